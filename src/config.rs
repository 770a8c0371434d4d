use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Sender address, e.g. `GreenWeave <no-reply@greenweave.shop>`.
    pub from: String,
    /// Base URL of the storefront; verification and reset links point here.
    pub client_url: String,
    /// `None` means mails are only logged.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Environment::Development,
            _ => Environment::Production,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    /// Argon2 iteration count.
    pub password_hash_cost: u32,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "greenweave".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "greenweave-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 7),
        };

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host,
                port: env_or("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            }),
            _ => None,
        };
        let mail = MailConfig {
            from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "GreenWeave <no-reply@greenweave.local>".into()),
            client_url: std::env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            smtp,
        };

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
            environment: Environment::parse(
                &std::env::var("APP_ENV").unwrap_or_else(|_| "production".into()),
            ),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            jwt,
            mail,
            password_hash_cost: env_or("PASSWORD_HASH_COST", 2),
        })
    }

    pub fn expose_error_detail(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_production() {
        assert_eq!(Environment::parse("development"), Environment::Development);
        assert_eq!(Environment::parse(" Dev "), Environment::Development);
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Production);
        assert_eq!(Environment::parse(""), Environment::Production);
    }
}
