use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::{jwt::JwtKeys, password::PasswordHasher};
use crate::config::AppConfig;
use crate::mail::{mailer_from_config, Mailer, Notifier};
use crate::users::{
    repo::PgUserStore,
    store::{MemoryUserStore, UserStore},
};

/// Everything a request handler needs, built once at start.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Notifier,
    pub jwt: JwtKeys,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres user store");
                Arc::new(PgUserStore::new(db))
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(MemoryUserStore::new())
            }
        };

        let mailer = mailer_from_config(&config.mail)?;
        Self::from_parts(config, users, mailer)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            notifier: Notifier::new(&config.mail),
            jwt: JwtKeys::from_config(&config.jwt),
            hasher: PasswordHasher::new(config.password_hash_cost)?,
            config,
            users,
            mailer,
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::config::{Environment, JwtConfig, MailConfig};
    use crate::mail::tests::RecordingMailer;

    pub(crate) fn config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            environment: Environment::Production,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60,
            },
            mail: MailConfig {
                from: "GreenWeave <no-reply@example.com>".into(),
                client_url: "http://localhost:3000".into(),
                smtp: None,
            },
            password_hash_cost: 1,
        }
    }

    /// In-memory state with a recording mailer and cheap hashing.
    pub(crate) fn state() -> (AppState, Arc<RecordingMailer>) {
        let mailer = Arc::new(RecordingMailer::default());
        let mut state = AppState::from_parts(
            Arc::new(config()),
            Arc::new(MemoryUserStore::new()),
            mailer.clone(),
        )
        .expect("fake state");
        state.hasher = PasswordHasher::fast();
        (state, mailer)
    }
}
