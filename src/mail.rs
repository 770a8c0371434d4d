use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::{MailConfig, SmtpConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> anyhow::Result<()>;
}

/// Development sink: writes every message to the log instead of sending it.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, body = %message.body, "mail (not sent)");
        Ok(())
    }
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig, from: &str) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .with_context(|| format!("smtp relay {}", cfg.host))?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();
        Ok(Self {
            transport,
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: MailMessage) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse().context("invalid from address")?)
            .to(message.to.parse().context("invalid to address")?)
            .subject(message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body)
            .context("build email")?;
        self.transport.send(email).await.context("smtp send")?;
        info!(to = %message.to, "mail sent");
        Ok(())
    }
}

/// Builds the account emails; holds the storefront URL the links point at.
#[derive(Clone)]
pub struct Notifier {
    client_url: String,
}

impl Notifier {
    pub fn new(cfg: &MailConfig) -> Self {
        Self {
            client_url: cfg.client_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/verify-email/{}", self.client_url, token)
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/reset-password/{}", self.client_url, token)
    }

    pub fn verification_email(&self, to: &str, first_name: &str, token: &str) -> MailMessage {
        MailMessage {
            to: to.to_string(),
            subject: "Verify your GreenWeave account".into(),
            body: format!(
                "Hi {},\n\n\
                 Welcome to GreenWeave! Please confirm your email address by opening the link below:\n\n\
                 {}\n\n\
                 If you did not create an account, you can ignore this email.",
                first_name,
                self.verification_link(token)
            ),
        }
    }

    pub fn reset_email(&self, to: &str, first_name: &str, token: &str) -> MailMessage {
        MailMessage {
            to: to.to_string(),
            subject: "Reset your GreenWeave password".into(),
            body: format!(
                "Hi {},\n\n\
                 We received a request to reset your password. The link below is valid for 1 hour:\n\n\
                 {}\n\n\
                 If you did not request a reset, you can ignore this email.",
                first_name,
                self.reset_link(token)
            ),
        }
    }
}

pub fn mailer_from_config(cfg: &MailConfig) -> anyhow::Result<std::sync::Arc<dyn Mailer>> {
    Ok(match &cfg.smtp {
        Some(smtp) => std::sync::Arc::new(SmtpMailer::new(smtp, &cfg.from)?),
        None => {
            info!("SMTP_HOST not set; emails will only be logged");
            std::sync::Arc::new(LogMailer)
        }
    })
}
