// src/mail.rs

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, Message, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("smtp error: {0}")]
    Transport(String),
    #[error("outbound mail is not configured")]
    Disabled,
}

/// Outbound email. Callers treat delivery as best-effort.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(server: &str, cfg: &MailConfig) -> Result<Self, MailError> {
        let sender = cfg
            .default_sender
            .as_deref()
            .ok_or_else(|| MailError::InvalidAddress("<no MAIL_DEFAULT_SENDER>".into()))?;
        let from: Mailbox = sender
            .parse()
            .map_err(|_| MailError::InvalidAddress(sender.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(cfg.port);
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|_| MailError::InvalidAddress(to.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!("Email sent to {to}");
        Ok(())
    }
}

/// Used when no SMTP server is configured. Logs the message and reports it
/// as undelivered.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), MailError> {
        tracing::info!("Email service disabled, skipping email to {to}: {subject}");
        Err(MailError::Disabled)
    }
}
