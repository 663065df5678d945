//! Outbound email delivery

use async_trait::async_trait;
use botsentry_common::config::EmailConfig;
use lettre::{
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Rendered email body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Email to deliver. Sender fields fall back to the configured defaults.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub content: EmailContent,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
}

impl OutboundEmail {
    pub fn new(to: impl Into<String>, content: EmailContent) -> Self {
        Self {
            to: to.into(),
            content,
            from_email: None,
            from_name: None,
            reply_to: None,
        }
    }
}

/// Email delivery errors
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email delivery not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

/// Email sender trait
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError>;
}

/// SMTP sender built on lettre
pub struct SmtpEmailSender {
    config: EmailConfig,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, EmailError> {
        let address = address
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", address, e)))?;
        Ok(Mailbox::new(name.map(str::to_string), address))
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message, EmailError> {
        let from_email = email.from_email.as_deref().unwrap_or(&self.config.from_email);
        let from_name = email.from_name.as_deref().unwrap_or(&self.config.from_name);

        let mut builder = Message::builder()
            .from(Self::mailbox(Some(from_name), from_email)?)
            .to(Self::mailbox(None, &email.to)?)
            .subject(&email.content.subject);

        if let Some(reply_to) = email.reply_to.as_deref().or(self.config.reply_to.as_deref()) {
            builder = builder.reply_to(Self::mailbox(None, reply_to)?);
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(email.content.text.clone()))
                    .singlepart(SinglePart::html(email.content.html.clone())),
            )
            .map_err(|e| EmailError::Build(e.to_string()))
    }

    fn transport(&self, host: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let mut builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| EmailError::Transport(e.to_string()))?
        } else if self.config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| EmailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        builder = builder.port(self.config.smtp_port);

        if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)))
            .build())
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let host = match self.config.smtp_host.as_deref() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(EmailError::NotConfigured("email.smtp_host is not set".to_string())),
        };

        let message = self.build_message(&email)?;
        let mailer = self.transport(host)?;

        let response = mailer
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        debug!(to = %email.to, code = %response.code(), "Email sent");
        Ok(())
    }
}
