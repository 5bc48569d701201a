//! Mail transports.

use std::future::Future;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to build email: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A plain-text email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers composed emails.
///
/// Implemented by [`SmtpMailer`] for real delivery and [`ConsoleMailer`] for
/// development.
pub trait Mailer: Send + Sync + 'static {
    /// Send one email.
    ///
    /// # Errors
    ///
    /// Returns error if the recipient address is invalid or the transport
    /// rejects the message.
    fn send(&self, email: &OutgoingEmail) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// Whether `address` is a syntactically valid email address.
pub fn is_valid_address(address: &str) -> bool {
    address.parse::<lettre::Address>().is_ok()
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// SMTP transport over TLS using Lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// # Errors
    ///
    /// Returns error if `from` is not a valid mailbox or the relay host is
    /// unusable.
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{from}: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(settings.port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {e}", email.to)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(format!("Failed to send email: {e}")))?;

        Ok(())
    }
}

/// Logs emails instead of sending them.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Mailer for ConsoleMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if !is_valid_address(&email.to) {
            return Err(MailError::InvalidAddress(email.to.clone()));
        }

        info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "Email (console transport)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation() {
        assert!(is_valid_address("ann@example.com"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("not an address"));
    }

    #[tokio::test]
    async fn console_mailer_rejects_blank_recipient() {
        let email = OutgoingEmail {
            to: String::new(),
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
        };
        assert!(matches!(
            ConsoleMailer::new().send(&email).await,
            Err(MailError::InvalidAddress(_))
        ));
    }
}
