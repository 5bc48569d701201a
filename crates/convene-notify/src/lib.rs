//! Outbound email: mail transports, the job worker fed by request handlers,
//! and the periodic reminder sweep.

pub mod mailer;
pub mod messages;
pub mod reminders;
pub mod worker;

pub use mailer::{ConsoleMailer, MailError, Mailer, OutgoingEmail, SmtpMailer, SmtpSettings};
pub use worker::Notifier;

#[cfg(test)]
pub(crate) mod test_support;
