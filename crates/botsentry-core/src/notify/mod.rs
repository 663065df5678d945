//! Email delivery and notification rendering

pub mod owner;
pub mod sender;
pub mod templates;

pub use owner::{NotificationReport, OwnerNotifier};
pub use sender::{EmailContent, EmailError, EmailSender, OutboundEmail, SmtpEmailSender};
pub use templates::Templates;
