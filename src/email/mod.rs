//! Email delivery: SMTP transport and HTML templates.

pub mod mailer;
pub mod templates;

pub use mailer::{Mailer, SmtpMailer};
