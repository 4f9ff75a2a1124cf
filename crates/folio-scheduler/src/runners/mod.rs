//! Built-in executors for `backup` and `email` tasks.

pub mod backup;
pub mod mail;

pub use backup::SqliteBackup;
pub use mail::SmtpMailer;
