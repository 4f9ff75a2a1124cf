use async_trait::async_trait;
use folio_core::config::SmtpConfig;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::{
    error::TaskError,
    executor::{EmailCommand, ExecResult, Mailer},
};

/// STARTTLS SMTP relay for `email` tasks.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, TaskError> {
        let from: Mailbox = cfg
            .from
            .parse()
            .map_err(|e| TaskError::InvalidCommand(format!("invalid smtp.from address: {e}")))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .map_err(|e| TaskError::Failed(format!("SMTP relay error: {e}")))?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self { from, transport })
    }
}

/// Build the outgoing message for `email`.
fn build_message(from: &Mailbox, email: &EmailCommand) -> Result<Message, TaskError> {
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| TaskError::InvalidCommand(format!("invalid recipient '{}': {e}", email.to)))?;
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.clone())
        .body(email.body.clone())
        .map_err(|e| TaskError::Failed(format!("failed to build email: {e}")))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &EmailCommand) -> ExecResult {
        let message = build_message(&self.from, email)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| TaskError::Failed(format!("SMTP send error: {e}")))?;
        info!(to = %email.to, code = %response.code(), "email sent");
        Ok(format!("sent to {} ({})", email.to, response.code()))
    }
}
