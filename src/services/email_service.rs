use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;
use crate::error::{AppError, AppResult};

pub struct EmailService {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid SMTP_FROM: {}", e)))?;

        let creds = Credentials::new(config.user.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::Internal(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { from, transport })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| AppError::Notification(format!("email: invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Notification(format!("email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Notification(format!("email: {}", e)))?;

        tracing::info!("Email sent to {}", to);
        Ok(())
    }
}
