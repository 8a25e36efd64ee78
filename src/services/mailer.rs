//! Contact-form mail delivery via SMTP.

use crate::error::DataError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "noreply@localhost";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// `None` when `SMTP_HOST` is unset.
    ///
    /// | Variable        | Default             |
    /// |-----------------|---------------------|
    /// | `SMTP_HOST`     | (required)          |
    /// | `SMTP_PORT`     | `587`               |
    /// | `SMTP_FROM`     | `noreply@localhost` |
    /// | `SMTP_USER`     |                     |
    /// | `SMTP_PASSWORD` |                     |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty())?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

/// A validated contact-form submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
}

impl ContactMessage {
    pub fn subject(&self) -> String {
        format!("New enquiry from {}", self.name)
    }

    pub fn body(&self) -> String {
        format!(
            "Name: {}\nEmail: {}\nPhone: {}\n\n{}",
            self.name,
            self.email,
            self.phone.as_deref().unwrap_or("-"),
            self.message
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, message: &ContactMessage) -> Result<(), DataError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from_address.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, message: &ContactMessage) -> Result<(), DataError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e: lettre::address::AddressError| DataError::Mail(e.to_string()))?;
        let reply_to: Mailbox = message
            .email
            .parse()
            .map_err(|_| DataError::validation("email", "Invalid email format"))?;

        let email = Message::builder()
            .from(self.from.clone())
            .reply_to(reply_to)
            .to(to)
            .subject(message.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body())
            .map_err(|e| DataError::Mail(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DataError::Mail(e.to_string()))?;

        info!("📧 Contact message relayed for {}", message.email);
        Ok(())
    }
}

/// Used when no SMTP relay is configured: logs instead of sending.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, message: &ContactMessage) -> Result<(), DataError> {
        warn!(
            "📭 SMTP not configured; contact message for {} from {} was not sent:\n{}",
            to,
            message.email,
            message.body()
        );
        Ok(())
    }
}
