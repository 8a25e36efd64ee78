use crate::error::{DataError, FieldError};
use crate::services::mailer::{ContactMessage, Mailer};
use crate::utils::rate_limit::RateLimiter;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 120, message = "Please tell us your name"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 40, message = "Phone number is too long"))]
    pub phone: Option<String>,
    #[validate(length(min = 10, max = 5000, message = "Message must be 10 to 5000 characters"))]
    pub message: String,
    /// Hidden field; humans leave it empty.
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContactOutcome {
    Sent,
    /// Honeypot tripped; reported to the caller as success.
    Discarded,
}

/// Flattens validator output into per-field errors, sorted by field.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", field));
                FieldError::new(field.to_string(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

pub struct ContactService {
    mailer: Arc<dyn Mailer>,
    limiter: RateLimiter,
    recipient: String,
}

impl ContactService {
    pub fn new(mailer: Arc<dyn Mailer>, limiter: RateLimiter, recipient: String) -> Self {
        Self {
            mailer,
            limiter,
            recipient,
        }
    }

    pub async fn submit(
        &self,
        request: ContactRequest,
        client_ip: Option<IpAddr>,
    ) -> Result<ContactOutcome, DataError> {
        if request
            .website
            .as_deref()
            .is_some_and(|w| !w.trim().is_empty())
        {
            info!("🍯 Contact submission discarded by honeypot");
            return Ok(ContactOutcome::Discarded);
        }

        request
            .validate()
            .map_err(|e| DataError::Validation(field_errors(&e)))?;

        let email_key = format!("email:{}", request.email.trim().to_lowercase());
        let ip_key = client_ip.map(|ip| format!("ip:{}", ip));
        let mut keys = vec![email_key.as_str()];
        if let Some(ip_key) = &ip_key {
            keys.push(ip_key.as_str());
        }
        self.limiter
            .check_all(&keys)
            .map_err(|retry_after| DataError::RateLimited { retry_after })?;

        let message = ContactMessage {
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            message: request.message.trim().to_string(),
        };
        self.mailer.send(&self.recipient, &message).await?;
        Ok(ContactOutcome::Sent)
    }

    /// Drops expired rate-limit windows.
    pub fn cleanup(&self) {
        self.limiter.cleanup();
    }
}
