//! Outbound mail
//!
//! The IVR hands finished voicemails to a [`MailSender`]. [`SesMailer`] sends
//! through AWS SES; [`LogMailer`] only logs, for setups without mail
//! credentials.

pub mod config;
pub mod notification;
pub mod ses;
pub mod sigv4;

pub use config::MailConfig;
pub use notification::{build_voicemail_notification, NotificationSettings};
pub use ses::SesMailer;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Mail errors
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Mail service returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MailError>;

/// A complete send request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub to_addresses: Vec<String>,
    pub subject: String,
    pub html_body: String,
    /// Sender address
    pub source: String,
    /// Authorization reference for the sender identity (SES identity ARN)
    pub source_arn: Option<String>,
    pub charset: String,
}

/// What the mail service returned for an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> Result<SendReceipt>;
}

/// Mail sender that writes requests to the log instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, request: &EmailRequest) -> Result<SendReceipt> {
        let message_id = format!("log-{}", uuid::Uuid::new_v4());
        info!(
            %message_id,
            to = ?request.to_addresses,
            subject = %request.subject,
            body = %request.html_body,
            "Mail delivery disabled, logging notification instead"
        );
        Ok(SendReceipt { message_id })
    }
}
