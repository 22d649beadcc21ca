//! Payment Error Types

use storefront_core::StoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Creem answered with a non-success status
    #[error("Creem error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Request to Creem never completed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Webhook payload lacks a field needed to attribute the record
    #[error("Webhook missing field: {0}")]
    MissingField(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Provider { status, .. } => *status >= 500 || *status == 429,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &str {
        match self {
            Self::Provider { .. } | Self::Http(_) => "Payment processing failed. Please try again.",
            Self::WebhookSignature(_) => "Invalid signature.",
            Self::WebhookParse(_) | Self::MissingField(_) => "Malformed webhook payload.",
            Self::Config(_) => "Service configuration error.",
            Self::Store(_) => "An error occurred processing your request.",
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
