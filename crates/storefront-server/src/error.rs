//! API Error Responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use storefront_core::StoreError;
use storefront_payments::PaymentError;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Errors returned by handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// No session, or a required identifier is missing
    #[error("Unauthorized")]
    Unauthorized,

    /// Creem is not configured on this deployment
    #[error("Payments not configured")]
    PaymentsDisabled,

    /// An optional feature lacks its configuration
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// Creem call failed
    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        source: PaymentError,
    },

    /// Webhook processing failed
    #[error("Webhook error: {0}")]
    Webhook(PaymentError),

    /// Storage failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub const fn upstream(context: &'static str, source: PaymentError) -> Self {
        Self::Upstream { context, source }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::PaymentsDisabled => (StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED"),
            Self::NotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED"),
            Self::Upstream { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
            Self::Webhook(e) => match e {
                PaymentError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
                PaymentError::WebhookParse(_) | PaymentError::MissingField(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD")
                }
                PaymentError::Store(store) => store_status(store),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "WEBHOOK_ERROR"),
            },
            Self::Store(store) => store_status(store),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Upstream { context, .. } => (*context).to_string(),
            Self::Webhook(PaymentError::Store(store)) | Self::Store(store) => store.user_message(),
            Self::Webhook(e) => e.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

const fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        StoreError::Duplicate { .. } => (StatusCode::CONFLICT, "DUPLICATE"),
        StoreError::MissingOwner(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        StoreError::InvalidStatus(_) | StoreError::Database(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        } else {
            tracing::warn!(error = %self, code, "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.message(),
                code: code.into(),
            }),
        )
            .into_response()
    }
}
