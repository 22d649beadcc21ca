//! Error Types

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record with the given id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record with the given id already exists
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    /// A new subscription arrived without an owning user
    #[error("Subscription {0} has no owning user")]
    MissingOwner(String),

    /// Unknown subscription status string
    #[error("Invalid subscription status: {0}")]
    InvalidStatus(String),

    /// Backing database failed
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn subscription_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "subscription", id: id.into() }
    }

    pub fn purchase_exists(id: impl Into<String>) -> Self {
        Self::Duplicate { kind: "one-time purchase", id: id.into() }
    }

    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { kind, .. } => format!("The {kind} does not exist."),
            Self::Duplicate { kind, .. } => format!("The {kind} was already recorded."),
            Self::MissingOwner(_) => "The subscription is not linked to a user.".into(),
            Self::InvalidStatus(_) => "Stored record is corrupt.".into(),
            Self::Database(_) => "The database is currently unavailable.".into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(err.to_string())
    }
}
