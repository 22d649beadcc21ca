//! Server Configuration
//!
//! Everything comes from environment variables (optionally via `.env`).

use storefront_payments::{CreemConfig, PaymentError};
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Creem: {0}")]
    Payments(#[from] PaymentError),
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Postgres URL; in-memory storage when unset
    pub database_url: Option<String>,

    pub database_max_connections: u32,

    /// Allowed CORS origin; any origin when unset
    pub cors_allow_origin: Option<String>,

    /// Creem API access; payments endpoints answer 503 when unset
    pub creem: Option<CreemConfig>,

    /// Webhook signing secret; unsigned webhooks are accepted when unset
    pub webhook_secret: Option<String>,

    /// Post-checkout redirect
    pub success_url: Option<String>,

    /// Hosted pricing table served at `/api/pricing-table`
    pub pricing_table_id: Option<String>,
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let creem = match non_empty("CREEM_API_KEY") {
            Some(_) => Some(CreemConfig::from_lookup(&lookup)?),
            None => None,
        };

        let database_max_connections = non_empty("DATABASE_MAX_CONNECTIONS")
            .map(|v| {
                v.parse().map_err(|_| ConfigError::Invalid {
                    key: "DATABASE_MAX_CONNECTIONS",
                    value: v,
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        Ok(Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections,
            cors_allow_origin: non_empty("CORS_ALLOW_ORIGIN"),
            webhook_secret: non_empty("CREEM_WEBHOOK_SECRET"),
            success_url: non_empty("SUCCESS_URL"),
            pricing_table_id: non_empty("CREEM_PRICING_TABLE_ID"),
            creem,
        })
    }
}
