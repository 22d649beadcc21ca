//! Application State

use std::sync::Arc;

use storefront_core::{PurchaseStore, SessionStore};
use storefront_payments::PaymentProvider;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Subscription and purchase records
    pub store: Arc<dyn PurchaseStore>,

    /// Session lookup for the auth cookie
    pub sessions: Arc<dyn SessionStore>,

    /// Payment provider (optional - None if not configured)
    pub payments: Option<Arc<dyn PaymentProvider>>,

    pub settings: Arc<Settings>,
}

/// Per-deployment values handlers need
#[derive(Clone, Debug, Default)]
pub struct Settings {
    /// Webhook signing secret
    pub webhook_secret: Option<String>,

    /// Post-checkout redirect
    pub success_url: Option<String>,

    /// Hosted pricing table id
    pub pricing_table_id: Option<String>,
}
