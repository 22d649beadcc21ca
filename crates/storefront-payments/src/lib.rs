//! # storefront-payments
//!
//! Creem payments integration for creem-storefront.
//!
//! ## Hosted checkout flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Storefront │────▶│   Creem Hosted  │────▶│  Storefront │
//! │ /api/checkout│    │  Checkout Page  │     │ success_url │
//! └─────────────┘     └────────┬────────┘     └─────────────┘
//!                              │ webhook
//!                              ▼
//!                     ┌─────────────────┐     ┌─────────────┐
//!                     │  /api/webhook   │────▶│ PurchaseStore│
//!                     │ WebhookHandler  │     │             │
//!                     └─────────────────┘     └─────────────┘
//! ```
//!
//! The storefront never decides whether something was paid for. It asks
//! Creem for checkout and portal links, and mirrors whatever the webhooks
//! report into the [`storefront_core::PurchaseStore`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storefront_payments::{CheckoutRequest, CreemClient, CreemConfig, PaymentProvider};
//!
//! let config = CreemConfig::from_lookup(|key| std::env::var(key).ok())?;
//! let client = CreemClient::new(&config)?;
//!
//! let session = client
//!     .create_checkout(&CheckoutRequest::for_user("prod_123", &user, None))
//!     .await?;
//!
//! // Redirect user to: session.checkout_url
//! ```

mod checkout;
mod client;
mod error;
pub mod format;
mod product;
mod webhook;

pub use checkout::{CheckoutMetadata, CheckoutRequest, CheckoutSession};
pub use client::{CreemClient, CreemConfig, CreemEnvironment, PaymentProvider};
pub use error::{PaymentError, Result};
pub use product::{
    BillingPeriod, BillingType, PageRequest, Pagination, PricingTable, PricingTableProduct,
    Product, ProductPage,
};
pub use webhook::{
    SIGNATURE_HEADER, WebhookEnvelope, WebhookEvent, WebhookHandler, WebhookOutcome, sign_payload,
    verify_signature,
};
