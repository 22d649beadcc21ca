//! # storefront-core
//!
//! Purchase records, subscription status transitions, and the storage and
//! session abstractions the storefront server is built on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      storefront-core                      │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────┐  │
//! │  │    Model     │  │ PurchaseStore  │  │ SessionStore │  │
//! │  │ Subscription │──│  (Strategy)    │  │  (Strategy)  │  │
//! │  │ OneTimePurch.│  │ Memory | Pg    │  │ Memory | Pg  │  │
//! │  └──────────────┘  └────────────────┘  └──────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are written only by the webhook state sync in
//! `storefront-payments`; everything else reads them.
//!
//! Enable the `postgres` feature for [`PgStore`].

pub mod error;
pub mod model;
pub mod session;
pub mod store;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::{Result, StoreError};
pub use model::{
    NewOneTimePurchase, NewSubscription, OneTimePurchase, StatusChange, Subscription,
    SubscriptionStatus, UserPurchases,
};
pub use session::{MemorySessionStore, SessionStore, SessionToken, UserSession};
pub use store::{MemoryPurchaseStore, PurchaseStore};

#[cfg(feature = "postgres")]
pub use postgres::PgStore;
