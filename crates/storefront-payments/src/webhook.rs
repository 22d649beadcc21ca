//! Creem Webhook Handling
//!
//! Mirrors provider-owned purchase state into the local store:
//!
//! | billing   | event                   | effect                               |
//! |-----------|-------------------------|--------------------------------------|
//! | one-time  | `checkout.completed`    | create one-time purchase             |
//! | recurring | `subscription.paid`     | upsert subscription as active        |
//! | recurring | `subscription.canceled` | existing subscription -> canceled    |
//! | recurring | `subscription.expired`  | existing subscription -> expired     |
//!
//! Anything else is ignored. Deliveries are not deduplicated.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use storefront_core::{
    NewOneTimePurchase, NewSubscription, PurchaseStore, StatusChange, StoreError,
    SubscriptionStatus,
};

use crate::error::{PaymentError, Result};
use crate::product::BillingType;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "creem-signature";

type HmacSha256 = Hmac<Sha256>;

/// Sign a payload the way Creem does: hex HMAC-SHA256 of the raw body
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a `creem-signature` header value in constant time
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> Result<()> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| PaymentError::WebhookSignature("signature is not hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::WebhookSignature("signature mismatch".into()))
}

// ============================================================================
// Wire format
// ============================================================================

/// Customer reference: Creem sends either the id or the expanded object
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomerRef {
    Id(String),
    Object { id: String },
}

impl CustomerRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

/// Product reference with its billing discriminator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: String,
    pub billing_type: BillingType,
}

/// The checkout or subscription an event is about
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookObject {
    /// Checkout or subscription id
    pub id: String,

    /// Set from the checkout `request_id` (the buying user)
    #[serde(default)]
    pub request_id: Option<String>,

    pub customer: CustomerRef,

    pub product: ProductRef,

    #[serde(default)]
    pub status: Option<String>,

    /// Checkout metadata; `userId` attributes subscriptions
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl WebhookObject {
    fn metadata_user_id(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("userId"))
            .and_then(serde_json::Value::as_str)
            .map(String::from)
    }
}

/// Webhook envelope as delivered.
///
/// `object` stays raw until the event type says which shape to expect;
/// refunds, disputes and other events carry objects of their own.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Event id
    pub id: String,

    #[serde(rename = "eventType")]
    pub event_type: String,

    #[serde(default)]
    pub created_at: Option<serde_json::Value>,

    #[serde(default)]
    pub object: serde_json::Value,
}

/// Event types whose object is a checkout or subscription
const SYNCED_EVENTS: [&str; 4] = [
    "checkout.completed",
    "subscription.paid",
    "subscription.canceled",
    "subscription.expired",
];

// ============================================================================
// Events
// ============================================================================

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// One-time payment completed - record purchase
    CheckoutCompleted {
        purchase_id: String,
        user_id: Option<String>,
        product_id: String,
        customer_id: String,
    },

    /// New subscription or renewal - mark active
    SubscriptionPaid {
        subscription_id: String,
        user_id: Option<String>,
        product_id: String,
        customer_id: String,
    },

    /// Subscription cancelled
    SubscriptionCanceled { subscription_id: String },

    /// Subscription ended
    SubscriptionExpired { subscription_id: String },

    /// Unhandled event type / billing combination
    Other {
        event_type: String,
        billing_type: Option<BillingType>,
    },
}

impl WebhookEvent {
    /// Decode a raw webhook body
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let envelope: WebhookEnvelope = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
        tracing::debug!(event_id = %envelope.id, event_type = %envelope.event_type, "Parsed webhook envelope");

        if !SYNCED_EVENTS.contains(&envelope.event_type.as_str()) {
            return Ok(Self::Other {
                event_type: envelope.event_type,
                billing_type: None,
            });
        }

        let object: WebhookObject = serde_json::from_value(envelope.object)
            .map_err(|e| PaymentError::WebhookParse(format!("object: {e}")))?;
        Ok(Self::dispatch(envelope.event_type, object))
    }

    fn dispatch(event_type: String, object: WebhookObject) -> Self {
        let billing_type = object.product.billing_type;

        match (billing_type, event_type.as_str()) {
            (BillingType::OneTime, "checkout.completed") => Self::CheckoutCompleted {
                purchase_id: object.id,
                user_id: object.request_id,
                product_id: object.product.id,
                customer_id: object.customer.id().to_string(),
            },
            (BillingType::Recurring, "subscription.paid") => Self::SubscriptionPaid {
                user_id: object.metadata_user_id(),
                customer_id: object.customer.id().to_string(),
                subscription_id: object.id,
                product_id: object.product.id,
            },
            (BillingType::Recurring, "subscription.canceled") => {
                Self::SubscriptionCanceled { subscription_id: object.id }
            }
            (BillingType::Recurring, "subscription.expired") => {
                Self::SubscriptionExpired { subscription_id: object.id }
            }
            _ => Self::Other {
                event_type,
                billing_type: Some(billing_type),
            },
        }
    }
}

/// What processing an event did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    PurchaseCreated {
        purchase_id: String,
        user_id: String,
    },
    SubscriptionActivated {
        subscription_id: String,
    },
    SubscriptionStatusChanged {
        subscription_id: String,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    Ignored {
        reason: String,
    },
}

// ============================================================================
// Handler
// ============================================================================

/// Webhook handler
pub struct WebhookHandler<S: PurchaseStore + ?Sized> {
    store: Arc<S>,
}

impl<S: PurchaseStore + ?Sized> WebhookHandler<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Verify signature (when a secret is configured) and parse
    pub fn parse_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        secret: Option<&str>,
    ) -> Result<WebhookEvent> {
        if let Some(secret) = secret {
            let signature = signature
                .ok_or_else(|| PaymentError::WebhookSignature("missing signature".into()))?;
            verify_signature(payload, signature, secret)?;
        }
        WebhookEvent::parse(payload)
    }

    /// Process a webhook event
    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted {
                purchase_id,
                user_id,
                product_id,
                customer_id,
            } => {
                let user_id = user_id.ok_or(PaymentError::MissingField("object.request_id"))?;

                let purchase = self
                    .store
                    .create_one_time_purchase(NewOneTimePurchase {
                        id: purchase_id,
                        user_id,
                        product: product_id,
                        provider_customer_id: customer_id,
                    })
                    .await?;

                tracing::info!(
                    purchase_id = %purchase.id,
                    user_id = %purchase.user_id,
                    product = %purchase.product,
                    "Recorded one-time purchase"
                );

                Ok(WebhookOutcome::PurchaseCreated {
                    purchase_id: purchase.id,
                    user_id: purchase.user_id,
                })
            }

            WebhookEvent::SubscriptionPaid {
                subscription_id,
                user_id,
                product_id,
                customer_id,
            } => {
                let sub = self
                    .store
                    .upsert_active_subscription(NewSubscription {
                        id: subscription_id,
                        user_id,
                        product: product_id,
                        provider_customer_id: customer_id,
                    })
                    .await
                    .map_err(|e| match e {
                        StoreError::MissingOwner(_) => {
                            PaymentError::MissingField("object.metadata.userId")
                        }
                        other => other.into(),
                    })?;

                tracing::info!(
                    subscription_id = %sub.id,
                    user_id = %sub.user_id,
                    product = %sub.product,
                    "Subscription active"
                );

                Ok(WebhookOutcome::SubscriptionActivated { subscription_id: sub.id })
            }

            WebhookEvent::SubscriptionCanceled { subscription_id } => {
                self.transition(&subscription_id, SubscriptionStatus::Canceled).await
            }

            WebhookEvent::SubscriptionExpired { subscription_id } => {
                self.transition(&subscription_id, SubscriptionStatus::Expired).await
            }

            WebhookEvent::Other { event_type, billing_type } => {
                let billing = billing_type.map_or("unknown", BillingType::as_str);
                tracing::debug!(event_type = %event_type, billing_type = billing, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored {
                    reason: format!("{billing} event {event_type}"),
                })
            }
        }
    }

    /// Move an existing subscription to `to`; fails when there is no row
    async fn transition(&self, id: &str, to: SubscriptionStatus) -> Result<WebhookOutcome> {
        match self.store.transition_subscription(id, to).await? {
            StatusChange::Applied { from, subscription } => {
                tracing::info!(
                    subscription_id = %id,
                    from = %from,
                    to = %subscription.status,
                    "Subscription status changed"
                );

                Ok(WebhookOutcome::SubscriptionStatusChanged {
                    subscription_id: subscription.id,
                    from,
                    to: subscription.status,
                })
            }
            StatusChange::Refused { current } => {
                tracing::warn!(
                    subscription_id = %id,
                    from = %current.status,
                    to = %to,
                    "Ignoring out-of-order subscription event"
                );

                Ok(WebhookOutcome::Ignored {
                    reason: format!("subscription {id} is {}", current.status),
                })
            }
        }
    }
}
