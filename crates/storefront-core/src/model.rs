//! Purchase Records
//!
//! The two record kinds mirrored from the payment provider: recurring
//! subscriptions and one-time purchases. Both are written only by the
//! webhook state sync and read by the account view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Subscription lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
        }
    }

    /// Parse the stored representation
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "canceled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }

    /// Whether a row in this status may move to `next`.
    ///
    /// Renewal (`-> Active`) is always allowed; an expired subscription
    /// never goes back to canceled.
    pub const fn can_transition_to(self, next: Self) -> bool {
        !matches!((self, next), (Self::Expired, Self::Canceled))
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A recurring subscription
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Provider-assigned subscription id
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Provider product id
    pub product: String,

    /// Provider customer id (used for the billing portal)
    pub provider_customer_id: String,

    pub status: SubscriptionStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A one-time purchase. Never modified after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimePurchase {
    /// Provider checkout id
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Provider product id
    pub product: String,

    /// Provider customer id
    pub provider_customer_id: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Data needed to create a subscription on first payment
#[derive(Clone, Debug)]
pub struct NewSubscription {
    pub id: String,
    pub user_id: Option<String>,
    pub product: String,
    pub provider_customer_id: String,
}

impl NewSubscription {
    /// Build the active row this payload would create.
    ///
    /// Fails when the payload carries no user to attribute it to.
    pub fn into_active(self, now: DateTime<Utc>) -> Option<Subscription> {
        Some(Subscription {
            user_id: self.user_id?,
            id: self.id,
            product: self.product,
            provider_customer_id: self.provider_customer_id,
            status: SubscriptionStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Data needed to record a one-time purchase
#[derive(Clone, Debug)]
pub struct NewOneTimePurchase {
    pub id: String,
    pub user_id: String,
    pub product: String,
    pub provider_customer_id: String,
}

impl NewOneTimePurchase {
    pub fn into_purchase(self, now: DateTime<Utc>) -> OneTimePurchase {
        OneTimePurchase {
            id: self.id,
            user_id: self.user_id,
            product: self.product,
            provider_customer_id: self.provider_customer_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a guarded status change
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusChange {
    /// The row moved from `from` to `subscription.status`
    Applied {
        from: SubscriptionStatus,
        subscription: Subscription,
    },

    /// The move is not allowed from the current status; the row is unchanged
    Refused { current: Subscription },
}

// ============================================================================
// Account view
// ============================================================================

/// Subscription row as shown on the account page
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub id: String,
    pub product: String,
    pub provider_customer_id: String,
    pub status: SubscriptionStatus,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionSummary {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            product: sub.product,
            provider_customer_id: sub.provider_customer_id,
            status: sub.status,
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

/// One-time purchase row as shown on the account page
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSummary {
    pub id: String,
    pub product: String,
    pub provider_customer_id: String,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl From<OneTimePurchase> for PurchaseSummary {
    fn from(purchase: OneTimePurchase) -> Self {
        Self {
            id: purchase.id,
            product: purchase.product,
            provider_customer_id: purchase.provider_customer_id,
            created_at: purchase.created_at,
            updated_at: purchase.updated_at,
        }
    }
}

/// Everything a user has bought, newest first
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPurchases {
    pub subscriptions: Vec<SubscriptionSummary>,
    pub one_time_purchases: Vec<PurchaseSummary>,
}

impl UserPurchases {
    pub fn new(subscriptions: Vec<Subscription>, purchases: Vec<OneTimePurchase>) -> Self {
        Self {
            subscriptions: subscriptions.into_iter().map(Into::into).collect(),
            one_time_purchases: purchases.into_iter().map(Into::into).collect(),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Expired,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(matches!(
            SubscriptionStatus::parse("paused"),
            Err(StoreError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_transitions() {
        use SubscriptionStatus::{Active, Canceled, Expired};

        assert!(Active.can_transition_to(Canceled));
        assert!(Active.can_transition_to(Expired));
        assert!(Canceled.can_transition_to(Expired));
        assert!(Canceled.can_transition_to(Active));
        assert!(Expired.can_transition_to(Active));
        assert!(Expired.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Canceled));
    }

    #[test]
    fn test_new_subscription_requires_user() {
        let new = NewSubscription {
            id: "sub_1".into(),
            user_id: None,
            product: "prod_1".into(),
            provider_customer_id: "cus_1".into(),
        };
        assert!(new.into_active(Utc::now()).is_none());
    }

    #[test]
    fn test_account_view_field_names() {
        let now = Utc::now();
        let purchases = UserPurchases::new(
            vec![Subscription {
                id: "sub_1".into(),
                user_id: "user_1".into(),
                product: "prod_1".into(),
                provider_customer_id: "cus_1".into(),
                status: SubscriptionStatus::Active,
                created_at: now,
                updated_at: now,
            }],
            Vec::new(),
        );

        let json = serde_json::to_value(&purchases).unwrap();
        let sub = &json["subscriptions"][0];
        assert_eq!(sub["providerCustomerId"], "cus_1");
        assert_eq!(sub["status"], "active");
        assert!(sub.get("created_at").is_some());
        assert!(sub.get("user_id").is_none());
        assert!(json["oneTimePurchases"].as_array().unwrap().is_empty());
    }
}
