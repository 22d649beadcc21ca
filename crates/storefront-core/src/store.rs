//! Purchase Storage
//!
//! `PurchaseStore` is the only way records are read or written. The webhook
//! handler owns every write; the account endpoint only reads.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::model::{
    NewOneTimePurchase, NewSubscription, OneTimePurchase, StatusChange, Subscription,
    SubscriptionStatus,
};

/// Storage trait for subscriptions and one-time purchases
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Mark the subscription active, creating it if it does not exist yet.
    ///
    /// Creating requires `new.user_id`; reactivating does not.
    async fn upsert_active_subscription(&self, new: NewSubscription) -> Result<Subscription>;

    /// Get subscription by provider id
    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>>;

    /// Move an existing subscription to `to` if its current status allows it.
    ///
    /// The check and the write happen as one step, so concurrent deliveries
    /// cannot slip a disallowed change past the guard. Fails with
    /// [`StoreError::NotFound`] when there is no such row.
    async fn transition_subscription(
        &self,
        id: &str,
        to: SubscriptionStatus,
    ) -> Result<StatusChange>;

    /// Record a one-time purchase.
    ///
    /// Fails with [`StoreError::Duplicate`] when the id is already taken.
    async fn create_one_time_purchase(&self, new: NewOneTimePurchase) -> Result<OneTimePurchase>;

    /// Subscriptions owned by a user, newest first
    async fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<Subscription>>;

    /// One-time purchases owned by a user, newest first
    async fn purchases_for_user(&self, user_id: &str) -> Result<Vec<OneTimePurchase>>;

    /// Check if the backing store is reachable
    async fn health_check(&self) -> bool {
        true
    }
}

/// In-memory purchase store (for development and tests)
#[derive(Default)]
pub struct MemoryPurchaseStore {
    subscriptions: RwLock<HashMap<String, Subscription>>,
    purchases: RwLock<HashMap<String, OneTimePurchase>>,
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of one-time purchase rows
    pub async fn purchase_count(&self) -> usize {
        self.purchases.read().await.len()
    }

    /// Total number of subscription rows
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

#[async_trait]
impl PurchaseStore for MemoryPurchaseStore {
    async fn upsert_active_subscription(&self, new: NewSubscription) -> Result<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
        let now = Utc::now();

        if let Some(existing) = subscriptions.get_mut(&new.id) {
            existing.status = SubscriptionStatus::Active;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let id = new.id.clone();
        let created = new
            .into_active(now)
            .ok_or_else(|| StoreError::MissingOwner(id.clone()))?;
        subscriptions.insert(id, created.clone());
        Ok(created)
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(id).cloned())
    }

    async fn transition_subscription(
        &self,
        id: &str,
        to: SubscriptionStatus,
    ) -> Result<StatusChange> {
        let mut subscriptions = self.subscriptions.write().await;
        let sub = subscriptions
            .get_mut(id)
            .ok_or_else(|| StoreError::subscription_not_found(id))?;

        if !sub.status.can_transition_to(to) {
            return Ok(StatusChange::Refused { current: sub.clone() });
        }

        let from = sub.status;
        sub.status = to;
        sub.updated_at = Utc::now();
        Ok(StatusChange::Applied {
            from,
            subscription: sub.clone(),
        })
    }

    async fn create_one_time_purchase(&self, new: NewOneTimePurchase) -> Result<OneTimePurchase> {
        let mut purchases = self.purchases.write().await;
        if purchases.contains_key(&new.id) {
            return Err(StoreError::purchase_exists(new.id));
        }

        let purchase = new.into_purchase(Utc::now());
        purchases.insert(purchase.id.clone(), purchase.clone());
        Ok(purchase)
    }

    async fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let mut subs: Vec<_> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }

    async fn purchases_for_user(&self, user_id: &str) -> Result<Vec<OneTimePurchase>> {
        let mut purchases: Vec<_> = self
            .purchases
            .read()
            .await
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(purchases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_sub(id: &str, user: Option<&str>) -> NewSubscription {
        NewSubscription {
            id: id.into(),
            user_id: user.map(Into::into),
            product: "prod_pro".into(),
            provider_customer_id: "cus_1".into(),
        }
    }

    fn new_purchase(id: &str, user: &str) -> NewOneTimePurchase {
        NewOneTimePurchase {
            id: id.into(),
            user_id: user.into(),
            product: "prod_lifetime".into(),
            provider_customer_id: "cus_1".into(),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_reactivates() {
        let store = MemoryPurchaseStore::new();

        let created = store
            .upsert_active_subscription(new_sub("sub_1", Some("user_1")))
            .await
            .unwrap();
        assert_eq!(created.status, SubscriptionStatus::Active);

        store
            .transition_subscription("sub_1", SubscriptionStatus::Canceled)
            .await
            .unwrap();

        // Renewal payloads need not carry the owner again
        let renewed = store
            .upsert_active_subscription(new_sub("sub_1", None))
            .await
            .unwrap();
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.user_id, "user_1");
        assert_eq!(renewed.created_at, created.created_at);
        assert_eq!(store.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_without_owner_fails_for_new_row() {
        let store = MemoryPurchaseStore::new();
        let result = store.upsert_active_subscription(new_sub("sub_1", None)).await;
        assert!(matches!(result, Err(StoreError::MissingOwner(_))));
        assert_eq!(store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_transition_on_missing_row_fails() {
        let store = MemoryPurchaseStore::new();
        let result = store
            .transition_subscription("sub_missing", SubscriptionStatus::Expired)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(store.get_subscription("sub_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_never_goes_back_to_canceled() {
        let store = MemoryPurchaseStore::new();
        store
            .upsert_active_subscription(new_sub("sub_1", Some("user_1")))
            .await
            .unwrap();

        let expired = store
            .transition_subscription("sub_1", SubscriptionStatus::Expired)
            .await
            .unwrap();
        assert!(matches!(
            expired,
            StatusChange::Applied { from: SubscriptionStatus::Active, .. }
        ));

        let late_cancel = store
            .transition_subscription("sub_1", SubscriptionStatus::Canceled)
            .await
            .unwrap();
        let StatusChange::Refused { current } = late_cancel else {
            panic!("expected refusal, got {late_cancel:?}");
        };
        assert_eq!(current.status, SubscriptionStatus::Expired);

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_terminal_events_respect_guard() {
        let store = std::sync::Arc::new(MemoryPurchaseStore::new());

        for round in 0..20 {
            let id = format!("sub_{round}");
            store
                .upsert_active_subscription(new_sub(&id, Some("user_1")))
                .await
                .unwrap();

            let (a, b) = (store.clone(), store.clone());
            let (ia, ib) = (id.clone(), id.clone());
            let expire = tokio::spawn(async move {
                a.transition_subscription(&ia, SubscriptionStatus::Expired).await
            });
            let cancel = tokio::spawn(async move {
                b.transition_subscription(&ib, SubscriptionStatus::Canceled).await
            });
            let expire = expire.await.unwrap().unwrap();
            let cancel = cancel.await.unwrap().unwrap();

            // Expiry always lands; a cancel after it is refused
            assert!(matches!(expire, StatusChange::Applied { .. }));
            let sub = store.get_subscription(&id).await.unwrap().unwrap();
            assert_eq!(sub.status, SubscriptionStatus::Expired);
            if let StatusChange::Applied { from, .. } = cancel {
                assert_eq!(from, SubscriptionStatus::Active);
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_purchase_rejected() {
        let store = MemoryPurchaseStore::new();
        store.create_one_time_purchase(new_purchase("ch_1", "user_1")).await.unwrap();

        let second = store.create_one_time_purchase(new_purchase("ch_1", "user_1")).await;
        assert!(matches!(second, Err(StoreError::Duplicate { .. })));
        assert_eq!(store.purchase_count().await, 1);
    }

    #[tokio::test]
    async fn test_listing_is_scoped_and_newest_first() {
        let store = MemoryPurchaseStore::new();
        store.create_one_time_purchase(new_purchase("ch_1", "user_1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.create_one_time_purchase(new_purchase("ch_2", "user_1")).await.unwrap();
        store.create_one_time_purchase(new_purchase("ch_3", "user_2")).await.unwrap();

        let mine = store.purchases_for_user("user_1").await.unwrap();
        let ids: Vec<_> = mine.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ch_2", "ch_1"]);
        assert!(store.subscriptions_for_user("user_1").await.unwrap().is_empty());
    }
}
