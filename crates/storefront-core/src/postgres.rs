//! Postgres Storage
//!
//! `PgStore` backs both [`PurchaseStore`] and [`SessionStore`] with a single
//! connection pool. The purchase tables are created by the embedded
//! migration; the `session` and `user` tables belong to the auth library and
//! are only read. The auth library stores `"expiresAt"` as a UTC `timestamp`
//! without time zone.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use crate::error::{Result, StoreError};
use crate::model::{
    NewOneTimePurchase, NewSubscription, OneTimePurchase, StatusChange, Subscription,
    SubscriptionStatus,
};
use crate::session::{SessionStore, SessionToken, UserSession};
use crate::store::PurchaseStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, product, provider_customer_id, status, created_at, updated_at";

const PURCHASE_COLUMNS: &str = "id, user_id, product, provider_customer_id, created_at, updated_at";

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    product: String,
    provider_customer_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        Ok(Self {
            status: SubscriptionStatus::parse(&row.status)?,
            id: row.id,
            user_id: row.user_id,
            product: row.product,
            provider_customer_id: row.provider_customer_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: String,
    user_id: String,
    product: String,
    provider_customer_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PurchaseRow> for OneTimePurchase {
    fn from(row: PurchaseRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            product: row.product,
            provider_customer_id: row.provider_customer_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    user_id: String,
    email: String,
    name: String,
    expires_at: DateTime<Utc>,
}

/// Postgres-backed purchase and session store
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect to `database_url` with a small pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the purchase tables if they do not exist
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&*self.pool).await?;
        tracing::info!("Purchase tables migrated");
        Ok(())
    }
}

#[async_trait]
impl PurchaseStore for PgStore {
    async fn upsert_active_subscription(&self, new: NewSubscription) -> Result<Subscription> {
        let now = Utc::now();

        let Some(user_id) = new.user_id else {
            // Without an owner only an existing row can be reactivated
            let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
                "UPDATE subscriptions SET status = 'active', updated_at = $2
                 WHERE id = $1
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            ))
            .bind(&new.id)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await?;

            return row
                .ok_or_else(|| StoreError::MissingOwner(new.id.clone()))?
                .try_into();
        };

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "INSERT INTO subscriptions
                 (id, user_id, product, provider_customer_id, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'active', $5, $5)
             ON CONFLICT (id) DO UPDATE
                 SET status = 'active', updated_at = EXCLUDED.updated_at
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(&new.id)
        .bind(&user_id)
        .bind(&new.product)
        .bind(&new.provider_customer_id)
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        row.try_into()
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?
        .map(Subscription::try_from)
        .transpose()
    }

    async fn transition_subscription(
        &self,
        id: &str,
        to: SubscriptionStatus,
    ) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await?;

        // Row lock: a concurrent delivery for the same id waits here
        let current: Subscription = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::subscription_not_found(id))?
        .try_into()?;

        if !current.status.can_transition_to(to) {
            tx.rollback().await?;
            return Ok(StatusChange::Refused { current });
        }

        let updated: Subscription = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE subscriptions SET status = $2, updated_at = $3
             WHERE id = $1
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id)
        .bind(to.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        tx.commit().await?;

        Ok(StatusChange::Applied {
            from: current.status,
            subscription: updated,
        })
    }

    async fn create_one_time_purchase(&self, new: NewOneTimePurchase) -> Result<OneTimePurchase> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "INSERT INTO one_time_purchases
                 (id, user_id, product, provider_customer_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             ON CONFLICT (id) DO NOTHING
             RETURNING {PURCHASE_COLUMNS}"
        ))
        .bind(&new.id)
        .bind(&new.user_id)
        .bind(&new.product)
        .bind(&new.provider_customer_id)
        .bind(Utc::now())
        .fetch_optional(&*self.pool)
        .await?;

        row.map(Into::into)
            .ok_or_else(|| StoreError::purchase_exists(new.id))
    }

    async fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE user_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?
        .into_iter()
        .map(Subscription::try_from)
        .collect()
    }

    async fn purchases_for_user(&self, user_id: &str) -> Result<Vec<OneTimePurchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM one_time_purchases
             WHERE user_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&*self.pool).await.is_ok()
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn resolve(&self, token: &SessionToken) -> Result<Option<UserSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT u.id AS user_id, u.email, u.name,
                   s."expiresAt" AT TIME ZONE 'UTC' AS expires_at
            FROM "session" s
            JOIN "user" u ON u.id = s."userId"
            WHERE s.token = $1
            "#,
        )
        .bind(token.as_str())
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row
            .map(|r| UserSession {
                user_id: r.user_id,
                email: r.email,
                name: r.name,
                expires_at: r.expires_at,
            })
            .filter(|s| !s.is_expired()))
    }
}

/// These run against a real server: set `DATABASE_URL` to a Postgres
/// instance the tests may create scratch databases on, then
/// `cargo test -p storefront-core --features postgres -- --ignored`.
#[cfg(test)]
mod tests {
    use chrono::Duration;

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

    /// Auth library tables as its Prisma schema lays them out
    async fn create_auth_tables(pool: &PgPool) {
        sqlx::query(
            r#"CREATE TABLE "user" (
                   id TEXT PRIMARY KEY,
                   name TEXT NOT NULL,
                   email TEXT NOT NULL UNIQUE
               )"#,
        )
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(
            r#"CREATE TABLE "session" (
                   id TEXT PRIMARY KEY,
                   token TEXT NOT NULL UNIQUE,
                   "userId" TEXT NOT NULL REFERENCES "user"(id),
                   "expiresAt" TIMESTAMP(3) NOT NULL
               )"#,
        )
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(r#"INSERT INTO "user" (id, name, email) VALUES ('user_1', 'Ada', 'ada@example.com')"#)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn insert_session(pool: &PgPool, id: &str, token: &str, expires_at: DateTime<Utc>) {
        sqlx::query(r#"INSERT INTO "session" (id, token, "userId", "expiresAt") VALUES ($1, $2, 'user_1', $3)"#)
            .bind(id)
            .bind(token)
            .bind(expires_at.naive_utc())
            .execute(pool)
            .await
            .unwrap();
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_upsert_creates_then_reactivates(pool: PgPool) {
        let store = PgStore::new(pool);

        let created = store
            .upsert_active_subscription(new_sub("sub_1", Some("user_1")))
            .await
            .unwrap();
        assert_eq!(created.status, SubscriptionStatus::Active);

        store
            .transition_subscription("sub_1", SubscriptionStatus::Canceled)
            .await
            .unwrap();

        // Owner-less renewal reactivates the existing row
        let renewed = store
            .upsert_active_subscription(new_sub("sub_1", None))
            .await
            .unwrap();
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.user_id, "user_1");
        assert_eq!(renewed.created_at, created.created_at);

        // Redelivery with the owner goes through ON CONFLICT
        let again = store
            .upsert_active_subscription(new_sub("sub_1", Some("user_1")))
            .await
            .unwrap();
        assert_eq!(again.status, SubscriptionStatus::Active);
        assert_eq!(store.subscriptions_for_user("user_1").await.unwrap().len(), 1);
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_upsert_without_owner_fails_for_new_row(pool: PgPool) {
        let store = PgStore::new(pool);

        let result = store.upsert_active_subscription(new_sub("sub_1", None)).await;
        assert!(matches!(result, Err(StoreError::MissingOwner(_))));
        assert!(store.get_subscription("sub_1").await.unwrap().is_none());
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_transition_guard(pool: PgPool) {
        let store = PgStore::new(pool);

        let missing = store
            .transition_subscription("sub_missing", SubscriptionStatus::Canceled)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));

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
        assert!(matches!(late_cancel, StatusChange::Refused { .. }));

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_concurrent_terminal_events_respect_guard(pool: PgPool) {
        let store = PgStore::new(pool);

        for round in 0..10 {
            let id = format!("sub_{round}");
            store
                .upsert_active_subscription(new_sub(&id, Some("user_1")))
                .await
                .unwrap();

            let (expire, cancel) = tokio::join!(
                store.transition_subscription(&id, SubscriptionStatus::Expired),
                store.transition_subscription(&id, SubscriptionStatus::Canceled),
            );
            assert!(matches!(expire.unwrap(), StatusChange::Applied { .. }));
            cancel.unwrap();

            let sub = store.get_subscription(&id).await.unwrap().unwrap();
            assert_eq!(sub.status, SubscriptionStatus::Expired);
        }
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_duplicate_purchase_rejected(pool: PgPool) {
        let store = PgStore::new(pool);

        let first = store
            .create_one_time_purchase(new_purchase("ch_1", "user_1"))
            .await
            .unwrap();
        assert_eq!(first.created_at, first.updated_at);

        let second = store.create_one_time_purchase(new_purchase("ch_1", "user_2")).await;
        assert!(matches!(second, Err(StoreError::Duplicate { .. })));

        let mine = store.purchases_for_user("user_1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(store.purchases_for_user("user_2").await.unwrap().is_empty());
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_listing_is_scoped_and_newest_first(pool: PgPool) {
        let store = PgStore::new(pool);

        store.create_one_time_purchase(new_purchase("ch_1", "user_1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create_one_time_purchase(new_purchase("ch_2", "user_1")).await.unwrap();
        store.create_one_time_purchase(new_purchase("ch_3", "user_2")).await.unwrap();

        store
            .upsert_active_subscription(new_sub("sub_old", Some("user_1")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .upsert_active_subscription(new_sub("sub_new", Some("user_1")))
            .await
            .unwrap();

        let purchases = store.purchases_for_user("user_1").await.unwrap();
        let ids: Vec<_> = purchases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ch_2", "ch_1"]);

        let subs = store.subscriptions_for_user("user_1").await.unwrap();
        let ids: Vec<_> = subs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sub_new", "sub_old"]);

        assert!(store.health_check().await);
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_session_lookup(pool: PgPool) {
        create_auth_tables(&pool).await;
        insert_session(&pool, "s_live", "tok_live", Utc::now() + Duration::hours(1)).await;
        insert_session(&pool, "s_old", "tok_old", Utc::now() - Duration::hours(1)).await;
        let store = PgStore::new(pool);

        let session = store
            .resolve(&SessionToken::from_string("tok_live"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.user_id, "user_1");
        assert_eq!(session.email, "ada@example.com");
        assert_eq!(session.name, "Ada");

        assert!(store.resolve(&SessionToken::from_string("tok_old")).await.unwrap().is_none());
        assert!(store.resolve(&SessionToken::from_string("nope")).await.unwrap().is_none());
    }
}
