use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    CounterIncrement, DisclosureGrant, DisclosureWrite, EntitlementStore, SubscriptionInsert,
    WorkerDirectory,
};
use crate::entitlements::error::{StoreError, StoreResult};
use crate::entitlements::models::{
    DisclosureRecord, Plan, QuotaLimit, Subscription, SubscriptionStatus, WorkerPublicRecord,
    WorkerStatus,
};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, start_date, end_date, \
     contacts_used, job_posts_used, created_at, updated_at";

const DISCLOSURE_COLUMNS: &str = "id, user_id, worker_id, subscription_id, disclosed_at";

/// key: entitlement-store-postgres -> uniqueness constraints as concurrency control
#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn active_subscription(&self, user_id: Uuid) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE user_id = $1 AND status = 'active' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn insert_active_subscription(
        &self,
        subscription: &Subscription,
    ) -> StoreResult<SubscriptionInsert> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            INSERT INTO subscriptions (
                id,
                user_id,
                plan_id,
                status,
                start_date,
                end_date,
                contacts_used,
                job_posts_used,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, 'active', $4, $5, $6, $7, $8, $8)
            ON CONFLICT (user_id) WHERE status = 'active' DO NOTHING
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.plan_id)
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.contacts_used)
        .bind(subscription.job_posts_used)
        .bind(subscription.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(SubscriptionInsert::Inserted(row.try_into()?)),
            None => Ok(SubscriptionInsert::ActiveExists),
        }
    }

    async fn close_subscription(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE subscriptions \
             SET status = $2, end_date = COALESCE(end_date, NOW()), updated_at = NOW() \
             WHERE id = $1 AND status = 'active' \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(subscription_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn replace_plan(
        &self,
        subscription_id: Uuid,
        plan: &Plan,
    ) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET plan_id = $2, status = 'active', updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
              AND ($3::BIGINT IS NULL OR contacts_used <= $3)
              AND ($4::BIGINT IS NULL OR job_posts_used <= $4)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(plan.id)
        .bind(plan.contact_limit.cap())
        .bind(plan.job_post_limit.cap())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn rotate_subscription(
        &self,
        current_id: Uuid,
        next: &Subscription,
    ) -> StoreResult<Option<Subscription>> {
        let mut tx = self.pool.begin().await?;
        let cancelled = sqlx::query(
            "UPDATE subscriptions \
             SET status = 'cancelled', end_date = COALESCE(end_date, NOW()), updated_at = NOW() \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(current_id)
        .execute(&mut *tx)
        .await?;
        if cancelled.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            INSERT INTO subscriptions (
                id,
                user_id,
                plan_id,
                status,
                start_date,
                end_date,
                contacts_used,
                job_posts_used,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, 'active', $4, $5, 0, 0, $6, $6)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(next.id)
        .bind(next.user_id)
        .bind(next.plan_id)
        .bind(next.start_date)
        .bind(next.end_date)
        .bind(next.created_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(row.try_into()?))
    }

    async fn increment_job_posts(
        &self,
        subscription_id: Uuid,
        limit: QuotaLimit,
    ) -> StoreResult<CounterIncrement> {
        let used: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE subscriptions
            SET job_posts_used = job_posts_used + 1, updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
              AND ($2::BIGINT IS NULL OR job_posts_used < $2)
            RETURNING job_posts_used
            "#,
        )
        .bind(subscription_id)
        .bind(limit.cap())
        .fetch_optional(&self.pool)
        .await?;

        Ok(used
            .map(CounterIncrement::Incremented)
            .unwrap_or(CounterIncrement::Rejected))
    }

    async fn has_disclosed(&self, user_id: Uuid, worker_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM contact_disclosures WHERE user_id = $1 AND worker_id = $2)",
        )
        .bind(user_id)
        .bind(worker_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn record_disclosure(&self, grant: &DisclosureGrant) -> StoreResult<DisclosureWrite> {
        let mut tx = self.pool.begin().await?;

        // A concurrent insert of the same pair blocks here until the other
        // transaction settles, then falls through to DO NOTHING.
        let record = sqlx::query_as::<_, DisclosureRecord>(&format!(
            "INSERT INTO contact_disclosures (id, user_id, worker_id, subscription_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, worker_id) DO NOTHING \
             RETURNING {DISCLOSURE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(grant.user_id)
        .bind(grant.worker_id)
        .bind(grant.subscription_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            tx.rollback().await?;
            return Ok(DisclosureWrite::AlreadyExists);
        };

        let contacts_used: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE subscriptions
            SET contacts_used = contacts_used + 1, updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
              AND ($2::BIGINT IS NULL OR contacts_used < $2)
            RETURNING contacts_used
            "#,
        )
        .bind(grant.subscription_id)
        .bind(grant.contact_limit.cap())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(contacts_used) = contacts_used else {
            tx.rollback().await?;
            return Ok(DisclosureWrite::QuotaDrifted);
        };

        tx.commit().await?;
        Ok(DisclosureWrite::Recorded {
            record,
            contacts_used,
        })
    }

    async fn disclosures(&self, user_id: Uuid) -> StoreResult<Vec<DisclosureRecord>> {
        let records = sqlx::query_as::<_, DisclosureRecord>(&format!(
            "SELECT {DISCLOSURE_COLUMNS} FROM contact_disclosures \
             WHERE user_id = $1 ORDER BY disclosed_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn count_disclosures(&self, user_id: Uuid) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contact_disclosures WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl WorkerDirectory for PgEntitlementStore {
    async fn worker_public_record(
        &self,
        worker_id: Uuid,
    ) -> StoreResult<Option<WorkerPublicRecord>> {
        let row = sqlx::query_as::<_, WorkerRow>(
            "SELECT id, status, is_active, phone, whatsapp FROM workers WHERE id = $1",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(WorkerPublicRecord::try_from).transpose()
    }
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan_id: Uuid,
    status: String,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    contacts_used: i64,
    job_posts_used: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "subscription {} has unknown status `{}`",
                row.id, row.status
            ))
        })?;
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            plan_id: row.plan_id,
            status,
            start_date: row.start_date,
            end_date: row.end_date,
            contacts_used: row.contacts_used,
            job_posts_used: row.job_posts_used,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct WorkerRow {
    id: Uuid,
    status: String,
    is_active: bool,
    phone: String,
    whatsapp: Option<String>,
}

impl TryFrom<WorkerRow> for WorkerPublicRecord {
    type Error = StoreError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let status = WorkerStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("worker {} has unknown status `{}`", row.id, row.status))
        })?;
        Ok(WorkerPublicRecord {
            id: row.id,
            status,
            is_active: row.is_active,
            phone: row.phone,
            whatsapp: row.whatsapp,
        })
    }
}
