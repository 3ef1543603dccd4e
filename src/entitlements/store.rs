//! Storage seam for the entitlement engine.
//!
//! Both backends must make [`EntitlementStore::record_disclosure`] atomic: the
//! journal row and the contact counter bump land together or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use super::error::StoreResult;
use super::models::{
    DisclosureRecord, Plan, QuotaLimit, Subscription, SubscriptionStatus, WorkerPublicRecord,
};

pub use memory::MemoryStore;
pub use postgres::PgEntitlementStore;

/// Append one journal row for the pair and charge one contact credit to `subscription_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisclosureGrant {
    pub user_id: Uuid,
    pub worker_id: Uuid,
    pub subscription_id: Uuid,
    pub contact_limit: QuotaLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisclosureWrite {
    Recorded {
        record: DisclosureRecord,
        contacts_used: i64,
    },
    /// Another request already journaled this pair; nothing was charged.
    AlreadyExists,
    /// The subscription was no longer active, or its counter had reached the
    /// limit, when the increment ran. Nothing was written.
    QuotaDrifted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterIncrement {
    Incremented(i64),
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionInsert {
    Inserted(Subscription),
    ActiveExists,
}

/// Worker directory lookup owned by the worker CRUD side of the marketplace.
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    async fn worker_public_record(&self, worker_id: Uuid)
        -> StoreResult<Option<WorkerPublicRecord>>;
}

/// key: entitlement-store -> ledger + journal persistence
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Most recent subscription with status `active`, lapsed or not.
    async fn active_subscription(&self, user_id: Uuid) -> StoreResult<Option<Subscription>>;

    /// Inserts `subscription` unless the user already holds an active one.
    async fn insert_active_subscription(
        &self,
        subscription: &Subscription,
    ) -> StoreResult<SubscriptionInsert>;

    /// Moves an active subscription to `status`. `None` when it was not active.
    async fn close_subscription(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription>>;

    /// Points an active subscription at `plan`, keeping its counters. `None`
    /// when it is no longer active or its counters exceed the plan's limits.
    async fn replace_plan(
        &self,
        subscription_id: Uuid,
        plan: &Plan,
    ) -> StoreResult<Option<Subscription>>;

    /// Cancels `current_id` and inserts `next` in one unit. `None` when
    /// `current_id` was no longer active.
    async fn rotate_subscription(
        &self,
        current_id: Uuid,
        next: &Subscription,
    ) -> StoreResult<Option<Subscription>>;

    async fn increment_job_posts(
        &self,
        subscription_id: Uuid,
        limit: QuotaLimit,
    ) -> StoreResult<CounterIncrement>;

    async fn has_disclosed(&self, user_id: Uuid, worker_id: Uuid) -> StoreResult<bool>;

    async fn record_disclosure(&self, grant: &DisclosureGrant) -> StoreResult<DisclosureWrite>;

    /// Journal rows for `user_id`, newest first.
    async fn disclosures(&self, user_id: Uuid) -> StoreResult<Vec<DisclosureRecord>>;

    async fn count_disclosures(&self, user_id: Uuid) -> StoreResult<i64>;
}
