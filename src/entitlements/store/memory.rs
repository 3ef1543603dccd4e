use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CounterIncrement, DisclosureGrant, DisclosureWrite, EntitlementStore, SubscriptionInsert,
    WorkerDirectory,
};
use crate::entitlements::error::{StoreError, StoreResult};
use crate::entitlements::models::{
    DisclosureRecord, Plan, QuotaLimit, Subscription, SubscriptionStatus, WorkerPublicRecord,
};

#[derive(Default)]
struct MemoryState {
    subscriptions: HashMap<Uuid, Subscription>,
    disclosures: HashMap<(Uuid, Uuid), DisclosureRecord>,
    workers: HashMap<Uuid, WorkerPublicRecord>,
}

impl MemoryState {
    fn active_for(&self, user_id: Uuid) -> Option<&Subscription> {
        self.subscriptions
            .values()
            .filter(|sub| sub.user_id == user_id && sub.status == SubscriptionStatus::Active)
            .max_by_key(|sub| sub.created_at)
    }

    fn active_mut(&mut self, subscription_id: Uuid) -> Option<&mut Subscription> {
        self.subscriptions
            .get_mut(&subscription_id)
            .filter(|sub| sub.status == SubscriptionStatus::Active)
    }
}

/// Single-lock store for tests and local runs without Postgres. Every write
/// happens under one write guard, which gives the same all-or-nothing
/// behaviour as the Postgres transactions.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    failing_writes: AtomicUsize,
    stale_disclosures: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_worker(&self, worker: WorkerPublicRecord) {
        self.state.write().await.workers.insert(worker.id, worker);
    }

    pub async fn subscription(&self, subscription_id: Uuid) -> Option<Subscription> {
        self.state
            .read()
            .await
            .subscriptions
            .get(&subscription_id)
            .cloned()
    }

    pub async fn subscriptions_for(&self, user_id: Uuid) -> Vec<Subscription> {
        let state = self.state.read().await;
        let mut subscriptions: Vec<_> = state
            .subscriptions
            .values()
            .filter(|sub| sub.user_id == user_id)
            .cloned()
            .collect();
        subscriptions.sort_by_key(|sub| sub.created_at);
        subscriptions
    }

    /// Overwrites a stored subscription, e.g. to backdate `end_date`.
    pub async fn put_subscription(&self, subscription: Subscription) {
        self.state
            .write()
            .await
            .subscriptions
            .insert(subscription.id, subscription);
    }

    /// The next `count` writes fail with [`StoreError::Unavailable`] and change nothing.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// The next `count` disclosure writes behave as if another request had
    /// consumed the counter first.
    pub fn drift_next_disclosures(&self, count: usize) {
        self.stale_disclosures.store(count, Ordering::SeqCst);
    }

    fn check_write(&self) -> StoreResult<()> {
        if take_one(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn active_subscription(&self, user_id: Uuid) -> StoreResult<Option<Subscription>> {
        Ok(self.state.read().await.active_for(user_id).cloned())
    }

    async fn insert_active_subscription(
        &self,
        subscription: &Subscription,
    ) -> StoreResult<SubscriptionInsert> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if state.active_for(subscription.user_id).is_some() {
            return Ok(SubscriptionInsert::ActiveExists);
        }
        let mut inserted = subscription.clone();
        inserted.status = SubscriptionStatus::Active;
        state.subscriptions.insert(inserted.id, inserted.clone());
        Ok(SubscriptionInsert::Inserted(inserted))
    }

    async fn close_subscription(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription>> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let Some(sub) = state.active_mut(subscription_id) else {
            return Ok(None);
        };
        let now = Utc::now();
        sub.status = status;
        sub.end_date.get_or_insert(now);
        sub.updated_at = now;
        Ok(Some(sub.clone()))
    }

    async fn replace_plan(
        &self,
        subscription_id: Uuid,
        plan: &Plan,
    ) -> StoreResult<Option<Subscription>> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let Some(sub) = state.active_mut(subscription_id) else {
            return Ok(None);
        };
        if !plan.contact_limit.covers(sub.contacts_used)
            || !plan.job_post_limit.covers(sub.job_posts_used)
        {
            return Ok(None);
        }
        sub.plan_id = plan.id;
        sub.updated_at = Utc::now();
        Ok(Some(sub.clone()))
    }

    async fn rotate_subscription(
        &self,
        current_id: Uuid,
        next: &Subscription,
    ) -> StoreResult<Option<Subscription>> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(current) = state.active_mut(current_id) else {
            return Ok(None);
        };
        current.status = SubscriptionStatus::Cancelled;
        current.end_date.get_or_insert(now);
        current.updated_at = now;

        let mut fresh = next.clone();
        fresh.status = SubscriptionStatus::Active;
        fresh.contacts_used = 0;
        fresh.job_posts_used = 0;
        state.subscriptions.insert(fresh.id, fresh.clone());
        Ok(Some(fresh))
    }

    async fn increment_job_posts(
        &self,
        subscription_id: Uuid,
        limit: QuotaLimit,
    ) -> StoreResult<CounterIncrement> {
        self.check_write()?;
        let mut state = self.state.write().await;
        match state.active_mut(subscription_id) {
            Some(sub) if limit.admits(sub.job_posts_used) => {
                sub.job_posts_used += 1;
                sub.updated_at = Utc::now();
                Ok(CounterIncrement::Incremented(sub.job_posts_used))
            }
            _ => Ok(CounterIncrement::Rejected),
        }
    }

    async fn has_disclosed(&self, user_id: Uuid, worker_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .disclosures
            .contains_key(&(user_id, worker_id)))
    }

    async fn record_disclosure(&self, grant: &DisclosureGrant) -> StoreResult<DisclosureWrite> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let key = (grant.user_id, grant.worker_id);
        if state.disclosures.contains_key(&key) {
            return Ok(DisclosureWrite::AlreadyExists);
        }
        if take_one(&self.stale_disclosures) {
            return Ok(DisclosureWrite::QuotaDrifted);
        }

        let now = Utc::now();
        let contacts_used = match state.active_mut(grant.subscription_id) {
            Some(sub) if grant.contact_limit.admits(sub.contacts_used) => {
                sub.contacts_used += 1;
                sub.updated_at = now;
                sub.contacts_used
            }
            _ => return Ok(DisclosureWrite::QuotaDrifted),
        };

        let record = DisclosureRecord {
            id: Uuid::new_v4(),
            user_id: grant.user_id,
            worker_id: grant.worker_id,
            subscription_id: Some(grant.subscription_id),
            disclosed_at: now,
        };
        state.disclosures.insert(key, record.clone());
        Ok(DisclosureWrite::Recorded {
            record,
            contacts_used,
        })
    }

    async fn disclosures(&self, user_id: Uuid) -> StoreResult<Vec<DisclosureRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .disclosures
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.disclosed_at.cmp(&a.disclosed_at));
        Ok(records)
    }

    async fn count_disclosures(&self, user_id: Uuid) -> StoreResult<i64> {
        let state = self.state.read().await;
        let count = state
            .disclosures
            .keys()
            .filter(|(owner, _)| *owner == user_id)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl WorkerDirectory for MemoryStore {
    async fn worker_public_record(
        &self,
        worker_id: Uuid,
    ) -> StoreResult<Option<WorkerPublicRecord>> {
        Ok(self.state.read().await.workers.get(&worker_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(subscription: &Subscription, worker_id: Uuid, limit: QuotaLimit) -> DisclosureGrant {
        DisclosureGrant {
            user_id: subscription.user_id,
            worker_id,
            subscription_id: subscription.id,
            contact_limit: limit,
        }
    }

    async fn store_with_subscription() -> (MemoryStore, Subscription) {
        let store = MemoryStore::new();
        let sub = Subscription::open(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        store.insert_active_subscription(&sub).await.unwrap();
        (store, sub)
    }

    #[tokio::test]
    async fn second_active_subscription_is_refused() {
        let (store, sub) = store_with_subscription().await;
        let other = Subscription::open(sub.user_id, Uuid::new_v4(), Utc::now());
        assert_eq!(
            store.insert_active_subscription(&other).await.unwrap(),
            SubscriptionInsert::ActiveExists
        );
    }

    #[tokio::test]
    async fn disclosure_charges_once_per_pair() {
        let (store, sub) = store_with_subscription().await;
        let worker = Uuid::new_v4();
        let first = store
            .record_disclosure(&grant(&sub, worker, QuotaLimit::Capped(3)))
            .await
            .unwrap();
        assert!(matches!(
            first,
            DisclosureWrite::Recorded {
                contacts_used: 1,
                ..
            }
        ));
        let second = store
            .record_disclosure(&grant(&sub, worker, QuotaLimit::Capped(3)))
            .await
            .unwrap();
        assert_eq!(second, DisclosureWrite::AlreadyExists);
        assert_eq!(store.subscription(sub.id).await.unwrap().contacts_used, 1);
    }

    #[tokio::test]
    async fn full_counter_drifts_without_journal_row() {
        let (store, sub) = store_with_subscription().await;
        let outcome = store
            .record_disclosure(&grant(&sub, Uuid::new_v4(), QuotaLimit::Capped(0)))
            .await
            .unwrap();
        assert_eq!(outcome, DisclosureWrite::QuotaDrifted);
        assert_eq!(store.count_disclosures(sub.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn injected_failure_leaves_state_untouched() {
        let (store, sub) = store_with_subscription().await;
        store.fail_next_writes(1);
        let err = store
            .record_disclosure(&grant(&sub, Uuid::new_v4(), QuotaLimit::Unlimited))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.count_disclosures(sub.user_id).await.unwrap(), 0);
        assert_eq!(store.subscription(sub.id).await.unwrap().contacts_used, 0);
    }

    #[tokio::test]
    async fn rotation_cancels_current_and_zeroes_counters() {
        let (store, sub) = store_with_subscription().await;
        store
            .record_disclosure(&grant(&sub, Uuid::new_v4(), QuotaLimit::Unlimited))
            .await
            .unwrap();
        let next = Subscription::open(sub.user_id, Uuid::new_v4(), Utc::now());
        let fresh = store
            .rotate_subscription(sub.id, &next)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.contacts_used, 0);
        let previous = store.subscription(sub.id).await.unwrap();
        assert_eq!(previous.status, SubscriptionStatus::Cancelled);
        assert!(previous.end_date.is_some());
        assert!(store
            .rotate_subscription(sub.id, &next)
            .await
            .unwrap()
            .is_none());
    }
}
