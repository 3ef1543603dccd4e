use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::error::EntitlementError;
use super::models::{
    Plan, PlanTier, QuotaKind, Subscription, SubscriptionStatus, UsageSnapshot,
};
use super::plans::PlanRegistry;
use super::store::{CounterIncrement, EntitlementStore, SubscriptionInsert};
use super::CONFLICT_RETRY_LIMIT;

/// How a user without an active subscription is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningPolicy {
    pub lazy_provisioning: bool,
    pub default_tier: PlanTier,
}

impl Default for ProvisioningPolicy {
    fn default() -> Self {
        Self {
            lazy_provisioning: true,
            default_tier: PlanTier::Free,
        }
    }
}

impl ProvisioningPolicy {
    pub fn from_env() -> Self {
        Self {
            lazy_provisioning: *crate::config::LAZY_FREE_PLAN_PROVISIONING,
            default_tier: *crate::config::DEFAULT_PLAN_TIER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveEntitlement {
    pub subscription: Subscription,
    pub plan: Plan,
}

impl ActiveEntitlement {
    pub fn usage(&self, quota: QuotaKind) -> UsageSnapshot {
        UsageSnapshot::new(
            quota,
            self.subscription.used(quota),
            self.plan.limit_for(quota),
        )
    }
}

/// Dashboard view: "X of Y used" for every metered dimension.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementSummary {
    pub subscription: Subscription,
    pub plan: Plan,
    pub contacts: UsageSnapshot,
    pub job_posts: UsageSnapshot,
}

impl From<ActiveEntitlement> for EntitlementSummary {
    fn from(current: ActiveEntitlement) -> Self {
        let contacts = current.usage(QuotaKind::Contacts);
        let job_posts = current.usage(QuotaKind::JobPosts);
        Self {
            subscription: current.subscription,
            plan: current.plan,
            contacts,
            job_posts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanChangeKind {
    Upgrade,
    Downgrade,
    Lateral,
}

impl PlanChangeKind {
    fn between(from: PlanTier, to: PlanTier) -> Self {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => PlanChangeKind::Upgrade,
            std::cmp::Ordering::Less => PlanChangeKind::Downgrade,
            std::cmp::Ordering::Equal => PlanChangeKind::Lateral,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanChange {
    pub previous_tier: PlanTier,
    pub kind: PlanChangeKind,
    pub usage_carried_over: bool,
    pub subscription: Subscription,
    pub plan: Plan,
}

/// key: subscription-ledger -> active subscription + metered counters
#[derive(Clone)]
pub struct SubscriptionLedger {
    store: Arc<dyn EntitlementStore>,
    plans: Arc<PlanRegistry>,
    policy: ProvisioningPolicy,
}

impl SubscriptionLedger {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        plans: Arc<PlanRegistry>,
        policy: ProvisioningPolicy,
    ) -> Self {
        Self {
            store,
            plans,
            policy,
        }
    }

    /// Read-only lookup; lapsed subscriptions read as absent.
    pub async fn get_active_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, EntitlementError> {
        let now = Utc::now();
        Ok(self
            .store
            .active_subscription(user_id)
            .await?
            .filter(|sub| sub.is_current(now)))
    }

    pub async fn active_entitlement(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ActiveEntitlement>, EntitlementError> {
        match self.get_active_subscription(user_id).await? {
            Some(subscription) => self.with_plan(subscription).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the user's active subscription, provisioning the default tier
    /// first when the policy allows it.
    pub async fn ensure_active_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<ActiveEntitlement, EntitlementError> {
        for _ in 0..=CONFLICT_RETRY_LIMIT {
            let now = Utc::now();
            if let Some(subscription) = self.store.active_subscription(user_id).await? {
                if !subscription.has_lapsed(now) {
                    return self.with_plan(subscription);
                }
                self.store
                    .close_subscription(subscription.id, SubscriptionStatus::Expired)
                    .await?;
                tracing::info!(%user_id, subscription_id = %subscription.id, "expired lapsed subscription");
            }

            if !self.policy.lazy_provisioning {
                return Err(EntitlementError::NoActiveSubscription(user_id));
            }

            let plan = self
                .plans
                .get_plan(self.policy.default_tier)
                .cloned()
                .ok_or_else(|| EntitlementError::UnknownPlan(self.policy.default_tier.to_string()))?;
            match self
                .store
                .insert_active_subscription(&Subscription::open(user_id, plan.id, now))
                .await?
            {
                SubscriptionInsert::Inserted(subscription) => {
                    tracing::info!(
                        %user_id,
                        subscription_id = %subscription.id,
                        tier = %plan.tier,
                        "provisioned default subscription"
                    );
                    return Ok(ActiveEntitlement { subscription, plan });
                }
                SubscriptionInsert::ActiveExists => {
                    tracing::debug!(%user_id, "subscription provisioned concurrently; re-reading");
                }
            }
        }
        Err(EntitlementError::ConcurrencyConflict)
    }

    pub async fn usage(&self, user_id: Uuid) -> Result<EntitlementSummary, EntitlementError> {
        Ok(self.ensure_active_subscription(user_id).await?.into())
    }

    /// Applies a plan change decided elsewhere (checkout, admin tooling).
    ///
    /// Counters carry over when the target plan's limits still cover them;
    /// otherwise the current subscription is cancelled and a fresh one opened.
    pub async fn change_plan(
        &self,
        user_id: Uuid,
        tier: PlanTier,
    ) -> Result<PlanChange, EntitlementError> {
        let target = self
            .plans
            .get_plan(tier)
            .cloned()
            .ok_or_else(|| EntitlementError::UnknownPlan(tier.to_string()))?;
        let current = self.ensure_active_subscription(user_id).await?;
        let kind = PlanChangeKind::between(current.plan.tier, target.tier);
        let carries_usage = target
            .contact_limit
            .covers(current.subscription.contacts_used)
            && target
                .job_post_limit
                .covers(current.subscription.job_posts_used);

        let subscription = if carries_usage {
            self.store
                .replace_plan(current.subscription.id, &target)
                .await?
        } else {
            let next = Subscription::open(user_id, target.id, Utc::now());
            self.store
                .rotate_subscription(current.subscription.id, &next)
                .await?
        }
        .ok_or(EntitlementError::ConcurrencyConflict)?;

        tracing::info!(
            %user_id,
            subscription_id = %subscription.id,
            from = %current.plan.tier,
            to = %target.tier,
            ?kind,
            carries_usage,
            "changed subscription plan"
        );
        Ok(PlanChange {
            previous_tier: current.plan.tier,
            kind,
            usage_carried_over: carries_usage,
            subscription,
            plan: target,
        })
    }

    pub async fn cancel(&self, user_id: Uuid) -> Result<Subscription, EntitlementError> {
        let current = self
            .get_active_subscription(user_id)
            .await?
            .ok_or(EntitlementError::NoActiveSubscription(user_id))?;
        let cancelled = self
            .store
            .close_subscription(current.id, SubscriptionStatus::Cancelled)
            .await?
            .ok_or(EntitlementError::ConcurrencyConflict)?;
        tracing::info!(%user_id, subscription_id = %cancelled.id, "cancelled subscription");
        Ok(cancelled)
    }

    /// Charges one job-post credit with the same compare-and-increment the
    /// contact counter uses.
    pub async fn consume_job_post(&self, user_id: Uuid) -> Result<UsageSnapshot, EntitlementError> {
        for attempt in 0..=CONFLICT_RETRY_LIMIT {
            let current = self.ensure_active_subscription(user_id).await?;
            let limit = current.plan.job_post_limit;
            let used = current.subscription.job_posts_used;
            if !limit.admits(used) {
                return Err(EntitlementError::QuotaExceeded {
                    quota: QuotaKind::JobPosts,
                    used,
                    limit: limit.as_raw(),
                });
            }
            match self
                .store
                .increment_job_posts(current.subscription.id, limit)
                .await?
            {
                CounterIncrement::Incremented(used) => {
                    return Ok(UsageSnapshot::new(QuotaKind::JobPosts, used, limit));
                }
                CounterIncrement::Rejected => {
                    tracing::warn!(%user_id, attempt, "job post counter moved concurrently");
                }
            }
        }
        Err(EntitlementError::ConcurrencyConflict)
    }

    fn with_plan(&self, subscription: Subscription) -> Result<ActiveEntitlement, EntitlementError> {
        let plan = self
            .plans
            .plan_by_id(subscription.plan_id)
            .cloned()
            .ok_or_else(|| EntitlementError::UnknownPlan(subscription.plan_id.to_string()))?;
        Ok(ActiveEntitlement { subscription, plan })
    }
}
