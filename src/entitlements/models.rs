use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Raw value persisted for a limit that disables capping.
pub const UNLIMITED: i64 = -1;

/// key: entitlement-tier -> ordered plan levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Basic,
    Premium,
    Business,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Free,
        PlanTier::Basic,
        PlanTier::Premium,
        PlanTier::Business,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
            PlanTier::Business => "business",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "basic" => Some(PlanTier::Basic),
            "premium" => Some(PlanTier::Premium),
            "business" => Some(PlanTier::Business),
            _ => None,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("quota limit must be non-negative or -1 (unlimited), got {0}")]
pub struct InvalidQuotaLimit(pub i64);

/// Cap on one metered dimension of a plan.
///
/// Stored and serialized as a plain integer so `-1` keeps meaning "unlimited"
/// for dashboards and the plan seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum QuotaLimit {
    Capped(i64),
    Unlimited,
}

impl QuotaLimit {
    /// Whether one more unit fits on top of `used`.
    pub fn admits(&self, used: i64) -> bool {
        match self {
            QuotaLimit::Unlimited => true,
            QuotaLimit::Capped(limit) => used < *limit,
        }
    }

    /// Whether `used` units already recorded stay within the cap.
    pub fn covers(&self, used: i64) -> bool {
        match self {
            QuotaLimit::Unlimited => true,
            QuotaLimit::Capped(limit) => used <= *limit,
        }
    }

    pub fn cap(&self) -> Option<i64> {
        match self {
            QuotaLimit::Unlimited => None,
            QuotaLimit::Capped(limit) => Some(*limit),
        }
    }

    pub fn remaining(&self, used: i64) -> Option<i64> {
        self.cap().map(|limit| limit.saturating_sub(used).max(0))
    }

    pub fn as_raw(&self) -> i64 {
        self.cap().unwrap_or(UNLIMITED)
    }
}

impl TryFrom<i64> for QuotaLimit {
    type Error = InvalidQuotaLimit;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            UNLIMITED => Ok(QuotaLimit::Unlimited),
            limit if limit >= 0 => Ok(QuotaLimit::Capped(limit)),
            other => Err(InvalidQuotaLimit(other)),
        }
    }
}

impl From<QuotaLimit> for i64 {
    fn from(limit: QuotaLimit) -> Self {
        limit.as_raw()
    }
}

/// key: entitlement-plan-model -> seeded catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub tier: PlanTier,
    pub price: i32,
    pub currency: String,
    pub contact_limit: QuotaLimit,
    pub job_post_limit: QuotaLimit,
    pub has_whatsapp_access: bool,
    pub user_limit: i32,
    pub features: Vec<String>,
    pub is_active: bool,
}

impl Plan {
    pub fn limit_for(&self, quota: QuotaKind) -> QuotaLimit {
        match quota {
            QuotaKind::Contacts => self.contact_limit,
            QuotaKind::JobPosts => self.job_post_limit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SubscriptionStatus::Active),
            "expired" => Some(SubscriptionStatus::Expired),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }
}

/// key: entitlement-subscription-model -> per-user usage counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub contacts_used: i64,
    pub job_posts_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Fresh active subscription with zeroed counters.
    pub fn open(user_id: Uuid, plan_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            plan_id,
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: None,
            contacts_used: 0,
            job_posts_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && !self.has_lapsed(now)
    }

    /// Still flagged active but past its end date.
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.end_date.map(|end| end <= now).unwrap_or(false)
    }

    pub fn used(&self, quota: QuotaKind) -> i64 {
        match quota {
            QuotaKind::Contacts => self.contacts_used,
            QuotaKind::JobPosts => self.job_posts_used,
        }
    }
}

/// key: disclosure-journal-model -> append-only audit row
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DisclosureRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub worker_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub disclosed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Approved,
    Rejected,
}

impl WorkerStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(WorkerStatus::Pending),
            "approved" => Some(WorkerStatus::Approved),
            "rejected" => Some(WorkerStatus::Rejected),
            _ => None,
        }
    }
}

/// Worker directory projection the guard needs. Not `Serialize`: contact
/// fields only leave the engine through [`ContactPayload`].
#[derive(Clone, PartialEq, Eq)]
pub struct WorkerPublicRecord {
    pub id: Uuid,
    pub status: WorkerStatus,
    pub is_active: bool,
    pub phone: String,
    pub whatsapp: Option<String>,
}

impl WorkerPublicRecord {
    pub fn is_publicly_visible(&self) -> bool {
        self.status == WorkerStatus::Approved && self.is_active
    }
}

impl fmt::Debug for WorkerPublicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPublicRecord")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("is_active", &self.is_active)
            .field("phone", &"<redacted>")
            .field("whatsapp", &self.whatsapp.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Contacts,
    JobPosts,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::Contacts => "contacts",
            QuotaKind::JobPosts => "job_posts",
        }
    }
}

/// "X of Y used" view of one metered dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub quota: QuotaKind,
    pub used: i64,
    pub limit: QuotaLimit,
    pub remaining: Option<i64>,
}

impl UsageSnapshot {
    pub fn new(quota: QuotaKind, used: i64, limit: QuotaLimit) -> Self {
        Self {
            quota,
            used,
            limit,
            remaining: limit.remaining(used),
        }
    }
}

/// key: disclosure-result -> contact plus metering outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactReveal {
    pub worker_id: Uuid,
    #[serde(flatten)]
    pub contact: ContactPayload,
    pub already_disclosed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn quota_limit_sentinel_maps_to_unlimited() {
        assert_eq!(QuotaLimit::try_from(-1), Ok(QuotaLimit::Unlimited));
        assert_eq!(QuotaLimit::try_from(0), Ok(QuotaLimit::Capped(0)));
        assert_eq!(QuotaLimit::try_from(-7), Err(InvalidQuotaLimit(-7)));
        assert_eq!(i64::from(QuotaLimit::Unlimited), -1);
    }

    #[test]
    fn capped_limit_admits_until_full() {
        let limit = QuotaLimit::Capped(3);
        assert!(limit.admits(2));
        assert!(!limit.admits(3));
        assert!(limit.covers(3));
        assert!(!limit.covers(4));
        assert_eq!(limit.remaining(1), Some(2));
        assert_eq!(limit.remaining(5), Some(0));
        assert!(QuotaLimit::Unlimited.admits(i64::MAX));
        assert_eq!(QuotaLimit::Unlimited.remaining(10), None);
    }

    #[test]
    fn usage_snapshot_serializes_unlimited_as_sentinel() {
        let snapshot = UsageSnapshot::new(QuotaKind::Contacts, 12, QuotaLimit::Unlimited);
        let value = serde_json::to_value(snapshot).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"quota": "contacts", "used": 12, "limit": -1, "remaining": null})
        );
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(PlanTier::Free < PlanTier::Basic);
        assert!(PlanTier::Premium < PlanTier::Business);
        assert_eq!(PlanTier::parse(" Premium "), Some(PlanTier::Premium));
        assert_eq!(PlanTier::parse("gold"), None);
    }

    #[test]
    fn lapsed_subscription_is_not_current() {
        let now = Utc::now();
        let mut subscription = Subscription::open(Uuid::new_v4(), Uuid::new_v4(), now);
        assert!(subscription.is_current(now));
        subscription.end_date = Some(now - Duration::days(1));
        assert!(subscription.has_lapsed(now));
        assert!(!subscription.is_current(now));
        subscription.status = SubscriptionStatus::Cancelled;
        assert!(!subscription.has_lapsed(now));
    }

    #[test]
    fn worker_debug_output_redacts_contact() {
        let worker = WorkerPublicRecord {
            id: Uuid::new_v4(),
            status: WorkerStatus::Approved,
            is_active: true,
            phone: "+91 98290 00000".into(),
            whatsapp: Some("+91 98290 00000".into()),
        };
        let rendered = format!("{worker:?}");
        assert!(!rendered.contains("98290"));
        assert!(worker.is_publicly_visible());
    }
}
