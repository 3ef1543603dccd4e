//! Subscription entitlements and worker contact disclosure.

pub mod api;
pub mod engine;
pub mod error;
pub mod guard;
pub mod journal;
pub mod ledger;
pub mod models;
pub mod plans;
pub mod store;

/// Internal retries after a `ConcurrencyConflict` before it is surfaced.
pub const CONFLICT_RETRY_LIMIT: usize = 1;

pub use api::{
    cancel_subscription, change_plan, consume_job_post, contact_history, get_subscription,
    list_plans, record_contact_view, reveal_contact, ChangePlanRequest, ContactViewRequest,
};
pub use engine::Entitlements;
pub use error::{EntitlementError, StoreError, StoreResult};
pub use guard::DisclosureGuard;
pub use journal::DisclosureJournal;
pub use ledger::{
    ActiveEntitlement, EntitlementSummary, PlanChange, PlanChangeKind, ProvisioningPolicy,
    SubscriptionLedger,
};
pub use models::{
    ContactPayload, ContactReveal, DisclosureRecord, Plan, PlanTier, QuotaKind, QuotaLimit,
    Subscription, SubscriptionStatus, UsageSnapshot, WorkerPublicRecord, WorkerStatus,
};
pub use plans::{default_catalog, seed_default_plans, PlanRegistry, PlanRegistryError};
pub use store::{
    DisclosureGrant, DisclosureWrite, EntitlementStore, MemoryStore, PgEntitlementStore,
    WorkerDirectory,
};
