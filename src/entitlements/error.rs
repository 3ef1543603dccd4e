use thiserror::Error;
use uuid::Uuid;

use super::models::QuotaKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// key: entitlement-errors -> typed outcomes of the engine boundary
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("worker {0} not found")]
    WorkerNotFound(Uuid),
    #[error("worker {0} is not publicly listed")]
    WorkerNotPublic(Uuid),
    #[error("user {0} has no active subscription")]
    NoActiveSubscription(Uuid),
    #[error("{} quota exceeded: {used} of {limit} used", .quota.as_str())]
    QuotaExceeded {
        quota: QuotaKind,
        used: i64,
        limit: i64,
    },
    #[error("usage changed concurrently, retry the request")]
    ConcurrencyConflict,
    #[error("unknown plan: {0}")]
    UnknownPlan(String),
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StoreError),
}

impl EntitlementError {
    /// Stable identifier rendered as `reason` in API bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            EntitlementError::Unauthenticated => "Unauthenticated",
            EntitlementError::WorkerNotFound(_) => "WorkerNotFound",
            EntitlementError::WorkerNotPublic(_) => "WorkerNotPublic",
            EntitlementError::NoActiveSubscription(_) => "NoActiveSubscription",
            EntitlementError::QuotaExceeded { .. } => "QuotaExceeded",
            EntitlementError::ConcurrencyConflict => "ConcurrencyConflict",
            EntitlementError::UnknownPlan(_) => "UnknownPlan",
            EntitlementError::StorageFailure(_) => "StorageFailure",
        }
    }

    /// Safe for the caller to retry unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EntitlementError::ConcurrencyConflict | EntitlementError::StorageFailure(_)
        )
    }
}
