use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::entitlements::EntitlementError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Entitlement(#[from] EntitlementError),
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Entitlement(err) => match err {
                EntitlementError::Unauthenticated => StatusCode::UNAUTHORIZED,
                EntitlementError::WorkerNotFound(_) | EntitlementError::WorkerNotPublic(_) => {
                    StatusCode::NOT_FOUND
                }
                EntitlementError::NoActiveSubscription(_)
                | EntitlementError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
                EntitlementError::ConcurrencyConflict => StatusCode::CONFLICT,
                EntitlementError::UnknownPlan(_) | EntitlementError::StorageFailure(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::NotFound => json!({ "reason": "NotFound", "message": self.to_string() }),
            AppError::BadRequest(message) => json!({ "reason": "BadRequest", "message": message }),
            AppError::Entitlement(err) => match err {
                EntitlementError::QuotaExceeded { quota, used, limit } => json!({
                    "reason": err.reason(),
                    "quota": quota,
                    "used": used,
                    "limit": limit,
                }),
                // Unlisted workers are indistinguishable from missing ones.
                EntitlementError::WorkerNotFound(_) | EntitlementError::WorkerNotPublic(_) => {
                    json!({ "reason": "WorkerNotFound", "message": "worker not found" })
                }
                EntitlementError::UnknownPlan(_) | EntitlementError::StorageFailure(_) => {
                    json!({ "reason": err.reason(), "message": "internal server error" })
                }
                _ => json!({ "reason": err.reason(), "message": err.to_string() }),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(?self);
        } else {
            tracing::debug!(?self);
        }
        (status, Json(self.body())).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlements::{QuotaKind, StoreError};
    use uuid::Uuid;

    #[test]
    fn quota_exceeded_carries_usage() {
        let err = AppError::from(EntitlementError::QuotaExceeded {
            quota: QuotaKind::Contacts,
            used: 3,
            limit: 3,
        });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            err.body(),
            json!({"reason": "QuotaExceeded", "quota": "contacts", "used": 3, "limit": 3})
        );
    }

    #[test]
    fn hidden_workers_look_missing() {
        let id = Uuid::new_v4();
        let hidden = AppError::from(EntitlementError::WorkerNotPublic(id));
        let missing = AppError::from(EntitlementError::WorkerNotFound(id));
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
        assert_eq!(hidden.body(), missing.body());
    }

    #[test]
    fn storage_details_stay_out_of_responses() {
        let err = AppError::from(EntitlementError::StorageFailure(StoreError::Unavailable(
            "connection refused to 10.0.0.5".into(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.body().to_string().contains("10.0.0.5"));
    }

    #[test]
    fn conflicts_map_to_409() {
        let err = AppError::from(EntitlementError::ConcurrencyConflict);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
