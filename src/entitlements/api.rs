use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{
    ContactReveal, DisclosureRecord, EntitlementSummary, Entitlements, Plan, PlanChange,
    PlanTier, Subscription, UsageSnapshot,
};
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;

/// key: entitlement-api -> rest endpoints
pub async fn list_plans(Extension(entitlements): Extension<Entitlements>) -> Json<Vec<Plan>> {
    Json(entitlements.plans.catalog())
}

pub async fn get_subscription(
    Extension(entitlements): Extension<Entitlements>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<EntitlementSummary>> {
    Ok(Json(entitlements.ledger.usage(user_id).await?))
}

pub async fn change_plan(
    Extension(entitlements): Extension<Entitlements>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<ChangePlanRequest>,
) -> AppResult<Json<PlanChange>> {
    let tier = PlanTier::parse(&payload.tier)
        .ok_or_else(|| AppError::BadRequest(format!("unknown tier `{}`", payload.tier)))?;
    if entitlements.plans.get_plan(tier).is_none() {
        return Err(AppError::NotFound);
    }
    Ok(Json(entitlements.ledger.change_plan(user_id, tier).await?))
}

pub async fn cancel_subscription(
    Extension(entitlements): Extension<Entitlements>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<Subscription>> {
    Ok(Json(entitlements.ledger.cancel(user_id).await?))
}

pub async fn consume_job_post(
    Extension(entitlements): Extension<Entitlements>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<UsageSnapshot>> {
    Ok(Json(entitlements.ledger.consume_job_post(user_id).await?))
}

pub async fn contact_history(
    Extension(entitlements): Extension<Entitlements>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<Vec<DisclosureRecord>>> {
    Ok(Json(entitlements.journal.history(user_id).await?))
}

/// Anonymous callers reach the guard so the refusal comes from the engine.
pub async fn reveal_contact(
    Extension(entitlements): Extension<Entitlements>,
    viewer: Option<AuthUser>,
    Path(worker_id): Path<Uuid>,
) -> AppResult<Json<ContactReveal>> {
    let reveal = entitlements
        .guard
        .reveal_contact(viewer.map(|viewer| viewer.user_id), worker_id)
        .await?;
    Ok(Json(reveal))
}

/// Body-addressed form of [`reveal_contact`] used by the web client.
pub async fn record_contact_view(
    Extension(entitlements): Extension<Entitlements>,
    viewer: Option<AuthUser>,
    Json(payload): Json<ContactViewRequest>,
) -> AppResult<Json<ContactReveal>> {
    let reveal = entitlements
        .guard
        .reveal_contact(viewer.map(|viewer| viewer.user_id), payload.worker_id)
        .await?;
    Ok(Json(reveal))
}

#[derive(Debug, Deserialize)]
pub struct ContactViewRequest {
    #[serde(rename = "workerId")]
    pub worker_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub tier: String,
}
