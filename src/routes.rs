use axum::{
    routing::{get, post},
    Router,
};

use crate::entitlements;

pub async fn root() -> &'static str {
    "JaipurHelp API"
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/subscription-plans", get(entitlements::list_plans))
        .route("/api/subscription", get(entitlements::get_subscription))
        .route("/api/subscriptions", post(entitlements::change_plan))
        .route(
            "/api/subscription/cancel",
            post(entitlements::cancel_subscription),
        )
        .route(
            "/api/subscription/job-posts",
            post(entitlements::consume_job_post),
        )
        .route(
            "/api/contact-views",
            get(entitlements::contact_history).post(entitlements::record_contact_view),
        )
        .route(
            "/api/workers/:id/contact",
            post(entitlements::reveal_contact),
        )
}
