use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use jaipurhelp::config;
use jaipurhelp::entitlements::{
    seed_default_plans, Entitlements, PgEntitlementStore, PlanRegistry, ProvisioningPolicy,
};
use jaipurhelp::routes::api_routes;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast if the JWT secret is missing
    let _ = config::JWT_SECRET.as_str();
    let pool = PgPoolOptions::new()
        .max_connections(*config::DATABASE_MAX_CONNECTIONS)
        .connect(config::DATABASE_URL.as_str())
        .await
        .context("connecting to DATABASE_URL")?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *config::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(error).context("running database migrations");
        }
    }

    if *config::SEED_DEFAULT_PLANS {
        seed_default_plans(&pool)
            .await
            .context("seeding subscription plans")?;
    }
    let plans = PlanRegistry::load(&pool)
        .await
        .context("loading subscription plans")?;
    let policy = ProvisioningPolicy::from_env();
    if policy.lazy_provisioning && plans.get_plan(policy.default_tier).is_none() {
        anyhow::bail!(
            "default tier `{}` has no plan in subscription_plans",
            policy.default_tier
        );
    }
    tracing::info!(plans = plans.catalog().len(), ?policy, "loaded plan registry");

    let store = Arc::new(PgEntitlementStore::new(pool.clone()));
    let entitlements = Entitlements::new(store.clone(), store, plans, policy);

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(entitlements));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .context("parsing BIND_ADDRESS/BIND_PORT")?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
