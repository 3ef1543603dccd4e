use std::collections::BTreeMap;

use sqlx::{FromRow, PgPool};
use thiserror::Error;
use uuid::Uuid;

use super::models::{InvalidQuotaLimit, Plan, PlanTier, QuotaLimit};

#[derive(Debug, Error)]
pub enum PlanRegistryError {
    #[error("more than one plan registered for tier `{0}`")]
    DuplicateTier(PlanTier),
    #[error("unknown plan tier `{0}`")]
    UnknownTier(String),
    #[error("plan `{tier}` has an invalid {field}: {source}")]
    InvalidLimit {
        tier: String,
        field: &'static str,
        #[source]
        source: InvalidQuotaLimit,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// key: plan-registry -> tier catalog, read-only to the engine
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    plans: BTreeMap<PlanTier, Plan>,
}

impl PlanRegistry {
    pub fn from_plans(plans: impl IntoIterator<Item = Plan>) -> Result<Self, PlanRegistryError> {
        let mut registry = BTreeMap::new();
        for plan in plans {
            let tier = plan.tier;
            if registry.insert(tier, plan).is_some() {
                return Err(PlanRegistryError::DuplicateTier(tier));
            }
        }
        Ok(Self { plans: registry })
    }

    /// Registry holding the default catalog, for deployments and tests without a plan table.
    pub fn seeded() -> Self {
        Self {
            plans: default_catalog()
                .into_iter()
                .map(|plan| (plan.tier, plan))
                .collect(),
        }
    }

    pub fn get_plan(&self, tier: PlanTier) -> Option<&Plan> {
        self.plans.get(&tier)
    }

    pub fn plan_by_id(&self, id: Uuid) -> Option<&Plan> {
        self.plans.values().find(|plan| plan.id == id)
    }

    /// Purchasable plans, cheapest tier first.
    pub fn catalog(&self) -> Vec<Plan> {
        self.plans
            .values()
            .filter(|plan| plan.is_active)
            .cloned()
            .collect()
    }

    pub fn is_upgrade(&self, from: PlanTier, to: PlanTier) -> bool {
        to > from
    }

    pub async fn load(pool: &PgPool) -> Result<Self, PlanRegistryError> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT
                id,
                name,
                tier,
                price,
                currency,
                contact_limit,
                job_post_limit,
                has_whatsapp_access,
                user_limit,
                features,
                is_active
            FROM subscription_plans
            ORDER BY price ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        let plans = rows
            .into_iter()
            .map(Plan::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_plans(plans)
    }
}

/// Inserts the default catalog, leaving tiers that already exist untouched.
/// Returns the number of plans created.
pub async fn seed_default_plans(pool: &PgPool) -> Result<u64, PlanRegistryError> {
    let mut created = 0;
    for plan in default_catalog() {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_plans (
                id,
                name,
                tier,
                price,
                currency,
                contact_limit,
                job_post_limit,
                has_whatsapp_access,
                user_limit,
                features,
                is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tier) DO NOTHING
            "#,
        )
        .bind(plan.id)
        .bind(&plan.name)
        .bind(plan.tier.as_str())
        .bind(plan.price)
        .bind(&plan.currency)
        .bind(plan.contact_limit.as_raw())
        .bind(plan.job_post_limit.as_raw())
        .bind(plan.has_whatsapp_access)
        .bind(plan.user_limit)
        .bind(&plan.features)
        .bind(plan.is_active)
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }
    if created > 0 {
        tracing::info!(created, "seeded default subscription plans");
    }
    Ok(created)
}

pub fn default_catalog() -> Vec<Plan> {
    vec![
        catalog_entry(
            PlanTier::Free,
            "Free",
            0,
            QuotaLimit::Capped(3),
            QuotaLimit::Capped(1),
            false,
            1,
            &["View 3 worker contacts", "Post 1 job", "Basic search filters"],
        ),
        catalog_entry(
            PlanTier::Basic,
            "Basic",
            299,
            QuotaLimit::Capped(20),
            QuotaLimit::Capped(5),
            false,
            1,
            &[
                "View 20 worker contacts",
                "Post 5 jobs",
                "All search filters",
                "Email support",
            ],
        ),
        catalog_entry(
            PlanTier::Premium,
            "Premium",
            599,
            QuotaLimit::Capped(50),
            QuotaLimit::Capped(15),
            true,
            1,
            &[
                "View 50 worker contacts",
                "Post 15 jobs",
                "WhatsApp access",
                "Priority support",
                "Featured job posts",
            ],
        ),
        catalog_entry(
            PlanTier::Business,
            "Business",
            1499,
            QuotaLimit::Unlimited,
            QuotaLimit::Unlimited,
            true,
            5,
            &[
                "Unlimited contacts",
                "Unlimited jobs",
                "WhatsApp access",
                "Dedicated support",
                "5 team members",
                "Analytics dashboard",
            ],
        ),
    ]
}

#[allow(clippy::too_many_arguments)]
fn catalog_entry(
    tier: PlanTier,
    name: &str,
    price: i32,
    contact_limit: QuotaLimit,
    job_post_limit: QuotaLimit,
    has_whatsapp_access: bool,
    user_limit: i32,
    features: &[&str],
) -> Plan {
    Plan {
        id: Uuid::new_v4(),
        name: name.to_string(),
        tier,
        price,
        currency: "INR".to_string(),
        contact_limit,
        job_post_limit,
        has_whatsapp_access,
        user_limit,
        features: features.iter().map(|feature| feature.to_string()).collect(),
        is_active: true,
    }
}

#[derive(Debug, FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    tier: String,
    price: i32,
    currency: String,
    contact_limit: i64,
    job_post_limit: i64,
    has_whatsapp_access: bool,
    user_limit: i32,
    features: Vec<String>,
    is_active: bool,
}

impl TryFrom<PlanRow> for Plan {
    type Error = PlanRegistryError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let tier = PlanTier::parse(&row.tier)
            .ok_or_else(|| PlanRegistryError::UnknownTier(row.tier.clone()))?;
        let contact_limit = QuotaLimit::try_from(row.contact_limit).map_err(|source| {
            PlanRegistryError::InvalidLimit {
                tier: row.tier.clone(),
                field: "contact_limit",
                source,
            }
        })?;
        let job_post_limit = QuotaLimit::try_from(row.job_post_limit).map_err(|source| {
            PlanRegistryError::InvalidLimit {
                tier: row.tier.clone(),
                field: "job_post_limit",
                source,
            }
        })?;
        Ok(Plan {
            id: row.id,
            name: row.name,
            tier,
            price: row.price,
            currency: row.currency,
            contact_limit,
            job_post_limit,
            has_whatsapp_access: row.has_whatsapp_access,
            user_limit: row.user_limit,
            features: row.features,
            is_active: row.is_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_registry_matches_default_catalog() {
        let registry = PlanRegistry::seeded();
        let free = registry.get_plan(PlanTier::Free).unwrap();
        assert_eq!(free.contact_limit, QuotaLimit::Capped(3));
        assert_eq!(free.job_post_limit, QuotaLimit::Capped(1));
        assert!(!free.has_whatsapp_access);

        let business = registry.get_plan(PlanTier::Business).unwrap();
        assert_eq!(business.contact_limit, QuotaLimit::Unlimited);
        assert_eq!(business.user_limit, 5);
        assert_eq!(registry.plan_by_id(business.id), Some(business));
    }

    #[test]
    fn catalog_is_listed_in_tier_order() {
        let tiers: Vec<_> = PlanRegistry::seeded()
            .catalog()
            .into_iter()
            .map(|plan| plan.tier)
            .collect();
        assert_eq!(tiers, PlanTier::ALL.to_vec());
    }

    #[test]
    fn inactive_plans_stay_resolvable_but_unlisted() {
        let mut plans = default_catalog();
        plans[1].is_active = false;
        let basic_id = plans[1].id;
        let registry = PlanRegistry::from_plans(plans).unwrap();
        assert!(registry.plan_by_id(basic_id).is_some());
        assert!(registry
            .catalog()
            .iter()
            .all(|plan| plan.tier != PlanTier::Basic));
    }

    #[test]
    fn duplicate_tiers_are_rejected() {
        let mut plans = default_catalog();
        plans.push(plans[0].clone());
        assert!(matches!(
            PlanRegistry::from_plans(plans),
            Err(PlanRegistryError::DuplicateTier(PlanTier::Free))
        ));
    }

    #[test]
    fn upgrade_follows_tier_order() {
        let registry = PlanRegistry::seeded();
        assert!(registry.is_upgrade(PlanTier::Free, PlanTier::Business));
        assert!(!registry.is_upgrade(PlanTier::Premium, PlanTier::Basic));
        assert!(!registry.is_upgrade(PlanTier::Basic, PlanTier::Basic));
    }

    #[test]
    fn plan_rows_with_bad_limits_are_rejected() {
        let row = PlanRow {
            id: Uuid::new_v4(),
            name: "Broken".into(),
            tier: "basic".into(),
            price: 10,
            currency: "INR".into(),
            contact_limit: -5,
            job_post_limit: 1,
            has_whatsapp_access: false,
            user_limit: 1,
            features: vec![],
            is_active: true,
        };
        let err = Plan::try_from(row).unwrap_err();
        assert!(matches!(
            err,
            PlanRegistryError::InvalidLimit {
                field: "contact_limit",
                ..
            }
        ));
    }
}
