use std::sync::Arc;

use uuid::Uuid;

use super::error::EntitlementError;
use super::models::DisclosureRecord;
use super::store::{DisclosureGrant, DisclosureWrite, EntitlementStore};

/// key: disclosure-journal -> idempotency key + audit trail
#[derive(Clone)]
pub struct DisclosureJournal {
    store: Arc<dyn EntitlementStore>,
}

impl DisclosureJournal {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn has_disclosed(
        &self,
        user_id: Uuid,
        worker_id: Uuid,
    ) -> Result<bool, EntitlementError> {
        Ok(self.store.has_disclosed(user_id, worker_id).await?)
    }

    /// Journals the pair and charges the grant's subscription in one unit.
    pub async fn record_disclosure(
        &self,
        grant: &DisclosureGrant,
    ) -> Result<DisclosureWrite, EntitlementError> {
        let outcome = self.store.record_disclosure(grant).await?;
        match &outcome {
            DisclosureWrite::Recorded { record, .. } => tracing::debug!(
                disclosure_id = %record.id,
                user_id = %grant.user_id,
                worker_id = %grant.worker_id,
                "journaled disclosure"
            ),
            DisclosureWrite::AlreadyExists => tracing::debug!(
                user_id = %grant.user_id,
                worker_id = %grant.worker_id,
                "disclosure already journaled by a concurrent request"
            ),
            DisclosureWrite::QuotaDrifted => tracing::debug!(
                user_id = %grant.user_id,
                subscription_id = %grant.subscription_id,
                "contact counter moved before the journal write"
            ),
        }
        Ok(outcome)
    }

    pub async fn history(&self, user_id: Uuid) -> Result<Vec<DisclosureRecord>, EntitlementError> {
        Ok(self.store.disclosures(user_id).await?)
    }

    pub async fn count(&self, user_id: Uuid) -> Result<i64, EntitlementError> {
        Ok(self.store.count_disclosures(user_id).await?)
    }
}
