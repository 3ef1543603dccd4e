use std::sync::Arc;

use uuid::Uuid;

use super::error::EntitlementError;
use super::ledger::{ActiveEntitlement, SubscriptionLedger};
use super::journal::DisclosureJournal;
use super::models::{ContactPayload, ContactReveal, QuotaKind, UsageSnapshot, WorkerPublicRecord};
use super::store::{DisclosureGrant, DisclosureWrite, WorkerDirectory};
use super::CONFLICT_RETRY_LIMIT;

/// key: disclosure-guard -> reveal decision + metering
///
/// Re-viewing a worker the user already unlocked never touches the counters;
/// a first view is journaled and charged in a single storage write.
#[derive(Clone)]
pub struct DisclosureGuard {
    workers: Arc<dyn WorkerDirectory>,
    ledger: SubscriptionLedger,
    journal: DisclosureJournal,
}

impl DisclosureGuard {
    pub fn new(
        workers: Arc<dyn WorkerDirectory>,
        ledger: SubscriptionLedger,
        journal: DisclosureJournal,
    ) -> Self {
        Self {
            workers,
            ledger,
            journal,
        }
    }

    pub async fn reveal_contact(
        &self,
        viewer: Option<Uuid>,
        worker_id: Uuid,
    ) -> Result<ContactReveal, EntitlementError> {
        let user_id = viewer.ok_or(EntitlementError::Unauthenticated)?;
        let outcome = self.reveal_for(user_id, worker_id).await;
        if let Err(EntitlementError::StorageFailure(error)) = &outcome {
            tracing::error!(%user_id, %worker_id, %error, "contact disclosure hit a storage failure");
        }
        outcome
    }

    async fn reveal_for(
        &self,
        user_id: Uuid,
        worker_id: Uuid,
    ) -> Result<ContactReveal, EntitlementError> {
        let worker = self.public_worker(worker_id).await?;
        let mut attempt = 0;
        loop {
            match self.try_reveal(user_id, &worker).await {
                Err(EntitlementError::ConcurrencyConflict) if attempt < CONFLICT_RETRY_LIMIT => {
                    attempt += 1;
                    tracing::warn!(%user_id, %worker_id, attempt, "disclosure raced a concurrent update; re-reading");
                }
                outcome => return outcome,
            }
        }
    }

    async fn public_worker(&self, worker_id: Uuid) -> Result<WorkerPublicRecord, EntitlementError> {
        let worker = self
            .workers
            .worker_public_record(worker_id)
            .await?
            .ok_or(EntitlementError::WorkerNotFound(worker_id))?;
        if !worker.is_publicly_visible() {
            tracing::info!(%worker_id, status = ?worker.status, is_active = worker.is_active, "refused disclosure of non-public worker");
            return Err(EntitlementError::WorkerNotPublic(worker_id));
        }
        Ok(worker)
    }

    async fn try_reveal(
        &self,
        user_id: Uuid,
        worker: &WorkerPublicRecord,
    ) -> Result<ContactReveal, EntitlementError> {
        if self.journal.has_disclosed(user_id, worker.id).await? {
            let current = self.ledger.active_entitlement(user_id).await?;
            let usage = current
                .as_ref()
                .map(|current| current.usage(QuotaKind::Contacts));
            return Ok(contact_reveal(worker, current.as_ref(), usage, true));
        }

        let current = self.ledger.ensure_active_subscription(user_id).await?;
        let limit = current.plan.contact_limit;
        let used = current.subscription.contacts_used;
        if !limit.admits(used) {
            tracing::info!(%user_id, worker_id = %worker.id, used, limit = limit.as_raw(), "contact quota exhausted");
            return Err(EntitlementError::QuotaExceeded {
                quota: QuotaKind::Contacts,
                used,
                limit: limit.as_raw(),
            });
        }

        let grant = DisclosureGrant {
            user_id,
            worker_id: worker.id,
            subscription_id: current.subscription.id,
            contact_limit: limit,
        };
        match self.journal.record_disclosure(&grant).await? {
            DisclosureWrite::Recorded { contacts_used, .. } => {
                tracing::info!(
                    %user_id,
                    worker_id = %worker.id,
                    subscription_id = %current.subscription.id,
                    contacts_used,
                    "disclosed worker contact"
                );
                let usage = UsageSnapshot::new(QuotaKind::Contacts, contacts_used, limit);
                Ok(contact_reveal(worker, Some(&current), Some(usage), false))
            }
            DisclosureWrite::AlreadyExists => {
                let usage = current.usage(QuotaKind::Contacts);
                Ok(contact_reveal(worker, Some(&current), Some(usage), true))
            }
            DisclosureWrite::QuotaDrifted => Err(EntitlementError::ConcurrencyConflict),
        }
    }
}

fn contact_reveal(
    worker: &WorkerPublicRecord,
    current: Option<&ActiveEntitlement>,
    usage: Option<UsageSnapshot>,
    already_disclosed: bool,
) -> ContactReveal {
    let whatsapp_allowed = current
        .map(|current| current.plan.has_whatsapp_access)
        .unwrap_or(false);
    ContactReveal {
        worker_id: worker.id,
        contact: ContactPayload {
            phone: worker.phone.clone(),
            whatsapp: worker.whatsapp.clone().filter(|_| whatsapp_allowed),
        },
        already_disclosed,
        usage,
    }
}
