use std::sync::Arc;

use super::guard::DisclosureGuard;
use super::journal::DisclosureJournal;
use super::ledger::{ProvisioningPolicy, SubscriptionLedger};
use super::plans::PlanRegistry;
use super::store::{EntitlementStore, MemoryStore, WorkerDirectory};

/// Wired-up engine shared by request handlers.
#[derive(Clone)]
pub struct Entitlements {
    pub plans: Arc<PlanRegistry>,
    pub ledger: SubscriptionLedger,
    pub journal: DisclosureJournal,
    pub guard: DisclosureGuard,
}

impl Entitlements {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        workers: Arc<dyn WorkerDirectory>,
        plans: PlanRegistry,
        policy: ProvisioningPolicy,
    ) -> Self {
        let plans = Arc::new(plans);
        let ledger = SubscriptionLedger::new(store.clone(), plans.clone(), policy);
        let journal = DisclosureJournal::new(store);
        let guard = DisclosureGuard::new(workers, ledger.clone(), journal.clone());
        Self {
            plans,
            ledger,
            journal,
            guard,
        }
    }

    pub fn in_memory(
        store: Arc<MemoryStore>,
        plans: PlanRegistry,
        policy: ProvisioningPolicy,
    ) -> Self {
        Self::new(store.clone(), store, plans, policy)
    }
}
