mod capacity;
mod error;
mod ledger;
mod mutations;
mod rotation;
mod store;
mod view;

pub use error::SchedulingError;
pub use ledger::CapacityLedger;
pub use rotation::{house_ad_fill, is_fully_booked, ordered_ads, rotation_cycle, RotationStep};
pub use store::{InMemoryStore, SlotStore};
pub use view::{ScheduleView, SlotRotation};

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, MutexGuard};

use capacity::validate_slot;

use crate::catalog::ContentCatalog;
use crate::config::{ConfigError, SchedulerConfig};
use crate::model::*;
use crate::notify::NotifyHub;

/// One mutex per slot of the grid, held across check-and-apply.
struct SlotLocks {
    locks: Vec<Mutex<()>>,
}

impl SlotLocks {
    fn new(config: &SchedulerConfig) -> Self {
        Self {
            locks: (0..config.slot_count()).map(|_| Mutex::new(())).collect(),
        }
    }
}

/// The scheduler for one screen network: ledger, slot locks, content catalog
/// and change notifications.
pub struct Engine {
    ledger: CapacityLedger,
    locks: SlotLocks,
    catalog: Arc<dyn ContentCatalog>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    /// Fails if `config` would leave the grid empty or a divisor at zero.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn SlotStore>,
        catalog: Arc<dyn ContentCatalog>,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let locks = SlotLocks::new(&config);
        Ok(Self {
            ledger: CapacityLedger::new(store, Arc::new(config)),
            locks,
            catalog,
            notify,
        })
    }

    /// Engine over a fresh `InMemoryStore`.
    pub fn in_memory(
        config: SchedulerConfig,
        catalog: Arc<dyn ContentCatalog>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            config,
            Arc::new(InMemoryStore::new()),
            catalog,
            Arc::new(NotifyHub::new()),
        )
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub fn config(&self) -> &SchedulerConfig {
        self.ledger.config()
    }

    /// Read projection as seen by `campaign_id`.
    pub fn view<'a>(&'a self, campaign_id: &'a str) -> ScheduleView<'a> {
        ScheduleView::new(&self.ledger, campaign_id)
    }

    /// Changes to one slot of the grid.
    pub fn subscribe(&self, slot: SlotKey) -> Result<broadcast::Receiver<Event>, SchedulingError> {
        validate_slot(self.config(), &slot)?;
        Ok(self.notify.subscribe(slot))
    }

    /// Lock `keys` in ascending order. Keys must already be validated against the grid.
    pub(super) async fn lock_slots<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k SlotKey>,
    ) -> Vec<MutexGuard<'_, ()>> {
        let config = self.ledger.config();
        let mut indices: Vec<usize> = keys.into_iter().map(|k| config.slot_index(k)).collect();
        indices.sort_unstable();
        indices.dedup();

        let mut guards = Vec::with_capacity(indices.len());
        for idx in indices {
            guards.push(self.locks.locks[idx].lock().await);
        }
        guards
    }

    /// Look the template's content up in the catalog. Zero-length content counts as missing.
    pub(super) async fn resolve_content(&self, key: &ContentKey) -> Result<ContentRef, SchedulingError> {
        let item = self
            .catalog
            .resolve(key.content_type, &key.id)
            .await
            .ok_or(SchedulingError::MissingContent)?;
        if item.duration_seconds == 0 {
            return Err(SchedulingError::MissingContent);
        }
        Ok(item.into())
    }

    pub(super) fn publish(&self, event: Event) {
        self.notify.send(event.slot(), &event);
    }
}
