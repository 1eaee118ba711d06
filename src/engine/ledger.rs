use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::model::*;

use super::capacity;
use super::store::SlotStore;

/// Read side of slot occupancy. The engine is its only writer.
#[derive(Clone)]
pub struct CapacityLedger {
    store: Arc<dyn SlotStore>,
    config: Arc<SchedulerConfig>,
}

impl CapacityLedger {
    pub fn new(store: Arc<dyn SlotStore>, config: Arc<SchedulerConfig>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(super) fn store(&self) -> &dyn SlotStore {
        self.store.as_ref()
    }

    /// `None` means no ads: the whole capacity is free.
    pub fn get_slot(&self, key: &SlotKey) -> Option<TimeSlot> {
        self.store.load(key)
    }

    /// Includes paused ads.
    pub fn occupied_seconds(&self, key: &SlotKey) -> Secs {
        capacity::occupied(self.get_slot(key).as_ref())
    }

    pub fn available_seconds(&self, key: &SlotKey) -> Secs {
        let occupied = self.occupied_seconds(key);
        capacity::report_overbooked(&self.config, *key, occupied);
        capacity::available(&self.config, occupied)
    }

    pub fn fill_percentage(&self, key: &SlotKey) -> u8 {
        let occupied = self.occupied_seconds(key);
        capacity::report_overbooked(&self.config, *key, occupied);
        capacity::fill_percentage(&self.config, occupied)
    }

    /// Slots that currently hold ads, ascending.
    pub fn occupied_keys(&self) -> Vec<SlotKey> {
        self.store.keys()
    }
}
