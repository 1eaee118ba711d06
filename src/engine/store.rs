use dashmap::DashMap;

use crate::model::*;

/// Backing storage for the ledger. Implementations never keep empty slots:
/// absent and empty mean the same thing.
pub trait SlotStore: Send + Sync {
    fn load(&self, key: &SlotKey) -> Option<TimeSlot>;

    /// Store `slot`, or drop the record if it has no ads left.
    fn save(&self, slot: TimeSlot);

    /// Keys with at least one ad, ascending.
    fn keys(&self) -> Vec<SlotKey>;

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InMemoryStore {
    slots: DashMap<SlotKey, TimeSlot>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl SlotStore for InMemoryStore {
    fn load(&self, key: &SlotKey) -> Option<TimeSlot> {
        self.slots.get(key).map(|e| e.value().clone())
    }

    fn save(&self, slot: TimeSlot) {
        if slot.is_empty() {
            self.slots.remove(&slot.key);
        } else {
            self.slots.insert(slot.key, slot);
        }
    }

    fn keys(&self) -> Vec<SlotKey> {
        let mut keys: Vec<SlotKey> = self.slots.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}
