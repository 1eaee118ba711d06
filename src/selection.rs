use std::collections::BTreeSet;

use crate::model::SlotKey;

/// Slots picked by one drag gesture. Owns no resources; dropping it is a cancel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    keys: BTreeSet<SlotKey>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive day/hour rectangle spanned by `anchor` and `current`, in either drag direction.
    pub fn rectangle_from(anchor: SlotKey, current: SlotKey) -> Self {
        let (day_lo, day_hi) = (anchor.day.min(current.day), anchor.day.max(current.day));
        let (hour_lo, hour_hi) = (anchor.hour.min(current.hour), anchor.hour.max(current.hour));
        let keys = (day_lo..=day_hi)
            .flat_map(|day| (hour_lo..=hour_hi).map(move |hour| SlotKey::new(day, hour)))
            .collect();
        Self { keys }
    }

    pub fn single(key: SlotKey) -> Self {
        Self::rectangle_from(key, key)
    }

    pub fn insert(&mut self, key: SlotKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &SlotKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Ascending day-major order.
    pub fn iter(&self) -> impl Iterator<Item = &SlotKey> {
        self.keys.iter()
    }

    pub fn keys(&self) -> &BTreeSet<SlotKey> {
        &self.keys
    }
}

impl FromIterator<SlotKey> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = SlotKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SelectionSet {
    type Item = SlotKey;
    type IntoIter = std::collections::btree_set::IntoIter<SlotKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

impl<'a> IntoIterator for &'a SelectionSet {
    type Item = &'a SlotKey;
    type IntoIter = std::collections::btree_set::Iter<'a, SlotKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}
