use crate::config::SchedulerConfig;
use crate::limits::MAX_ADS_PER_SLOT;
use crate::model::*;

use super::SchedulingError;

pub(crate) fn occupied(slot: Option<&TimeSlot>) -> Secs {
    slot.map_or(0, TimeSlot::occupied_seconds)
}

/// Floors at zero; a negative balance only exists if the invariant is already broken.
pub(crate) fn available(config: &SchedulerConfig, occupied: Secs) -> Secs {
    config.slot_capacity_seconds.saturating_sub(occupied)
}

/// `round(100 × occupied / capacity)`, clamped to 100.
pub(crate) fn fill_percentage(config: &SchedulerConfig, occupied: Secs) -> u8 {
    let capacity = u64::from(config.slot_capacity_seconds);
    let pct = (u64::from(occupied) * 100 + capacity / 2) / capacity;
    pct.min(100) as u8
}

/// Log and count an over-provisioned slot. Reads degrade to clamped values.
pub(crate) fn report_overbooked(config: &SchedulerConfig, key: SlotKey, occupied: Secs) {
    if occupied > config.slot_capacity_seconds {
        tracing::warn!(
            "capacity invariant broken at {key}: {occupied}s occupied, capacity {}s",
            config.slot_capacity_seconds
        );
        metrics::counter!(crate::observability::OVERBOOKED_SLOTS_TOTAL).increment(1);
    }
}

pub(crate) fn validate_frequency(config: &SchedulerConfig, plays_per_hour: u32) -> Result<(), SchedulingError> {
    if plays_per_hour == 0 || plays_per_hour > config.max_plays_per_hour {
        return Err(SchedulingError::InvalidFrequency {
            plays_per_hour,
            max: config.max_plays_per_hour,
        });
    }
    Ok(())
}

pub(crate) fn validate_slot(config: &SchedulerConfig, key: &SlotKey) -> Result<(), SchedulingError> {
    if !config.contains(key) {
        return Err(SchedulingError::InvalidSlot(*key));
    }
    Ok(())
}

/// All-or-nothing gate: the slot with the least room decides for the whole selection.
pub(crate) fn check_batch_capacity<'a>(
    config: &SchedulerConfig,
    slots: impl IntoIterator<Item = (SlotKey, Option<&'a TimeSlot>)>,
    requested: Secs,
) -> Result<(), SchedulingError> {
    let tightest = slots
        .into_iter()
        .map(|(key, slot)| (key, available(config, occupied(slot))))
        .min_by_key(|(_, available)| *available);

    let Some((slot, available)) = tightest else {
        return Err(SchedulingError::InvalidSelection);
    };
    if requested > available {
        return Err(SchedulingError::InsufficientCapacity {
            slot,
            requested,
            available,
        });
    }
    Ok(())
}

pub(crate) fn check_slot_room(slot: Option<&TimeSlot>) -> Result<(), SchedulingError> {
    if slot.is_some_and(|s| s.ads.len() >= MAX_ADS_PER_SLOT) {
        return Err(SchedulingError::LimitExceeded("too many ads in slot"));
    }
    Ok(())
}

/// Would `slot` still fit if `replaced` were swapped for an ad needing `requested`?
pub(crate) fn check_replacement(
    config: &SchedulerConfig,
    slot: &TimeSlot,
    replaced: &ScheduledAd,
    requested: Secs,
) -> Result<(), SchedulingError> {
    let others = slot.occupied_seconds().saturating_sub(replaced.total_seconds_per_hour());
    let available = available(config, others);
    if requested > available {
        return Err(SchedulingError::InsufficientCapacity {
            slot: slot.key,
            requested,
            available,
        });
    }
    Ok(())
}
