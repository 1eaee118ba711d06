use crate::model::*;

use super::capacity::{self, validate_slot};
use super::ledger::CapacityLedger;
use super::rotation::{house_ad_fill, ordered_ads};
use super::SchedulingError;

/// A slot's ads in rotation order plus the house-ad fill that closes the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRotation {
    pub slot: SlotKey,
    pub ads: Vec<ScheduledAd>,
    pub house_ad: Option<HouseAdFill>,
}

/// Read-only projection of the ledger for one campaign. Every call is a fresh
/// snapshot; nothing is cached between calls.
pub struct ScheduleView<'a> {
    ledger: &'a CapacityLedger,
    campaign_id: &'a str,
}

impl<'a> ScheduleView<'a> {
    pub fn new(ledger: &'a CapacityLedger, campaign_id: &'a str) -> Self {
        Self { ledger, campaign_id }
    }

    pub fn campaign_id(&self) -> &str {
        self.campaign_id
    }

    /// Counted over every key of the grid, absent slots included.
    pub fn weekly_summary(&self) -> WeeklySummary {
        let config = self.ledger.config();
        let mut summary = WeeklySummary::default();
        for key in config.slot_keys() {
            let occupied = self.ledger.occupied_seconds(&key);
            if occupied == 0 {
                summary.empty_slots += 1;
            } else if occupied >= config.slot_capacity_seconds {
                capacity::report_overbooked(config, key, occupied);
                summary.fully_booked_slots += 1;
            } else {
                summary.partially_filled_slots += 1;
            }
        }
        summary
    }

    pub fn slot_summary(&self, key: SlotKey) -> SlotSummary {
        let config = self.ledger.config();
        let slot = self.ledger.get_slot(&key);
        let occupied = capacity::occupied(slot.as_ref());
        capacity::report_overbooked(config, key, occupied);
        SlotSummary {
            slot: key,
            fill_percentage: capacity::fill_percentage(config, occupied),
            ad_count: slot.as_ref().map_or(0, |s| s.ads.len()),
            has_own_ad: slot
                .as_ref()
                .is_some_and(|s| s.ads.iter().any(|ad| ad.is_own_ad(self.campaign_id))),
            occupied_seconds: occupied,
            available_seconds: capacity::available(config, occupied),
        }
    }

    /// One row per hour of `day`, in hour order.
    pub fn day_summary(&self, day: u8) -> Result<Vec<SlotSummary>, SchedulingError> {
        let config = self.ledger.config();
        validate_slot(config, &SlotKey::new(day, 0))?;
        Ok(config.day_keys(day).map(|key| self.slot_summary(key)).collect())
    }

    pub fn rotation(&self, key: SlotKey) -> Result<SlotRotation, SchedulingError> {
        let config = self.ledger.config();
        validate_slot(config, &key)?;
        let slot = self.ledger.get_slot(&key);
        let ads = slot
            .as_ref()
            .map(|s| ordered_ads(s).into_iter().cloned().collect())
            .unwrap_or_default();
        Ok(SlotRotation {
            slot: key,
            ads,
            house_ad: house_ad_fill(config, slot.as_ref()),
        })
    }

    /// This campaign's ads across the week, split by paused state. Slots in
    /// ascending order, ads in rotation order within a slot.
    pub fn own_ads_across_week(&self) -> OwnAdsReport {
        let mut report = OwnAdsReport::default();
        for key in self.ledger.occupied_keys() {
            let Some(slot) = self.ledger.get_slot(&key) else {
                continue;
            };
            for ad in ordered_ads(&slot) {
                if !ad.is_own_ad(self.campaign_id) {
                    continue;
                }
                let entry = OwnAdEntry {
                    slot: key,
                    ad: ad.clone(),
                };
                if ad.paused {
                    report.paused.push(entry);
                } else {
                    report.active.push(entry);
                }
            }
        }
        report
    }
}
