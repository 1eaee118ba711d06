use crate::config::SchedulerConfig;
use crate::model::*;

// ── Rotation ────────────────────────────────────────────────────

/// Ads by `sequence` ascending. The sort is stable, so equal sequences keep
/// insertion order.
pub fn ordered_ads(slot: &TimeSlot) -> Vec<&ScheduledAd> {
    let mut ads: Vec<&ScheduledAd> = slot.ads.iter().collect();
    ads.sort_by_key(|ad| ad.sequence);
    ads
}

pub fn is_fully_booked(config: &SchedulerConfig, slot: &TimeSlot) -> bool {
    slot.occupied_seconds() >= config.slot_capacity_seconds
}

/// Filler for unclaimed capacity, or `None` once the slot is fully booked.
/// Leftover shorter than one house spot still reports, with zero plays.
pub fn house_ad_fill(config: &SchedulerConfig, slot: Option<&TimeSlot>) -> Option<HouseAdFill> {
    let occupied = slot.map_or(0, TimeSlot::occupied_seconds);
    if occupied >= config.slot_capacity_seconds {
        return None;
    }
    let leftover_seconds = config.slot_capacity_seconds - occupied;
    Some(HouseAdFill {
        leftover_seconds,
        house_ad_plays: leftover_seconds / config.house_ad_duration_seconds,
    })
}

/// One step of the closed airing loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationStep<'a> {
    Ad(&'a ScheduledAd),
    HouseAd(HouseAdFill),
}

/// What actually airs, in order: unpaused ads, then the house-ad fill. After the
/// last step the loop returns to the first.
///
/// Paused ads still hold their reservation, so their seconds are not handed
/// to the house ad.
pub fn rotation_cycle<'a>(config: &SchedulerConfig, slot: &'a TimeSlot) -> Vec<RotationStep<'a>> {
    let mut steps: Vec<RotationStep<'a>> = ordered_ads(slot)
        .into_iter()
        .filter(|ad| !ad.paused)
        .map(RotationStep::Ad)
        .collect();
    if let Some(fill) = house_ad_fill(config, Some(slot)) {
        steps.push(RotationStep::HouseAd(fill));
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn ad(key: SlotKey, duration: Secs, plays: u32, sequence: u32) -> ScheduledAd {
        ScheduledAd {
            id: AdId::new(key, Ulid::new()),
            owner_id: "acme".into(),
            content: ContentRef {
                content_type: ContentType::Media,
                content_id: format!("m{sequence}"),
                name: format!("m{sequence}"),
                single_play_duration_seconds: duration,
            },
            plays_per_hour: plays,
            sequence,
            paused: false,
        }
    }

    fn slot(ads: Vec<ScheduledAd>) -> TimeSlot {
        TimeSlot {
            key: SlotKey::new(1, 9),
            ads,
        }
    }

    #[test]
    fn house_fill_for_leftover() {
        let c = SchedulerConfig::default();
        let s = slot(vec![ad(SlotKey::new(1, 9), 3000, 1, 1)]);
        let fill = house_ad_fill(&c, Some(&s)).unwrap();
        assert_eq!(fill.leftover_seconds, 600);
        assert_eq!(fill.house_ad_plays, 60);
    }

    #[test]
    fn house_fill_for_absent_slot_is_whole_hour() {
        let c = SchedulerConfig::default();
        let fill = house_ad_fill(&c, None).unwrap();
        assert_eq!(fill.leftover_seconds, 3600);
        assert_eq!(fill.house_ad_plays, 360);
    }

    #[test]
    fn no_house_fill_when_fully_booked() {
        let c = SchedulerConfig::default();
        let s = slot(vec![ad(SlotKey::new(1, 9), 60, 60, 1)]);
        assert!(is_fully_booked(&c, &s));
        assert!(house_ad_fill(&c, Some(&s)).is_none());
    }

    #[test]
    fn house_fill_rounds_plays_down() {
        let c = SchedulerConfig::default();
        let s = slot(vec![ad(SlotKey::new(1, 9), 3595, 1, 1)]);
        let fill = house_ad_fill(&c, Some(&s)).unwrap();
        assert_eq!(fill.leftover_seconds, 5);
        assert_eq!(fill.house_ad_plays, 0);
        assert!(!is_fully_booked(&c, &s));
    }

    #[test]
    fn ordered_by_sequence_ties_by_insertion() {
        let key = SlotKey::new(1, 9);
        let a = ad(key, 10, 1, 2);
        let b = ad(key, 10, 1, 1);
        let c = ad(key, 10, 1, 2);
        let s = slot(vec![a.clone(), b.clone(), c.clone()]);
        let ids: Vec<_> = ordered_ads(&s).into_iter().map(|ad| ad.id).collect();
        assert_eq!(ids, vec![b.id, a.id, c.id]);
    }

    #[test]
    fn cycle_skips_paused_and_ends_with_house_ad() {
        let c = SchedulerConfig::default();
        let key = SlotKey::new(1, 9);
        let first = ad(key, 15, 12, 1);
        let mut paused = ad(key, 30, 8, 2);
        paused.paused = true;
        let third = ad(key, 20, 3, 3);
        let s = slot(vec![first.clone(), paused, third.clone()]);

        let cycle = rotation_cycle(&c, &s);
        assert_eq!(cycle.len(), 3);
        assert_eq!(cycle[0], RotationStep::Ad(&first));
        assert_eq!(cycle[1], RotationStep::Ad(&third));
        // 180 + 240 + 60 reserved, paused seconds included.
        assert_eq!(
            cycle[2],
            RotationStep::HouseAd(HouseAdFill {
                leftover_seconds: 3120,
                house_ad_plays: 312,
            })
        );
    }

    #[test]
    fn full_slot_cycle_has_no_house_ad() {
        let c = SchedulerConfig::default();
        let key = SlotKey::new(1, 9);
        let s = slot(vec![ad(key, 30, 60, 1), ad(key, 30, 60, 2)]);
        let cycle = rotation_cycle(&c, &s);
        assert_eq!(cycle.len(), 2);
        assert!(cycle.iter().all(|step| matches!(step, RotationStep::Ad(_))));
    }
}
