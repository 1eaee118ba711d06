use tracing::{debug, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::selection::SelectionSet;

use super::capacity::{
    check_batch_capacity, check_replacement, check_slot_room, validate_frequency, validate_slot,
};
use super::{Engine, SchedulingError};

fn record<T>(op: &'static str, result: &Result<T, SchedulingError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(crate::observability::TRANSACTIONS_TOTAL, "op" => op, "outcome" => outcome)
        .increment(1);
}

fn validate_owner(owner_id: &str) -> Result<(), SchedulingError> {
    if owner_id.len() > MAX_ID_LEN {
        return Err(SchedulingError::LimitExceeded("owner id too long"));
    }
    Ok(())
}

impl Engine {
    /// Schedule one template into every slot of `selection`. All-or-nothing: the
    /// slot with the least free airtime gates the whole batch, and nothing is
    /// written unless every slot fits.
    ///
    /// Each slot gets its own copy with an id scoped to that slot; all copies
    /// share one batch ULID. Returns the new ids in slot order.
    pub async fn batch_add(
        &self,
        selection: &SelectionSet,
        template: &AdTemplate,
    ) -> Result<Vec<AdId>, SchedulingError> {
        let result = self.batch_add_inner(selection, template).await;
        record("batch_add", &result);
        result
    }

    async fn batch_add_inner(
        &self,
        selection: &SelectionSet,
        template: &AdTemplate,
    ) -> Result<Vec<AdId>, SchedulingError> {
        if selection.is_empty() {
            return Err(SchedulingError::InvalidSelection);
        }
        let config = self.config();
        for key in selection {
            validate_slot(config, key)?;
        }
        validate_frequency(config, template.plays_per_hour)?;
        validate_owner(&template.owner_id)?;
        let content = self.resolve_content(&template.content).await?;
        let requested = content
            .single_play_duration_seconds
            .saturating_mul(template.plays_per_hour);

        let _guards = self.lock_slots(selection.iter()).await;
        let store = self.ledger.store();

        // Phase 1: load and validate every slot before touching any of them.
        let loaded: Vec<(SlotKey, Option<TimeSlot>)> =
            selection.iter().map(|key| (*key, store.load(key))).collect();
        for (_, slot) in &loaded {
            check_slot_room(slot.as_ref())?;
        }
        if let Err(e) = check_batch_capacity(
            config,
            loaded.iter().map(|(key, slot)| (*key, slot.as_ref())),
            requested,
        ) {
            warn!("batch of {} slots rejected: {e}", selection.len());
            return Err(e);
        }

        // Phase 2: all validated, apply everywhere.
        let batch = Ulid::new();
        let mut ids = Vec::with_capacity(loaded.len());
        for (key, slot) in loaded {
            let mut slot = slot.unwrap_or_else(|| TimeSlot::new(key));
            let ad = ScheduledAd {
                id: AdId::new(key, batch),
                owner_id: template.owner_id.clone(),
                content: content.clone(),
                plays_per_hour: template.plays_per_hour,
                sequence: slot.ads.len() as u32 + 1,
                paused: false,
            };
            ids.push(ad.id);
            slot.ads.push(ad.clone());
            store.save(slot);
            self.publish(Event::AdScheduled { slot: key, ad });
        }

        debug!(
            "scheduled {} ({}s/hour) into {} slots as batch {batch}",
            content.name,
            requested,
            ids.len()
        );
        Ok(ids)
    }

    /// Remove one ad. A slot left without ads is dropped from the ledger.
    /// Deleting twice yields `NotFound` the second time and changes nothing.
    pub async fn delete(&self, slot: SlotKey, ad_id: AdId) -> Result<ScheduledAd, SchedulingError> {
        let result = self.delete_inner(slot, ad_id).await;
        record("delete", &result);
        result
    }

    async fn delete_inner(&self, key: SlotKey, ad_id: AdId) -> Result<ScheduledAd, SchedulingError> {
        validate_slot(self.config(), &key)?;
        let _guard = self.lock_slots([&key]).await;
        let store = self.ledger.store();

        let not_found = SchedulingError::NotFound { slot: key, ad_id };
        let mut slot = store.load(&key).ok_or(not_found.clone())?;
        let removed = slot.remove_ad(&ad_id).ok_or(not_found)?;
        let emptied = slot.is_empty();
        store.save(slot);

        self.publish(Event::AdRemoved { slot: key, id: ad_id });
        if emptied {
            self.notify.prune();
        }
        debug!("removed ad {ad_id} from {key}");
        Ok(removed)
    }

    /// Replace an ad with one built from `template`, keeping its id, sequence and
    /// place in the slot. The post-edit occupancy is checked before anything
    /// changes, so a rejected edit leaves the slot exactly as it was.
    pub async fn edit(
        &self,
        slot: SlotKey,
        ad_id: AdId,
        template: &AdTemplate,
    ) -> Result<ScheduledAd, SchedulingError> {
        let result = self.edit_inner(slot, ad_id, template).await;
        record("edit", &result);
        result
    }

    async fn edit_inner(
        &self,
        key: SlotKey,
        ad_id: AdId,
        template: &AdTemplate,
    ) -> Result<ScheduledAd, SchedulingError> {
        let config = self.config();
        validate_slot(config, &key)?;
        validate_frequency(config, template.plays_per_hour)?;
        validate_owner(&template.owner_id)?;
        let content = self.resolve_content(&template.content).await?;

        let _guard = self.lock_slots([&key]).await;
        let store = self.ledger.store();

        let not_found = SchedulingError::NotFound { slot: key, ad_id };
        let mut slot = store.load(&key).ok_or(not_found.clone())?;
        let pos = slot.position(&ad_id).ok_or(not_found)?;

        let replacement = ScheduledAd {
            id: ad_id,
            owner_id: template.owner_id.clone(),
            content,
            plays_per_hour: template.plays_per_hour,
            sequence: slot.ads[pos].sequence,
            paused: false,
        };
        check_replacement(config, &slot, &slot.ads[pos], replacement.total_seconds_per_hour())?;

        slot.ads[pos] = replacement.clone();
        store.save(slot);

        self.publish(Event::AdRevised {
            slot: key,
            ad: replacement.clone(),
        });
        debug!(
            "revised ad {ad_id} at {key}: {} x{}",
            replacement.content.name, replacement.plays_per_hour
        );
        Ok(replacement)
    }

    /// Flip `paused`. Occupancy is unchanged either way. Returns the new state.
    pub async fn toggle_pause(&self, slot: SlotKey, ad_id: AdId) -> Result<bool, SchedulingError> {
        let result = self.toggle_pause_inner(slot, ad_id).await;
        record("toggle_pause", &result);
        result
    }

    async fn toggle_pause_inner(&self, key: SlotKey, ad_id: AdId) -> Result<bool, SchedulingError> {
        validate_slot(self.config(), &key)?;
        let _guard = self.lock_slots([&key]).await;
        let store = self.ledger.store();

        let not_found = SchedulingError::NotFound { slot: key, ad_id };
        let mut slot = store.load(&key).ok_or(not_found.clone())?;
        let pos = slot.position(&ad_id).ok_or(not_found)?;
        let paused = !slot.ads[pos].paused;
        slot.ads[pos].paused = paused;
        store.save(slot);

        self.publish(Event::AdPauseToggled {
            slot: key,
            id: ad_id,
            paused,
        });
        debug!("ad {ad_id} at {key} paused={paused}");
        Ok(paused)
    }
}
