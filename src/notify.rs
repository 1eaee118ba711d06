use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, SlotKey};

const CHANNEL_CAPACITY: usize = 256;

/// Per-slot broadcast of schedule changes.
pub struct NotifyHub {
    channels: DashMap<SlotKey, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes of one slot. Creates the channel if needed.
    pub fn subscribe(&self, slot: SlotKey) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(slot)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, slot: SlotKey, event: &Event) {
        if let Some(sender) = self.channels.get(&slot) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AdId;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let slot = SlotKey::new(1, 9);
        let mut rx = hub.subscribe(slot);

        let event = Event::AdPauseToggled {
            slot,
            id: AdId::new(slot, Ulid::new()),
            paused: true,
        };
        hub.send(slot, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn other_slots_are_not_delivered() {
        let hub = NotifyHub::new();
        let watched = SlotKey::new(1, 9);
        let other = SlotKey::new(1, 10);
        let mut rx = hub.subscribe(watched);

        hub.send(
            other,
            &Event::AdRemoved {
                slot: other,
                id: AdId::new(other, Ulid::new()),
            },
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let slot = SlotKey::new(0, 0);
        hub.send(
            slot,
            &Event::AdRemoved {
                slot,
                id: AdId::new(slot, Ulid::new()),
            },
        );
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn prune_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(SlotKey::new(2, 3));
        let _kept = hub.subscribe(SlotKey::new(2, 4));
        assert_eq!(hub.channel_count(), 2);
        drop(rx);
        hub.prune();
        assert_eq!(hub.channel_count(), 1);
    }
}
