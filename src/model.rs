use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Seconds of airtime. Durations, capacities and per-hour totals all use it.
pub type Secs = u32;

/// A recurring weekly hour: `(day_of_week, hour)`.
///
/// Ordering is day-major, which is also the lock-acquisition order for batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub day: u8,
    pub hour: u8,
}

impl SlotKey {
    pub const fn new(day: u8, hour: u8) -> Self {
        Self { day, hour }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} {:02}:00", self.day, self.hour)
    }
}

/// Identity of one scheduled ad inside one slot.
///
/// `batch` is shared by every copy a single batch-add created, so the same logical ad
/// keeps a distinct id per slot. Text form: `<day>:<hour>:<ULID>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdId {
    pub slot: SlotKey,
    pub batch: Ulid,
}

impl AdId {
    pub fn new(slot: SlotKey, batch: Ulid) -> Self {
        Self { slot, batch }
    }
}

impl fmt::Display for AdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.slot.day, self.slot.hour, self.batch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAdIdError(String);

impl fmt::Display for ParseAdIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad ad id: {}", self.0)
    }
}

impl std::error::Error for ParseAdIdError {}

impl FromStr for AdId {
    type Err = ParseAdIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(day), Some(hour), Some(batch)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseAdIdError(format!("expected <day>:<hour>:<ulid>, got {s:?}")));
        };
        let day = day
            .parse()
            .map_err(|_| ParseAdIdError(format!("bad day in {s:?}")))?;
        let hour = hour
            .parse()
            .map_err(|_| ParseAdIdError(format!("bad hour in {s:?}")))?;
        let batch = Ulid::from_string(batch).map_err(|e| ParseAdIdError(format!("{e} in {s:?}")))?;
        Ok(Self::new(SlotKey::new(day, hour), batch))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Playlist,
    Media,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Playlist => "playlist",
            ContentType::Media => "media",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "playlist" => Ok(ContentType::Playlist),
            "media" => Ok(ContentType::Media),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

/// An item from the content catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub content_type: ContentType,
    pub id: String,
    pub name: String,
    pub duration_seconds: Secs,
}

/// Catalog key carried by a template before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub content_type: ContentType,
    pub id: String,
}

impl ContentKey {
    pub fn new(content_type: ContentType, id: impl Into<String>) -> Self {
        Self {
            content_type,
            id: id.into(),
        }
    }
}

/// Resolved content snapshot stored on a scheduled ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub content_type: ContentType,
    pub content_id: String,
    pub name: String,
    pub single_play_duration_seconds: Secs,
}

impl From<ContentItem> for ContentRef {
    fn from(item: ContentItem) -> Self {
        Self {
            content_type: item.content_type,
            content_id: item.id,
            name: item.name,
            single_play_duration_seconds: item.duration_seconds,
        }
    }
}

/// What the user configured once for a whole selection. Ids and sequence
/// numbers are assigned per slot at scheduling time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdTemplate {
    pub owner_id: String,
    pub content: ContentKey,
    pub plays_per_hour: u32,
}

impl AdTemplate {
    pub fn new(owner_id: impl Into<String>, content: ContentKey, plays_per_hour: u32) -> Self {
        Self {
            owner_id: owner_id.into(),
            content,
            plays_per_hour,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAd {
    pub id: AdId,
    pub owner_id: String,
    pub content: ContentRef,
    pub plays_per_hour: u32,
    /// Rotation rank within the slot.
    pub sequence: u32,
    /// Paused ads keep their capacity reservation.
    pub paused: bool,
}

impl ScheduledAd {
    /// Always derived; saturates so an absurd duration can only ever fail the capacity gate.
    pub fn total_seconds_per_hour(&self) -> Secs {
        self.content
            .single_play_duration_seconds
            .saturating_mul(self.plays_per_hour)
    }

    pub fn is_own_ad(&self, campaign_id: &str) -> bool {
        self.owner_id == campaign_id
    }
}

/// A slot with at least one ad. Empty slots are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub key: SlotKey,
    /// Insertion order; rotation order is derived from `sequence`.
    pub ads: Vec<ScheduledAd>,
}

impl TimeSlot {
    pub fn new(key: SlotKey) -> Self {
        Self { key, ads: Vec::new() }
    }

    /// Paused ads count in full.
    pub fn occupied_seconds(&self) -> Secs {
        self.ads
            .iter()
            .fold(0, |acc: Secs, ad| acc.saturating_add(ad.total_seconds_per_hour()))
    }

    pub fn get(&self, id: &AdId) -> Option<&ScheduledAd> {
        self.ads.iter().find(|ad| ad.id == *id)
    }

    pub fn position(&self, id: &AdId) -> Option<usize> {
        self.ads.iter().position(|ad| ad.id == *id)
    }

    pub fn remove_ad(&mut self, id: &AdId) -> Option<ScheduledAd> {
        self.position(id).map(|pos| self.ads.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }
}

/// Unused capacity handed to the platform filler. Derived on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseAdFill {
    pub leftover_seconds: Secs,
    pub house_ad_plays: u32,
}

/// Change notifications, one channel per slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    AdScheduled { slot: SlotKey, ad: ScheduledAd },
    AdRevised { slot: SlotKey, ad: ScheduledAd },
    AdRemoved { slot: SlotKey, id: AdId },
    AdPauseToggled { slot: SlotKey, id: AdId, paused: bool },
}

impl Event {
    pub fn slot(&self) -> SlotKey {
        match self {
            Event::AdScheduled { slot, .. }
            | Event::AdRevised { slot, .. }
            | Event::AdRemoved { slot, .. }
            | Event::AdPauseToggled { slot, .. } => *slot,
        }
    }
}

// ── Projection result types ─────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeeklySummary {
    pub empty_slots: usize,
    pub partially_filled_slots: usize,
    pub fully_booked_slots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSummary {
    pub slot: SlotKey,
    pub fill_percentage: u8,
    pub ad_count: usize,
    pub has_own_ad: bool,
    pub occupied_seconds: Secs,
    pub available_seconds: Secs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnAdEntry {
    pub slot: SlotKey,
    pub ad: ScheduledAd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnAdsReport {
    pub active: Vec<OwnAdEntry>,
    pub paused: Vec<OwnAdEntry>,
}

impl OwnAdsReport {
    pub fn len(&self) -> usize {
        self.active.len() + self.paused.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.paused.is_empty()
    }
}
