use crate::model::{AdId, Secs, SlotKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// The tightest slot of the selection cannot take the requested airtime.
    InsufficientCapacity {
        slot: SlotKey,
        requested: Secs,
        available: Secs,
    },
    /// Template content is unknown to the catalog or has no duration.
    MissingContent,
    NotFound {
        slot: SlotKey,
        ad_id: AdId,
    },
    /// A transaction was handed an empty selection.
    InvalidSelection,
    /// Key outside the configured day/hour grid.
    InvalidSlot(SlotKey),
    InvalidFrequency {
        plays_per_hour: u32,
        max: u32,
    },
    LimitExceeded(&'static str),
}

impl SchedulingError {
    /// Not-found outcomes are safe to treat as already-applied.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulingError::NotFound { .. })
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulingError::InsufficientCapacity { .. } => "insufficient_capacity",
            SchedulingError::MissingContent => "missing_content",
            SchedulingError::NotFound { .. } => "not_found",
            SchedulingError::InvalidSelection => "invalid_selection",
            SchedulingError::InvalidSlot(_) => "invalid_slot",
            SchedulingError::InvalidFrequency { .. } => "invalid_frequency",
            SchedulingError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::InsufficientCapacity {
                slot,
                requested,
                available,
            } => write!(
                f,
                "insufficient capacity at {slot}: requested {requested}s/hour, available {available}s"
            ),
            SchedulingError::MissingContent => write!(f, "no resolvable content selected"),
            SchedulingError::NotFound { slot, ad_id } => {
                write!(f, "ad {ad_id} not found at {slot}")
            }
            SchedulingError::InvalidSelection => write!(f, "selection is empty"),
            SchedulingError::InvalidSlot(slot) => write!(f, "{slot} is outside the schedule grid"),
            SchedulingError::InvalidFrequency {
                plays_per_hour,
                max,
            } => write!(f, "plays per hour must be within 1..={max}, got {plays_per_hour}"),
            SchedulingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for SchedulingError {}
