use std::fmt;

use crate::model::{Secs, SlotKey};

/// Scheduling constants. Every value can be overridden from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Airtime available per slot.
    pub slot_capacity_seconds: Secs,
    /// Length of one platform filler spot.
    pub house_ad_duration_seconds: Secs,
    /// Upper bound on a template's frequency (360 = one play every 10s).
    pub max_plays_per_hour: u32,
    pub days_per_week: u8,
    pub hours_per_day: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slot_capacity_seconds: 3600,
            house_ad_duration_seconds: 10,
            max_plays_per_hour: 360,
            days_per_week: 7,
            hours_per_day: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Zero(&'static str),
    OutOfRange { field: &'static str, value: u32, max: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Zero(field) => write!(f, "{field} must be greater than zero"),
            ConfigError::OutOfRange { field, value, max } => {
                write!(f, "{field} = {value} exceeds maximum {max}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl SchedulerConfig {
    /// Read `AIRTIME_*` overrides; unparsable values fall back to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let config = Self {
            slot_capacity_seconds: env_or("AIRTIME_SLOT_CAPACITY_SECONDS", d.slot_capacity_seconds),
            house_ad_duration_seconds: env_or("AIRTIME_HOUSE_AD_SECONDS", d.house_ad_duration_seconds),
            max_plays_per_hour: env_or("AIRTIME_MAX_PLAYS_PER_HOUR", d.max_plays_per_hour),
            days_per_week: env_or("AIRTIME_DAYS_PER_WEEK", d.days_per_week),
            hours_per_day: env_or("AIRTIME_HOURS_PER_DAY", d.hours_per_day),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_capacity_seconds == 0 {
            return Err(ConfigError::Zero("slot_capacity_seconds"));
        }
        if self.house_ad_duration_seconds == 0 {
            return Err(ConfigError::Zero("house_ad_duration_seconds"));
        }
        if self.max_plays_per_hour == 0 {
            return Err(ConfigError::Zero("max_plays_per_hour"));
        }
        if self.days_per_week == 0 {
            return Err(ConfigError::Zero("days_per_week"));
        }
        if self.hours_per_day == 0 {
            return Err(ConfigError::Zero("hours_per_day"));
        }
        if self.days_per_week > 7 {
            return Err(ConfigError::OutOfRange {
                field: "days_per_week",
                value: self.days_per_week.into(),
                max: 7,
            });
        }
        if self.hours_per_day > 24 {
            return Err(ConfigError::OutOfRange {
                field: "hours_per_day",
                value: self.hours_per_day.into(),
                max: 24,
            });
        }
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        usize::from(self.days_per_week) * usize::from(self.hours_per_day)
    }

    pub fn contains(&self, key: &SlotKey) -> bool {
        key.day < self.days_per_week && key.hour < self.hours_per_day
    }

    /// Dense index for lock tables. Caller checks `contains` first.
    pub fn slot_index(&self, key: &SlotKey) -> usize {
        usize::from(key.day) * usize::from(self.hours_per_day) + usize::from(key.hour)
    }

    /// Every key of the grid, day-major.
    pub fn slot_keys(&self) -> impl Iterator<Item = SlotKey> + use<> {
        let hours = self.hours_per_day;
        (0..self.days_per_week).flat_map(move |day| (0..hours).map(move |hour| SlotKey::new(day, hour)))
    }

    pub fn day_keys(&self, day: u8) -> impl Iterator<Item = SlotKey> + use<> {
        (0..self.hours_per_day).map(move |hour| SlotKey::new(day, hour))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_weekly_grid() {
        let c = SchedulerConfig::default();
        assert_eq!(c.slot_capacity_seconds, 3600);
        assert_eq!(c.house_ad_duration_seconds, 10);
        assert_eq!(c.max_plays_per_hour, 360);
        assert_eq!(c.slot_count(), 168);
        assert_eq!(c.slot_keys().count(), 168);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn slot_index_is_dense() {
        let c = SchedulerConfig::default();
        let indices: Vec<_> = c.slot_keys().map(|k| c.slot_index(&k)).collect();
        assert_eq!(indices, (0..168).collect::<Vec<_>>());
    }

    #[test]
    fn contains_respects_grid() {
        let c = SchedulerConfig::default();
        assert!(c.contains(&SlotKey::new(6, 23)));
        assert!(!c.contains(&SlotKey::new(7, 0)));
        assert!(!c.contains(&SlotKey::new(0, 24)));
    }

    #[test]
    fn validate_rejects_zero_and_oversized_grids() {
        let zero_capacity = SchedulerConfig {
            slot_capacity_seconds: 0,
            ..Default::default()
        };
        assert_eq!(zero_capacity.validate(), Err(ConfigError::Zero("slot_capacity_seconds")));

        let long_week = SchedulerConfig {
            days_per_week: 8,
            ..Default::default()
        };
        assert!(matches!(long_week.validate(), Err(ConfigError::OutOfRange { field: "days_per_week", .. })));
    }

    #[test]
    fn day_keys_cover_every_hour() {
        let c = SchedulerConfig::default();
        let keys: Vec<_> = c.day_keys(3).collect();
        assert_eq!(keys.len(), 24);
        assert_eq!(keys[0], SlotKey::new(3, 0));
        assert_eq!(keys[23], SlotKey::new(3, 23));
    }
}
