//! Zone histories: a zone's ordered offset periods over a fixed window.

use thiserror::Error;

use crate::period::OffsetPeriod;
use crate::rules::ZoneRules;
use crate::Instant;

/// The lowest priority a country may assign to a zone.
pub const MIN_PRIORITY: i64 = 1;
/// The highest priority a country may assign to a zone.
pub const MAX_PRIORITY: i64 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("priority {priority} for {zone_id} is outside 1..=10")]
    InvalidPriority { zone_id: String, priority: i64 },
}

/// One zone's behaviour over `[start, end)`: consecutive periods meet
/// exactly and cover the whole window.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ZoneHistory {
    zone_id: String,
    priority: u8,
    periods: Vec<OffsetPeriod>,
}

/// A by-value key for a run of periods. Two histories that produce equal
/// keys over the same range behaved identically over that range; hashing is
/// over the period fields themselves, never object identity.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PeriodKey(Vec<OffsetPeriod>);

impl ZoneHistory {
    /// Walks `rules` from `start`, collecting periods until `end`.
    pub fn from_rules(
        rules: &dyn ZoneRules,
        zone_id: &str,
        priority: i64,
        start: Instant,
        end: Instant,
    ) -> Result<ZoneHistory, HistoryError> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(HistoryError::InvalidPriority {
                zone_id: zone_id.to_owned(),
                priority,
            });
        }
        let mut periods = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let period = OffsetPeriod::from_rules(rules, cursor, end);
            cursor = period.end();
            periods.push(period);
        }
        Ok(ZoneHistory {
            zone_id: zone_id.to_owned(),
            priority: priority as u8,
            periods,
        })
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn periods(&self) -> &[OffsetPeriod] {
        &self.periods
    }

    /// The key for `periods[i..j)`.
    pub fn key_over_range(&self, i: usize, j: usize) -> PeriodKey {
        PeriodKey(self.periods[i..j].to_vec())
    }
}
