//! Offset periods: spans over which a zone's behaviour is constant.

use crate::rules::ZoneRules;
use crate::Instant;

/// A `[start, end)` span during which a zone's standard offset, daylight
/// offset and display name are all constant. Two periods are equal only if
/// every field matches, span boundaries included.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct OffsetPeriod {
    start: Instant,
    end: Instant,
    raw_offset_ms: i64,
    dst_offset_ms: i64,
    name: String,
}

impl OffsetPeriod {
    /// Returns the period in force at `start`, clipped to `[start, end)`:
    /// it runs until the zone's next rule transition, or until `end` if the
    /// rules hold steady that long.
    pub fn from_rules(rules: &dyn ZoneRules, start: Instant, end: Instant) -> OffsetPeriod {
        debug_assert!(start < end);
        let info = rules.offset_at(start);
        let period_end = match rules.next_transition(start) {
            Some(at) if at < end => at,
            _ => end,
        };
        OffsetPeriod {
            start,
            end: period_end,
            raw_offset_ms: info.raw_offset_ms,
            dst_offset_ms: info.dst_offset_ms,
            name: info.name,
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn end(&self) -> Instant {
        self.end
    }

    pub fn raw_offset_ms(&self) -> i64 {
        self.raw_offset_ms
    }

    pub fn dst_offset_ms(&self) -> i64 {
        self.dst_offset_ms
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The total offset from UTC over this period.
    pub fn total_offset_ms(&self) -> i64 {
        self.raw_offset_ms + self.dst_offset_ms
    }
}
