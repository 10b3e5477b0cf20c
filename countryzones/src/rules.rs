//! Zone rule data compiled from the tz source files.
//!
//! The tz database describes each zone as a stack of rule sets; what the
//! consolidation stages need is much simpler: for a zone id, the offsets in
//! force at an instant and the instant of the next change. `parse-zoneinfo`
//! turns the source files into per-zone timespan sets; this module flattens
//! those into millisecond-resolution transition lists answered by binary
//! search, and hides the whole thing behind the [`ZoneRules`] trait so tests
//! can substitute scripted data.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use parse_zoneinfo::line::{Line, LineParser};
use parse_zoneinfo::table::{Table, TableBuilder};
use parse_zoneinfo::transitions::{FixedTimespan, FixedTimespanSet, TableTransitions};
use thiserror::Error;

use crate::Instant;

/// The tz source files that contribute zone definitions.
pub const TZDATA_FILES: [&str; 9] = [
    "africa",
    "antarctica",
    "asia",
    "australasia",
    "backward",
    "etcetera",
    "europe",
    "northamerica",
    "southamerica",
];

/// Offsets and display name in force at one instant.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ZoneOffset {
    /// Offset from UTC of standard time, in milliseconds.
    pub raw_offset_ms: i64,
    /// Extra daylight-saving offset, in milliseconds.
    pub dst_offset_ms: i64,
    /// The abbreviation in use, e.g. `EST`.
    pub name: String,
}

impl ZoneOffset {
    /// The total offset from UTC.
    pub fn total_ms(&self) -> i64 {
        self.raw_offset_ms + self.dst_offset_ms
    }
}

/// Rule data for a single zone.
pub trait ZoneRules {
    /// The offsets in force at `at`.
    fn offset_at(&self, at: Instant) -> ZoneOffset;

    /// The first transition instant strictly after `after`, if any.
    fn next_transition(&self, after: Instant) -> Option<Instant>;
}

/// Hands out rule data per zone id.
pub trait RulesSource {
    /// Rule data for `zone_id`, or `None` for an id the tz database does not
    /// define. Link names resolve to their target's rules.
    fn rules(&self, zone_id: &str) -> Option<&dyn ZoneRules>;
}

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
}

/// Transition list for one zone. The first entry is the span in force since
/// the beginning of time; every later entry starts at a transition instant.
#[derive(Clone, PartialEq, Debug)]
pub struct CompiledZoneRules {
    transitions: Vec<(Instant, ZoneOffset)>,
}

impl CompiledZoneRules {
    /// Builds rule data from an initial span and an ordered transition list.
    pub fn new(first: ZoneOffset, rest: Vec<(Instant, ZoneOffset)>) -> CompiledZoneRules {
        let mut transitions = Vec::with_capacity(rest.len() + 1);
        transitions.push((i64::MIN, first));
        transitions.extend(rest);
        debug_assert!(transitions.windows(2).all(|w| w[0].0 < w[1].0));
        CompiledZoneRules { transitions }
    }

    fn from_timespans(set: &FixedTimespanSet) -> CompiledZoneRules {
        let convert = |span: &FixedTimespan| ZoneOffset {
            raw_offset_ms: span.utc_offset * 1000,
            dst_offset_ms: span.dst_offset * 1000,
            name: span.name.clone(),
        };
        CompiledZoneRules::new(
            convert(&set.first),
            set.rest
                .iter()
                .map(|(start, span)| (start * 1000, convert(span)))
                .collect(),
        )
    }
}

impl ZoneRules for CompiledZoneRules {
    fn offset_at(&self, at: Instant) -> ZoneOffset {
        // The sentinel first entry guarantees a predecessor for every instant.
        let idx = self.transitions.partition_point(|(start, _)| *start <= at);
        self.transitions[idx - 1].1.clone()
    }

    fn next_transition(&self, after: Instant) -> Option<Instant> {
        let idx = self.transitions.partition_point(|(start, _)| *start <= after);
        self.transitions.get(idx).map(|(start, _)| *start)
    }
}

/// Every zone's compiled rule data, including link names.
#[derive(Default, Debug)]
pub struct CompiledRules {
    zones: HashMap<String, CompiledZoneRules>,
}

impl CompiledRules {
    /// Compiles every zone (and link) in `table`.
    pub fn from_table(table: &Table) -> CompiledRules {
        let mut zones = HashMap::new();
        for name in table.zonesets.keys().chain(table.links.keys()) {
            match table.timespans(name) {
                Some(set) => {
                    let _ = zones.insert(name.clone(), CompiledZoneRules::from_timespans(&set));
                }
                None => tracing::warn!("no timespans for zone {name}"),
            }
        }
        tracing::info!("compiled rule data for {} zone ids", zones.len());
        CompiledRules { zones }
    }

    /// Parses the standard tz source files under `dir` and compiles them.
    pub fn from_tzdata_dir<P: AsRef<Path>>(dir: P) -> Result<CompiledRules, RulesError> {
        let parser = LineParser::default();
        let mut builder = TableBuilder::new();
        for filename in TZDATA_FILES {
            let path = dir.as_ref().join(filename);
            let file = File::open(&path).map_err(|source| RulesError::Io {
                path: path.display().to_string(),
                source,
            })?;
            for (number, line) in BufReader::new(file).lines().enumerate() {
                let mut line = line.map_err(|source| RulesError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                // Comments can trail real fields, so strip rather than skip.
                if let Some(pos) = line.find('#') {
                    line.truncate(pos);
                }
                if line.trim().is_empty() {
                    continue;
                }
                let parse_error = |message: String| RulesError::Parse {
                    file: filename.to_owned(),
                    line: number + 1,
                    message,
                };
                match parser.parse_str(&line).map_err(|e| parse_error(e.to_string()))? {
                    Line::Space => {}
                    Line::Zone(zone) => builder
                        .add_zone_line(zone)
                        .map_err(|e| parse_error(e.to_string()))?,
                    Line::Continuation(cont) => builder
                        .add_continuation_line(cont)
                        .map_err(|e| parse_error(e.to_string()))?,
                    Line::Rule(rule) => builder
                        .add_rule_line(rule)
                        .map_err(|e| parse_error(e.to_string()))?,
                    Line::Link(link) => builder
                        .add_link_line(link)
                        .map_err(|e| parse_error(e.to_string()))?,
                }
            }
        }
        Ok(CompiledRules::from_table(&builder.build()))
    }

    /// Adds or replaces one zone's rule data. Tests script their rule sets
    /// through this.
    pub fn insert(&mut self, zone_id: impl Into<String>, rules: CompiledZoneRules) {
        let _ = self.zones.insert(zone_id.into(), rules);
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl RulesSource for CompiledRules {
    fn rules(&self, zone_id: &str) -> Option<&dyn ZoneRules> {
        self.zones.get(zone_id).map(|rules| rules as &dyn ZoneRules)
    }
}
