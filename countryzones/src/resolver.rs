//! Per-country validation and output records.
//!
//! One country at a time: check the declaration against the rule data, the
//! zone.tab country list and the alias table, build the country's zone tree
//! over the usage window, and emit the record the XML writer serialises.
//! Problems go through [`Diagnostics`] so that every broken country in a
//! run is reported, not just the first.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Months, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

use crate::diagnostics::Diagnostics;
use crate::history::{HistoryError, ZoneHistory};
use crate::input::CountryInput;
use crate::rules::RulesSource;
use crate::tree::{ZoneTree, ZoneUsage};
use crate::aliases::AliasMap;
use crate::{Instant, MAX_INSTANT};

/// The start of the usage window: 1970-01-01T00:00:00Z, the epoch the tz
/// database guarantees data from.
pub const ZONE_USAGE_CALCS_START: Instant = 0;

/// Merges after this instant are invisible to clients.
pub const ZONE_USAGE_NOT_AFTER_CUTOFF: Instant = MAX_INSTANT;

/// The end of the usage window: two years past the cutoff, so the final
/// DST cycle before the cutoff is fully observed.
pub fn zone_usage_calcs_end() -> Instant {
    let cutoff = DateTime::from_timestamp_millis(ZONE_USAGE_NOT_AFTER_CUTOFF)
        .expect("cutoff is in range");
    cutoff
        .checked_add_months(Months::new(24))
        .expect("cutoff + 2 years is in range")
        .timestamp_millis()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("cannot derive a year from IANA version {0:?}")]
    BadIanaVersion(String),
}

/// Problems a country's declaration can have. Rendered into [`Diagnostics`];
/// the variants mirror what the operator has to fix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("country code {0:?} is not two lowercase letters")]
    BadIsoCode(String),
    #[error("no time zone mappings declared")]
    NoZones,
    #[error("zone id {0} is declared twice")]
    DuplicateZones(String),
    #[error("several zones but no defaultTimeZoneId")]
    AmbiguousDefault,
    #[error("default zone {0} is not one of the declared zones")]
    DefaultNotMember(String),
    #[error("defaultTimeZoneBoost requires an explicit defaultTimeZoneId")]
    BoostWithoutDefault,
    #[error("unknown zone id {0}")]
    InvalidZoneId(String),
    #[error("aliasId {alias} is not the current id for {zone}")]
    BadAlias { zone: String, alias: String },
    #[error("declared zones disagree with zone.tab: missing {missing:?}, unexpected {extra:?}")]
    IanaMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },
    #[error("unparseable utcOffset {0:?}")]
    BadOffsetString(String),
    #[error("utcOffset {declared} disagrees with the rule offset {actual_ms}ms for {zone}")]
    OffsetMismatch {
        zone: String,
        declared: String,
        actual_ms: i64,
    },
    #[error("priority {priority} for {zone} is outside 1..=10")]
    InvalidPriority { zone: String, priority: i64 },
}

/// One zone of a resolved country, in declaration order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ResolvedZone {
    pub zone_id: String,
    pub shown_in_picker: bool,
    /// Set when the zone stops being distinct within the usage window.
    pub not_used_after: Option<Instant>,
    /// The surviving zone that stands in for it, when `not_used_after` is set.
    pub replaced_by: Option<String>,
    pub alias_id: Option<String>,
}

/// The output record for one country.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CountryRecord {
    pub iso_code: String,
    pub default_zone_id: String,
    pub default_time_zone_boost: bool,
    /// Whether any declared zone spends time at a total offset of zero
    /// during the current rule year.
    pub ever_uses_utc: bool,
    pub zones: Vec<ResolvedZone>,
}

/// Validates countries against one IANA release.
pub struct Resolver<'a> {
    rules: &'a dyn RulesSource,
    aliases: &'a AliasMap,
    /// Mid-year instant of the year after the release, used to spot-check
    /// declared offsets.
    sample_instant: Instant,
    /// Start of the release year, from which `ever_uses_utc` is judged.
    year_start: Instant,
    calcs_start: Instant,
    calcs_end: Instant,
    not_after_cutoff: Instant,
    offset_pattern: Regex,
}

impl<'a> Resolver<'a> {
    /// Derives the version-pinned sample instants from `iana_version`
    /// (e.g. `2021a`), which keeps generation reproducible for a release.
    pub fn new(
        rules: &'a dyn RulesSource,
        aliases: &'a AliasMap,
        iana_version: &str,
    ) -> Result<Resolver<'a>, ResolverError> {
        let year: i32 = iana_version
            .get(0..4)
            .and_then(|y| y.parse().ok())
            .filter(|y| (1970..=9999).contains(y))
            .ok_or_else(|| ResolverError::BadIanaVersion(iana_version.to_owned()))?;
        let sample_instant = Utc
            .with_ymd_and_hms(year + 1, 7, 2, 12, 0, 0)
            .single()
            .expect("mid-year noon always exists")
            .timestamp_millis();
        let year_start = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .expect("year start always exists")
            .timestamp_millis();
        Ok(Resolver {
            rules,
            aliases,
            sample_instant,
            year_start,
            calcs_start: ZONE_USAGE_CALCS_START,
            calcs_end: zone_usage_calcs_end(),
            not_after_cutoff: ZONE_USAGE_NOT_AFTER_CUTOFF,
            offset_pattern: Regex::new(r"^(?P<sign>-)?(?P<hours>\d{1,2}):(?P<minutes>\d{2})$")
                .unwrap(),
        })
    }

    /// Resolves one country. Problems are recorded in `diags`; the record is
    /// only returned when the country is clean.
    pub fn resolve(
        &self,
        country: &CountryInput,
        iana_zones: &[String],
        diags: &mut Diagnostics,
    ) -> Option<CountryRecord> {
        let before = diags.entries().len();
        let errored = |diags: &Diagnostics| {
            diags.entries()[before..]
                .iter()
                .any(|e| e.severity == crate::diagnostics::Severity::Error)
        };

        self.check_structure(country, diags);
        self.check_zone_ids(country, diags);
        if errored(diags) {
            return None;
        }

        self.check_aliases(country, iana_zones, diags);
        self.check_offsets(country, diags);
        if errored(diags) {
            return None;
        }

        let histories = self.build_histories(country, diags)?;
        let ever_uses_utc = histories.iter().any(|history| {
            history
                .periods()
                .iter()
                .any(|p| p.end() > self.year_start && p.total_offset_ms() == 0)
        });

        let usage = self.compute_usage(country, histories, diags)?;

        let default_zone_id = country
            .default_zone_id
            .clone()
            .unwrap_or_else(|| country.zones[0].zone_id.clone());

        Some(CountryRecord {
            iso_code: country.iso_code.clone(),
            default_zone_id,
            default_time_zone_boost: country.default_time_zone_boost,
            ever_uses_utc,
            zones: country
                .zones
                .iter()
                .map(|mapping| {
                    let usage = usage.get(&mapping.zone_id).cloned().unwrap_or(ZoneUsage {
                        not_used_after: None,
                        replaced_by: None,
                    });
                    ResolvedZone {
                        zone_id: mapping.zone_id.clone(),
                        shown_in_picker: mapping.shown_in_picker,
                        not_used_after: usage.not_used_after,
                        replaced_by: usage.replaced_by,
                        alias_id: mapping.alias_id.clone(),
                    }
                })
                .collect(),
        })
    }

    fn check_structure(&self, country: &CountryInput, diags: &mut Diagnostics) {
        let iso_ok = country.iso_code.len() == 2
            && country.iso_code.bytes().all(|b| b.is_ascii_lowercase());
        if !iso_ok {
            diags.error(ValidationError::BadIsoCode(country.iso_code.clone()));
        }

        if country.zones.is_empty() {
            diags.error(ValidationError::NoZones);
            return;
        }

        let mut seen = HashSet::new();
        for mapping in &country.zones {
            if !seen.insert(mapping.zone_id.as_str()) {
                diags.error(ValidationError::DuplicateZones(mapping.zone_id.clone()));
            }
        }

        match &country.default_zone_id {
            Some(default) => {
                if !country.zones.iter().any(|m| &m.zone_id == default) {
                    diags.error(ValidationError::DefaultNotMember(default.clone()));
                }
            }
            None => {
                if country.zones.len() > 1 {
                    diags.error(ValidationError::AmbiguousDefault);
                }
                if country.default_time_zone_boost {
                    diags.error(ValidationError::BoostWithoutDefault);
                }
            }
        }
    }

    fn check_zone_ids(&self, country: &CountryInput, diags: &mut Diagnostics) {
        for mapping in &country.zones {
            if self.rules.rules(&mapping.zone_id).is_none() {
                diags.error(ValidationError::InvalidZoneId(mapping.zone_id.clone()));
            }
        }
    }

    /// Every declared zone, after substituting declared aliases, must match
    /// zone.tab's idea of the country exactly.
    fn check_aliases(&self, country: &CountryInput, iana_zones: &[String], diags: &mut Diagnostics) {
        let mut expected = Vec::new();
        for mapping in &country.zones {
            match &mapping.alias_id {
                Some(alias) => {
                    if self.aliases.target(&mapping.zone_id) != Some(alias.as_str()) {
                        diags.error(ValidationError::BadAlias {
                            zone: mapping.zone_id.clone(),
                            alias: alias.clone(),
                        });
                    }
                    expected.push(alias.clone());
                }
                None => expected.push(mapping.zone_id.clone()),
            }
        }

        let expected: HashSet<String> = expected.into_iter().collect();
        let actual: HashSet<String> = iana_zones.iter().cloned().collect();
        if expected != actual {
            let mut missing: Vec<String> = actual.difference(&expected).cloned().collect();
            let mut extra: Vec<String> = expected.difference(&actual).cloned().collect();
            missing.sort();
            extra.sort();
            diags.error(ValidationError::IanaMismatch { missing, extra });
        }
    }

    fn check_offsets(&self, country: &CountryInput, diags: &mut Diagnostics) {
        for mapping in &country.zones {
            let Some(declared_ms) = self.parse_utc_offset(&mapping.utc_offset) else {
                diags.error(ValidationError::BadOffsetString(mapping.utc_offset.clone()));
                continue;
            };
            let rules = self
                .rules
                .rules(&mapping.zone_id)
                .expect("zone ids were checked before offsets");
            let actual_ms = rules.offset_at(self.sample_instant).raw_offset_ms;
            if actual_ms != declared_ms {
                diags.error(ValidationError::OffsetMismatch {
                    zone: mapping.zone_id.clone(),
                    declared: mapping.utc_offset.clone(),
                    actual_ms,
                });
            }
            if declared_ms % (15 * 60 * 1000) != 0 {
                diags.warn(format!(
                    "utcOffset {} for {} is not a quarter-hour multiple",
                    mapping.utc_offset, mapping.zone_id
                ));
            }
        }
    }

    fn build_histories(
        &self,
        country: &CountryInput,
        diags: &mut Diagnostics,
    ) -> Option<Vec<ZoneHistory>> {
        let mut histories = Vec::with_capacity(country.zones.len());
        let mut failed = false;
        for mapping in &country.zones {
            let rules = self
                .rules
                .rules(&mapping.zone_id)
                .expect("zone ids were checked before histories");
            match ZoneHistory::from_rules(
                rules,
                &mapping.zone_id,
                mapping.priority,
                self.calcs_start,
                self.calcs_end,
            ) {
                Ok(history) => histories.push(history),
                Err(HistoryError::InvalidPriority { zone_id, priority }) => {
                    diags.error(ValidationError::InvalidPriority {
                        zone: zone_id,
                        priority,
                    });
                    failed = true;
                }
            }
        }
        (!failed).then_some(histories)
    }

    fn compute_usage(
        &self,
        country: &CountryInput,
        histories: Vec<ZoneHistory>,
        diags: &mut Diagnostics,
    ) -> Option<std::collections::HashMap<String, ZoneUsage>> {
        let tree = match ZoneTree::build(
            &country.iso_code,
            histories,
            self.calcs_start,
            self.calcs_end,
        ) {
            Ok(tree) => tree,
            Err(err) => {
                diags.error(err);
                return None;
            }
        };
        match tree.compute_usage(self.not_after_cutoff) {
            Ok(usage) => Some(usage),
            Err(err) => {
                for clash in err.clashes {
                    diags.error(ClashMessage(clash));
                }
                None
            }
        }
    }

    fn parse_utc_offset(&self, text: &str) -> Option<i64> {
        let caps = self.offset_pattern.captures(text)?;
        let hours: i64 = caps["hours"].parse().ok()?;
        let minutes: i64 = caps["minutes"].parse().ok()?;
        if hours > 18 || minutes > 59 {
            return None;
        }
        let magnitude = (hours * 60 + minutes) * 60 * 1000;
        Some(if caps.name("sign").is_some() {
            -magnitude
        } else {
            magnitude
        })
    }
}

struct ClashMessage(crate::tree::PriorityClash);

impl fmt::Display for ClashMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "priority clash between {} at priority {}",
            self.0.zone_ids.join(", "),
            self.0.priority
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_parse_with_sign_and_odd_minutes() {
        let rules = crate::rules::CompiledRules::default();
        let aliases = AliasMap::default();
        let resolver = Resolver::new(&rules, &aliases, "2021a").expect("valid version");

        assert_eq!(resolver.parse_utc_offset("0:00"), Some(0));
        assert_eq!(resolver.parse_utc_offset("00:00"), Some(0));
        assert_eq!(resolver.parse_utc_offset("-5:00"), Some(-18_000_000));
        assert_eq!(resolver.parse_utc_offset("5:45"), Some(20_700_000));
        assert_eq!(resolver.parse_utc_offset("13:00"), Some(46_800_000));
        assert_eq!(resolver.parse_utc_offset("bogus"), None);
        assert_eq!(resolver.parse_utc_offset("5:99"), None);
    }

    #[test]
    fn sample_instants_pin_to_the_release_year() {
        let rules = crate::rules::CompiledRules::default();
        let aliases = AliasMap::default();
        let resolver = Resolver::new(&rules, &aliases, "2021a").expect("valid version");

        // 2022-07-02T12:00:00Z and 2021-01-01T00:00:00Z.
        assert_eq!(resolver.sample_instant, 1_656_763_200_000);
        assert_eq!(resolver.year_start, 1_609_459_200_000);
    }

    #[test]
    fn malformed_versions_are_rejected() {
        let rules = crate::rules::CompiledRules::default();
        let aliases = AliasMap::default();
        assert!(Resolver::new(&rules, &aliases, "21a").is_err());
        assert!(Resolver::new(&rules, &aliases, "abcd").is_err());
    }

    #[test]
    fn usage_window_covers_two_years_past_the_cutoff() {
        // 2040-01-19T03:14:07Z.
        assert_eq!(zone_usage_calcs_end(), 2_210_555_647_000);
    }
}
