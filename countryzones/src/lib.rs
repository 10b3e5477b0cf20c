//! Consolidating IANA zone histories into per-country time zone metadata.
//!
//! Most countries declare several tz database zones, many of which stopped
//! disagreeing with each other decades ago. This crate decides, for every
//! country, which zones are still distinct, which zone is the default, and
//! when each remaining zone last differed from the zone that replaces it.
//!
//! The work is split into stages:
//!
//! - **Rule data** comes from the tz source files, compiled into per-zone
//!   transition lists by the `rules` module;
//! - **Offset periods** and **zone histories** (the `period` and `history`
//!   modules) slice a zone's rules into spans of constant behaviour over a
//!   fixed window;
//! - The **zone tree** (the `tree` module) groups a country's histories by
//!   agreement, newest periods first, and derives per-zone usage metadata;
//! - The **resolver** (the `resolver` module) validates one country's
//!   declarations against the rule data, the zone.tab country list and the
//!   backward-link aliases, and emits its output record;
//! - The `input`, `zone_tab` and `aliases` modules parse the three input
//!   files, and `diagnostics` collects everything worth telling the operator.

#![warn(missing_copy_implementations)]
#![warn(nonstandard_style)]
#![warn(trivial_numeric_casts)]
#![warn(unreachable_pub)]
#![warn(unused)]

pub mod aliases;
pub mod diagnostics;
pub mod history;
pub mod input;
pub mod period;
pub mod resolver;
pub mod rules;
pub mod tree;
pub mod zone_tab;

/// Milliseconds since the Unix epoch.
pub type Instant = i64;

/// 2038-01-19T03:14:07Z, the latest cutoff ever shown to clients. Anything
/// at or beyond this instant is treated as "still in use".
pub const MAX_INSTANT: Instant = i32::MAX as Instant * 1000;
