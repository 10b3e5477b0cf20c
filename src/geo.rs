//! Mapping coarse locations to time zone ids.

use thiserror::Error;

/// Opaque cell identifier. Fixes that fall in the same cell compare equal,
/// which is what duplicate suppression keys on; the actual value comes from
/// the geo data's spatial index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LocationToken(pub u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("geo zone data unavailable: {0}")]
pub struct GeoLookupError(pub String);

/// The zones that apply at a location. An empty list is a real answer:
/// the fix landed somewhere no zone claims, like open ocean.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ZoneMatch {
    pub token: LocationToken,
    pub zone_ids: Vec<String>,
}

/// Opens the geo data. Each certainty computation opens a fresh session and
/// drops it when done, so the backing file is never held across idle time.
pub trait ZoneFinder: Send + Sync {
    fn open(&self) -> Result<Box<dyn ZoneFinderSession + '_>, GeoLookupError>;
}

pub trait ZoneFinderSession {
    fn lookup(&mut self, latitude: f64, longitude: f64) -> Result<ZoneMatch, GeoLookupError>;
}
