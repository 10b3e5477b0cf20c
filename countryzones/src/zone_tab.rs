//! Parsing `zone.tab`, the tz database's country-to-zone table.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file}:{line}: expected ISO-CODE<TAB>coordinates<TAB>zone-id")]
pub struct ZoneTabError {
    pub file: String,
    pub line: usize,
}

/// Parses `zone.tab` into lowercase country code → zone ids, keeping the
/// file's zone order per country. `#` comments and blank lines are skipped.
pub fn parse_zone_tab(
    file: &str,
    text: &str,
) -> Result<HashMap<String, Vec<String>>, ZoneTabError> {
    let mut countries: HashMap<String, Vec<String>> = HashMap::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split('\t');
        let (iso, _coords, zone_id) = match (fields.next(), fields.next(), fields.next()) {
            (Some(iso), Some(coords), Some(zone)) if !iso.is_empty() && !coords.is_empty() => {
                (iso, coords, zone)
            }
            _ => {
                return Err(ZoneTabError {
                    file: file.to_owned(),
                    line: number + 1,
                })
            }
        };
        countries
            .entry(iso.to_ascii_lowercase())
            .or_default()
            .push(zone_id.to_owned());
    }
    Ok(countries)
}
