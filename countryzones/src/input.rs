//! Parsing the countryzones declaration file.
//!
//! The file is a textual record format: scalar fields as `name:value` or
//! `name:"value"`, nested records as `name:<` ... `>`. Only two record kinds
//! nest: `countries` blocks inside the file, `timeZoneMappings` blocks
//! inside a country. Anything the schema does not name is an error, so a
//! typo cannot silently drop a field.

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("{file}:{line}: {message}")]
    Schema {
        file: String,
        line: usize,
        message: String,
    },
}

/// One zone entry within a country, as declared.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ZoneMapping {
    pub zone_id: String,
    /// The declared standard offset, e.g. `-5:00`, checked against the rule
    /// data during resolution.
    pub utc_offset: String,
    pub priority: i64,
    pub shown_in_picker: bool,
    /// The current id this entry is an old name for, when the tz database
    /// has renamed it.
    pub alias_id: Option<String>,
}

/// One country's declared zones, in declaration order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CountryInput {
    pub iso_code: String,
    pub default_zone_id: Option<String>,
    pub default_time_zone_boost: bool,
    pub zones: Vec<ZoneMapping>,
}

/// The whole declaration file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CountryZonesFile {
    pub iana_version: String,
    pub countries: Vec<CountryInput>,
}

struct FieldParser {
    open_block: Regex,
    string_field: Regex,
    scalar_field: Regex,
}

impl FieldParser {
    fn new() -> FieldParser {
        FieldParser {
            open_block: Regex::new(r"^(?P<name>\w+)\s*:\s*<$").unwrap(),
            string_field: Regex::new(r#"^(?P<name>\w+)\s*:\s*"(?P<value>[^"]*)"$"#).unwrap(),
            scalar_field: Regex::new(r"^(?P<name>\w+)\s*:\s*(?P<value>[A-Za-z0-9_.+-]+)$").unwrap(),
        }
    }
}

enum Item {
    Open(String),
    Close,
    String(String, String),
    Scalar(String, String),
}

/// Parses `text` (named `file` in messages) into the declaration model.
pub fn parse_country_zones(file: &str, text: &str) -> Result<CountryZonesFile, InputError> {
    let parser = FieldParser::new();
    let schema = |line: usize, message: String| InputError::Schema {
        file: file.to_owned(),
        line,
        message,
    };

    let mut iana_version: Option<String> = None;
    let mut countries: Vec<CountryInput> = Vec::new();
    let mut country: Option<PartialCountry> = None;
    let mut mapping: Option<PartialMapping> = None;

    for (number, raw) in text.lines().enumerate() {
        let line = number + 1;
        let mut content = raw;
        if let Some(pos) = content.find('#') {
            content = &content[..pos];
        }
        let content = content.trim();
        if content.is_empty() {
            continue;
        }

        let item = if content == ">" {
            Item::Close
        } else if let Some(caps) = parser.open_block.captures(content) {
            Item::Open(caps["name"].to_owned())
        } else if let Some(caps) = parser.string_field.captures(content) {
            Item::String(caps["name"].to_owned(), caps["value"].to_owned())
        } else if let Some(caps) = parser.scalar_field.captures(content) {
            Item::Scalar(caps["name"].to_owned(), caps["value"].to_owned())
        } else {
            return Err(schema(line, format!("unrecognised line {content:?}")));
        };

        match item {
            Item::Close => {
                if let Some(m) = mapping.take() {
                    let c = country.as_mut().expect("mappings only open inside a country");
                    c.zones.push(m.finish(file, line)?);
                } else if let Some(c) = country.take() {
                    countries.push(c.finish(file, line)?);
                } else {
                    return Err(schema(line, "unmatched '>'".to_owned()));
                }
            }
            Item::Open(name) => {
                if mapping.is_some() {
                    return Err(schema(line, format!("unexpected block {name:?} in a mapping")));
                } else if country.is_some() {
                    if name == "timeZoneMappings" {
                        mapping = Some(PartialMapping::default());
                    } else {
                        return Err(schema(line, format!("unknown country block {name:?}")));
                    }
                } else if name == "countries" {
                    country = Some(PartialCountry::default());
                } else {
                    return Err(schema(line, format!("unknown block {name:?}")));
                }
            }
            Item::String(name, value) => {
                if let Some(m) = mapping.as_mut() {
                    match name.as_str() {
                        "id" => m.zone_id = Some(value),
                        "utcOffset" => m.utc_offset = Some(value),
                        "aliasId" => m.alias_id = Some(value),
                        _ => {
                            return Err(schema(line, format!("unknown mapping field {name:?}")))
                        }
                    }
                } else if let Some(c) = country.as_mut() {
                    match name.as_str() {
                        "isoCode" => c.iso_code = Some(value),
                        "defaultTimeZoneId" => c.default_zone_id = Some(value),
                        _ => {
                            return Err(schema(line, format!("unknown country field {name:?}")))
                        }
                    }
                } else if name == "ianaVersion" {
                    if iana_version.replace(value).is_some() {
                        return Err(schema(line, "ianaVersion declared twice".to_owned()));
                    }
                } else {
                    return Err(schema(line, format!("unknown field {name:?}")));
                }
            }
            Item::Scalar(name, value) => {
                if let Some(m) = mapping.as_mut() {
                    match name.as_str() {
                        "priority" => {
                            m.priority = Some(value.parse().map_err(|_| {
                                schema(line, format!("expected an integer, found {value:?}"))
                            })?);
                        }
                        "shownInPicker" => {
                            m.shown_in_picker = Some(parse_bool(&value).ok_or_else(|| {
                                schema(line, format!("expected a bool, found {value:?}"))
                            })?);
                        }
                        _ => {
                            return Err(schema(line, format!("unknown mapping field {name:?}")))
                        }
                    }
                } else if let Some(c) = country.as_mut() {
                    if name == "defaultTimeZoneBoost" {
                        c.default_time_zone_boost = parse_bool(&value).ok_or_else(|| {
                            schema(line, format!("expected a bool, found {value:?}"))
                        })?;
                    } else {
                        return Err(schema(line, format!("unknown country field {name:?}")));
                    }
                } else {
                    return Err(schema(line, format!("unknown field {name:?}")));
                }
            }
        }
    }

    if country.is_some() || mapping.is_some() {
        return Err(schema(
            text.lines().count(),
            "unterminated block at end of file".to_owned(),
        ));
    }
    let iana_version = iana_version.ok_or_else(|| schema(1, "missing ianaVersion".to_owned()))?;

    Ok(CountryZonesFile {
        iana_version,
        countries,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[derive(Default)]
struct PartialCountry {
    iso_code: Option<String>,
    default_zone_id: Option<String>,
    default_time_zone_boost: bool,
    zones: Vec<ZoneMapping>,
}

impl PartialCountry {
    fn finish(self, file: &str, line: usize) -> Result<CountryInput, InputError> {
        let iso_code = self.iso_code.ok_or_else(|| InputError::Schema {
            file: file.to_owned(),
            line,
            message: "country block without isoCode".to_owned(),
        })?;
        Ok(CountryInput {
            iso_code,
            default_zone_id: self.default_zone_id,
            default_time_zone_boost: self.default_time_zone_boost,
            zones: self.zones,
        })
    }
}

#[derive(Default)]
struct PartialMapping {
    zone_id: Option<String>,
    utc_offset: Option<String>,
    priority: Option<i64>,
    shown_in_picker: Option<bool>,
    alias_id: Option<String>,
}

impl PartialMapping {
    fn finish(self, file: &str, line: usize) -> Result<ZoneMapping, InputError> {
        let schema = |message: &str| InputError::Schema {
            file: file.to_owned(),
            line,
            message: message.to_owned(),
        };
        Ok(ZoneMapping {
            zone_id: self.zone_id.ok_or_else(|| schema("mapping without id"))?,
            utc_offset: self
                .utc_offset
                .ok_or_else(|| schema("mapping without utcOffset"))?,
            priority: self.priority.unwrap_or(1),
            shown_in_picker: self.shown_in_picker.unwrap_or(true),
            alias_id: self.alias_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# Generated from the rules declarations.
ianaVersion:"2021a"
countries:<
  isoCode:"us"
  defaultTimeZoneId:"America/New_York"
  timeZoneMappings:<
    utcOffset:"-5:00"
    id:"America/New_York"
    priority:10
  >
  timeZoneMappings:<
    utcOffset:"-5:00"
    id:"America/Detroit"
    shownInPicker:false
  >
>
countries:<
  isoCode:"gb"
  defaultTimeZoneBoost:true
  defaultTimeZoneId:"Europe/London"
  timeZoneMappings:<
    utcOffset:"0:00"
    id:"Europe/London"
    aliasId:"Europe/Belfast"
  >
>
"#;

    #[test]
    fn parses_nested_records() {
        let file = parse_country_zones("countryzones.txt", SAMPLE).expect("parses");
        assert_eq!(file.iana_version, "2021a");
        assert_eq!(file.countries.len(), 2);

        let us = &file.countries[0];
        assert_eq!(us.iso_code, "us");
        assert_eq!(us.default_zone_id.as_deref(), Some("America/New_York"));
        assert!(!us.default_time_zone_boost);
        assert_eq!(
            us.zones,
            vec![
                ZoneMapping {
                    zone_id: "America/New_York".to_owned(),
                    utc_offset: "-5:00".to_owned(),
                    priority: 10,
                    shown_in_picker: true,
                    alias_id: None,
                },
                ZoneMapping {
                    zone_id: "America/Detroit".to_owned(),
                    utc_offset: "-5:00".to_owned(),
                    priority: 1,
                    shown_in_picker: false,
                    alias_id: None,
                },
            ]
        );

        let gb = &file.countries[1];
        assert!(gb.default_time_zone_boost);
        assert_eq!(gb.zones[0].alias_id.as_deref(), Some("Europe/Belfast"));
    }

    #[test]
    fn unknown_fields_are_schema_errors() {
        let text = "ianaVersion:\"2021a\"\ncountries:<\n  isoCode:\"us\"\n  surprise:\"x\"\n>\n";
        let err = parse_country_zones("countryzones.txt", text).expect_err("unknown field");
        assert!(matches!(err, InputError::Schema { line: 4, .. }));
    }

    #[test]
    fn missing_version_is_a_schema_error() {
        let err = parse_country_zones("countryzones.txt", "\n").expect_err("no version");
        assert!(err.to_string().contains("ianaVersion"));
    }

    #[test]
    fn unterminated_blocks_are_rejected() {
        let text = "ianaVersion:\"2021a\"\ncountries:<\n  isoCode:\"us\"\n";
        assert!(parse_country_zones("countryzones.txt", text).is_err());
    }

    #[test]
    fn mapping_requires_id_and_offset() {
        let text = "ianaVersion:\"2021a\"\ncountries:<\n  isoCode:\"us\"\n  timeZoneMappings:<\n    id:\"America/New_York\"\n  >\n>\n";
        let err = parse_country_zones("countryzones.txt", text).expect_err("no offset");
        assert!(err.to_string().contains("utcOffset"));
    }
}
