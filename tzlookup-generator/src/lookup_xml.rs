//! Writing the tzlookup.xml artifact.
//!
//! The document is small and its shape is fixed, so it is written directly
//! rather than through a serializer: one `<country>` element per resolved
//! country, one `<id>` element per zone, attributes only where they carry
//! information (a hidden picker entry, a superseded zone, an alias).

use std::io::{self, Write};

use countryzones::resolver::CountryRecord;

pub fn write_lookup_xml(
    out: &mut impl Write,
    iana_version: &str,
    records: &[CountryRecord],
) -> io::Result<()> {
    writeln!(out, "<timezones ianaversion=\"{}\">", escape(iana_version))?;
    writeln!(out, " <countryzones>")?;
    for record in records {
        write!(
            out,
            "  <country code=\"{}\" default=\"{}\"",
            escape(&record.iso_code),
            escape(&record.default_zone_id),
        )?;
        if record.default_time_zone_boost {
            write!(out, " boost=\"y\"")?;
        }
        writeln!(
            out,
            " everutc=\"{}\">",
            if record.ever_uses_utc { "y" } else { "n" }
        )?;

        for zone in &record.zones {
            write!(out, "   <id")?;
            if !zone.shown_in_picker {
                write!(out, " picker=\"n\"")?;
            }
            if let Some(not_after) = zone.not_used_after {
                write!(out, " notafter=\"{not_after}\"")?;
                if let Some(replacement) = &zone.replaced_by {
                    write!(out, " repl=\"{}\"", escape(replacement))?;
                }
            }
            if let Some(alias) = &zone.alias_id {
                write!(out, " alts=\"{}\"", escape(alias))?;
            }
            writeln!(out, ">{}</id>", escape(&zone.zone_id))?;
        }
        writeln!(out, "  </country>")?;
    }
    writeln!(out, " </countryzones>")?;
    writeln!(out, "</timezones>")?;
    Ok(())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use countryzones::resolver::ResolvedZone;

    fn zone(id: &str) -> ResolvedZone {
        ResolvedZone {
            zone_id: id.to_owned(),
            shown_in_picker: true,
            not_used_after: None,
            replaced_by: None,
            alias_id: None,
        }
    }

    #[test]
    fn renders_the_full_attribute_set() {
        let records = vec![
            CountryRecord {
                iso_code: "gb".to_owned(),
                default_zone_id: "Europe/London".to_owned(),
                default_time_zone_boost: false,
                ever_uses_utc: true,
                zones: vec![zone("Europe/London")],
            },
            CountryRecord {
                iso_code: "us".to_owned(),
                default_zone_id: "America/New_York".to_owned(),
                default_time_zone_boost: true,
                ever_uses_utc: false,
                zones: vec![
                    zone("America/New_York"),
                    ResolvedZone {
                        shown_in_picker: false,
                        not_used_after: Some(167_814_000_000),
                        replaced_by: Some("America/New_York".to_owned()),
                        ..zone("America/Detroit")
                    },
                    ResolvedZone {
                        alias_id: Some("America/Nuuk".to_owned()),
                        ..zone("America/Godthab")
                    },
                ],
            },
        ];

        let mut out = Vec::new();
        write_lookup_xml(&mut out, "2021a", &records).expect("writes");
        let xml = String::from_utf8(out).expect("utf-8");

        assert_eq!(
            xml,
            "<timezones ianaversion=\"2021a\">\n \
             <countryzones>\n  \
             <country code=\"gb\" default=\"Europe/London\" everutc=\"y\">\n   \
             <id>Europe/London</id>\n  \
             </country>\n  \
             <country code=\"us\" default=\"America/New_York\" boost=\"y\" everutc=\"n\">\n   \
             <id>America/New_York</id>\n   \
             <id picker=\"n\" notafter=\"167814000000\" repl=\"America/New_York\">America/Detroit</id>\n   \
             <id alts=\"America/Nuuk\">America/Godthab</id>\n  \
             </country>\n \
             </countryzones>\n\
             </timezones>\n"
        );
    }

    #[test]
    fn markup_characters_are_escaped() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
