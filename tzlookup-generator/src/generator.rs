//! The generation pipeline: load every input, resolve every country, write
//! the artifact only when the whole run is clean.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use countryzones::aliases::AliasMap;
use countryzones::diagnostics::Diagnostics;
use countryzones::input::parse_country_zones;
use countryzones::resolver::Resolver;
use countryzones::rules::CompiledRules;
use countryzones::zone_tab::parse_zone_tab;

use crate::errors::Error;
use crate::lookup_xml::write_lookup_xml;

fn read(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn generate(tzdata: &Path, countryzones_path: &Path, output: &Path) -> Result<(), Error> {
    let result = run(tzdata, countryzones_path, output);
    if result.is_err() {
        // The packaging scripts treat an existing output as a good build, so
        // a failed run must not leave one behind.
        let _ = fs::remove_file(output);
    }
    result
}

fn run(tzdata: &Path, countryzones_path: &Path, output: &Path) -> Result<(), Error> {
    let declarations = parse_country_zones(
        &countryzones_path.display().to_string(),
        &read(countryzones_path)?,
    )?;
    tracing::info!(
        "loaded {} country declarations for IANA {}",
        declarations.countries.len(),
        declarations.iana_version
    );

    let zone_tab_path = tzdata.join("zone.tab");
    let zone_tab = parse_zone_tab(
        &zone_tab_path.display().to_string(),
        &read(&zone_tab_path)?,
    )?;

    let backward_path = tzdata.join("backward");
    let aliases = AliasMap::parse(
        &backward_path.display().to_string(),
        &read(&backward_path)?,
    )?;
    tracing::info!("{} backward links", aliases.len());

    let rules = CompiledRules::from_tzdata_dir(tzdata)?;
    let resolver = Resolver::new(&rules, &aliases, &declarations.iana_version)?;

    let mut diags = Diagnostics::new();
    let mut records = Vec::with_capacity(declarations.countries.len());
    let empty = Vec::new();
    for country in &declarations.countries {
        diags.push_scope(country.iso_code.clone());
        let iana_zones = zone_tab.get(&country.iso_code).unwrap_or(&empty);
        if let Some(record) = resolver.resolve(country, iana_zones, &mut diags) {
            records.push(record);
        }
        diags.pop_scope();
        if diags.halt_requested() {
            break;
        }
    }

    // Countries zone.tab knows about but the declarations do not would
    // silently ship with no time zone at all.
    let declared: HashSet<&str> = declarations
        .countries
        .iter()
        .map(|c| c.iso_code.as_str())
        .collect();
    let mut undeclared: Vec<&str> = zone_tab
        .keys()
        .map(String::as_str)
        .filter(|iso| !declared.contains(iso))
        .collect();
    undeclared.sort_unstable();
    for iso in undeclared {
        diags.error(format!("country {iso} appears in zone.tab but is not declared"));
    }

    for entry in diags.entries() {
        match entry.severity {
            countryzones::diagnostics::Severity::Warning => tracing::warn!("{entry}"),
            countryzones::diagnostics::Severity::Error => tracing::error!("{entry}"),
        }
    }
    if diags.has_error() {
        return Err(Error::Validation(diags.render()));
    }

    let mut xml = Vec::new();
    write_lookup_xml(&mut xml, &declarations.iana_version, &records).map_err(|source| {
        Error::Io {
            path: output.display().to_string(),
            source,
        }
    })?;
    fs::write(output, &xml).map_err(|source| Error::Io {
        path: output.display().to_string(),
        source,
    })?;
    tracing::info!(
        "wrote {} countries to {}",
        records.len(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use countryzones::rules::TZDATA_FILES;
    use std::fs::File;
    use std::io::Write as _;

    const ZONES: &str = "\
Zone\tTest/Alpha\t1:00\t-\tCET
Zone\tTest/Beta\t0:00\t-\tGMT
Link\tTest/Alpha\tTest/Old
";

    const ZONE_TAB: &str = "\
# test data
TA\t+0000+00000\tTest/Alpha
TB\t+0000+00000\tTest/Beta
";

    const COUNTRY_ZONES: &str = r#"
ianaVersion:"2021a"
countries:<
  isoCode:"ta"
  timeZoneMappings:<
    utcOffset:"1:00"
    id:"Test/Alpha"
  >
>
countries:<
  isoCode:"tb"
  timeZoneMappings:<
    utcOffset:"0:00"
    id:"Test/Beta"
  >
>
"#;

    fn write_fixture(dir: &Path, countryzones_text: &str) -> std::path::PathBuf {
        for filename in TZDATA_FILES {
            let content = if filename == "europe" { ZONES } else { "" };
            let mut file = File::create(dir.join(filename)).expect("fixture file");
            file.write_all(content.as_bytes()).expect("fixture file");
        }
        fs::write(dir.join("zone.tab"), ZONE_TAB).expect("fixture file");
        let countryzones_path = dir.join("countryzones.txt");
        fs::write(&countryzones_path, countryzones_text).expect("fixture file");
        countryzones_path
    }

    #[test]
    fn clean_inputs_produce_the_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let countryzones_path = write_fixture(dir.path(), COUNTRY_ZONES);
        let output = dir.path().join("tzlookup.xml");

        generate(dir.path(), &countryzones_path, &output).expect("generates");

        let xml = fs::read_to_string(&output).expect("artifact exists");
        assert_eq!(
            xml,
            "<timezones ianaversion=\"2021a\">\n \
             <countryzones>\n  \
             <country code=\"ta\" default=\"Test/Alpha\" everutc=\"n\">\n   \
             <id>Test/Alpha</id>\n  \
             </country>\n  \
             <country code=\"tb\" default=\"Test/Beta\" everutc=\"y\">\n   \
             <id>Test/Beta</id>\n  \
             </country>\n \
             </countryzones>\n\
             </timezones>\n"
        );
    }

    #[test]
    fn validation_failures_leave_no_artifact_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Declared offset disagrees with the rule data.
        let broken = COUNTRY_ZONES.replace("utcOffset:\"1:00\"", "utcOffset:\"2:00\"");
        let countryzones_path = write_fixture(dir.path(), &broken);
        let output = dir.path().join("tzlookup.xml");
        fs::write(&output, "stale").expect("seed stale artifact");

        let err = generate(dir.path(), &countryzones_path, &output).expect_err("fails");
        assert_eq!(err.exit_code(), 1);
        assert!(!output.exists(), "stale artifact must be removed");
    }

    #[test]
    fn undeclared_zone_tab_countries_fail_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let only_ta = r#"
ianaVersion:"2021a"
countries:<
  isoCode:"ta"
  timeZoneMappings:<
    utcOffset:"1:00"
    id:"Test/Alpha"
  >
>
"#;
        let countryzones_path = write_fixture(dir.path(), only_ta);
        let output = dir.path().join("tzlookup.xml");

        let err = generate(dir.path(), &countryzones_path, &output).expect_err("fails");
        assert!(err.to_string().contains("tb"), "{err}");
    }

    #[test]
    fn missing_inputs_exit_with_code_two() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("countryzones.txt");
        let output = dir.path().join("tzlookup.xml");

        let err = generate(dir.path(), &missing, &output).expect_err("fails");
        assert_eq!(err.exit_code(), 2);
    }
}
