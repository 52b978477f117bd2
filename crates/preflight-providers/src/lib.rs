//! Reference providers exercising the compiler and scheduler: `brew`,
//! `npm`, `go`, `nvim`, `macos`. Intentionally minimal — a real
//! deployment is expected to add its own providers behind the same
//! `Provider` trait.

pub mod brew;
pub mod go;
pub mod macos;
pub mod npm;
pub mod nvim;

use preflight_config::ConfigValue;
use preflight_core::step::Provider;
use preflight_types::{Error, ErrorKind, Result};

/// All providers shipped with this crate, in a fixed order so capture
/// and doctor output is reproducible across runs.
pub fn reference_providers() -> Vec<Box<dyn Provider>> {
    vec![
        Box::new(brew::BrewProvider),
        Box::new(npm::NpmProvider),
        Box::new(go::GoProvider),
        Box::new(nvim::NvimProvider),
        Box::new(macos::MacosProvider),
    ]
}

/// Parses a provider's config section into `(name, version)` pairs. A
/// section is either a sequence of bare strings (name only) or a
/// sequence of mappings carrying at least `name` and optionally
/// `version`. Anything else is a `Config` error — providers do not
/// guess at malformed shapes.
pub fn parse_package_entries(section: &ConfigValue) -> Result<Vec<(String, Option<String>)>> {
    let entries = section
        .as_sequence()
        .ok_or_else(|| Error::new(ErrorKind::Config).with_message("expected a sequence of packages"))?;
    entries.iter().map(parse_one_entry).collect()
}

fn parse_one_entry(entry: &ConfigValue) -> Result<(String, Option<String>)> {
    if let Some(name) = entry.as_str() {
        return Ok((name.to_string(), None));
    }
    let mapping = entry
        .as_mapping()
        .ok_or_else(|| Error::new(ErrorKind::Config).with_message("package entry must be a string or mapping"))?;
    let name = mapping
        .get("name")
        .and_then(ConfigValue::as_str)
        .ok_or_else(|| Error::new(ErrorKind::Config).with_message("package entry missing `name`"))?
        .to_string();
    let version = mapping.get("version").and_then(ConfigValue::as_str).map(str::to_string);
    Ok((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ConfigValue {
        serde_norway::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_bare_string_entries() {
        let section = parse("- ripgrep\n- fd\n");
        let entries = parse_package_entries(&section).unwrap();
        assert_eq!(entries, vec![("ripgrep".to_string(), None), ("fd".to_string(), None)]);
    }

    #[test]
    fn parses_mapping_entries_with_version() {
        let section = parse("- name: ripgrep\n  version: 14.1.0\n- name: fd\n");
        let entries = parse_package_entries(&section).unwrap();
        assert_eq!(
            entries,
            vec![
                ("ripgrep".to_string(), Some("14.1.0".to_string())),
                ("fd".to_string(), None),
            ]
        );
    }

    #[test]
    fn rejects_non_sequence_sections() {
        let section = parse("name: ripgrep\n");
        assert!(parse_package_entries(&section).is_err());
    }

    #[test]
    fn rejects_entries_without_a_name() {
        let section = parse("- version: 1.0.0\n");
        assert!(parse_package_entries(&section).is_err());
    }
}
