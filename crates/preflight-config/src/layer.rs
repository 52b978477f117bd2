use std::collections::BTreeMap;

use serde::Deserialize;

use crate::value::ConfigValue;

#[derive(Debug, Clone, Deserialize)]
pub struct LayerMetadata {
    #[serde(default)]
    pub description: Option<String>,
    /// Platform guards (`["darwin"]`, `["linux", "darwin"]`, …); an
    /// empty list means "all platforms".
    #[serde(default)]
    pub platform: Vec<String>,
}

/// A document loaded from a layer file or an inline body (§3 "Layer").
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub metadata: LayerMetadata,
    pub config: ConfigValue,
}

impl Layer {
    /// Parses a layer document: `{name, description?, platform?, <provider sections…>}`.
    /// Everything other than `name`/`description`/`platform` is the
    /// provider-section config tree.
    pub fn parse(raw: &str) -> Result<Self, serde_norway::Error> {
        let full: ConfigValue = serde_norway::from_str(raw)?;
        let mapping = match &full {
            ConfigValue::Mapping(m) => m.clone(),
            _ => BTreeMap::new(),
        };

        let name = mapping
            .get("name")
            .and_then(ConfigValue::as_str)
            .unwrap_or_default()
            .to_string();

        let metadata = LayerMetadata {
            description: mapping
                .get("description")
                .and_then(ConfigValue::as_str)
                .map(str::to_string),
            platform: mapping
                .get("platform")
                .and_then(ConfigValue::as_sequence)
                .map(|seq| {
                    seq.iter()
                        .filter_map(ConfigValue::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let mut config_map = mapping;
        config_map.remove("name");
        config_map.remove("description");
        config_map.remove("platform");

        Ok(Self {
            name,
            metadata,
            config: ConfigValue::Mapping(config_map),
        })
    }

    /// Whether this layer applies on the given platform identifier
    /// (`"darwin"`, `"linux"`, `"windows"`); unguarded layers always apply.
    pub fn applies_to(&self, platform: &str) -> bool {
        self.metadata.platform.is_empty()
            || self
                .metadata
                .platform
                .iter()
                .any(|p| p.eq_ignore_ascii_case(platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_provider_sections() {
        let layer = Layer::parse("name: base\nbrew:\n  - name: ripgrep\n").unwrap();
        assert_eq!(layer.name, "base");
        assert!(layer.config.get("brew").is_some());
    }

    #[test]
    fn parses_metadata_and_excludes_it_from_config() {
        let layer = Layer::parse(
            "name: work\ndescription: work laptop overlay\nplatform: [darwin]\nnpm: []\n",
        )
        .unwrap();
        assert_eq!(layer.metadata.description.as_deref(), Some("work laptop overlay"));
        assert_eq!(layer.metadata.platform, vec!["darwin".to_string()]);
        assert!(layer.config.get("description").is_none());
        assert!(layer.config.get("platform").is_none());
    }

    #[test]
    fn unguarded_layer_applies_everywhere() {
        let layer = Layer::parse("name: base\n").unwrap();
        assert!(layer.applies_to("darwin"));
        assert!(layer.applies_to("linux"));
    }

    #[test]
    fn guarded_layer_only_applies_to_listed_platforms() {
        let layer = Layer::parse("name: mac-only\nplatform: [darwin]\n").unwrap();
        assert!(layer.applies_to("darwin"));
        assert!(!layer.applies_to("linux"));
    }

    #[test]
    fn empty_no_op_layer_parses_cleanly() {
        let layer = Layer::parse("name: base\n").unwrap();
        assert_eq!(layer.config, ConfigValue::Mapping(BTreeMap::new()));
    }
}
