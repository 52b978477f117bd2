use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use preflight_types::{Error, ErrorKind};

use crate::layer::Layer;
use crate::merge::{self, Lineage};
use crate::value::ConfigValue;

/// Result of loading and merging one target: the merged config tree,
/// the config root (for path resolution), the requested target name,
/// and the per-scalar merge lineage.
pub struct LoadedConfig {
    pub config_root: PathBuf,
    pub target: String,
    pub merged: ConfigValue,
    pub lineage: Lineage,
    /// Layer names actually merged, in merge order, for diagnostics.
    pub layers_applied: Vec<String>,
}

impl LoadedConfig {
    pub fn provider_section(&self, provider: &str) -> Option<&ConfigValue> {
        self.merged.get(provider)
    }
}

struct RootDocument {
    targets: BTreeMap<String, Vec<String>>,
    inline: ConfigValue,
}

fn parse_root(raw: &str) -> Result<RootDocument, Error> {
    let full: ConfigValue = serde_norway::from_str(raw).map_err(|e| {
        Error::new(ErrorKind::Schema).with_message(format!("failed to parse root config: {e}"))
    })?;

    let mut mapping = match full {
        ConfigValue::Mapping(m) => m,
        _ => {
            return Err(Error::new(ErrorKind::Schema)
                .with_message("root config must be a mapping"));
        }
    };

    let targets_value = mapping.remove("targets").ok_or_else(|| {
        Error::new(ErrorKind::Schema).with_message("root config missing required `targets` key")
    })?;

    let targets_mapping = targets_value.as_mapping().ok_or_else(|| {
        Error::new(ErrorKind::Schema).with_message("`targets` must be a mapping of name to layer list")
    })?;

    let mut targets = BTreeMap::new();
    for (name, layer_list) in targets_mapping {
        let layers = layer_list
            .as_sequence()
            .ok_or_else(|| {
                Error::new(ErrorKind::Schema)
                    .with_message(format!("target `{name}` must list layer ids"))
            })?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    Error::new(ErrorKind::Schema)
                        .with_message(format!("target `{name}` contains a non-string layer id"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        targets.insert(name.clone(), layers);
    }

    Ok(RootDocument {
        targets,
        inline: ConfigValue::Mapping(mapping),
    })
}

/// Discovers the config root as the parent directory of `main_config_path`.
pub fn discover_config_root(main_config_path: &Path) -> Result<PathBuf, Error> {
    main_config_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            Error::new(ErrorKind::Config)
                .with_path(main_config_path)
                .with_message("config path has no parent directory")
        })
}

/// Loads the root document and merges the named target's layers, per
/// §4.3's contract.
pub fn load_target(main_config_path: &Path, target: &str) -> Result<LoadedConfig, Error> {
    let config_root = discover_config_root(main_config_path)?;
    let layers_dir = config_root.join("layers");

    let raw = fs::read_to_string(main_config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::new(ErrorKind::Config)
                .with_path(main_config_path)
                .with_message("missing")
        } else {
            Error::new(ErrorKind::Config)
                .with_path(main_config_path)
                .with_cause(anyhow::Error::new(e))
        }
    })?;

    let root = parse_root(&raw)?;
    let layer_ids = root.targets.get(target).ok_or_else(|| {
        Error::new(ErrorKind::Config).with_message(format!("unknown target `{target}`"))
    })?;

    let mut ordered_layers: Vec<(String, ConfigValue)> = Vec::new();
    let has_inline_sections = root
        .inline
        .as_mapping()
        .map(|m| !m.is_empty())
        .unwrap_or(false);
    if has_inline_sections {
        ordered_layers.push(("<root>".to_string(), root.inline));
    }

    let mut layers_applied = Vec::new();
    if has_inline_sections {
        layers_applied.push("<root>".to_string());
    }

    for layer_id in layer_ids {
        let layer_path = layers_dir.join(format!("{layer_id}.yaml"));
        let layer_raw = fs::read_to_string(&layer_path).map_err(|_| {
            Error::new(ErrorKind::Schema)
                .with_path(&layer_path)
                .with_message(format!("missing layer `{layer_id}`"))
        })?;
        let layer = Layer::parse(&layer_raw).map_err(|e| {
            Error::new(ErrorKind::Schema)
                .with_path(&layer_path)
                .with_message(format!("failed to parse layer `{layer_id}`: {e}"))
        })?;
        layers_applied.push(layer.name.clone());
        ordered_layers.push((layer.name, layer.config));
    }

    let (merged, lineage) = merge::merge_layers(&ordered_layers)?;

    Ok(LoadedConfig {
        config_root,
        target: target.to_string(),
        merged,
        lineage,
        layers_applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn s1_empty_target_merges_to_empty_mapping() {
        let dir = tempdir().unwrap();
        write(dir.path(), "preflight.yaml", "targets:\n  default: []\n");

        let loaded = load_target(&dir.path().join("preflight.yaml"), "default").unwrap();
        assert_eq!(loaded.merged, ConfigValue::Mapping(Default::default()));
    }

    #[test]
    fn s2_single_no_op_layer_loads_cleanly() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "preflight.yaml",
            "targets:\n  default: [base]\n",
        );
        write(dir.path(), "layers/base.yaml", "name: base\n");

        let loaded = load_target(&dir.path().join("preflight.yaml"), "default").unwrap();
        assert_eq!(loaded.layers_applied, vec!["base".to_string()]);
    }

    #[test]
    fn missing_config_file_is_reported_as_missing() {
        let dir = tempdir().unwrap();
        let result = load_target(&dir.path().join("nope.yaml"), "default");
        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn unknown_target_is_a_config_error() {
        let dir = tempdir().unwrap();
        write(dir.path(), "preflight.yaml", "targets:\n  default: []\n");
        let result = load_target(&dir.path().join("preflight.yaml"), "ghost");
        assert!(result.is_err());
    }

    #[test]
    fn missing_layer_is_a_schema_error() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "preflight.yaml",
            "targets:\n  default: [missing-layer]\n",
        );
        let result = load_target(&dir.path().join("preflight.yaml"), "default");
        assert_eq!(
            result.unwrap_err().kind(),
            preflight_types::ErrorKind::Schema
        );
    }

    #[test]
    fn layers_merge_left_to_right_in_target_order() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "preflight.yaml",
            "targets:\n  work: [base, overlay]\n",
        );
        write(dir.path(), "layers/base.yaml", "name: base\nshell: zsh\n");
        write(dir.path(), "layers/overlay.yaml", "name: overlay\nshell: bash\n");

        let loaded = load_target(&dir.path().join("preflight.yaml"), "work").unwrap();
        assert_eq!(loaded.provider_section("shell").unwrap().as_str(), Some("bash"));
    }
}
