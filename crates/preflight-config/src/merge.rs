use std::collections::BTreeMap;

use preflight_types::{Error, ErrorKind};

use crate::value::ConfigValue;

/// Maps a dotted config path (`brew.formula.0`, `macos.defaults.autohide`)
/// to the name of the layer that supplied the value currently at that
/// path. Consulted by diff/explain, never by the merge itself.
#[derive(Debug, Clone, Default)]
pub struct Lineage(BTreeMap<String, String>);

impl Lineage {
    pub fn layer_for(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    fn record(&mut self, path: &str, layer: &str) {
        self.0.insert(path.to_string(), layer.to_string());
    }

    fn merge_into(&mut self, other: Lineage) {
        self.0.extend(other.0);
    }
}

/// Deep-merges `layers` (in order, later layers win) per §3's merging
/// semantics: scalars replaced, sequences concatenated-then-deduped by
/// identity key, mappings merged recursively.
pub fn merge_layers(layers: &[(String, ConfigValue)]) -> Result<(ConfigValue, Lineage), Error> {
    let mut acc: Option<(ConfigValue, Lineage)> = None;
    for (layer_name, value) in layers {
        acc = Some(match acc {
            None => {
                let mut lineage = Lineage::default();
                stamp_lineage(value, layer_name, "", &mut lineage);
                (value.clone(), lineage)
            }
            Some((base, mut lineage)) => {
                let mut overlay_lineage = Lineage::default();
                stamp_lineage(value, layer_name, "", &mut overlay_lineage);
                let merged = merge_one(&base, value, "")?;
                lineage.merge_into(overlay_lineage);
                (merged, lineage)
            }
        });
    }
    Ok(acc.unwrap_or((ConfigValue::Mapping(BTreeMap::new()), Lineage::default())))
}

fn stamp_lineage(value: &ConfigValue, layer: &str, path: &str, lineage: &mut Lineage) {
    lineage.record(path, layer);
    match value {
        ConfigValue::Mapping(m) => {
            for (key, child) in m {
                let child_path = join(path, key);
                stamp_lineage(child, layer, &child_path, lineage);
            }
        }
        ConfigValue::Sequence(items) => {
            for (idx, child) in items.iter().enumerate() {
                let child_path = join(path, &idx.to_string());
                stamp_lineage(child, layer, &child_path, lineage);
            }
        }
        ConfigValue::Scalar(_) => {}
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn merge_one(base: &ConfigValue, overlay: &ConfigValue, path: &str) -> Result<ConfigValue, Error> {
    match (base, overlay) {
        (ConfigValue::Mapping(base_map), ConfigValue::Mapping(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let child_path = join(path, key);
                let merged_value = match merged.get(key) {
                    Some(base_value) => merge_one(base_value, overlay_value, &child_path)?,
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Ok(ConfigValue::Mapping(merged))
        }
        (ConfigValue::Sequence(base_seq), ConfigValue::Sequence(overlay_seq)) => {
            merge_sequences(base_seq, overlay_seq, path)
        }
        // Type mismatch or both scalars: rightmost (overlay) replaces
        // outright. Not spelled out in the data model beyond "scalars
        // are replaced by the rightmost layer"; extended here to cover
        // a layer that changes a section's shape entirely.
        _ => Ok(overlay.clone()),
    }
}

fn merge_sequences(
    base: &[ConfigValue],
    overlay: &[ConfigValue],
    path: &str,
) -> Result<ConfigValue, Error> {
    let mut by_identity: Vec<(Option<String>, ConfigValue)> = Vec::new();
    for item in base.iter().chain(overlay.iter()) {
        let key = item.identity_key();
        match &key {
            Some(k) => {
                if let Some(existing) = by_identity
                    .iter_mut()
                    .find(|(existing_key, _)| existing_key.as_deref() == Some(k.as_str()))
                {
                    if existing.1 != *item {
                        return Err(Error::new(ErrorKind::Config).with_message(format!(
                            "ambiguous merge at `{path}`: duplicate identity key `{k}` with differing bodies"
                        )));
                    }
                    // identical duplicate: keep the later occurrence's
                    // position but the same body, so re-push to move it
                    // to the end without creating a second entry.
                    existing.1 = item.clone();
                } else {
                    by_identity.push((key, item.clone()));
                }
            }
            None => by_identity.push((None, item.clone())),
        }
    }
    Ok(ConfigValue::Sequence(
        by_identity.into_iter().map(|(_, v)| v).collect(),
    ))
}
