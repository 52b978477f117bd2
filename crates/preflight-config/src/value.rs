use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A leaf value in a config tree: scalar, sequence, or mapping — never
/// anything richer, so providers narrow at compile time instead of
/// relying on runtime reflection (DESIGN NOTES, "Dynamic config trees").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(Scalar),
    Sequence(Vec<ConfigValue>),
    Mapping(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ConfigValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// The identity key used to deduplicate sequence elements: `domain:key`
    /// for mappings carrying both fields (macOS defaults shape),
    /// otherwise the `name` field (package/tool-module shape), otherwise
    /// none — in which case two elements are only "the same" if they are
    /// structurally identical.
    pub fn identity_key(&self) -> Option<String> {
        let mapping = self.as_mapping()?;
        if let (Some(domain), Some(key)) = (mapping.get("domain"), mapping.get("key")) {
            if let (Some(domain), Some(key)) = (domain.as_str(), key.as_str()) {
                return Some(format!("{domain}:{key}"));
            }
        }
        mapping.get("name").and_then(|n| n.as_str()).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ConfigValue {
        serde_norway::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_scalars_sequences_and_mappings() {
        let v = parse("formula: ripgrep\nversion: 14\nenabled: true\n");
        let mapping = v.as_mapping().unwrap();
        assert_eq!(mapping["formula"].as_str(), Some("ripgrep"));
        assert!(matches!(mapping["enabled"], ConfigValue::Scalar(Scalar::Bool(true))));
    }

    #[test]
    fn identity_key_prefers_domain_and_key() {
        let v = parse("domain: com.apple.dock\nkey: autohide\nvalue: true\n");
        assert_eq!(v.identity_key(), Some("com.apple.dock:autohide".to_string()));
    }

    #[test]
    fn identity_key_falls_back_to_name() {
        let v = parse("name: ripgrep\nversion: 14.1.0\n");
        assert_eq!(v.identity_key(), Some("ripgrep".to_string()));
    }

    #[test]
    fn identity_key_is_none_without_name_or_domain_key() {
        let v = parse("a: 1\nb: 2\n");
        assert_eq!(v.identity_key(), None);
    }
}
