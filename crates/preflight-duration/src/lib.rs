//! Duration (de)serialization shared by every config-bearing type in the
//! engine: accepts either a humantime string (`"30s"`, `"2m"`) or a raw
//! millisecond count, and always serializes back out as milliseconds so
//! round-trips through JSON are exact.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationHelper {
    String(String),
    U64(u64),
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
    }
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// The same dual codec for `Option<Duration>` fields, so a config
/// section can declare a duration as genuinely absent (`None`) rather
/// than needing a sentinel value.
pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<super::DurationHelper>::deserialize(deserializer)?;
        raw.map(|helper| match helper {
            super::DurationHelper::String(s) => humantime::parse_duration(&s)
                .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
            super::DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
        })
        .transpose()
    }

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }
}

/// Convenience wrapper for fields declared as `DurationField` rather than
/// annotated with `#[serde(with = "preflight_duration")]` on a bare
/// `Duration` — useful inside generic containers (`Option<DurationField>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DurationField(pub Duration);

impl Serialize for DurationField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for DurationField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize(deserializer).map(DurationField)
    }
}

impl From<Duration> for DurationField {
    fn from(d: Duration) -> Self {
        DurationField(d)
    }
}

impl From<DurationField> for Duration {
    fn from(d: DurationField) -> Self {
        d.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "crate")]
        delay: Duration,
    }

    #[test]
    fn parses_humantime_string() {
        let w: Wrapper = serde_json::from_str(r#"{"delay":"2s"}"#).unwrap();
        assert_eq!(w.delay, Duration::from_secs(2));
    }

    #[test]
    fn parses_millisecond_integer() {
        let w: Wrapper = serde_json::from_str(r#"{"delay":1500}"#).unwrap();
        assert_eq!(w.delay, Duration::from_millis(1500));
    }

    #[test]
    fn serializes_as_milliseconds() {
        let w = Wrapper {
            delay: Duration::from_secs(1),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"delay":1000}"#);
    }

    #[test]
    fn rejects_invalid_string() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"delay":"not-a-duration"}"#);
        assert!(result.is_err());
    }

    proptest::proptest! {
        #[test]
        fn millisecond_roundtrip(ms in 0u64..10_000_000) {
            let w = Wrapper { delay: Duration::from_millis(ms) };
            let json = serde_json::to_string(&w).unwrap();
            let parsed: Wrapper = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.delay, w.delay);
        }
    }

    #[derive(Serialize, Deserialize)]
    struct OptionalWrapper {
        #[serde(with = "crate::option")]
        max_age: Option<Duration>,
    }

    #[test]
    fn option_none_roundtrips_as_null() {
        let w = OptionalWrapper { max_age: None };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"max_age":null}"#);
        let parsed: OptionalWrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_age, None);
    }

    #[test]
    fn option_some_parses_humantime_string() {
        let w: OptionalWrapper = serde_json::from_str(r#"{"max_age":"2h"}"#).unwrap();
        assert_eq!(w.max_age, Some(Duration::from_secs(7200)));
    }
}
