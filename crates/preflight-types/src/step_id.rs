use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// A stable, human-readable step identifier of the shape `provider:kind:name`
/// (more `:`-separated segments are allowed after the first).
///
/// Matches `^[a-z][a-z0-9_-]*(?::[A-Za-z0-9._\-/]+)+$`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if !is_valid(&raw) {
            return Err(Error::new(ErrorKind::Internal).with_message(format!(
                "invalid step id `{raw}`: must match provider:kind:name"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first segment, conventionally the provider name.
    pub fn provider(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

fn is_valid(raw: &str) -> bool {
    let mut segments = raw.split(':');
    let Some(first) = segments.next() else {
        return false;
    };
    if first.is_empty() {
        return false;
    }
    let mut chars = first.chars();
    let Some(head) = chars.next() else {
        return false;
    };
    if !head.is_ascii_lowercase() {
        return false;
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return false;
    }

    let mut rest_count = 0;
    for segment in segments {
        rest_count += 1;
        if segment.is_empty() {
            return false;
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'))
        {
            return false;
        }
    }
    rest_count >= 1
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StepId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StepId::new(value)
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

impl std::str::FromStr for StepId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::new(s)
    }
}
