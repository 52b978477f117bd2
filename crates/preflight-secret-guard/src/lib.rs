//! Secret reference grammar and redaction.
//!
//! A secret reference is the opaque string `secret://provider/key`.
//! Resolution of the underlying value is deferred to the step that
//! actually needs it; this crate is the enforcement point that keeps
//! both the unresolved reference and any resolved value it stands for
//! out of logs, reports and error messages.

const SCHEME: &str = "secret://";
const PLACEHOLDER: &str = "[redacted secret]";

/// A parsed `secret://provider/key` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub provider: String,
    pub key: String,
}

impl SecretRef {
    /// Parses `raw` as a secret reference. Returns `None` for anything
    /// that is not exactly `secret://<provider>/<key>` with both parts
    /// non-empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(SCHEME)?;
        let (provider, key) = rest.split_once('/')?;
        if provider.is_empty() || key.is_empty() || key.contains('/') {
            return None;
        }
        Some(Self {
            provider: provider.to_string(),
            key: key.to_string(),
        })
    }

    pub fn is_reference(raw: &str) -> bool {
        raw.starts_with(SCHEME)
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.provider, self.key)
    }
}

/// Scrubs any `secret://...` reference and any previously-registered
/// resolved secret value out of a string before it reaches a [`Reporter`],
/// an event record, or an error message.
///
/// [`Reporter`]: ../preflight_core/reporter/trait.Reporter.html
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    resolved_values: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resolved secret value so it is scrubbed from any
    /// text that passes through [`Redactor::redact`] afterwards.
    /// Only meaningful values are registered; callers should skip
    /// empty strings to avoid pathological whole-string redaction.
    pub fn register_secret_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.resolved_values.push(value);
        }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = redact_references(text);
        for secret in &self.resolved_values {
            out = out.replace(secret.as_str(), PLACEHOLDER);
        }
        out
    }
}

/// Replaces every `secret://provider/key`-shaped substring with the
/// redaction placeholder, independent of any registered resolved value.
fn redact_references(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(SCHEME) {
        out.push_str(&rest[..start]);
        let after_scheme = &rest[start + SCHEME.len()..];
        let token_len = after_scheme
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ',' | ']'))
            .unwrap_or(after_scheme.len());
        let candidate = format!("{SCHEME}{}", &after_scheme[..token_len]);
        if SecretRef::parse(&candidate).is_some() {
            out.push_str(PLACEHOLDER);
        } else {
            out.push_str(&candidate);
        }
        rest = &after_scheme[token_len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_reference() {
        let parsed = SecretRef::parse("secret://onepassword/github-token").unwrap();
        assert_eq!(parsed.provider, "onepassword");
        assert_eq!(parsed.key, "github-token");
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(SecretRef::parse("secret://onepassword").is_none());
        assert!(SecretRef::parse("secret:///key").is_none());
        assert!(SecretRef::parse("secret://provider/").is_none());
        assert!(SecretRef::parse("not-a-secret").is_none());
    }

    #[test]
    fn redacts_reference_embedded_in_a_log_line() {
        let redactor = Redactor::new();
        let line = "using secret://onepassword/github-token for auth";
        assert_eq!(
            redactor.redact(line),
            "using [redacted secret] for auth"
        );
    }

    #[test]
    fn redacts_registered_resolved_value() {
        let mut redactor = Redactor::new();
        redactor.register_secret_value("ghp_abc123");
        let line = "authenticated with ghp_abc123 successfully";
        assert_eq!(
            redactor.redact(line),
            "authenticated with [redacted secret] successfully"
        );
    }

    #[test]
    fn leaves_unrelated_text_untouched() {
        let redactor = Redactor::new();
        assert_eq!(redactor.redact("plain log line"), "plain log line");
    }

    #[test]
    fn empty_values_are_never_registered_as_wildcards() {
        let mut redactor = Redactor::new();
        redactor.register_secret_value("");
        assert_eq!(redactor.redact("some text"), "some text");
    }

    proptest::proptest! {
        #[test]
        fn well_formed_references_always_redact(
            provider in "[a-z][a-z0-9-]{0,10}",
            key in "[a-z][a-z0-9-]{0,10}",
        ) {
            let redactor = Redactor::new();
            let raw = format!("secret://{provider}/{key}");
            let redacted = redactor.redact(&raw);
            assert!(!redacted.contains("secret://"));
        }
    }
}
