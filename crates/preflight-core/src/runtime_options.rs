//! `.preflight.toml` project configuration, merged field-by-field with
//! CLI flags into the `RuntimeOptions` every engine entry point takes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use preflight_types::{Error, ErrorKind};

fn default_concurrency() -> usize {
    4
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_keep_last() -> usize {
    50
}

fn default_output_lines() -> usize {
    50
}

/// `{keep_last, max_age}`; default keeps the last 50 snapshot sets with
/// no age-based pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    #[serde(default, with = "preflight_duration::option")]
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
            max_age: None,
        }
    }
}

/// `{concurrency, lock_timeout, retention, strict, dry_run, confirm,
/// output_lines}` — the full set of engine-wide run parameters.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub concurrency: usize,
    pub lock_timeout: Duration,
    pub retention: RetentionPolicy,
    pub strict: bool,
    pub dry_run: bool,
    pub confirm: bool,
    pub output_lines: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            lock_timeout: default_lock_timeout(),
            retention: RetentionPolicy::default(),
            strict: false,
            dry_run: false,
            confirm: false,
            output_lines: default_output_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout", with = "preflight_duration")]
    pub timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: default_lock_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    #[serde(default, with = "preflight_duration::option")]
    pub max_age: Option<Duration>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_lines")]
    pub lines: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            lines: default_output_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConcurrencyConfig {
    #[serde(default)]
    pub degree: Option<usize>,
}

/// The `.preflight.toml` document: `[policy] strict = false`,
/// `[lock] timeout = "30s"`, `[retention] keep_last = 50`,
/// `[output] lines = 50`, plus an optional concurrency override.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

impl EngineConfig {
    /// Loads `.preflight.toml` beside the config root; `Ok(None)` if it
    /// does not exist.
    pub fn load_from_root(config_root: &Path) -> Result<Option<Self>, Error> {
        let path = config_root.join(".preflight.toml");
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorKind::Config)
                .with_path(path)
                .with_cause(anyhow::Error::new(e))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::new(ErrorKind::Schema)
                .with_path(path)
                .with_message(format!("failed to parse engine config: {e}"))
        })
    }

    /// Builds `RuntimeOptions` by merging CLI overrides over this
    /// config's values; `Option` fields in `cli` mean "flag not given".
    pub fn build_runtime_options(&self, cli: CliOverrides) -> RuntimeOptions {
        RuntimeOptions {
            concurrency: cli
                .concurrency
                .or(self.concurrency.degree)
                .unwrap_or_else(default_concurrency),
            lock_timeout: cli.lock_timeout.unwrap_or(self.lock.timeout),
            retention: RetentionPolicy {
                keep_last: cli.retention_keep_last.unwrap_or(self.retention.keep_last),
                max_age: cli.retention_max_age.or(self.retention.max_age),
            },
            strict: cli.strict || self.policy.strict,
            dry_run: cli.dry_run,
            confirm: cli.confirm,
            output_lines: cli.output_lines.unwrap_or(self.output.lines),
        }
    }
}

/// CLI-flag overrides for merging with `.preflight.toml` values.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub concurrency: Option<usize>,
    pub lock_timeout: Option<Duration>,
    pub retention_keep_last: Option<usize>,
    pub retention_max_age: Option<Duration>,
    pub strict: bool,
    pub dry_run: bool,
    pub confirm: bool,
    pub output_lines: Option<usize>,
}

/// Default data root for the snapshot store and lockfile: `$HOME/.preflight`.
pub fn default_state_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".preflight"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_floor() {
        let opts = RuntimeOptions::default();
        assert_eq!(opts.concurrency, 4);
        assert_eq!(opts.retention.keep_last, 50);
        assert!(!opts.strict);
    }

    #[test]
    fn cli_overrides_win_over_config() {
        let config = EngineConfig {
            policy: PolicyConfig { strict: false },
            lock: LockConfig {
                timeout: Duration::from_secs(10),
            },
            ..Default::default()
        };
        let cli = CliOverrides {
            strict: true,
            lock_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let opts = config.build_runtime_options(cli);
        assert!(opts.strict);
        assert_eq!(opts.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn config_values_apply_when_cli_is_silent() {
        let config = EngineConfig {
            retention: RetentionConfig {
                keep_last: 10,
                max_age: None,
            },
            output: OutputConfig { lines: 200 },
            ..Default::default()
        };
        let opts = config.build_runtime_options(CliOverrides::default());
        assert_eq!(opts.retention.keep_last, 10);
        assert_eq!(opts.output_lines, 200);
    }

    #[test]
    fn parses_toml_with_humantime_durations() {
        let toml = r#"
[lock]
timeout = "30s"

[retention]
keep_last = 25

[output]
lines = 100
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.lock.timeout, Duration::from_secs(30));
        assert_eq!(config.retention.keep_last, 25);
        assert_eq!(config.output.lines, 100);
    }
}
