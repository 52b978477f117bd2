//! Version resolver and lockfile (§4.5). Given a provider, a name, and
//! a requested version, produces a deterministic `Resolution`; the
//! lockfile that backs it is a stable-ordered `(provider, name) →
//! {version, resolved_at}` mapping persisted as JSON.
//!
//! "Stable key ordering" is a `BTreeMap` serialized through
//! `serde_json`, the same idiom the teacher's `state.rs` uses for its
//! execution-state index — this crate reuses it verbatim rather than
//! inventing a second persistence path, generalized from a single
//! `ExecutionState` document to a `(provider, name)`-keyed map.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use preflight_types::{Error, ErrorKind, Resolution, ResolutionSource};

pub const LOCKFILE_NAME: &str = "preflight.lock.json";

/// One pinned `(provider, name)` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEntry {
    pub version: String,
    pub resolved_at: DateTime<Utc>,
}

/// The on-disk lockfile: a stable-ordered map keyed by `"provider/name"`
/// so JSON object key order matches `BTreeMap` iteration order, which
/// is what makes two runs over the same state produce byte-identical
/// files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lockfile {
    entries: BTreeMap<String, LockEntry>,
}

fn lock_key(provider: &str, name: &str) -> String {
    format!("{provider}/{name}")
}

impl Lockfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(config_root: &Path) -> PathBuf {
        config_root.join(LOCKFILE_NAME)
    }

    /// Loads the lockfile beside the config root; an absent file is an
    /// empty lockfile, not an error — the very first run has none.
    pub fn load(config_root: &Path) -> Result<Self, Error> {
        let path = Self::path(config_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::new(ErrorKind::Schema).with_path(&path).with_cause(anyhow::Error::new(e)))
    }

    /// Writes the lockfile atomically (write-to-temp + rename), per
    /// §4.5.
    pub fn save(&self, config_root: &Path) -> Result<(), Error> {
        let path = Self::path(config_root);
        let tmp = path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::new(ErrorKind::Internal).with_cause(anyhow::Error::new(e)))?;
        {
            let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            file.write_all(&data).map_err(|e| io_error(&tmp, e))?;
            file.sync_all().map_err(|e| io_error(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))
    }

    pub fn get(&self, provider: &str, name: &str) -> Option<&LockEntry> {
        self.entries.get(&lock_key(provider, name))
    }

    /// Pins `(provider, name)` to `version`, stamping `resolved_at` as
    /// now. Called after a successful apply of a lockable step.
    pub fn record(&mut self, provider: &str, name: &str, version: impl Into<String>) {
        self.entries.insert(
            lock_key(provider, name),
            LockEntry {
                version: version.into(),
                resolved_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::new(ErrorKind::Internal).with_path(path).with_cause(anyhow::Error::new(e))
}

/// Inputs to `resolve`: everything the algorithm in §4.5 needs to know
/// about one `(provider, name)` pair for this run.
pub struct ResolveInput<'a> {
    pub provider: &'a str,
    pub name: &'a str,
    /// What the config asked for; empty or absent means "whatever is
    /// resolvable".
    pub requested_version: Option<&'a str>,
    pub locked: Option<&'a LockEntry>,
    /// From the step's optional `InstalledVersion`.
    pub installed_version: Option<&'a str>,
    /// A caller-supplied "latest known" value (e.g. from a registry
    /// query); used only when nothing else yields a version.
    pub latest_version: Option<&'a str>,
}

/// Implements §4.5's five-step algorithm. Deterministic given the same
/// inputs — no network calls happen inside this function; callers
/// gather `installed_version`/`latest_version` beforehand.
pub fn resolve(input: ResolveInput<'_>) -> Resolution {
    let provider = input.provider.to_string();
    let name = input.name.to_string();

    if let Some(locked) = input.locked {
        let available_version = input.installed_version.map(str::to_string);
        let drifted = available_version
            .as_deref()
            .map(|available| !available.is_empty() && available != locked.version)
            .unwrap_or(false);
        return Resolution {
            provider,
            name,
            version: locked.version.clone(),
            source: ResolutionSource::Lockfile,
            locked: true,
            locked_version: Some(locked.version.clone()),
            available_version,
            drifted,
            updated: false,
            failed: false,
            error: None,
        };
    }

    if let Some(installed) = input.installed_version.filter(|v| !v.is_empty()) {
        let version = input
            .requested_version
            .filter(|v| !v.is_empty())
            .unwrap_or(installed)
            .to_string();
        return Resolution {
            provider,
            name,
            version,
            source: ResolutionSource::Latest,
            locked: false,
            locked_version: None,
            available_version: Some(installed.to_string()),
            drifted: false,
            updated: false,
            failed: false,
            error: None,
        };
    }

    if let Some(latest) = input.latest_version.filter(|v| !v.is_empty()) {
        return Resolution {
            provider,
            name,
            version: latest.to_string(),
            source: ResolutionSource::Latest,
            locked: false,
            locked_version: None,
            available_version: Some(latest.to_string()),
            drifted: false,
            updated: false,
            failed: false,
            error: None,
        };
    }

    Resolution {
        provider,
        name,
        version: String::new(),
        source: ResolutionSource::None,
        locked: false,
        locked_version: None,
        available_version: None,
        drifted: false,
        updated: false,
        failed: false,
        error: None,
    }
}
