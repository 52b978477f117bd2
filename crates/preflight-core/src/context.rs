//! Context carriers passed to steps and providers: `CompileContext` at
//! compile time, `RunContext` during check/plan/apply, `ExplainContext`
//! to dispatch static explanation text.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use preflight_config::ConfigValue;
use preflight_secret_guard::Redactor;

use crate::fs::FileSystem;
use crate::process::CommandRunner;
use crate::reporter::Reporter;

/// Threaded from the top-level run into every subprocess wait and file
/// operation. Cloning shares the same underlying flag.
#[derive(Clone)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Context given to a provider's `compile`: the merged config for the
/// active target, the config root (for path resolution) and the ports
/// providers need to validate or stamp steps at compile time.
pub struct CompileContext<'a> {
    merged: &'a ConfigValue,
    target: &'a str,
    config_root: &'a Path,
    fs: &'a dyn FileSystem,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        merged: &'a ConfigValue,
        target: &'a str,
        config_root: &'a Path,
        fs: &'a dyn FileSystem,
    ) -> Self {
        Self {
            merged,
            target,
            config_root,
            fs,
        }
    }

    /// The provider's own subtree of the merged config, if the provider
    /// name appears as a top-level key.
    pub fn get_section(&self, provider: &str) -> Option<&ConfigValue> {
        self.merged.get(provider)
    }

    pub fn target(&self) -> &str {
        self.target
    }

    pub fn config_root(&self) -> &Path {
        self.config_root
    }

    /// Resolves a config-relative path, preferring a target-suffixed
    /// sibling of its first segment when present on disk.
    pub fn resolve_target_path(&self, relative: &str) -> preflight_types::Result<PathBuf> {
        preflight_config::resolve_target_path(self.config_root, relative, self.target, |p| {
            self.fs.exists(p)
        })
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs
    }
}

/// Context threaded through `Check`/`Plan`/`Apply`/`InstalledVersion`.
pub struct RunContext<'a> {
    cancel: CancellationToken,
    reporter: &'a dyn Reporter,
    runner: &'a dyn CommandRunner,
    fs: &'a dyn FileSystem,
    redactor: &'a Redactor,
}

impl<'a> RunContext<'a> {
    pub fn new(
        cancel: CancellationToken,
        reporter: &'a dyn Reporter,
        runner: &'a dyn CommandRunner,
        fs: &'a dyn FileSystem,
        redactor: &'a Redactor,
    ) -> Self {
        Self {
            cancel,
            reporter,
            runner,
            fs,
            redactor,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs
    }

    pub fn redactor(&self) -> &Redactor {
        self.redactor
    }
}

/// Empty marker used only to dispatch `Explain`; steps never need
/// ports to produce static text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainContext;
