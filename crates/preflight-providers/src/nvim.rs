//! `nvim:config:<name>` — syncs one managed file from the dotfiles
//! layer into the live Neovim config directory.
//!
//! Config shape: a `nvim` section holding a sequence of bare filenames
//! or `{name}` mappings, each resolved against `.config/nvim/<name>`
//! through the target-suffix path rule (§4.3.5) to pick its source,
//! and against `$XDG_CONFIG_HOME` (or `$HOME/.config`) + `$NVIM_APPNAME`
//! (default `nvim`) for its destination — the two environment
//! variables this provider is the sole consumer of (§6).
//!
//! `Check` always compares source and destination content; the source
//! material's `LazyLockStep` sometimes skips this and reports
//! satisfied unconditionally, which an idempotence-invariant engine
//! cannot do, so this provider only ever implements the stricter
//! behavior (DESIGN NOTES, resolved open question).

use std::path::PathBuf;

use preflight_core::context::{CompileContext, ExplainContext, RunContext};
use preflight_core::sanitize::validate_module_path;
use preflight_core::step::{Provider, Step};
use preflight_types::{
    CaptureFilter, CaptureItem, Diff, DiffKind, DoctorCheck, Explanation, Result, StepId, StepStatus,
};

fn nvim_config_dir() -> PathBuf {
    let appname = std::env::var("NVIM_APPNAME").unwrap_or_else(|_| "nvim".to_string());
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(std::env::var("HOME").unwrap_or_default()).join(".config"));
    base.join(appname)
}

pub struct NvimConfigFileStep {
    id: StepId,
    name: String,
    source: PathBuf,
    destination: PathBuf,
}

impl NvimConfigFileStep {
    pub fn new(ctx: &CompileContext<'_>, name: &str) -> Result<Self> {
        validate_module_path(name)?;
        let source = ctx.resolve_target_path(&format!(".config/nvim/{name}"))?;
        let destination = nvim_config_dir().join(name);
        Ok(Self {
            id: StepId::new(format!("nvim:config:{name}"))?,
            name: name.to_string(),
            source,
            destination,
        })
    }
}

impl Step for NvimConfigFileStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &[]
    }

    fn check(&self, ctx: &RunContext<'_>) -> Result<StepStatus> {
        if !ctx.fs().exists(&self.destination) {
            return Ok(StepStatus::NeedsApply);
        }
        let source_hash = ctx.fs().content_hash(&self.source)?;
        let destination_hash = ctx.fs().content_hash(&self.destination)?;
        Ok(if source_hash == destination_hash {
            StepStatus::Satisfied
        } else {
            StepStatus::NeedsApply
        })
    }

    fn plan(&self, ctx: &RunContext<'_>) -> Result<Diff> {
        let exists = ctx.fs().exists(&self.destination);
        let kind = if !exists {
            DiffKind::Add
        } else if ctx.fs().content_hash(&self.source)? == ctx.fs().content_hash(&self.destination)? {
            DiffKind::None
        } else {
            DiffKind::Modify
        };
        Ok(Diff {
            kind,
            resource: "file".to_string(),
            name: self.destination.to_string_lossy().into_owned(),
            old_value: exists.then(|| self.destination.to_string_lossy().into_owned()),
            new_value: Some(self.source.to_string_lossy().into_owned()),
        })
    }

    fn apply(&self, ctx: &RunContext<'_>) -> Result<()> {
        let contents = ctx.fs().read(&self.source)?;
        let mode = ctx.fs().file_mode(&self.source)?;
        ctx.fs().write_atomic(&self.destination, &contents, mode)
    }

    fn explain(&self, _ctx: &ExplainContext) -> Explanation {
        Explanation {
            summary: format!("Sync Neovim config file `{}`", self.name),
            detail: format!(
                "Copies `{}` over `{}` whenever their contents differ.",
                self.source.display(),
                self.destination.display()
            ),
            doc_links: vec!["https://neovim.io/doc/user/starting.html#xdg".to_string()],
            tradeoffs: vec![],
        }
    }
}

pub struct NvimProvider;

impl Provider for NvimProvider {
    fn name(&self) -> &'static str {
        "nvim"
    }

    fn compile(&self, ctx: &CompileContext<'_>) -> Result<Vec<Box<dyn Step>>> {
        let Some(section) = ctx.get_section("nvim") else {
            return Ok(Vec::new());
        };
        let entries = section
            .as_sequence()
            .ok_or_else(|| preflight_types::Error::new(preflight_types::ErrorKind::Config).with_message("`nvim` section must be a sequence"))?;
        entries
            .iter()
            .map(|entry| {
                let name = if let Some(name) = entry.as_str() {
                    name.to_string()
                } else {
                    entry
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            preflight_types::Error::new(preflight_types::ErrorKind::Config)
                                .with_message("nvim entry must be a string or `{name}` mapping")
                        })?
                        .to_string()
                };
                NvimConfigFileStep::new(ctx, &name).map(|s| Box::new(s) as Box<dyn Step>)
            })
            .collect()
    }

    fn capture(&self, ctx: &RunContext<'_>, filter: &CaptureFilter) -> Result<Vec<CaptureItem>> {
        let _ = (ctx, filter);
        Ok(Vec::new())
    }

    fn doctor_checks(&self) -> Vec<DoctorCheck> {
        vec![DoctorCheck {
            tool: "nvim".to_string(),
            min_version: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial(nvim_env)]
    fn config_dir_defaults_to_home_config_nvim() {
        unsafe {
            std::env::remove_var("NVIM_APPNAME");
            std::env::remove_var("XDG_CONFIG_HOME");
            std::env::set_var("HOME", "/home/dev");
        }
        assert_eq!(nvim_config_dir(), PathBuf::from("/home/dev/.config/nvim"));
    }

    #[test]
    #[serial(nvim_env)]
    fn config_dir_honors_appname_override() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/home/dev/.config");
            std::env::set_var("NVIM_APPNAME", "nvim-nightly");
        }
        assert_eq!(nvim_config_dir(), PathBuf::from("/home/dev/.config/nvim-nightly"));
        unsafe {
            std::env::remove_var("NVIM_APPNAME");
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }
}
