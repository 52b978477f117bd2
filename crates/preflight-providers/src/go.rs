//! `go:install:<name>` — installs a Go binary with `go install
//! <module>@<ref>`. Config shape: a `go` section holding a sequence of
//! `{module, ref?}` mappings (`ref` is a git tag, branch, or `latest`;
//! defaults to `latest`).
//!
//! Installed-version detection reads the build info embedded in the
//! binary by the Go toolchain (`go version -m <path>`) rather than
//! querying a registry, so it works fully offline once a binary is in
//! place.

use std::path::PathBuf;
use std::time::Duration;

use preflight_core::context::{ExplainContext, RunContext};
use preflight_core::sanitize::{validate_git_ref, validate_module_path};
use preflight_core::step::{Provider, Step};
use preflight_types::{
    CaptureFilter, CaptureItem, Diff, DiffKind, DoctorCheck, Error, ErrorKind, Explanation, LockInfo, Result, StepId,
    StepStatus,
};

const TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_REF: &str = "latest";

fn bin_name(module: &str) -> &str {
    module.rsplit('/').next().unwrap_or(module)
}

fn gobin_path(module: &str) -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_default();
    PathBuf::from(home).join("go").join("bin").join(bin_name(module))
}

pub struct GoInstallStep {
    id: StepId,
    module: String,
    version_ref: String,
}

impl GoInstallStep {
    pub fn new(module: &str, version_ref: Option<&str>) -> Result<Self> {
        validate_module_path(module)?;
        let version_ref = version_ref.unwrap_or(DEFAULT_REF);
        validate_git_ref(version_ref)?;
        Ok(Self {
            id: StepId::new(format!("go:install:{}", bin_name(module)))?,
            module: module.to_string(),
            version_ref: version_ref.to_string(),
        })
    }

    fn binary_path(&self) -> PathBuf {
        gobin_path(&self.module)
    }

    /// Parses the `mod` line of `go version -m <binary>`:
    /// `\tmod\t<module>\t<version>\t<hash>`.
    fn query_installed(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        let path = self.binary_path();
        if !ctx.fs().exists(&path) {
            return Ok(None);
        }
        let output = ctx.runner().run(
            "go",
            &["version".to_string(), "-m".to_string(), path.to_string_lossy().into_owned()],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Ok(None);
        }
        Ok(output.stdout.lines().find_map(|line| {
            let mut fields = line.trim().split('\t');
            if fields.next() != Some("mod") {
                return None;
            }
            if fields.next()? != self.module {
                return None;
            }
            fields.next().map(str::to_string)
        }))
    }
}

impl Step for GoInstallStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &[]
    }

    fn check(&self, ctx: &RunContext<'_>) -> Result<StepStatus> {
        let installed = self.query_installed(ctx)?;
        Ok(match &installed {
            Some(_) if self.version_ref == DEFAULT_REF => StepStatus::Satisfied,
            Some(installed) if installed == &self.version_ref => StepStatus::Satisfied,
            Some(_) => StepStatus::NeedsApply,
            None => StepStatus::NeedsApply,
        })
    }

    fn plan(&self, ctx: &RunContext<'_>) -> Result<Diff> {
        let installed = self.query_installed(ctx)?;
        let kind = match &installed {
            Some(_) if self.version_ref == DEFAULT_REF => DiffKind::None,
            Some(installed) if installed == &self.version_ref => DiffKind::None,
            Some(_) => DiffKind::Modify,
            None => DiffKind::Add,
        };
        Ok(Diff {
            kind,
            resource: "go_binary".to_string(),
            name: self.module.clone(),
            old_value: installed,
            new_value: Some(self.version_ref.clone()),
        })
    }

    fn apply(&self, ctx: &RunContext<'_>) -> Result<()> {
        let spec = format!("{}@{}", self.module, self.version_ref);
        let output = ctx.runner().run(
            "go",
            &["install".to_string(), spec.clone()],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Err(Error::new(ErrorKind::CommandFailed)
                .with_step_id(self.id.clone())
                .with_message(format!("go install {spec} failed: {}", output.stderr)));
        }
        Ok(())
    }

    fn explain(&self, _ctx: &ExplainContext) -> Explanation {
        Explanation {
            summary: format!("Install Go binary `{}`", bin_name(&self.module)),
            detail: "Runs `go install <module>@<ref>`; version is read back from the binary's embedded build info."
                .to_string(),
            doc_links: vec!["https://go.dev/ref/mod#go-install".to_string()],
            tradeoffs: vec!["`ref = latest` is never reported as drifted once any version is installed".to_string()],
        }
    }

    fn installed_version(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        self.query_installed(ctx)
    }

    fn lock_info(&self) -> Option<LockInfo> {
        Some(LockInfo {
            provider: "go".to_string(),
            name: self.module.clone(),
            version: self.version_ref.clone(),
        })
    }

    fn required_tools(&self) -> &[&str] {
        &["go"]
    }
}

pub struct GoProvider;

impl Provider for GoProvider {
    fn name(&self) -> &'static str {
        "go"
    }

    fn compile(&self, ctx: &preflight_core::context::CompileContext<'_>) -> Result<Vec<Box<dyn Step>>> {
        let Some(section) = ctx.get_section("go") else {
            return Ok(Vec::new());
        };
        let entries = section
            .as_sequence()
            .ok_or_else(|| Error::new(ErrorKind::Config).with_message("`go` section must be a sequence"))?;
        entries
            .iter()
            .map(|entry| {
                let mapping = entry
                    .as_mapping()
                    .ok_or_else(|| Error::new(ErrorKind::Config).with_message("go entry must be a mapping"))?;
                let module = mapping
                    .get("module")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::new(ErrorKind::Config).with_message("go entry missing `module`"))?;
                let version_ref = mapping.get("ref").and_then(|v| v.as_str());
                GoInstallStep::new(module, version_ref).map(|s| Box::new(s) as Box<dyn Step>)
            })
            .collect()
    }

    fn capture(&self, ctx: &RunContext<'_>, filter: &CaptureFilter) -> Result<Vec<CaptureItem>> {
        let _ = (ctx, filter);
        Ok(Vec::new())
    }

    fn doctor_checks(&self) -> Vec<DoctorCheck> {
        vec![DoctorCheck {
            tool: "go".to_string(),
            min_version: None,
        }]
    }
}
