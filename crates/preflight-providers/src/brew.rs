//! `brew:formula:<name>` — installs/upgrades a Homebrew formula.
//! Config shape: a `brew` section holding a sequence of
//! `{name, version?}` mappings, the package shape `ConfigValue::identity_key`
//! already recognizes via its `name` fallback.

use std::time::Duration;

use preflight_core::context::{ExplainContext, RunContext};
use preflight_core::sanitize::{validate_package_identifier, validate_version};
use preflight_core::step::{Provider, Step};
use preflight_types::{
    CaptureFilter, CaptureItem, Diff, DiffKind, DoctorCheck, Error, ErrorKind, Explanation, LockInfo, Result, StepId,
    StepStatus,
};

use crate::parse_package_entries;

const TIMEOUT: Duration = Duration::from_secs(120);

pub struct BrewFormulaStep {
    id: StepId,
    name: String,
    version: Option<String>,
}

impl BrewFormulaStep {
    pub fn new(name: &str, version: Option<&str>) -> Result<Self> {
        validate_package_identifier(name)?;
        if let Some(v) = version {
            validate_version(v)?;
        }
        Ok(Self {
            id: StepId::new(format!("brew:formula:{name}"))?,
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }

    fn query_installed(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        let output = ctx.runner().run(
            "brew",
            &["list".to_string(), "--versions".to_string(), self.name.clone()],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Ok(None);
        }
        Ok(output.stdout.split_whitespace().last().map(str::to_string))
    }
}

impl Step for BrewFormulaStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &[]
    }

    fn check(&self, ctx: &RunContext<'_>) -> Result<StepStatus> {
        let installed = self.query_installed(ctx)?;
        Ok(match (&installed, &self.version) {
            (Some(installed), Some(wanted)) if installed == wanted => StepStatus::Satisfied,
            (Some(_), None) => StepStatus::Satisfied,
            (Some(_), Some(_)) => StepStatus::NeedsApply,
            (None, _) => StepStatus::NeedsApply,
        })
    }

    fn plan(&self, ctx: &RunContext<'_>) -> Result<Diff> {
        let installed = self.query_installed(ctx)?;
        let kind = match (&installed, &self.version) {
            (Some(installed), Some(wanted)) if installed == wanted => DiffKind::None,
            (Some(_), None) => DiffKind::None,
            (None, _) => DiffKind::Add,
            (Some(_), Some(_)) => DiffKind::Modify,
        };
        Ok(Diff {
            kind,
            resource: "brew_formula".to_string(),
            name: self.name.clone(),
            old_value: installed,
            new_value: self.version.clone(),
        })
    }

    fn apply(&self, ctx: &RunContext<'_>) -> Result<()> {
        let mut args = vec!["install".to_string(), self.name.clone()];
        if let Some(version) = &self.version {
            args.push(format!("@{version}"));
        }
        let output = ctx.runner().run("brew", &args, None, Some(TIMEOUT), ctx.cancel_token())?;
        if !output.success() {
            return Err(Error::new(ErrorKind::CommandFailed)
                .with_step_id(self.id.clone())
                .with_message(format!("brew install {} failed: {}", self.name, output.stderr)));
        }
        Ok(())
    }

    fn explain(&self, _ctx: &ExplainContext) -> Explanation {
        Explanation {
            summary: format!("Install Homebrew formula `{}`", self.name),
            detail: "Runs `brew install` when the formula is missing or at the wrong version.".to_string(),
            doc_links: vec!["https://docs.brew.sh/Formula-Cookbook".to_string()],
            tradeoffs: vec![],
        }
    }

    fn installed_version(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        self.query_installed(ctx)
    }

    fn lock_info(&self) -> Option<LockInfo> {
        Some(LockInfo {
            provider: "brew".to_string(),
            name: self.name.clone(),
            version: self.version.clone().unwrap_or_default(),
        })
    }

    fn required_tools(&self) -> &[&str] {
        &["brew"]
    }
}

pub struct BrewProvider;

impl Provider for BrewProvider {
    fn name(&self) -> &'static str {
        "brew"
    }

    fn compile(&self, ctx: &preflight_core::context::CompileContext<'_>) -> Result<Vec<Box<dyn Step>>> {
        let Some(section) = ctx.get_section("brew") else {
            return Ok(Vec::new());
        };
        let entries = parse_package_entries(section)?;
        entries
            .into_iter()
            .map(|(name, version)| BrewFormulaStep::new(&name, version.as_deref()).map(|s| Box::new(s) as Box<dyn Step>))
            .collect()
    }

    fn capture(&self, ctx: &RunContext<'_>, filter: &CaptureFilter) -> Result<Vec<CaptureItem>> {
        if !filter.includes("brew") {
            return Ok(Vec::new());
        }
        let output = ctx.runner().run(
            "brew",
            &["list".to_string(), "--versions".to_string()],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Ok(Vec::new());
        }
        let items = output
            .stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let name = parts.next()?;
                let version = parts.last().unwrap_or_default();
                let mut attributes = serde_json::Map::new();
                attributes.insert("version".to_string(), serde_json::Value::String(version.to_string()));
                Some(CaptureItem {
                    provider: "brew".to_string(),
                    id: name.to_string(),
                    attributes,
                    hash: None,
                })
            })
            .collect();
        Ok(items)
    }

    fn doctor_checks(&self) -> Vec<DoctorCheck> {
        vec![DoctorCheck {
            tool: "brew".to_string(),
            min_version: None,
        }]
    }
}
