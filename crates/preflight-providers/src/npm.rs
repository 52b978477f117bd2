//! `npm:package:<name>` — installs/upgrades a globally-installed npm
//! package. Config shape matches `brew`: a `npm` section holding a
//! sequence of `{name, version?}` mappings or bare strings.

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

pub struct NpmPackageStep {
    id: StepId,
    name: String,
    version: Option<String>,
}

impl NpmPackageStep {
    pub fn new(name: &str, version: Option<&str>) -> Result<Self> {
        validate_package_identifier(name)?;
        if let Some(v) = version {
            validate_version(v)?;
        }
        Ok(Self {
            id: StepId::new(format!("npm:package:{name}"))?,
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }

    /// `npm list -g <name> --depth=0` prints `<prefix> <name>@<version>`
    /// on success and a non-zero exit when nothing is installed.
    fn query_installed(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        let output = ctx.runner().run(
            "npm",
            &[
                "list".to_string(),
                "-g".to_string(),
                self.name.clone(),
                "--depth=0".to_string(),
            ],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Ok(None);
        }
        let prefix = format!("{}@", self.name);
        Ok(output
            .stdout
            .lines()
            .find_map(|line| line.trim().rsplit_once(&prefix).map(|(_, version)| version.to_string())))
    }
}

impl Step for NpmPackageStep {
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
            resource: "npm_package".to_string(),
            name: self.name.clone(),
            old_value: installed,
            new_value: self.version.clone(),
        })
    }

    fn apply(&self, ctx: &RunContext<'_>) -> Result<()> {
        let spec = match &self.version {
            Some(version) => format!("{}@{version}", self.name),
            None => self.name.clone(),
        };
        let output = ctx.runner().run(
            "npm",
            &["install".to_string(), "-g".to_string(), spec.clone()],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Err(Error::new(ErrorKind::CommandFailed)
                .with_step_id(self.id.clone())
                .with_message(format!("npm install -g {spec} failed: {}", output.stderr)));
        }
        Ok(())
    }

    fn explain(&self, _ctx: &ExplainContext) -> Explanation {
        Explanation {
            summary: format!("Install global npm package `{}`", self.name),
            detail: "Runs `npm install -g` when the package is missing or at the wrong version.".to_string(),
            doc_links: vec!["https://docs.npmjs.com/cli/v10/commands/npm-install".to_string()],
            tradeoffs: vec![],
        }
    }

    fn installed_version(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        self.query_installed(ctx)
    }

    fn lock_info(&self) -> Option<LockInfo> {
        Some(LockInfo {
            provider: "npm".to_string(),
            name: self.name.clone(),
            version: self.version.clone().unwrap_or_default(),
        })
    }

    fn required_tools(&self) -> &[&str] {
        &["npm"]
    }
}

pub struct NpmProvider;

impl Provider for NpmProvider {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn compile(&self, ctx: &preflight_core::context::CompileContext<'_>) -> Result<Vec<Box<dyn Step>>> {
        let Some(section) = ctx.get_section("npm") else {
            return Ok(Vec::new());
        };
        let entries = parse_package_entries(section)?;
        entries
            .into_iter()
            .map(|(name, version)| NpmPackageStep::new(&name, version.as_deref()).map(|s| Box::new(s) as Box<dyn Step>))
            .collect()
    }

    fn capture(&self, ctx: &RunContext<'_>, filter: &CaptureFilter) -> Result<Vec<CaptureItem>> {
        if !filter.includes("npm") {
            return Ok(Vec::new());
        }
        let output = ctx.runner().run(
            "npm",
            &["list".to_string(), "-g".to_string(), "--depth=0".to_string()],
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
                let entry = line.trim().strip_prefix("├── ").or_else(|| line.trim().strip_prefix("└── "))?;
                let (name, version) = entry.rsplit_once('@')?;
                let mut attributes = serde_json::Map::new();
                attributes.insert("version".to_string(), serde_json::Value::String(version.to_string()));
                Some(CaptureItem {
                    provider: "npm".to_string(),
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
            tool: "npm".to_string(),
            min_version: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_package_names_with_shell_metacharacters() {
        assert!(NpmPackageStep::new("typescript; rm -rf /", None).is_err());
    }

    #[test]
    fn accepts_scoped_package_names() {
        assert!(NpmPackageStep::new("@angular/cli", Some("17.0.0")).is_ok());
    }

    #[test]
    fn step_id_follows_the_npm_package_convention() {
        let step = NpmPackageStep::new("typescript", Some("5.0.0")).unwrap();
        assert_eq!(step.id().as_str(), "npm:package:typescript");
    }
}
