//! `macos:defaults:<domain>:<key>` — sets one macOS user default via
//! `defaults write`/`defaults read`. Config shape: a `macos` section
//! holding a sequence of `{domain, key, value, type?}` mappings, the
//! shape `ConfigValue::identity_key` recognizes natively via its
//! `domain`/`key` pair.

use std::time::Duration;

use preflight_core::context::{ExplainContext, RunContext};
use preflight_core::sanitize::{validate_module_path, validate_shell_token};
use preflight_core::step::{Provider, Step};
use preflight_types::{
    CaptureFilter, CaptureItem, Diff, DiffKind, DoctorCheck, Error, ErrorKind, Explanation, Result, StepId, StepStatus,
};

const TIMEOUT: Duration = Duration::from_secs(30);

/// `defaults write` value types; inferred from the config scalar's
/// JSON type when not given explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultsType {
    Bool,
    Int,
    Float,
    String,
}

impl DefaultsType {
    fn flag(self) -> &'static str {
        match self {
            DefaultsType::Bool => "-bool",
            DefaultsType::Int => "-int",
            DefaultsType::Float => "-float",
            DefaultsType::String => "-string",
        }
    }

    fn parse(name: &str) -> Result<Self> {
        match name {
            "bool" => Ok(DefaultsType::Bool),
            "int" => Ok(DefaultsType::Int),
            "float" => Ok(DefaultsType::Float),
            "string" => Ok(DefaultsType::String),
            other => Err(Error::new(ErrorKind::Config).with_message(format!("unknown defaults type `{other}`"))),
        }
    }
}

pub struct MacosDefaultsStep {
    id: StepId,
    domain: String,
    key: String,
    value: String,
    value_type: DefaultsType,
}

impl MacosDefaultsStep {
    pub fn new(domain: &str, key: &str, value: &str, value_type: DefaultsType) -> Result<Self> {
        validate_module_path(domain)?;
        validate_module_path(key)?;
        validate_shell_token(value)?;
        Ok(Self {
            id: StepId::new(format!("macos:defaults:{domain}:{key}"))?,
            domain: domain.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            value_type,
        })
    }

    fn query_current(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        let output = ctx.runner().run(
            "defaults",
            &["read".to_string(), self.domain.clone(), self.key.clone()],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout.trim().to_string()))
    }
}

impl Step for MacosDefaultsStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &[]
    }

    fn check(&self, ctx: &RunContext<'_>) -> Result<StepStatus> {
        let current = self.query_current(ctx)?;
        Ok(match current {
            Some(current) if current == self.value => StepStatus::Satisfied,
            _ => StepStatus::NeedsApply,
        })
    }

    fn plan(&self, ctx: &RunContext<'_>) -> Result<Diff> {
        let current = self.query_current(ctx)?;
        let kind = match &current {
            Some(current) if current == &self.value => DiffKind::None,
            Some(_) => DiffKind::Modify,
            None => DiffKind::Add,
        };
        Ok(Diff {
            kind,
            resource: "macos_default".to_string(),
            name: format!("{}:{}", self.domain, self.key),
            old_value: current,
            new_value: Some(self.value.clone()),
        })
    }

    fn apply(&self, ctx: &RunContext<'_>) -> Result<()> {
        let output = ctx.runner().run(
            "defaults",
            &[
                "write".to_string(),
                self.domain.clone(),
                self.key.clone(),
                self.value_type.flag().to_string(),
                self.value.clone(),
            ],
            None,
            Some(TIMEOUT),
            ctx.cancel_token(),
        )?;
        if !output.success() {
            return Err(Error::new(ErrorKind::CommandFailed)
                .with_step_id(self.id.clone())
                .with_message(format!(
                    "defaults write {} {} failed: {}",
                    self.domain, self.key, output.stderr
                )));
        }
        Ok(())
    }

    fn explain(&self, _ctx: &ExplainContext) -> Explanation {
        Explanation {
            summary: format!("Set macOS default `{}` `{}`", self.domain, self.key),
            detail: "Runs `defaults write` when the current value differs from the desired one.".to_string(),
            doc_links: vec!["https://ss64.com/osx/defaults.html".to_string()],
            tradeoffs: vec!["Many defaults only take effect after the owning app or `Finder`/`SystemUIServer` restarts".to_string()],
        }
    }

    fn required_tools(&self) -> &[&str] {
        &["defaults"]
    }
}

pub struct MacosProvider;

impl Provider for MacosProvider {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn compile(&self, ctx: &preflight_core::context::CompileContext<'_>) -> Result<Vec<Box<dyn Step>>> {
        let Some(section) = ctx.get_section("macos") else {
            return Ok(Vec::new());
        };
        let entries = section
            .as_sequence()
            .ok_or_else(|| Error::new(ErrorKind::Config).with_message("`macos` section must be a sequence"))?;
        entries
            .iter()
            .map(|entry| {
                let mapping = entry
                    .as_mapping()
                    .ok_or_else(|| Error::new(ErrorKind::Config).with_message("macos entry must be a mapping"))?;
                let domain = mapping
                    .get("domain")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::new(ErrorKind::Config).with_message("macos entry missing `domain`"))?;
                let key = mapping
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::new(ErrorKind::Config).with_message("macos entry missing `key`"))?;
                let value_field = mapping
                    .get("value")
                    .ok_or_else(|| Error::new(ErrorKind::Config).with_message("macos entry missing `value`"))?;
                let value_type = match mapping.get("type").and_then(|v| v.as_str()) {
                    Some(name) => DefaultsType::parse(name)?,
                    None => infer_type(value_field),
                };
                let value = value_field.as_str().map(str::to_string).unwrap_or_else(|| {
                    value_field
                        .as_scalar()
                        .map(|s| s.to_string())
                        .unwrap_or_default()
                });
                MacosDefaultsStep::new(domain, key, &value, value_type).map(|s| Box::new(s) as Box<dyn Step>)
            })
            .collect()
    }

    fn capture(&self, ctx: &RunContext<'_>, filter: &CaptureFilter) -> Result<Vec<CaptureItem>> {
        let _ = (ctx, filter);
        Ok(Vec::new())
    }

    fn doctor_checks(&self) -> Vec<DoctorCheck> {
        vec![DoctorCheck {
            tool: "defaults".to_string(),
            min_version: None,
        }]
    }
}

fn infer_type(value: &preflight_config::ConfigValue) -> DefaultsType {
    match value.as_scalar() {
        Some(preflight_config::Scalar::Bool(_)) => DefaultsType::Bool,
        Some(preflight_config::Scalar::Number(n)) if n.fract() == 0.0 => DefaultsType::Int,
        Some(preflight_config::Scalar::Number(_)) => DefaultsType::Float,
        _ => DefaultsType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_id_follows_the_domain_key_convention() {
        let step = MacosDefaultsStep::new("com.apple.dock", "autohide", "true", DefaultsType::Bool).unwrap();
        assert_eq!(step.id().as_str(), "macos:defaults:com.apple.dock:autohide");
    }

    #[test]
    fn rejects_values_with_shell_metacharacters() {
        assert!(MacosDefaultsStep::new("com.apple.dock", "autohide", "true; rm -rf /", DefaultsType::Bool).is_err());
    }

    #[test]
    fn infers_bool_type_from_scalar() {
        let value = preflight_config::ConfigValue::Scalar(preflight_config::Scalar::Bool(true));
        assert_eq!(infer_type(&value), DefaultsType::Bool);
    }

    #[test]
    fn infers_int_type_from_whole_number_scalar() {
        let value = preflight_config::ConfigValue::Scalar(preflight_config::Scalar::Number(3.0));
        assert_eq!(infer_type(&value), DefaultsType::Int);
    }
}
