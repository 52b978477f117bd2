//! Validator & policy (§4.10). Static checks — schema well-formedness,
//! cycle/duplicate/unknown-dependency detection — already happen in
//! `preflight_core::dag::StepGraph::build`; this crate is the
//! pluggable layer on top: predicates over the *compiled* step list
//! that are specific to a deployment rather than to the DAG shape
//! itself (e.g. "no step installs the deprecated tool X").

use preflight_core::step::Step;
use preflight_types::PolicyViolation;

/// One pluggable policy predicate. Implementations inspect the
/// compiled steps and report zero or more violations; they never
/// mutate anything and never run subprocesses.
pub trait PolicyRule: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, steps: &[&dyn Step]) -> Vec<PolicyViolation>;
}

/// Flags any step that requires a tool on the deny list.
pub struct DeniedToolRule {
    name: String,
    denied_tools: Vec<String>,
}

impl DeniedToolRule {
    pub fn new(name: impl Into<String>, denied_tools: Vec<String>) -> Self {
        Self {
            name: name.into(),
            denied_tools,
        }
    }
}

impl PolicyRule for DeniedToolRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, steps: &[&dyn Step]) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();
        for step in steps {
            for tool in step.required_tools() {
                if self.denied_tools.iter().any(|denied| denied == tool) {
                    violations.push(PolicyViolation {
                        policy_name: self.name.clone(),
                        step_id: Some(step.id().clone()),
                        message: format!("step requires denied tool `{tool}`"),
                    });
                }
            }
        }
        violations
    }
}

/// Flags any provider namespace not present in an explicit allow list.
/// Useful for locking a shared config down to a known provider set.
pub struct AllowedProviderRule {
    name: String,
    allowed_providers: Vec<String>,
}

impl AllowedProviderRule {
    pub fn new(name: impl Into<String>, allowed_providers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            allowed_providers,
        }
    }
}

impl PolicyRule for AllowedProviderRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, steps: &[&dyn Step]) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();
        for step in steps {
            let provider = step.id().provider();
            if !self.allowed_providers.iter().any(|allowed| allowed == provider) {
                violations.push(PolicyViolation {
                    policy_name: self.name.clone(),
                    step_id: Some(step.id().clone()),
                    message: format!("provider `{provider}` is not in the allowed provider list"),
                });
            }
        }
        violations
    }
}

/// Runs a set of `PolicyRule`s over a compiled step list, aggregating
/// every violation. In `strict` mode, any violation fails validation;
/// otherwise violations are reported but do not block a run.
pub struct Validator {
    rules: Vec<Box<dyn PolicyRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: Box<dyn PolicyRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn evaluate(&self, steps: &[&dyn Step]) -> Vec<PolicyViolation> {
        self.rules.iter().flat_map(|rule| rule.evaluate(steps)).collect()
    }

    /// `Ok(violations)` always carries whatever non-fatal violations
    /// were found. `Err` is only returned in `strict` mode when at
    /// least one violation is present.
    pub fn validate(&self, steps: &[&dyn Step], strict: bool) -> Result<Vec<PolicyViolation>, Vec<PolicyViolation>> {
        let violations = self.evaluate(steps);
        if strict && !violations.is_empty() {
            Err(violations)
        } else {
            Ok(violations)
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preflight_core::context::{ExplainContext, RunContext};
    use preflight_types::{Diff, Explanation, Result, StepId, StepStatus};

    struct FakeStep {
        id: StepId,
        required_tools: Vec<&'static str>,
    }

    impl Step for FakeStep {
        fn id(&self) -> &StepId {
            &self.id
        }

        fn depends_on(&self) -> &[StepId] {
            &[]
        }

        fn check(&self, _ctx: &RunContext<'_>) -> Result<StepStatus> {
            Ok(StepStatus::Satisfied)
        }

        fn plan(&self, _ctx: &RunContext<'_>) -> Result<Diff> {
            unimplemented!()
        }

        fn apply(&self, _ctx: &RunContext<'_>) -> Result<()> {
            Ok(())
        }

        fn explain(&self, _ctx: &ExplainContext) -> Explanation {
            Explanation {
                summary: String::new(),
                detail: String::new(),
                doc_links: vec![],
                tradeoffs: vec![],
            }
        }

        fn required_tools(&self) -> &[&str] {
            &self.required_tools
        }
    }

    fn fake_step(id: &str, required_tools: Vec<&'static str>) -> Box<dyn Step> {
        Box::new(FakeStep {
            id: StepId::new(id).unwrap(),
            required_tools,
        })
    }

    fn as_refs(boxed: &[Box<dyn Step>]) -> Vec<&dyn Step> {
        boxed.iter().map(|b| b.as_ref()).collect()
    }

    #[test]
    fn denied_tool_rule_flags_matching_step() {
        let boxed = vec![fake_step("brew:formula:ripgrep", vec!["brew"]), fake_step("npm:package:left-pad", vec!["npm"])];
        let steps = as_refs(&boxed);
        let rule = DeniedToolRule::new("no-left-pad-deps", vec!["npm".to_string()]);
        let violations = rule.evaluate(&steps);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].step_id.as_ref().unwrap().as_str(), "npm:package:left-pad");
    }

    #[test]
    fn allowed_provider_rule_flags_unlisted_provider() {
        let boxed = vec![fake_step("brew:formula:ripgrep", vec![])];
        let steps = as_refs(&boxed);
        let rule = AllowedProviderRule::new("only-npm", vec!["npm".to_string()]);
        let violations = rule.evaluate(&steps);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn validator_aggregates_violations_from_all_rules() {
        let boxed = vec![fake_step("brew:formula:ripgrep", vec!["brew"])];
        let steps = as_refs(&boxed);
        let validator = Validator::new()
            .with_rule(Box::new(DeniedToolRule::new("no-brew", vec!["brew".to_string()])))
            .with_rule(Box::new(AllowedProviderRule::new("only-npm", vec!["npm".to_string()])));
        let violations = validator.evaluate(&steps);
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn strict_mode_fails_validation_on_any_violation() {
        let boxed = vec![fake_step("brew:formula:ripgrep", vec!["brew"])];
        let steps = as_refs(&boxed);
        let validator = Validator::new().with_rule(Box::new(DeniedToolRule::new("no-brew", vec!["brew".to_string()])));
        assert!(validator.validate(&steps, true).is_err());
        assert!(validator.validate(&steps, false).is_ok());
    }

    #[test]
    fn no_violations_when_nothing_matches() {
        let boxed = vec![fake_step("npm:package:typescript", vec!["npm"])];
        let steps = as_refs(&boxed);
        let validator = Validator::new().with_rule(Box::new(DeniedToolRule::new("no-brew", vec!["brew".to_string()])));
        assert!(validator.evaluate(&steps).is_empty());
    }
}
