//! Orchestration: wires the compiler, scheduler, lockfile and snapshot
//! store together into the `plan`/`apply`/`diff`/`doctor`/`capture`
//! entry points a CLI (or any other frontend) drives. Plays the role
//! of the teacher's `engine.rs` (`run_preflight`/`run_publish`): lock
//! acquisition, state loading, stage execution and report assembly
//! follow the same sequence, generalized from "publish packages" to
//! "apply steps".

pub mod apply;
pub mod capture;
pub mod compile;
pub mod diff;
pub mod doctor;
pub mod plan;

use std::path::Path;

use preflight_core::context::{CancellationToken, RunContext};
use preflight_core::dag::StepGraph;
use preflight_core::fs::FileSystem;
use preflight_core::lock::RunLock;
use preflight_core::process::CommandRunner;
use preflight_core::reporter::Reporter;
use preflight_core::runtime_options::RuntimeOptions;
use preflight_core::step::Provider;
use preflight_policy::Validator;
use preflight_secret_guard::Redactor;
use preflight_types::{Error, ErrorKind, Result};

pub use compile::{dag_digest, compile, CompiledRun};
pub use plan::{plan, PlannedRun};

/// Everything one engine call needs: where the config and state live,
/// which providers are registered, the runtime knobs from
/// `.preflight.toml`/CLI, the policy rules to enforce, and the ports
/// every compiled step runs through.
pub struct EngineContext<'a> {
    pub config_path: &'a Path,
    pub target: &'a str,
    /// Data root for the lockfile and snapshot store: `$HOME/.preflight`
    /// by default (§6).
    pub state_dir: &'a Path,
    pub providers: &'a [Box<dyn Provider>],
    pub runtime: &'a RuntimeOptions,
    pub policy: &'a Validator,
    pub reporter: &'a dyn Reporter,
    pub runner: &'a dyn CommandRunner,
    pub fs: &'a dyn FileSystem,
    pub redactor: &'a Redactor,
    pub cancel: CancellationToken,
}

impl<'a> EngineContext<'a> {
    pub fn run_context(&self) -> RunContext<'_> {
        RunContext::new(self.cancel.clone(), self.reporter, self.runner, self.fs, self.redactor)
    }

    fn compiled(&self) -> Result<CompiledRun> {
        compile::compile(self.config_path, self.target, self.providers, self.fs)
    }
}

/// Runs every registered `PolicyRule` over the compiled step list.
/// `strict` promotes any violation to a `PolicyViolation` error; a
/// non-strict run only reports them through the `Reporter`.
fn validate_policy(engine: &EngineContext<'_>, graph: &StepGraph) -> Result<()> {
    let steps: Vec<&dyn preflight_core::step::Step> = graph.order().iter().filter_map(|id| graph.get(id)).collect();
    match engine.policy.validate(&steps, engine.runtime.strict) {
        Ok(violations) => {
            for violation in &violations {
                engine.reporter.warn(&violation.message);
            }
            Ok(())
        }
        Err(violations) => {
            let summary = violations.iter().map(|v| v.message.as_str()).collect::<Vec<_>>().join("; ");
            Err(Error::new(ErrorKind::PolicyViolation).with_message(summary))
        }
    }
}

/// Acquires the run-level advisory lock in the config root, keyed to
/// this run's compiled DAG digest. Only `apply` holds it — `plan`,
/// `diff`, `doctor` and `capture` never mutate the lockfile, snapshot
/// store or target files, so they read the live system without it.
fn acquire_run_lock(engine: &EngineContext<'_>, graph: &StepGraph) -> Result<RunLock> {
    let config_root = preflight_config::discover_config_root(engine.config_path)?;
    RunLock::acquire(&config_root, engine.runtime.lock_timeout, Some(dag_digest(graph)))
}
