//! `plan(config, target) -> PlanReport`: compiles the target, validates
//! it, runs `Check`+`Plan` over every step, then enriches each lockable
//! step's entry with a version [`Resolution`](preflight_types::Resolution)
//! (§4.5) — `scheduler::plan` itself never touches the lockfile, so
//! that enrichment happens here, one layer up.

use preflight_config::discover_config_root;
use preflight_lockfile::{resolve, Lockfile, ResolveInput};
use preflight_core::scheduler;
use preflight_types::Result;

use crate::{compile::CompiledRun, validate_policy, EngineContext};

/// A compiled run plus its plan report, kept together so `apply`/`diff`
/// can be driven from the same compilation without recompiling.
pub struct PlannedRun {
    pub compiled: CompiledRun,
    pub plan_report: preflight_types::PlanReport,
}

pub fn plan(engine: &EngineContext<'_>) -> Result<PlannedRun> {
    let compiled = engine.compiled()?;
    validate_policy(engine, &compiled.graph)?;

    let run_ctx = engine.run_context();
    let mut plan_report = scheduler::plan(&compiled.graph, &run_ctx)?;

    let config_root = discover_config_root(engine.config_path)?;
    let lockfile = Lockfile::load(&config_root)?;

    for entry in &mut plan_report.entries {
        let Some(step) = compiled.graph.get(&entry.step_id) else {
            continue;
        };
        let Some(lock_info) = step.lock_info() else {
            continue;
        };
        let installed = step.installed_version(&run_ctx)?;
        let locked = lockfile.get(&lock_info.provider, &lock_info.name);
        let requested = (!lock_info.version.is_empty()).then_some(lock_info.version.as_str());
        entry.resolution = Some(resolve(ResolveInput {
            provider: &lock_info.provider,
            name: &lock_info.name,
            requested_version: requested,
            locked,
            installed_version: installed.as_deref(),
            latest_version: None,
        }));
    }

    Ok(PlannedRun { compiled, plan_report })
}
