//! Wires the scheduler around the snapshot and lockfile side effects
//! `Step::apply` itself never performs (§4.7, §4.5). `scheduler::apply`
//! has no per-step lifecycle hooks — it drives a bounded-concurrency
//! wavefront with no callback seam — so every file this run might
//! touch is snapshotted in one pre-pass before the scheduler runs, and
//! ownership/lockfile bookkeeping happens in a post-pass over whichever
//! steps the resulting `ApplyReport` actually marked `Applied`.

use preflight_config::discover_config_root;
use preflight_core::scheduler;
use preflight_lockfile::Lockfile;
use preflight_snapshot::SnapshotStore;
use preflight_types::{ApplyOutcome, ApplyReport, Result};

use crate::{acquire_run_lock, plan::PlannedRun, EngineContext};

/// Requires `runtime.confirm` to mutate anything; otherwise the
/// returned report is the plan's `NeedsApply` set marked `dry_run`,
/// per §4.8.
pub fn apply(engine: &EngineContext<'_>, planned: &PlannedRun) -> Result<ApplyReport> {
    let _lock = acquire_run_lock(engine, &planned.compiled.graph)?;

    let run_ctx = engine.run_context();
    let mut options = engine.runtime.clone();
    options.dry_run = engine.runtime.dry_run || !engine.runtime.confirm;

    if options.dry_run {
        return Ok(scheduler::apply(&planned.compiled.graph, &planned.plan_report, &run_ctx, &options));
    }

    let mut store = SnapshotStore::open(engine.state_dir)?;
    for entry in planned.plan_report.needs_apply() {
        if let Some(path) = entry.diff.touched_path() {
            store.before_modify(engine.fs, &path)?;
        }
    }

    let report = scheduler::apply(&planned.compiled.graph, &planned.plan_report, &run_ctx, &options);

    let config_root = discover_config_root(engine.config_path)?;
    let mut lockfile = Lockfile::load(&config_root)?;

    for apply_entry in &report.entries {
        if apply_entry.outcome != ApplyOutcome::Applied {
            continue;
        }
        let Some(plan_entry) = planned.plan_report.entries.iter().find(|e| e.step_id == apply_entry.step_id) else {
            continue;
        };
        let Some(step) = planned.compiled.graph.get(&apply_entry.step_id) else {
            continue;
        };

        if let Some(path) = plan_entry.diff.touched_path() {
            let hash = engine.fs.content_hash(&path).unwrap_or_default();
            store.after_apply(&path, apply_entry.step_id.provider(), &hash);
        }

        if let Some(lock_info) = step.lock_info() {
            let version = plan_entry
                .resolution
                .as_ref()
                .map(|r| r.version.clone())
                .filter(|v| !v.is_empty())
                .unwrap_or(lock_info.version);
            lockfile.record(&lock_info.provider, &lock_info.name, version);
        }
    }

    store.commit("apply run", &engine.runtime.retention)?;
    lockfile.save(&config_root)?;

    Ok(report)
}
