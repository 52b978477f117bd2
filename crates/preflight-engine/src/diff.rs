//! `diff(config, target) -> Vec<Diff>`: the subset of a plan's diffs
//! for steps whose `Check` reported `NeedsApply` (§4.8).

use preflight_types::{Diff, Result};

use crate::EngineContext;

pub fn diff(engine: &EngineContext<'_>) -> Result<Vec<Diff>> {
    let planned = crate::plan::plan(engine)?;
    Ok(planned.plan_report.needs_apply().map(|entry| entry.diff.clone()).collect())
}
