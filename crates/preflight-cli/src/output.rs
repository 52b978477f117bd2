//! Report rendering for each subcommand. Plain, line-oriented stdout,
//! one printer per report type.

use preflight_snapshot::RestoreOutcome;
use preflight_types::{
    ApplyOutcome, ApplyReport, CaptureItem, Diff, DiffKind, DriftEntry, DriftKind, HealthReport, PlanReport, StepStatus,
};

fn diff_symbol(diff: &Diff) -> &'static str {
    match diff.kind {
        DiffKind::Add => "+",
        DiffKind::Remove => "-",
        DiffKind::Modify => "~",
        DiffKind::None => " ",
    }
}

pub fn print_plan(report: &PlanReport) {
    if report.is_empty() {
        println!("No changes.");
        return;
    }

    for entry in &report.entries {
        let status = match entry.status {
            StepStatus::Satisfied => "satisfied",
            StepStatus::NeedsApply => "needs apply",
            StepStatus::Unknown => "unknown",
        };
        println!("{} {}: {status}", diff_symbol(&entry.diff), entry.step_id);
        if entry.status == StepStatus::NeedsApply {
            println!("    {}", entry.explanation.summary);
            if let Some(resolution) = &entry.resolution {
                println!("    version: {} ({:?})", resolution.version, resolution.source);
                if resolution.drifted {
                    println!("    drifted: locked={:?} available={:?}", resolution.locked_version, resolution.available_version);
                }
            }
        }
        if let Some(err) = &entry.error {
            println!("    error: {err}");
        }
    }

    let needs_apply = report.needs_apply().count();
    println!();
    println!("{needs_apply} step(s) need apply out of {} total.", report.entries.len());
}

pub fn print_diff(diffs: &[Diff]) {
    if diffs.is_empty() {
        println!("No changes.");
        return;
    }
    for diff in diffs {
        println!("{} {} {}", diff_symbol(diff), diff.resource, diff.name);
        if let (Some(old), Some(new)) = (&diff.old_value, &diff.new_value) {
            println!("    - {old}");
            println!("    + {new}");
        }
    }
}

pub fn print_apply(report: &ApplyReport) {
    if report.dry_run {
        println!("dry run — no changes applied.");
    }
    for entry in &report.entries {
        let outcome = match entry.outcome {
            ApplyOutcome::Applied => "applied",
            ApplyOutcome::Skipped => "skipped",
            ApplyOutcome::Failed => "failed",
        };
        print!("{}: {outcome} ({}ms)", entry.step_id, entry.duration_ms);
        if let Some(reason) = &entry.skip_reason {
            print!(" — {reason}");
        }
        if let Some(err) = &entry.error {
            print!(" — {err}");
        }
        println!();
    }

    let failed = report.failed_step_ids().len();
    if failed > 0 {
        println!();
        println!("{failed} step(s) failed.");
    }
}

pub fn print_doctor(report: &HealthReport, verbose: bool) {
    if report.healthy() {
        println!("healthy");
    } else {
        println!("unhealthy");
    }

    if verbose || !report.errors.is_empty() {
        for error in &report.errors {
            println!("  error: {error}");
        }
    }
    if verbose || !report.missing_tools.is_empty() {
        for tool in &report.missing_tools {
            println!("  missing tool: {tool}");
        }
    }
}

pub fn print_restore(outcomes: &[RestoreOutcome], dry_run: bool) {
    let verb = if dry_run { "would restore" } else { "restored" };
    for outcome in outcomes {
        if let Some(error) = &outcome.error {
            println!("{}: error — {error}", outcome.path.display());
            continue;
        }
        if outcome.was_absent {
            println!("{}: {verb} (delete — was absent at snapshot time)", outcome.path.display());
        } else {
            println!("{}: {verb}", outcome.path.display());
        }
    }
}

pub fn print_capture(items: &[CaptureItem]) {
    let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
    println!("{json}");
}

pub fn print_drift(entries: &[DriftEntry]) {
    if entries.is_empty() {
        println!("No drift detected.");
        return;
    }
    for entry in entries {
        let kind = match entry.kind {
            DriftKind::Drifted => "drifted",
            DriftKind::Orphaned => "orphaned",
        };
        println!("{}/{}: {kind}", entry.provider, entry.id);
    }
}
