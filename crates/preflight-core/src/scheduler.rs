//! Turns a `StepGraph` into a `PlanReport` (sequential check+plan) or
//! an `ApplyReport` (bounded-parallelism apply). The wavefront/chunked
//! concurrency shape is the teacher's publish-level scheduler
//! generalized from `Arc`-cloned owned state to borrowed `RunContext`
//! ports: since a step's inputs now live behind references rather than
//! `Arc<T>`, `std::thread::scope` replaces `thread::spawn` + `Arc`
//! cloning as the structurally equivalent, borrow-checked tool for the
//! same bounded-chunk pattern `engine_parallel.rs` uses.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use preflight_types::{
    ApplyEntry, ApplyOutcome, ApplyReport, Diff, Error, ErrorKind, Explanation, PlanEntry, PlanReport, StepId,
    StepStatus,
};

use crate::context::{ExplainContext, RunContext};
use crate::dag::StepGraph;
use crate::runtime_options::RuntimeOptions;

/// Runs `check` then `plan` for every step in topological order.
/// Cancellation (§5) short-circuits the whole pass with `Err(Canceled)`,
/// checked before each step and surfaced by any step whose `Check`/
/// `Plan` itself observes cancellation. Any other `Check` error
/// degrades that step to `StepStatus::Unknown` (§4.6) and the pass
/// continues — `Plan` is not called for it, since there is nothing
/// meaningful to diff against an unknown state.
pub fn plan(graph: &StepGraph, ctx: &RunContext<'_>) -> Result<PlanReport, Error> {
    let mut entries = Vec::with_capacity(graph.len());
    for id in graph.order() {
        if ctx.is_canceled() {
            return Err(Error::new(ErrorKind::Canceled));
        }
        let step = graph.get(id).expect("graph order only contains known ids");
        match step.check(ctx) {
            Ok(status) => {
                let diff = step.plan(ctx)?;
                let explanation = step.explain(&ExplainContext);
                entries.push(PlanEntry {
                    step_id: id.clone(),
                    status,
                    diff,
                    resolution: None,
                    explanation,
                    error: None,
                });
            }
            Err(e) if e.kind() == ErrorKind::Canceled => return Err(e),
            Err(e) => {
                let explanation = step.explain(&ExplainContext);
                entries.push(PlanEntry {
                    step_id: id.clone(),
                    status: StepStatus::Unknown,
                    diff: Diff::none("unknown", id.as_str()),
                    resolution: None,
                    explanation,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    Ok(PlanReport { entries })
}

/// Groups a topological order into concurrency-safe wavefronts: each
/// wave contains every step whose dependencies have all completed in
/// an earlier wave, lexicographically ordered for determinism. Steps
/// within one wave have no dependency relationship and may run
/// concurrently.
pub(crate) fn wavefronts(graph: &StepGraph) -> Vec<Vec<StepId>> {
    let mut remaining: BTreeMap<StepId, BTreeSet<StepId>> = graph
        .order()
        .iter()
        .map(|id| {
            let deps = graph
                .get(id)
                .expect("known id")
                .depends_on()
                .iter()
                .cloned()
                .collect();
            (id.clone(), deps)
        })
        .collect();

    let mut waves = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<StepId> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        if ready.is_empty() {
            // Already validated acyclic by `StepGraph::build`; this is
            // unreachable unless called on a graph built some other way.
            break;
        }
        for id in &ready {
            remaining.remove(id);
        }
        for deps in remaining.values_mut() {
            for id in &ready {
                deps.remove(id);
            }
        }
        waves.push(ready);
    }
    waves
}

/// Applies every step the plan marked `NeedsApply`, wave by wave,
/// bounded to `options.concurrency` steps in flight at once within a
/// wave. A step that fails marks all of its transitive dependents
/// `Skipped`; `options.strict` additionally cancels the whole run on
/// the first failure. A step whose `Check` reported `StepStatus::Unknown`
/// (§4.6) is treated the same as a failed step — it never reaches
/// `Apply`, and its transitive dependents are skipped exactly as if it
/// had failed. Respects `ctx`'s cancellation token throughout; a run
/// that observes cancellation at any point is reported with
/// `ApplyReport.canceled = true` (§5, §7).
pub fn apply(graph: &StepGraph, plan_report: &PlanReport, ctx: &RunContext<'_>, options: &RuntimeOptions) -> ApplyReport {
    let needs_apply: BTreeSet<StepId> = plan_report.needs_apply().map(|e| e.step_id.clone()).collect();

    let results: Mutex<BTreeMap<StepId, ApplyEntry>> = Mutex::new(BTreeMap::new());
    let mut skipped_by_failure: BTreeSet<StepId> = BTreeSet::new();
    let mut aborted = false;
    let canceled = AtomicBool::new(ctx.is_canceled());

    for entry in &plan_report.entries {
        if entry.status != StepStatus::Unknown {
            continue;
        }
        results.lock().expect("lock poisoned").insert(
            entry.step_id.clone(),
            ApplyEntry {
                step_id: entry.step_id.clone(),
                outcome: ApplyOutcome::Failed,
                duration_ms: 0,
                error: entry.error.clone().or_else(|| Some("check returned unknown status".to_string())),
                skip_reason: None,
            },
        );
        skipped_by_failure.extend(graph.descendants_of(&entry.step_id));
        if options.strict {
            aborted = true;
        }
    }

    if options.dry_run {
        let mut map = results.lock().expect("lock poisoned");
        for id in &needs_apply {
            if map.contains_key(id) {
                continue;
            }
            let skip_reason = if skipped_by_failure.contains(id) {
                "a dependency failed".to_string()
            } else {
                "dry run".to_string()
            };
            map.insert(
                id.clone(),
                ApplyEntry {
                    step_id: id.clone(),
                    outcome: ApplyOutcome::Skipped,
                    duration_ms: 0,
                    error: None,
                    skip_reason: Some(skip_reason),
                },
            );
        }
        drop(map);
        return finish(graph, results, true, canceled.load(Ordering::SeqCst));
    }

    for wave in wavefronts(graph) {
        let runnable: Vec<&StepId> = wave
            .iter()
            .filter(|id| needs_apply.contains(*id) && !skipped_by_failure.contains(*id))
            .collect();

        for id in wave.iter().filter(|id| skipped_by_failure.contains(*id)) {
            results.lock().expect("lock poisoned").entry(id.clone()).or_insert_with(|| ApplyEntry {
                step_id: id.clone(),
                outcome: ApplyOutcome::Skipped,
                duration_ms: 0,
                error: None,
                skip_reason: Some("a dependency failed".to_string()),
            });
        }

        if aborted || ctx.is_canceled() {
            let skip_reason = if ctx.is_canceled() {
                canceled.store(true, Ordering::SeqCst);
                "run canceled"
            } else {
                "aborted after a prior failure (--strict)"
            };
            for id in runnable {
                results.lock().expect("lock poisoned").insert(
                    id.clone(),
                    ApplyEntry {
                        step_id: id.clone(),
                        outcome: ApplyOutcome::Skipped,
                        duration_ms: 0,
                        error: None,
                        skip_reason: Some(skip_reason.to_string()),
                    },
                );
            }
            continue;
        }

        let concurrency = options.concurrency.max(1).min(runnable.len().max(1));
        for chunk in runnable.chunks(concurrency) {
            std::thread::scope(|scope| {
                let mut handles = Vec::with_capacity(chunk.len());
                for id in chunk {
                    let step = graph.get(id).expect("known id");
                    let results = &results;
                    let canceled = &canceled;
                    handles.push(scope.spawn(move || {
                        if ctx.is_canceled() {
                            canceled.store(true, Ordering::SeqCst);
                            results.lock().expect("lock poisoned").insert(
                                id.clone(),
                                ApplyEntry {
                                    step_id: id.clone(),
                                    outcome: ApplyOutcome::Skipped,
                                    duration_ms: 0,
                                    error: None,
                                    skip_reason: Some("run canceled".to_string()),
                                },
                            );
                            return;
                        }
                        let started = Instant::now();
                        ctx.reporter().step_started(id);
                        let outcome = step.apply(ctx);
                        let duration_ms = started.elapsed().as_millis();
                        let entry = match outcome {
                            Ok(()) => {
                                ctx.reporter().step_finished(id, "applied");
                                ApplyEntry {
                                    step_id: id.clone(),
                                    outcome: ApplyOutcome::Applied,
                                    duration_ms,
                                    error: None,
                                    skip_reason: None,
                                }
                            }
                            Err(e) => {
                                ctx.reporter().step_finished(id, "failed");
                                if e.kind() == ErrorKind::Canceled {
                                    canceled.store(true, Ordering::SeqCst);
                                }
                                ApplyEntry {
                                    step_id: id.clone(),
                                    outcome: ApplyOutcome::Failed,
                                    duration_ms,
                                    error: Some(e.to_string()),
                                    skip_reason: None,
                                }
                            }
                        };
                        results.lock().expect("lock poisoned").insert(id.clone(), entry);
                    }));
                }
                for handle in handles {
                    handle.join().expect("step apply thread panicked");
                }
            });
        }

        for id in chunk_failures(&results, chunk_ids(&runnable)) {
            skipped_by_failure.extend(graph.descendants_of(&id));
            if options.strict {
                aborted = true;
            }
        }
    }

    finish(graph, results, false, canceled.load(Ordering::SeqCst))
}

fn chunk_ids(runnable: &[&StepId]) -> Vec<StepId> {
    runnable.iter().map(|id| (*id).clone()).collect()
}

fn chunk_failures(results: &Mutex<BTreeMap<StepId, ApplyEntry>>, ids: Vec<StepId>) -> Vec<StepId> {
    let map = results.lock().expect("lock poisoned");
    ids.into_iter()
        .filter(|id| matches!(map.get(id).map(|e| e.outcome), Some(ApplyOutcome::Failed)))
        .collect()
}

fn finish(graph: &StepGraph, results: Mutex<BTreeMap<StepId, ApplyEntry>>, dry_run: bool, canceled: bool) -> ApplyReport {
    let mut map = results.into_inner().expect("lock poisoned");
    let entries = graph
        .order()
        .iter()
        .filter_map(|id| map.remove(id))
        .collect();
    ApplyReport { entries, dry_run, canceled }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExplainContext;
    use crate::fs::NativeFileSystem;
    use crate::process::SystemCommandRunner;
    use crate::reporter::NullReporter;
    use crate::step::Step;
    use preflight_secret_guard::Redactor;
    use preflight_types::Diff;
    use std::sync::Mutex as StdMutex;

    struct RecordingStep {
        id: StepId,
        deps: Vec<StepId>,
        fails: bool,
        calls: &'static StdMutex<Vec<String>>,
    }

    impl Step for RecordingStep {
        fn id(&self) -> &StepId {
            &self.id
        }
        fn depends_on(&self) -> &[StepId] {
            &self.deps
        }
        fn check(&self, _ctx: &RunContext<'_>) -> preflight_types::Result<StepStatus> {
            Ok(StepStatus::NeedsApply)
        }
        fn plan(&self, _ctx: &RunContext<'_>) -> preflight_types::Result<Diff> {
            Ok(Diff::none("test", self.id.as_str()))
        }
        fn apply(&self, _ctx: &RunContext<'_>) -> preflight_types::Result<()> {
            self.calls.lock().unwrap().push(self.id.as_str().to_string());
            if self.fails {
                Err(Error::new(preflight_types::ErrorKind::CommandFailed).with_step_id(self.id.clone()))
            } else {
                Ok(())
            }
        }
        fn explain(&self, _ctx: &ExplainContext) -> Explanation {
            Explanation::default()
        }
    }

    fn id(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    fn make_ctx<'a>(
        cancel: crate::context::CancellationToken,
        reporter: &'a NullReporter,
        runner: &'a SystemCommandRunner,
        fs: &'a NativeFileSystem,
        redactor: &'a Redactor,
    ) -> RunContext<'a> {
        RunContext::new(cancel, reporter, runner, fs, redactor)
    }

    #[test]
    fn failed_step_skips_its_dependents() {
        static CALLS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());
        CALLS.lock().unwrap().clear();

        let graph = StepGraph::build(vec![
            Box::new(RecordingStep {
                id: id("a:k:root"),
                deps: vec![],
                fails: true,
                calls: &CALLS,
            }),
            Box::new(RecordingStep {
                id: id("a:k:child"),
                deps: vec![id("a:k:root")],
                fails: false,
                calls: &CALLS,
            }),
        ])
        .unwrap();

        let plan_report = PlanReport {
            entries: graph
                .order()
                .iter()
                .map(|i| PlanEntry {
                    step_id: i.clone(),
                    status: StepStatus::NeedsApply,
                    diff: Diff::none("test", i.as_str()),
                    resolution: None,
                    explanation: Explanation::default(),
                    error: None,
                })
                .collect(),
        };

        let reporter = NullReporter;
        let runner = SystemCommandRunner;
        let fs = NativeFileSystem;
        let redactor = Redactor::new();
        let ctx = make_ctx(crate::context::CancellationToken::new(), &reporter, &runner, &fs, &redactor);

        let options = RuntimeOptions::default();
        let report = apply(&graph, &plan_report, &ctx, &options);

        let root_entry = report
            .entries
            .iter()
            .find(|e| e.step_id.as_str() == "a:k:root")
            .unwrap();
        assert_eq!(root_entry.outcome, ApplyOutcome::Failed);

        let child_entry = report
            .entries
            .iter()
            .find(|e| e.step_id.as_str() == "a:k:child")
            .unwrap();
        assert_eq!(child_entry.outcome, ApplyOutcome::Skipped);
        assert!(!CALLS.lock().unwrap().contains(&"a:k:child".to_string()));
    }

    #[test]
    fn dry_run_skips_everything_without_calling_apply() {
        static CALLS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());
        CALLS.lock().unwrap().clear();

        let graph = StepGraph::build(vec![Box::new(RecordingStep {
            id: id("a:k:only"),
            deps: vec![],
            fails: false,
            calls: &CALLS,
        })])
        .unwrap();

        let plan_report = PlanReport {
            entries: vec![PlanEntry {
                step_id: id("a:k:only"),
                status: StepStatus::NeedsApply,
                diff: Diff::none("test", "only"),
                resolution: None,
                explanation: Explanation::default(),
                error: None,
            }],
        };

        let reporter = NullReporter;
        let runner = SystemCommandRunner;
        let fs = NativeFileSystem;
        let redactor = Redactor::new();
        let ctx = make_ctx(crate::context::CancellationToken::new(), &reporter, &runner, &fs, &redactor);

        let mut options = RuntimeOptions::default();
        options.dry_run = true;
        let report = apply(&graph, &plan_report, &ctx, &options);

        assert!(report.dry_run);
        assert_eq!(report.entries[0].outcome, ApplyOutcome::Skipped);
        assert!(CALLS.lock().unwrap().is_empty());
    }

    struct CheckFailsStep {
        id: StepId,
        deps: Vec<StepId>,
    }

    impl Step for CheckFailsStep {
        fn id(&self) -> &StepId {
            &self.id
        }
        fn depends_on(&self) -> &[StepId] {
            &self.deps
        }
        fn check(&self, _ctx: &RunContext<'_>) -> preflight_types::Result<StepStatus> {
            Err(Error::new(preflight_types::ErrorKind::CommandFailed).with_message("probe unreachable"))
        }
        fn plan(&self, _ctx: &RunContext<'_>) -> preflight_types::Result<Diff> {
            panic!("plan must not run after a failing check");
        }
        fn apply(&self, _ctx: &RunContext<'_>) -> preflight_types::Result<()> {
            panic!("apply must not run for an unknown-status step");
        }
        fn explain(&self, _ctx: &ExplainContext) -> Explanation {
            Explanation::default()
        }
    }

    #[test]
    fn plan_degrades_a_failing_check_to_unknown_and_continues() {
        static CALLS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());
        CALLS.lock().unwrap().clear();

        let graph = StepGraph::build(vec![
            Box::new(CheckFailsStep { id: id("a:k:bad"), deps: vec![] }),
            Box::new(RecordingStep {
                id: id("a:k:after"),
                deps: vec![],
                fails: false,
                calls: &CALLS,
            }),
        ])
        .unwrap();

        let reporter = NullReporter;
        let runner = SystemCommandRunner;
        let fs = NativeFileSystem;
        let redactor = Redactor::new();
        let ctx = make_ctx(crate::context::CancellationToken::new(), &reporter, &runner, &fs, &redactor);

        let report = plan(&graph, &ctx).unwrap();

        let bad = report.entries.iter().find(|e| e.step_id.as_str() == "a:k:bad").unwrap();
        assert_eq!(bad.status, StepStatus::Unknown);
        assert!(bad.error.as_ref().unwrap().contains("probe unreachable"));

        let after = report.entries.iter().find(|e| e.step_id.as_str() == "a:k:after").unwrap();
        assert_eq!(after.status, StepStatus::NeedsApply);
    }

    #[test]
    fn apply_treats_unknown_status_as_failed_and_skips_dependents() {
        static CALLS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());
        CALLS.lock().unwrap().clear();

        let graph = StepGraph::build(vec![
            Box::new(CheckFailsStep { id: id("a:k:root"), deps: vec![] }),
            Box::new(RecordingStep {
                id: id("a:k:child"),
                deps: vec![id("a:k:root")],
                fails: false,
                calls: &CALLS,
            }),
        ])
        .unwrap();

        let reporter = NullReporter;
        let runner = SystemCommandRunner;
        let fs = NativeFileSystem;
        let redactor = Redactor::new();
        let ctx = make_ctx(crate::context::CancellationToken::new(), &reporter, &runner, &fs, &redactor);

        let plan_report = plan(&graph, &ctx).unwrap();
        let options = RuntimeOptions::default();
        let report = apply(&graph, &plan_report, &ctx, &options);

        let root_entry = report.entries.iter().find(|e| e.step_id.as_str() == "a:k:root").unwrap();
        assert_eq!(root_entry.outcome, ApplyOutcome::Failed);

        let child_entry = report.entries.iter().find(|e| e.step_id.as_str() == "a:k:child").unwrap();
        assert_eq!(child_entry.outcome, ApplyOutcome::Skipped);
        assert!(!report.canceled);
        assert!(CALLS.lock().unwrap().is_empty());
    }

    #[test]
    fn plan_returns_canceled_error_when_token_is_already_canceled() {
        static CALLS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());
        CALLS.lock().unwrap().clear();

        let graph = StepGraph::build(vec![Box::new(RecordingStep {
            id: id("a:k:only"),
            deps: vec![],
            fails: false,
            calls: &CALLS,
        })])
        .unwrap();

        let reporter = NullReporter;
        let runner = SystemCommandRunner;
        let fs = NativeFileSystem;
        let redactor = Redactor::new();
        let cancel = crate::context::CancellationToken::new();
        cancel.cancel();
        let ctx = make_ctx(cancel, &reporter, &runner, &fs, &redactor);

        let err = plan(&graph, &ctx).unwrap_err();
        assert_eq!(err.kind(), preflight_types::ErrorKind::Canceled);
    }

    #[test]
    fn apply_reports_canceled_when_token_is_already_canceled() {
        static CALLS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());
        CALLS.lock().unwrap().clear();

        let graph = StepGraph::build(vec![Box::new(RecordingStep {
            id: id("a:k:only"),
            deps: vec![],
            fails: false,
            calls: &CALLS,
        })])
        .unwrap();

        let plan_report = PlanReport {
            entries: vec![PlanEntry {
                step_id: id("a:k:only"),
                status: StepStatus::NeedsApply,
                diff: Diff::none("test", "only"),
                resolution: None,
                explanation: Explanation::default(),
                error: None,
            }],
        };

        let reporter = NullReporter;
        let runner = SystemCommandRunner;
        let fs = NativeFileSystem;
        let redactor = Redactor::new();
        let cancel = crate::context::CancellationToken::new();
        cancel.cancel();
        let ctx = make_ctx(cancel, &reporter, &runner, &fs, &redactor);

        let options = RuntimeOptions::default();
        let report = apply(&graph, &plan_report, &ctx, &options);

        assert!(report.canceled);
        assert_eq!(report.entries[0].outcome, ApplyOutcome::Skipped);
        assert_eq!(report.entries[0].skip_reason.as_deref(), Some("run canceled"));
        assert!(CALLS.lock().unwrap().is_empty());
    }
}
