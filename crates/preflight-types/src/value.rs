use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::step_id::StepId;

/// `Satisfied`: nothing to do. `NeedsApply`: `Plan`/`Apply` should run.
/// `Unknown`: `Check` failed or could not determine state; apply treats
/// this as a failure for the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Satisfied,
    NeedsApply,
    Unknown,
}

/// `{type, resource, name, old_value, new_value}` produced by `Plan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub resource: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl Diff {
    pub fn none(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::None,
            resource: resource.into(),
            name: name.into(),
            old_value: None,
            new_value: None,
        }
    }

    /// The path a step declares it will touch, per §9's "Plan is
    /// canonical for lifecycle path declarations" resolution. Only
    /// meaningful when `resource == "file"`.
    pub fn touched_path(&self) -> Option<PathBuf> {
        (self.resource == "file").then(|| PathBuf::from(&self.name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Add,
    Remove,
    Modify,
    None,
}

/// Static human-readable text for a step, dispatched via `Explain`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub doc_links: Vec<String>,
    #[serde(default)]
    pub tradeoffs: Vec<String>,
}

/// Lockfile integration metadata a step may declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub provider: String,
    pub name: String,
    pub version: String,
}

/// Where a resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    None,
    Lockfile,
    Latest,
}

/// Output of the version resolver, attached to a step's planned diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub provider: String,
    pub name: String,
    pub version: String,
    pub source: ResolutionSource,
    pub locked: bool,
    pub locked_version: Option<String>,
    pub available_version: Option<String>,
    pub drifted: bool,
    pub updated: bool,
    pub failed: bool,
    pub error: Option<String>,
}

/// A pre-modification copy of one file, content-addressed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub path: PathBuf,
    pub hash: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub blob_filename: String,
    #[serde(default)]
    pub was_absent: bool,
}

/// The group of snapshots taken during one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSet {
    pub id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub snapshot_ids: Vec<String>,
    /// Monotonically increasing within one store; used as the strict
    /// tie-break for sets sharing a `created_at` timestamp (DESIGN
    /// NOTES: "strict newest-first, insertion-order tie-break").
    pub insertion_index: u64,
}

/// A violated policy predicate, reported as a warning unless `strict`
/// promotes it to fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub policy_name: String,
    pub step_id: Option<StepId>,
    pub message: String,
}

/// Entry in the plan report for one compiled step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub step_id: StepId,
    pub status: StepStatus,
    pub diff: Diff,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub explanation: Explanation,
    /// Set when `status == Unknown`: the message from the `Check` error
    /// that degraded this step, per §4.6 ("`Check` errors degrade the
    /// step to `Unknown`").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub entries: Vec<PlanEntry>,
}

impl PlanReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn needs_apply(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.status == StepStatus::NeedsApply)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyEntry {
    pub step_id: StepId,
    pub outcome: ApplyOutcome,
    pub duration_ms: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub entries: Vec<ApplyEntry>,
    pub dry_run: bool,
    /// Set when the run observed cancellation (§5, §7: "`Canceled`
    /// short-circuits remaining work and is surfaced verbatim"). A
    /// canceled run still reports whatever per-step outcomes it
    /// gathered before the cancellation, but the process surface must
    /// exit 130 rather than 0 or 1 for it (§6).
    #[serde(default)]
    pub canceled: bool,
}

impl ApplyReport {
    pub fn failed_step_ids(&self) -> BTreeSet<StepId> {
        self.entries
            .iter()
            .filter(|e| e.outcome == ApplyOutcome::Failed)
            .map(|e| e.step_id.clone())
            .collect()
    }
}

/// An item read live from the system by a provider's `capture`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureItem {
    pub provider: String,
    pub id: String,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    Drifted,
    Orphaned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEntry {
    pub provider: String,
    pub id: String,
    pub kind: DriftKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub errors: Vec<String>,
    pub missing_tools: Vec<String>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.errors.is_empty() && self.missing_tools.is_empty()
    }
}

/// A required-binary (plus optional minimum version) a provider
/// declares for `doctor`'s full-mode tool check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorCheck {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

/// Narrows which providers `capture` should run against; an empty
/// `providers` list means "all registered providers".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureFilter {
    pub providers: Vec<String>,
}

impl CaptureFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn includes(&self, provider: &str) -> bool {
        self.providers.is_empty() || self.providers.iter().any(|p| p == provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_touched_path_only_for_file_resource() {
        let file_diff = Diff {
            kind: DiffKind::Modify,
            resource: "file".to_string(),
            name: "/home/u/.zshrc".to_string(),
            old_value: None,
            new_value: None,
        };
        assert_eq!(file_diff.touched_path(), Some(PathBuf::from("/home/u/.zshrc")));

        let pkg_diff = Diff {
            kind: DiffKind::Add,
            resource: "formula".to_string(),
            name: "ripgrep".to_string(),
            old_value: None,
            new_value: None,
        };
        assert_eq!(pkg_diff.touched_path(), None);
    }

    #[test]
    fn plan_report_needs_apply_filters_by_status() {
        let step_id = StepId::new("brew:formula:ripgrep").unwrap();
        let report = PlanReport {
            entries: vec![
                PlanEntry {
                    step_id: step_id.clone(),
                    status: StepStatus::Satisfied,
                    diff: Diff::none("formula", "ripgrep"),
                    resolution: None,
                    explanation: Explanation::default(),
                    error: None,
                },
                PlanEntry {
                    step_id: StepId::new("npm:package:typescript").unwrap(),
                    status: StepStatus::NeedsApply,
                    diff: Diff::none("package", "typescript"),
                    resolution: None,
                    explanation: Explanation::default(),
                    error: None,
                },
            ],
        };
        assert_eq!(report.needs_apply().count(), 1);
    }

    #[test]
    fn health_report_default_is_healthy() {
        assert!(HealthReport::default().healthy());
    }
}
