//! `capture(config, target, filter) -> Vec<CaptureItem>` and drift
//! detection (§4.9): merges every provider's live inventory, then
//! compares it against what the snapshot store recorded at apply time.
//! A captured package is orphaned when no compiled step claims it via
//! `lock_info`; an owned file is drifted when its current content hash
//! no longer matches the hash recorded the last time it was applied.

use std::collections::BTreeSet;
use std::path::PathBuf;

use preflight_snapshot::SnapshotStore;
use preflight_types::{CaptureFilter, CaptureItem, DriftEntry, DriftKind, Result};

use crate::EngineContext;

pub fn capture(engine: &EngineContext<'_>, filter: &CaptureFilter) -> Result<Vec<CaptureItem>> {
    let run_ctx = engine.run_context();
    let mut items = Vec::new();
    for provider in engine.providers {
        items.extend(provider.capture(&run_ctx, filter)?);
    }
    Ok(items)
}

pub fn drift(engine: &EngineContext<'_>, filter: &CaptureFilter) -> Result<Vec<DriftEntry>> {
    let compiled = engine.compiled()?;
    let store = SnapshotStore::open(engine.state_dir)?;
    let items = capture(engine, filter)?;

    let owned_packages: BTreeSet<(String, String)> = compiled
        .graph
        .order()
        .iter()
        .filter_map(|id| compiled.graph.get(id))
        .filter_map(|step| step.lock_info())
        .map(|info| (info.provider, info.name))
        .collect();

    let mut entries = Vec::new();
    for item in &items {
        if !owned_packages.contains(&(item.provider.clone(), item.id.clone())) {
            entries.push(DriftEntry {
                provider: item.provider.clone(),
                id: item.id.clone(),
                kind: DriftKind::Orphaned,
            });
        }
    }

    for (path_str, owner) in store.owned_paths() {
        let Some(recorded) = store.recorded_hash(&PathBuf::from(path_str)) else {
            continue;
        };
        let path = PathBuf::from(path_str);
        let current = engine.fs.exists(&path).then(|| engine.fs.content_hash(&path).ok()).flatten();
        if current.as_deref() != Some(recorded) {
            entries.push(DriftEntry {
                provider: owner.to_string(),
                id: path_str.to_string(),
                kind: DriftKind::Drifted,
            });
        }
    }

    Ok(entries)
}
