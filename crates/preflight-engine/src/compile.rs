//! Loads a target's merged configuration and compiles every registered
//! provider's steps into a validated [`StepGraph`].

use std::path::Path;

use preflight_config::{load_target, LoadedConfig};
use preflight_core::context::CompileContext;
use preflight_core::dag::StepGraph;
use preflight_core::fs::FileSystem;
use preflight_core::step::Provider;
use preflight_types::Result;
use sha2::{Digest, Sha256};

/// A loaded config plus the `StepGraph` compiled from it.
pub struct CompiledRun {
    pub loaded: LoadedConfig,
    pub graph: StepGraph,
}

pub fn compile(config_path: &Path, target: &str, providers: &[Box<dyn Provider>], fs: &dyn FileSystem) -> Result<CompiledRun> {
    let loaded = load_target(config_path, target)?;
    let ctx = CompileContext::new(&loaded.merged, &loaded.target, &loaded.config_root, fs);

    let mut steps = Vec::new();
    for provider in providers {
        steps.extend(provider.compile(&ctx)?);
    }

    let graph = StepGraph::build(steps)?;
    Ok(CompiledRun { loaded, graph })
}

/// Content hash of the compiled DAG's step ids in topological order —
/// the run lock's `dag_digest`, so a stale lock left by a run against a
/// different config is still detected as foreign rather than silently
/// reused.
pub fn dag_digest(graph: &StepGraph) -> String {
    let joined = graph.order().iter().map(|id| id.as_str()).collect::<Vec<_>>().join(",");
    hex::encode(Sha256::digest(joined))
}
