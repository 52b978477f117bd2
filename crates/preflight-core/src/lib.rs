//! The step DAG, scheduler, and the process/filesystem/reporting ports
//! every provider and engine stage is built on. `preflight-core` knows
//! nothing about YAML, lockfiles, or snapshots — those are the
//! adjoining crates (`preflight-config`, `preflight-lockfile`,
//! `preflight-snapshot`); this crate is the load-bearing middle of the
//! stack: the `Step`/`Provider` contract, the DAG that assembles
//! compiled steps, and the scheduler that drives check/plan/apply.

pub mod context;
pub mod dag;
pub mod fs;
pub mod lock;
pub mod process;
pub mod reporter;
pub mod runtime_options;
pub mod sanitize;
pub mod scheduler;
pub mod step;

pub use context::{CancellationToken, CompileContext, ExplainContext, RunContext};
pub use dag::StepGraph;
pub use fs::{FileSystem, NativeFileSystem};
pub use lock::RunLock;
pub use process::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use reporter::{ConsoleReporter, NullReporter, RedactingReporter, Reporter};
pub use runtime_options::{CliOverrides, EngineConfig, RetentionPolicy, RuntimeOptions};
pub use step::{Provider, Step};
