//! CLI adapter for Preflight: `plan`/`apply`/`diff`/`doctor`/`restore`/
//! `capture` subcommands over the `preflight-engine` entry points. The
//! binary (`src/main.rs`) is a thin forwarder to [`run`] — the same
//! three-crate split the teacher uses for `shipper`/`shipper-cli`
//! (library surface vs. binary), so an embedder can call `run`
//! programmatically without shelling out.

pub mod output;
pub mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use preflight_core::context::CancellationToken;
use preflight_core::fs::{FileSystem, NativeFileSystem};
use preflight_core::process::{CommandRunner, SystemCommandRunner};
use preflight_core::reporter::{NullReporter, Reporter};
use preflight_core::runtime_options::{CliOverrides, EngineConfig};
use preflight_engine::EngineContext;
use preflight_policy::Validator;
use preflight_secret_guard::Redactor;
use preflight_snapshot::{SetSelector, SnapshotStore};
use preflight_types::{CaptureFilter, ErrorKind};

#[derive(Parser, Debug)]
#[command(name = "preflight", version)]
#[command(about = "Declarative, idempotent workstation configuration")]
pub struct Cli {
    /// Path to the root config file.
    #[arg(long, global = true, default_value = "preflight.yaml")]
    pub config: PathBuf,

    /// Named target to evaluate.
    #[arg(long, global = true, default_value = "default")]
    pub target: String,

    /// Data root for the lockfile and snapshot store (default: $HOME/.preflight).
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Worker pool size for `apply`'s bounded-concurrency scheduler.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Advisory run-lock acquisition timeout, e.g. `30s`.
    #[arg(long, global = true, value_parser = parse_duration)]
    pub lock_timeout: Option<Duration>,

    /// Abort the whole run on the first step failure instead of only
    /// halting dependents.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Suppress progress bars and step-level reporting.
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Preview the operations required to reach the desired state.
    Plan,
    /// Apply the plan. Requires `--confirm` to mutate anything.
    Apply {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        confirm: bool,
    },
    /// Show only the diffs for steps that need apply.
    Diff,
    /// Run health checks.
    Doctor {
        /// Schema validation and DAG build only — skip tool probes.
        #[arg(long)]
        quick: bool,
        #[arg(long)]
        verbose: bool,
    },
    /// Restore files from a snapshot set.
    Restore {
        /// Snapshot set id, an unambiguous short prefix, or `latest`.
        set_id: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Read the live system into an inventory, optionally filtered by provider.
    Capture {
        #[arg(long = "provider")]
        providers: Vec<String>,
    },
    /// Compare recorded applied state against the live system.
    Drift {
        #[arg(long = "provider")]
        providers: Vec<String>,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn resolve_state_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &cli.state_dir {
        return Ok(dir.clone());
    }
    preflight_core::runtime_options::default_state_dir()
        .ok_or_else(|| anyhow::anyhow!("no --state-dir given and $HOME is unset"))
}

/// Programmatic entry point: parses `std::env::args`, runs the
/// requested subcommand, and returns the process exit code per §6
/// (0 success, 1 command-level failure, 2 validation error, 3 missing
/// config, 130 canceled). Never panics on user input — every failure
/// path returns a code instead.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[error] {err}");
            ExitCode::from(1)
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    let state_dir = resolve_state_dir(&cli)?;
    let config_root = match preflight_config::discover_config_root(&cli.config) {
        Ok(root) => root,
        Err(e) => return Ok(ExitCode::from(e.exit_code() as u8)),
    };

    let engine_config = EngineConfig::load_from_root(&config_root).unwrap_or(None).unwrap_or_default();
    let overrides = CliOverrides {
        concurrency: cli.concurrency,
        lock_timeout: cli.lock_timeout,
        strict: cli.strict,
        dry_run: matches!(cli.command, Command::Apply { dry_run: true, .. }),
        confirm: matches!(cli.command, Command::Apply { confirm: true, .. }),
        ..Default::default()
    };
    let runtime = engine_config.build_runtime_options(overrides);

    let fs = NativeFileSystem;
    let runner = SystemCommandRunner;
    let redactor = Redactor::new();
    let providers = preflight_providers::reference_providers();
    let policy = Validator::new();
    let cancel = CancellationToken::new();
    install_cancel_handler(cancel.clone());

    let reporter: Box<dyn Reporter> = if cli.quiet {
        Box::new(NullReporter)
    } else {
        Box::new(progress::ProgressReporter::new(providers.len().max(1) * 8))
    };

    let engine = EngineContext {
        config_path: &cli.config,
        target: &cli.target,
        state_dir: &state_dir,
        providers: &providers,
        runtime: &runtime,
        policy: &policy,
        reporter: reporter.as_ref(),
        runner: &runner,
        fs: &fs,
        redactor: &redactor,
        cancel,
    };

    dispatch(&engine, cli.command, &state_dir, &fs)
}

fn dispatch(
    engine: &EngineContext<'_>,
    command: Command,
    state_dir: &PathBuf,
    fs: &dyn FileSystem,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::Plan => match preflight_engine::plan(engine) {
            Ok(planned) => {
                output::print_plan(&planned.plan_report);
                Ok(ExitCode::from(0))
            }
            Err(e) => Ok(ExitCode::from(e.exit_code() as u8)),
        },
        Command::Apply { .. } => {
            let planned = match preflight_engine::plan(engine) {
                Ok(p) => p,
                Err(e) => return Ok(ExitCode::from(e.exit_code() as u8)),
            };
            match preflight_engine::apply::apply(engine, &planned) {
                Ok(report) => {
                    output::print_apply(&report);
                    let code = if report.canceled {
                        preflight_types::Error::new(ErrorKind::Canceled).exit_code() as u8
                    } else if report.failed_step_ids().is_empty() {
                        0
                    } else {
                        1
                    };
                    Ok(ExitCode::from(code))
                }
                Err(e) => Ok(ExitCode::from(e.exit_code() as u8)),
            }
        }
        Command::Diff => match preflight_engine::diff::diff(engine) {
            Ok(diffs) => {
                output::print_diff(&diffs);
                Ok(ExitCode::from(0))
            }
            Err(e) => Ok(ExitCode::from(e.exit_code() as u8)),
        },
        Command::Doctor { quick, verbose } => {
            let report = preflight_engine::doctor::doctor(engine, quick)?;
            output::print_doctor(&report, verbose);
            Ok(ExitCode::from(if report.healthy() { 0 } else { 1 }))
        }
        Command::Restore { set_id, dry_run } => {
            let store = SnapshotStore::open(state_dir).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            let selector = SetSelector::parse(&set_id);
            match store.restore(fs, selector, dry_run) {
                Ok(outcomes) => {
                    output::print_restore(&outcomes, dry_run);
                    let ok = outcomes.iter().all(|o| o.error.is_none());
                    Ok(ExitCode::from(if ok { 0 } else { 1 }))
                }
                Err(e) if e.kind() == ErrorKind::SnapshotMissing => {
                    eprintln!("[error] {e}");
                    Ok(ExitCode::from(1))
                }
                Err(e) => Ok(ExitCode::from(e.exit_code() as u8)),
            }
        }
        Command::Capture { providers } => {
            let filter = if providers.is_empty() { CaptureFilter::all() } else { CaptureFilter { providers } };
            match preflight_engine::capture::capture(engine, &filter) {
                Ok(items) => {
                    output::print_capture(&items);
                    Ok(ExitCode::from(0))
                }
                Err(e) => Ok(ExitCode::from(e.exit_code() as u8)),
            }
        }
        Command::Drift { providers } => {
            let filter = if providers.is_empty() { CaptureFilter::all() } else { CaptureFilter { providers } };
            match preflight_engine::capture::drift(engine, &filter) {
                Ok(entries) => {
                    output::print_drift(&entries);
                    Ok(ExitCode::from(0))
                }
                Err(e) => Ok(ExitCode::from(e.exit_code() as u8)),
            }
        }
    }
}

/// Wires SIGINT to the run's cancellation token (§5): cancellation
/// fails in-flight `Check`/`Plan`/`Apply` calls with `Canceled` rather
/// than killing the process outright, so the scheduler gets a chance
/// to report what it already finished. Best-effort — if a handler is
/// already installed (e.g. under a test harness), this silently no-ops
/// rather than panicking.
fn install_cancel_handler(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_handles_valid_and_invalid_inputs() {
        assert!(parse_duration("1s").is_ok());
        assert!(parse_duration("nope").is_err());
    }

    #[test]
    fn cli_parses_plan_subcommand_with_defaults() {
        let cli = Cli::parse_from(["preflight", "plan"]);
        assert_eq!(cli.config, PathBuf::from("preflight.yaml"));
        assert_eq!(cli.target, "default");
        assert!(matches!(cli.command, Command::Plan));
    }

    #[test]
    fn cli_parses_apply_with_confirm_flag() {
        let cli = Cli::parse_from(["preflight", "apply", "--confirm"]);
        match cli.command {
            Command::Apply { confirm, dry_run } => {
                assert!(confirm);
                assert!(!dry_run);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn cli_parses_restore_with_set_selector() {
        let cli = Cli::parse_from(["preflight", "restore", "latest", "--dry-run"]);
        match cli.command {
            Command::Restore { set_id, dry_run } => {
                assert_eq!(set_id, "latest");
                assert!(dry_run);
            }
            _ => panic!("expected restore"),
        }
    }

    #[test]
    fn cli_global_flags_apply_before_subcommand() {
        let cli = Cli::parse_from(["preflight", "--target", "work", "--quiet", "diff"]);
        assert_eq!(cli.target, "work");
        assert!(cli.quiet);
    }

    #[test]
    fn resolve_state_dir_prefers_explicit_flag() {
        let cli = Cli::parse_from(["preflight", "--state-dir", "/tmp/pf-state", "plan"]);
        let resolved = resolve_state_dir(&cli).unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/pf-state"));
    }
}
