//! Uniform subprocess runner. Mirrors the teacher's poll-with-timeout
//! shape: spawn, poll `try_wait` on a short interval, grace-kill on
//! deadline. Non-zero exit codes are not errors here; only a missing
//! binary or a transport failure is.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use preflight_types::{Error, ErrorKind};

use crate::context::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Output of a completed (or forcibly stopped) subprocess. Cancellation
/// is never represented here — it surfaces as `Err(ErrorKind::Canceled)`
/// from `CommandRunner::run` instead (§5: "Cancellation immediately
/// fails `Check`/`Plan` with `Canceled`"), so a canceled command can
/// never be misread as a plain non-zero exit.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// A single capability for running external tools. Implementations
/// must treat `;`, `&`, `|`, `$`, backtick and newline in `args` as the
/// caller's problem to reject before invocation (see `sanitize`); this
/// port does not itself shell-interpret arguments, since it always
/// execs the program directly rather than through a shell.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, Error>;
}

/// Runs real subprocesses via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, Error> {
        run_command_with_timeout(program, args, cwd, timeout, cancel)
    }
}

fn run_command_with_timeout(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<CommandOutput, Error> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::new(ErrorKind::CommandNotFound).with_message(format!("{program}: not found"))
        } else {
            Error::new(ErrorKind::CommandFailed)
                .with_message(format!("failed to spawn {program}"))
                .with_cause(anyhow::Error::new(e))
        }
    })?;

    loop {
        if cancel.is_canceled() {
            terminate_on_cancel(&mut child);
            return Err(Error::new(ErrorKind::Canceled).with_message(format!("{program}: canceled")));
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                return collect_output(child, status.code().unwrap_or(-1), start, false);
            }
            Ok(None) => {
                if let Some(limit) = timeout {
                    if start.elapsed() >= limit {
                        return finish_timed_out(child, start);
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(Error::new(ErrorKind::CommandFailed)
                    .with_message(format!("failed to poll {program}"))
                    .with_cause(anyhow::Error::new(e)));
            }
        }
    }
}

fn finish_timed_out(
    mut child: std::process::Child,
    start: Instant,
) -> Result<CommandOutput, Error> {
    let _ = child.kill();
    let _ = child.wait();
    collect_output(child, -1, start, true)
}

/// Grace period before the hard kill, giving the child a chance to
/// exit on its own (POSIX: this crate does not send SIGINT directly
/// since `std::process::Child` exposes only `kill`; the grace window
/// still lets short-lived children finish before we reap them). Output
/// is discarded — a canceled command surfaces only as `Err(Canceled)`.
fn terminate_on_cancel(child: &mut std::process::Child) {
    let deadline = Instant::now() + CANCEL_GRACE_PERIOD;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) if Instant::now() < deadline => std::thread::sleep(POLL_INTERVAL),
            _ => break,
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn collect_output(
    mut child: std::process::Child,
    exit_code: i32,
    start: Instant,
    timed_out: bool,
) -> Result<CommandOutput, Error> {
    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }
    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration: start.elapsed(),
    })
}
