//! Progress reporting with TTY detection: a progress bar when stderr
//! is a terminal, line-oriented fallback otherwise. State lives in
//! atomics and `ProgressBar`'s own interior mutability so the `&self`
//! methods stay safe to call from multiple apply-scheduler worker
//! threads at once (`preflight_core::reporter::Reporter` requires
//! `Send + Sync`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use is_terminal::IsTerminal;

use preflight_core::reporter::Reporter;
use preflight_types::StepId;

/// Detects whether stderr is connected to a terminal. Progress and log
/// lines both go to stderr so stdout stays clean for report output.
pub fn is_tty() -> bool {
    std::io::stderr().is_terminal()
}

pub struct ProgressReporter {
    is_tty: bool,
    total: usize,
    done: AtomicUsize,
    bar: Option<ProgressBar>,
    start: Instant,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        let is_tty = is_tty();
        let bar = is_tty.then(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });

        Self {
            is_tty,
            total,
            done: AtomicUsize::new(0),
            bar,
            start: Instant::now(),
        }
    }

    /// Always uses the non-TTY line-oriented fallback, regardless of
    /// the real terminal. Used by `--quiet` and by tests.
    pub fn silent(total: usize) -> Self {
        Self {
            is_tty: false,
            total,
            done: AtomicUsize::new(0),
            bar: None,
            start: Instant::now(),
        }
    }

    pub fn finish(&self) {
        let elapsed = self.start.elapsed();
        if let Some(bar) = &self.bar {
            bar.set_message(format!("applied {}/{} steps in {elapsed:?}", self.total, self.total));
            bar.finish();
        } else {
            eprintln!("applied {}/{} steps in {elapsed:?}", self.total, self.total);
        }
    }
}

impl Reporter for ProgressReporter {
    fn info(&self, message: &str) {
        if self.is_tty {
            if let Some(bar) = &self.bar {
                bar.println(format!("[info] {message}"));
                return;
            }
        }
        eprintln!("[info] {message}");
    }

    fn warn(&self, message: &str) {
        if self.is_tty {
            if let Some(bar) = &self.bar {
                bar.println(format!("[warn] {message}"));
                return;
            }
        }
        eprintln!("[warn] {message}");
    }

    fn error(&self, message: &str) {
        if self.is_tty {
            if let Some(bar) = &self.bar {
                bar.println(format!("[error] {message}"));
                return;
            }
        }
        eprintln!("[error] {message}");
    }

    fn step_started(&self, step_id: &StepId) {
        let current = self.done.load(Ordering::SeqCst) + 1;
        let elapsed = self.start.elapsed();
        let msg = format!("[{current}/{}] applying {step_id}... ({elapsed:?})", self.total);
        if let Some(bar) = &self.bar {
            bar.set_message(msg);
            bar.set_position((current - 1) as u64);
        } else {
            eprintln!("{msg}");
        }
    }

    fn step_finished(&self, step_id: &StepId, outcome: &str) {
        let current = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(bar) = &self.bar {
            bar.inc(0);
            bar.println(format!("[{current}/{}] {step_id}: {outcome}", self.total));
        } else {
            eprintln!("[{current}/{}] {step_id}: {outcome}", self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_reporter_disables_tty() {
        let reporter = ProgressReporter::silent(3);
        assert!(!reporter.is_tty);
        assert!(reporter.bar.is_none());
    }

    #[test]
    fn step_started_and_finished_advance_done_counter() {
        let reporter = ProgressReporter::silent(2);
        let id = StepId::new("brew:formula:ripgrep").unwrap();
        reporter.step_started(&id);
        reporter.step_finished(&id, "applied");
        assert_eq!(reporter.done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reporter_methods_are_callable_without_panicking() {
        let reporter = ProgressReporter::silent(1);
        reporter.info("i");
        reporter.warn("w");
        reporter.error("e");
        reporter.finish();
    }

    #[test]
    fn is_tty_returns_a_bool() {
        let result = is_tty();
        assert!(matches!(result, true | false));
    }
}
