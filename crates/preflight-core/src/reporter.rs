//! Structured reporting in place of a logging-crate facade: a `Reporter`
//! trait with a no-op and a console implementation, plus a redaction
//! wrapper every reporter is expected to sit behind.

use preflight_secret_guard::Redactor;
use preflight_types::StepId;

/// Leveled, field-free reporting plus two hooks the progress bar
/// drives. Implementations must be safe for concurrent use, since
/// worker threads in the apply scheduler report independently.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn step_started(&self, step_id: &StepId) {
        let _ = step_id;
    }
    fn step_finished(&self, step_id: &StepId, outcome: &str) {
        let _ = (step_id, outcome);
    }
}

/// Discards everything. Used for quiet runs and as a default in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Writes to stderr, one line per event, prefixed by level.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        eprintln!("[info] {message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("[warn] {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("[error] {message}");
    }

    fn step_started(&self, step_id: &StepId) {
        eprintln!("[info] {step_id}: starting");
    }

    fn step_finished(&self, step_id: &StepId, outcome: &str) {
        eprintln!("[info] {step_id}: {outcome}");
    }
}

/// Wraps any `Reporter`, scrubbing every string through a `Redactor`
/// before it reaches the inner implementation. This is the concrete
/// mechanism behind "unresolved secret references never appear in
/// logs" — every reporting path in the engine goes through one of
/// these rather than the raw implementation.
pub struct RedactingReporter<'a> {
    inner: &'a dyn Reporter,
    redactor: &'a Redactor,
}

impl<'a> RedactingReporter<'a> {
    pub fn new(inner: &'a dyn Reporter, redactor: &'a Redactor) -> Self {
        Self { inner, redactor }
    }
}

impl Reporter for RedactingReporter<'_> {
    fn info(&self, message: &str) {
        self.inner.info(&self.redactor.redact(message));
    }

    fn warn(&self, message: &str) {
        self.inner.warn(&self.redactor.redact(message));
    }

    fn error(&self, message: &str) {
        self.inner.error(&self.redactor.redact(message));
    }

    fn step_started(&self, step_id: &StepId) {
        self.inner.step_started(step_id);
    }

    fn step_finished(&self, step_id: &StepId, outcome: &str) {
        self.inner
            .step_finished(step_id, &self.redactor.redact(outcome));
    }
}
