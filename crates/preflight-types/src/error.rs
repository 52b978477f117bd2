use std::fmt;
use std::path::PathBuf;

use thiserror::Error as ThisError;

use crate::step_id::StepId;

/// The closed set of error categories a faithful engine run may surface.
///
/// Propagation policy (validation-fatal vs. recorded-against-a-step vs.
/// recoverable) lives with the callers that raise each kind, not here —
/// this enum only names the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum ErrorKind {
    #[error("config")]
    Config,
    #[error("schema")]
    Schema,
    #[error("dependency cycle")]
    DependencyCycle,
    #[error("unknown dependency")]
    UnknownDependency,
    #[error("duplicate step")]
    DuplicateStep,
    #[error("command not found")]
    CommandNotFound,
    #[error("command failed")]
    CommandFailed,
    #[error("lock conflict")]
    LockConflict,
    #[error("snapshot missing")]
    SnapshotMissing,
    #[error("path escape")]
    PathEscape,
    #[error("policy violation")]
    PolicyViolation,
    #[error("canceled")]
    Canceled,
    #[error("internal")]
    Internal,
}

/// An error carrying its [`ErrorKind`] plus the `{step_id?, path?, cause}`
/// fields every error must expose for log lines, report entries and exit
/// codes (ERROR HANDLING DESIGN).
#[derive(Debug, ThisError)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    step_id: Option<StepId>,
    path: Option<PathBuf>,
    #[source]
    cause: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            step_id: None,
            path: None,
            cause: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_step_id(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn step_id(&self) -> Option<&StepId> {
        self.step_id.as_ref()
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Exit code per the process surface: 0 success, 1 command-level
    /// failure, 2 validation error, 3 missing config, 130 canceled.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::Canceled => 130,
            ErrorKind::Config | ErrorKind::Schema if self.message.as_deref() == Some("missing") => {
                3
            }
            ErrorKind::Config
            | ErrorKind::Schema
            | ErrorKind::DependencyCycle
            | ErrorKind::UnknownDependency
            | ErrorKind::DuplicateStep
            | ErrorKind::PathEscape
            | ErrorKind::PolicyViolation => 2,
            ErrorKind::CommandNotFound
            | ErrorKind::CommandFailed
            | ErrorKind::LockConflict
            | ErrorKind::SnapshotMissing
            | ErrorKind::Internal => 1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(step_id) = &self.step_id {
            write!(f, " step_id={step_id}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " path={}", path.display())?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_maps_validation_errors_to_two() {
        assert_eq!(Error::new(ErrorKind::DependencyCycle).exit_code(), 2);
        assert_eq!(Error::new(ErrorKind::PathEscape).exit_code(), 2);
    }

    #[test]
    fn exit_code_maps_canceled_to_130() {
        assert_eq!(Error::new(ErrorKind::Canceled).exit_code(), 130);
    }

    #[test]
    fn exit_code_maps_command_failures_to_one() {
        assert_eq!(Error::new(ErrorKind::CommandFailed).exit_code(), 1);
        assert_eq!(Error::new(ErrorKind::LockConflict).exit_code(), 1);
    }

    #[test]
    fn display_includes_step_id_and_path() {
        let step_id = StepId::new("brew:formula:ripgrep").unwrap();
        let err = Error::new(ErrorKind::CommandFailed)
            .with_step_id(step_id)
            .with_path("/tmp/x")
            .with_message("exit 1");
        let rendered = err.to_string();
        assert!(rendered.contains("brew:formula:ripgrep"));
        assert!(rendered.contains("/tmp/x"));
        assert!(rendered.contains("exit 1"));
    }
}
