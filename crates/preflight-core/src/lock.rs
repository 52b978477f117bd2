//! Run-level advisory file lock: the only unavoidable process-wide
//! state an engine run holds (DESIGN NOTES, "Global state"). Acquired
//! in `engine_start`, released in `engine_stop` with guaranteed
//! cleanup on all exit paths via `Drop`. Lifted close to verbatim from
//! the teacher's `lock.rs::LockFile`, with the `plan_id` field
//! generalized to a `dag_digest` so a stale lock left by a run against
//! a *different* compiled DAG is still detected as foreign.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use preflight_types::{Error, ErrorKind};

pub const LOCK_FILE: &str = ".preflight.lock";

/// Sentinel contents of the lock file: who holds it, since when, and
/// against which compiled DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
    pub dag_digest: Option<String>,
}

/// A held lock; releases on `Drop` so every exit path (success, error,
/// panic unwind) cleans up.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquires the lock in `config_root`, removing a stale lock past
    /// `timeout` first. Fails with `LockConflict` if a live lock is
    /// already held.
    pub fn acquire(config_root: &Path, timeout: Duration, dag_digest: Option<String>) -> Result<Self, Error> {
        let lock_path = config_root.join(LOCK_FILE);

        if lock_path.exists() {
            match read_lock_info(&lock_path) {
                Ok(existing) => {
                    let age = Utc::now() - existing.acquired_at;
                    if age.num_seconds().unsigned_abs() > timeout.as_secs() {
                        fs::remove_file(&lock_path).map_err(|e| io_error(&lock_path, e))?;
                    } else {
                        return Err(Error::new(ErrorKind::LockConflict).with_path(&lock_path).with_message(
                            format!(
                                "lock already held by pid {} on {} since {}",
                                existing.pid, existing.hostname, existing.acquired_at
                            ),
                        ));
                    }
                }
                Err(_) => {
                    // Corrupt sentinel; treat as foreign-but-dead and
                    // remove it rather than failing the whole run.
                    fs::remove_file(&lock_path).map_err(|e| io_error(&lock_path, e))?;
                }
            }
        }

        let info = LockInfo {
            pid: std::process::id(),
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            acquired_at: Utc::now(),
            dag_digest,
        };
        write_lock_info(&lock_path, &info)?;

        Ok(Self { path: lock_path })
    }

    pub fn release(&mut self) -> Result<(), Error> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| io_error(&self.path, e))?;
        }
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn write_lock_info(path: &Path, info: &LockInfo) -> Result<(), Error> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(info)
        .map_err(|e| Error::new(ErrorKind::Internal).with_cause(anyhow::Error::new(e)))?;
    {
        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(json.as_bytes()).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}

fn read_lock_info(path: &Path) -> Result<LockInfo, Error> {
    let content = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::new(ErrorKind::Internal).with_path(path).with_cause(anyhow::Error::new(e)))
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::new(ErrorKind::Internal).with_path(path).with_cause(anyhow::Error::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_then_release_removes_sentinel() {
        let dir = tempdir().unwrap();
        let mut lock = RunLock::acquire(dir.path(), Duration::from_secs(3600), None).unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());
        lock.release().unwrap();
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn second_acquire_fails_with_lock_conflict() {
        let dir = tempdir().unwrap();
        let _held = RunLock::acquire(dir.path(), Duration::from_secs(3600), None).unwrap();
        let err = RunLock::acquire(dir.path(), Duration::from_secs(3600), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockConflict);
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = tempdir().unwrap();
        {
            let _lock = RunLock::acquire(dir.path(), Duration::from_secs(3600), None).unwrap();
            assert!(dir.path().join(LOCK_FILE).exists());
        }
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn stale_lock_past_timeout_is_removed_and_reacquired() {
        let dir = tempdir().unwrap();
        let stale = LockInfo {
            pid: 999999,
            hostname: "other-host".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
            dag_digest: Some("old-digest".to_string()),
        };
        write_lock_info(&dir.path().join(LOCK_FILE), &stale).unwrap();

        let lock = RunLock::acquire(dir.path(), Duration::from_secs(3600), Some("new-digest".to_string())).unwrap();
        let info = read_lock_info(&lock.path).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_ne!(info.dag_digest, Some("old-digest".to_string()));
    }

    #[test]
    fn fresh_foreign_lock_is_a_conflict_even_for_a_different_dag() {
        let dir = tempdir().unwrap();
        let fresh = LockInfo {
            pid: 999999,
            hostname: "other-host".to_string(),
            acquired_at: Utc::now(),
            dag_digest: Some("other-digest".to_string()),
        };
        write_lock_info(&dir.path().join(LOCK_FILE), &fresh).unwrap();

        let err = RunLock::acquire(dir.path(), Duration::from_secs(3600), Some("my-digest".to_string())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockConflict);
    }
}
