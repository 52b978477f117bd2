//! Filesystem capability: read, atomic write, symlink/junction ops,
//! content hashing and the two path-security checks steps and the
//! snapshot store rely on.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use preflight_types::{Error, ErrorKind};

/// Streams file content into a hasher above this size rather than
/// buffering it whole, per the memory model's 1 MiB threshold.
const STREAM_THRESHOLD: u64 = 1024 * 1024;

pub trait FileSystem: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>, Error>;
    fn write_atomic(&self, path: &Path, contents: &[u8], mode: Option<u32>) -> Result<(), Error>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_symlink(&self, path: &Path) -> bool;
    fn symlink_target(&self, path: &Path) -> Result<Option<PathBuf>, Error>;
    fn create_symlink(&self, target: &Path, link: &Path) -> Result<(), Error>;
    /// Windows junction, or a hardlink on platforms without junctions.
    fn create_link(&self, target: &Path, link: &Path) -> Result<(), Error>;
    fn remove(&self, path: &Path) -> Result<(), Error>;
    fn mkdir_all(&self, path: &Path) -> Result<(), Error>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), Error>;
    fn copy(&self, from: &Path, to: &Path) -> Result<(), Error>;
    fn content_hash(&self, path: &Path) -> Result<String, Error>;
    fn file_mode(&self, path: &Path) -> Result<Option<u32>, Error>;

    /// Lexical containment: does `candidate` normalize under `root`
    /// without touching the filesystem?
    fn is_within_root(&self, root: &Path, candidate: &Path) -> bool {
        preflight_config::is_within_root(root, candidate)
    }

    /// Same question, but resolving symlinks first and rejecting a
    /// resolved path that escapes `root`. Falls back to the lexical
    /// check for paths that do not exist yet (e.g. a file `Apply` is
    /// about to create).
    fn is_within_root_secure(&self, root: &Path, candidate: &Path) -> bool {
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        match (fs::canonicalize(root), fs::canonicalize(&joined)) {
            (Ok(root_real), Ok(candidate_real)) => candidate_real.starts_with(root_real),
            _ => self.is_within_root(root, candidate),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFileSystem;

impl FileSystem for NativeFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>, Error> {
        fs::read(path).map_err(|e| io_error(path, e))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8], mode: Option<u32>) -> Result<(), Error> {
        let tmp = tmp_path(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        {
            let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            file.write_all(contents).map_err(|e| io_error(&tmp, e))?;
            file.sync_all().map_err(|e| io_error(&tmp, e))?;
        }
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))
                .map_err(|e| io_error(&tmp, e))?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        fsync_parent_dir(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        path.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn symlink_target(&self, path: &Path) -> Result<Option<PathBuf>, Error> {
        if !self.is_symlink(path) {
            return Ok(None);
        }
        fs::read_link(path).map(Some).map_err(|e| io_error(path, e))
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> Result<(), Error> {
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link).map_err(|e| io_error(link, e))
        }
        #[cfg(windows)]
        {
            if target.is_dir() {
                std::os::windows::fs::symlink_dir(target, link).map_err(|e| io_error(link, e))
            } else {
                std::os::windows::fs::symlink_file(target, link).map_err(|e| io_error(link, e))
            }
        }
        #[cfg(not(any(unix, windows)))]
        {
            Err(Error::new(ErrorKind::Internal).with_message("symlinks unsupported on this platform"))
        }
    }

    fn create_link(&self, target: &Path, link: &Path) -> Result<(), Error> {
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::hard_link(target, link).map_err(|e| io_error(link, e))
    }

    fn remove(&self, path: &Path) -> Result<(), Error> {
        if self.is_dir(path) && !self.is_symlink(path) {
            fs::remove_dir_all(path).map_err(|e| io_error(path, e))
        } else {
            fs::remove_file(path).map_err(|e| io_error(path, e))
        }
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), Error> {
        fs::create_dir_all(path).map_err(|e| io_error(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), Error> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::rename(from, to).map_err(|e| io_error(to, e))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), Error> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::copy(from, to).map_err(|e| io_error(to, e))?;
        Ok(())
    }

    fn content_hash(&self, path: &Path) -> Result<String, Error> {
        let metadata = fs::metadata(path).map_err(|e| io_error(path, e))?;
        let mut hasher = Sha256::new();
        if metadata.len() > STREAM_THRESHOLD {
            let mut file = File::open(path).map_err(|e| io_error(path, e))?;
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf).map_err(|e| io_error(path, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        } else {
            let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
            hasher.update(&bytes);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn file_mode(&self, path: &Path) -> Result<Option<u32>, Error> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(path).map_err(|e| io_error(path, e))?;
            Ok(Some(metadata.permissions().mode()))
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            Ok(None)
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::new(ErrorKind::Internal)
            .with_path(path)
            .with_message("missing")
            .with_cause(anyhow::Error::new(e))
    } else {
        Error::new(ErrorKind::Internal)
            .with_path(path)
            .with_cause(anyhow::Error::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/file.txt");
        let fs_port = NativeFileSystem;
        fs_port.write_atomic(&path, b"hello", None).unwrap();
        assert_eq!(fs_port.read(&path).unwrap(), b"hello");
    }

    #[test]
    fn content_hash_is_stable_for_same_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let fs_port = NativeFileSystem;
        fs_port.write_atomic(&path, b"same bytes", None).unwrap();
        let h1 = fs_port.content_hash(&path).unwrap();
        let h2 = fs_port.content_hash(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn is_within_root_secure_rejects_symlink_escape() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        let link = root.join("escape");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&outside, &link).unwrap();
            let fs_port = NativeFileSystem;
            assert!(!fs_port.is_within_root_secure(&root, &link));
        }
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        let fs_port = NativeFileSystem;
        fs_port.write_atomic(&path, b"x", None).unwrap();
        fs_port.remove(&path).unwrap();
        assert!(!fs_port.exists(&path));
    }
}
