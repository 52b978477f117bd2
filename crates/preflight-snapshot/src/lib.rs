//! Lifecycle: pre-modification file snapshots, per-run snapshot sets,
//! and restore (§4.7). The index-persistence idiom — temp-file write +
//! `sync_all` + rename, best-effort parent-directory fsync — is lifted
//! directly from the teacher's `state.rs::atomic_write_json`, applied
//! here to two sibling indexes (`index.json`, `sets.json`) instead of
//! one state document.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use preflight_core::fs::FileSystem;
use preflight_core::runtime_options::RetentionPolicy;
use preflight_types::{Error, ErrorKind, Snapshot, SnapshotSet};

const SNAPSHOTS_DIR: &str = "snapshots";
const INDEX_FILE: &str = "index.json";
const SETS_FILE: &str = "sets.json";
const OWNERSHIP_FILE: &str = "ownership.json";
const SHORT_ID_LEN: usize = 8;

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
struct SnapshotIndex {
    snapshots: BTreeMap<String, Snapshot>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
struct SetsIndex {
    sets: BTreeMap<String, SnapshotSet>,
}

/// The layer that last applied a path, plus the content hash it wrote —
/// the latter is what lets drift detection compare "what's on disk now"
/// against "what we put there", per §4.9.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct OwnedPath {
    layer: String,
    hash: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
struct OwnershipIndex {
    /// Maps a file path (as displayed) to the layer that last applied
    /// it and the hash it wrote; consulted by drift detection (§4.9).
    ownership: BTreeMap<String, OwnedPath>,
}

/// Resolves either to a full set id, its "latest" alias, or an
/// unambiguous 8-character prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetSelector<'a> {
    Latest,
    Id(&'a str),
}

impl<'a> SetSelector<'a> {
    pub fn parse(selector: &'a str) -> Self {
        if selector == "latest" {
            SetSelector::Latest
        } else {
            SetSelector::Id(selector)
        }
    }
}

/// One restored (or would-be-restored, for `dry_run`) file.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub path: PathBuf,
    pub was_absent: bool,
    pub error: Option<String>,
}

/// The content-addressed snapshot store living under
/// `<data_root>/snapshots/`.
pub struct SnapshotStore {
    root: PathBuf,
    index: SnapshotIndex,
    sets: SetsIndex,
    ownership: OwnershipIndex,
    pending: Vec<Snapshot>,
    next_insertion_index: u64,
}

impl SnapshotStore {
    /// Opens (creating if absent) the store under `data_root`.
    pub fn open(data_root: &Path) -> Result<Self, Error> {
        let root = data_root.join(SNAPSHOTS_DIR);
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;

        let index = read_json_or_default(&root.join(INDEX_FILE))?;
        let sets: SetsIndex = read_json_or_default(&root.join(SETS_FILE))?;
        let ownership = read_json_or_default(&root.join(OWNERSHIP_FILE))?;
        let next_insertion_index = sets.sets.values().map(|s| s.insertion_index + 1).max().unwrap_or(0);

        Ok(Self {
            root,
            index,
            sets,
            ownership,
            pending: Vec::new(),
            next_insertion_index,
        })
    }

    /// Records a pre-modification snapshot of `path`, read through
    /// `fs`. An absent file becomes a tombstone (`was_absent = true`,
    /// no blob written) so `restore` can recreate absence by deletion.
    pub fn before_modify(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<Snapshot, Error> {
        let created_at = Utc::now();

        if !fs.exists(path) {
            let snapshot = Snapshot {
                id: content_id(path, "", created_at.timestamp_nanos_opt().unwrap_or_default()),
                path: path.to_path_buf(),
                hash: String::new(),
                size: 0,
                created_at,
                blob_filename: String::new(),
                was_absent: true,
            };
            self.pending.push(snapshot.clone());
            return Ok(snapshot);
        }

        let bytes = fs.read(path)?;
        let hash = hex::encode(Sha256::digest(&bytes));
        let id = content_id(path, &hash, created_at.timestamp_nanos_opt().unwrap_or_default());
        let blob_filename = format!("{id}.blob");
        let blob_path = self.root.join(&blob_filename);
        write_blob(&blob_path, &bytes)?;

        let snapshot = Snapshot {
            id,
            path: path.to_path_buf(),
            hash,
            size: bytes.len() as u64,
            created_at,
            blob_filename,
            was_absent: false,
        };
        self.pending.push(snapshot.clone());
        Ok(snapshot)
    }

    /// Records that `path` is now owned by `source_layer`, writing
    /// `content_hash`; consulted by drift detection (§4.9).
    pub fn after_apply(&mut self, path: &Path, source_layer: &str, content_hash: &str) {
        self.ownership.ownership.insert(
            path.display().to_string(),
            OwnedPath {
                layer: source_layer.to_string(),
                hash: content_hash.to_string(),
            },
        );
    }

    pub fn owner_of(&self, path: &Path) -> Option<&str> {
        self.ownership.ownership.get(&path.display().to_string()).map(|o| o.layer.as_str())
    }

    /// The hash recorded the last time `path` was applied, if any.
    pub fn recorded_hash(&self, path: &Path) -> Option<&str> {
        self.ownership.ownership.get(&path.display().to_string()).map(|o| o.hash.as_str())
    }

    pub fn owned_paths(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ownership.ownership.iter().map(|(p, o)| (p.as_str(), o.layer.as_str()))
    }

    /// Commits the pending snapshots taken during this run as one new
    /// `SnapshotSet`, persisting both indexes atomically, then prunes
    /// sets beyond `retention`.
    pub fn commit(&mut self, reason: impl Into<String>, retention: &RetentionPolicy) -> Result<Option<SnapshotSet>, Error> {
        if self.pending.is_empty() {
            self.save_ownership()?;
            return Ok(None);
        }

        let created_at = Utc::now();
        let insertion_index = self.next_insertion_index;
        self.next_insertion_index += 1;

        let snapshot_ids: Vec<String> = self.pending.iter().map(|s| s.id.clone()).collect();
        let set_id = hex::encode(Sha256::digest(format!(
            "{}:{}:{}",
            created_at.timestamp_nanos_opt().unwrap_or_default(),
            insertion_index,
            snapshot_ids.join(",")
        )));

        for snapshot in self.pending.drain(..) {
            self.index.snapshots.insert(snapshot.id.clone(), snapshot);
        }

        let set = SnapshotSet {
            id: set_id.clone(),
            reason: reason.into(),
            created_at,
            snapshot_ids,
            insertion_index,
        };
        self.sets.sets.insert(set_id, set.clone());

        self.save_index()?;
        self.save_sets()?;
        self.save_ownership()?;
        self.prune_retention(retention)?;

        Ok(Some(set))
    }

    /// Restores the set matched by `selector`. When `dry_run`, reports
    /// the intended actions without mutating anything.
    pub fn restore(&self, fs: &dyn FileSystem, selector: SetSelector<'_>, dry_run: bool) -> Result<Vec<RestoreOutcome>, Error> {
        let set = self.resolve_set(selector)?;
        let mut outcomes = Vec::with_capacity(set.snapshot_ids.len());

        for snapshot_id in &set.snapshot_ids {
            let snapshot = match self.index.snapshots.get(snapshot_id) {
                Some(s) => s,
                None => {
                    outcomes.push(RestoreOutcome {
                        path: PathBuf::new(),
                        was_absent: false,
                        error: Some(format!("snapshot {snapshot_id} missing from index")),
                    });
                    continue;
                }
            };

            if dry_run {
                outcomes.push(RestoreOutcome {
                    path: snapshot.path.clone(),
                    was_absent: snapshot.was_absent,
                    error: None,
                });
                continue;
            }

            let result = if snapshot.was_absent {
                fs.remove(&snapshot.path)
            } else {
                let blob_path = self.root.join(&snapshot.blob_filename);
                fs::read(&blob_path)
                    .map_err(|e| io_error(&blob_path, e))
                    .and_then(|bytes| fs.write_atomic(&snapshot.path, &bytes, fs.file_mode(&snapshot.path).ok().flatten()))
            };

            outcomes.push(RestoreOutcome {
                path: snapshot.path.clone(),
                was_absent: snapshot.was_absent,
                error: result.err().map(|e| e.to_string()),
            });
        }

        Ok(outcomes)
    }

    fn resolve_set(&self, selector: SetSelector<'_>) -> Result<SnapshotSet, Error> {
        match selector {
            SetSelector::Latest => self
                .sets
                .sets
                .values()
                .max_by_key(|s| (s.created_at, s.insertion_index))
                .cloned()
                .ok_or_else(|| Error::new(ErrorKind::SnapshotMissing).with_message("no snapshot sets recorded")),
            SetSelector::Id(id) => {
                if let Some(set) = self.sets.sets.get(id) {
                    return Ok(set.clone());
                }
                if id.len() < SHORT_ID_LEN {
                    return Err(Error::new(ErrorKind::SnapshotMissing)
                        .with_message(format!("no snapshot set matches id {id}")));
                }
                let matches: Vec<&SnapshotSet> = self.sets.sets.values().filter(|s| s.id.starts_with(id)).collect();
                match matches.as_slice() {
                    [single] => Ok((*single).clone()),
                    [] => Err(Error::new(ErrorKind::SnapshotMissing)
                        .with_message(format!("no snapshot set matches prefix {id}"))),
                    _ => Err(Error::new(ErrorKind::SnapshotMissing)
                        .with_message(format!("prefix {id} matches more than one snapshot set"))),
                }
            }
        }
    }

    fn prune_retention(&mut self, retention: &RetentionPolicy) -> Result<(), Error> {
        let mut ordered: Vec<SnapshotSet> = self.sets.sets.values().cloned().collect();
        ordered.sort_by_key(|s| std::cmp::Reverse((s.created_at, s.insertion_index)));

        let now = Utc::now();
        let mut to_drop = Vec::new();
        for (index, set) in ordered.iter().enumerate() {
            let past_count = index >= retention.keep_last;
            let past_age = retention
                .max_age
                .map(|max_age| {
                    (now - set.created_at).to_std().map(|age| age > max_age).unwrap_or(false)
                })
                .unwrap_or(false);
            if past_count || past_age {
                to_drop.push(set.id.clone());
            }
        }

        if to_drop.is_empty() {
            return Ok(());
        }

        for set_id in to_drop {
            if let Some(set) = self.sets.sets.remove(&set_id) {
                for snapshot_id in &set.snapshot_ids {
                    if let Some(snapshot) = self.index.snapshots.remove(snapshot_id)
                        && !snapshot.was_absent
                    {
                        let blob_path = self.root.join(&snapshot.blob_filename);
                        let _ = fs::remove_file(blob_path);
                    }
                }
            }
        }

        self.save_index()?;
        self.save_sets()?;
        Ok(())
    }

    fn save_index(&self) -> Result<(), Error> {
        write_json_atomic(&self.root.join(INDEX_FILE), &self.index)
    }

    fn save_sets(&self) -> Result<(), Error> {
        write_json_atomic(&self.root.join(SETS_FILE), &self.sets)
    }

    fn save_ownership(&self) -> Result<(), Error> {
        write_json_atomic(&self.root.join(OWNERSHIP_FILE), &self.ownership)
    }
}

fn content_id(path: &Path, hash: &str, nanos: i64) -> String {
    let digest = Sha256::digest(format!("{}:{}:{}", path.display(), hash, nanos));
    hex::encode(digest)
}

fn write_blob(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if path.exists() {
        return Ok(());
    }
    let tmp = path.with_extension("blob.tmp");
    {
        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(bytes).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::new(ErrorKind::Internal).with_cause(anyhow::Error::new(e)))?;
    {
        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(&data).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
    fsync_parent_dir(path);
    Ok(())
}

fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T, Error> {
    if !path.exists() {
        return Ok(T::default());
    }
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
    use preflight_core::fs::NativeFileSystem;
    use tempfile::tempdir;

    fn retention(keep_last: usize) -> RetentionPolicy {
        RetentionPolicy { keep_last, max_age: None }
    }

    #[test]
    fn snapshot_and_restore_round_trips_a_modified_file() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let target = work.path().join("config.toml");
        fs::write(&target, b"original").unwrap();

        let native = NativeFileSystem;
        let mut store = SnapshotStore::open(data.path()).unwrap();
        store.before_modify(&native, &target).unwrap();
        store.commit("test run", &retention(50)).unwrap();

        fs::write(&target, b"mutated").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"mutated");

        let outcomes = store.restore(&native, SetSelector::Latest, false).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].error.is_none());
        assert_eq!(fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn restoring_a_tombstone_deletes_the_recreated_file() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let target = work.path().join("new-file.toml");

        let native = NativeFileSystem;
        let mut store = SnapshotStore::open(data.path()).unwrap();
        store.before_modify(&native, &target).unwrap();
        store.commit("install new file", &retention(50)).unwrap();

        fs::write(&target, b"now it exists").unwrap();
        assert!(target.exists());

        let outcomes = store.restore(&native, SetSelector::Latest, false).unwrap();
        assert!(outcomes[0].was_absent);
        assert!(!target.exists());
    }

    #[test]
    fn dry_run_restore_does_not_mutate() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let target = work.path().join("config.toml");
        fs::write(&target, b"original").unwrap();

        let native = NativeFileSystem;
        let mut store = SnapshotStore::open(data.path()).unwrap();
        store.before_modify(&native, &target).unwrap();
        store.commit("test run", &retention(50)).unwrap();

        fs::write(&target, b"mutated").unwrap();
        store.restore(&native, SetSelector::Latest, true).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"mutated");
    }

    #[test]
    fn short_id_prefix_resolves_uniquely() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let target = work.path().join("config.toml");
        fs::write(&target, b"original").unwrap();

        let native = NativeFileSystem;
        let mut store = SnapshotStore::open(data.path()).unwrap();
        store.before_modify(&native, &target).unwrap();
        let set = store.commit("test run", &retention(50)).unwrap().unwrap();

        let prefix = &set.id[..8];
        let resolved = store.resolve_set(SetSelector::Id(prefix)).unwrap();
        assert_eq!(resolved.id, set.id);
    }

    #[test]
    fn retention_prunes_oldest_sets_beyond_keep_last() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let native = NativeFileSystem;
        let mut store = SnapshotStore::open(data.path()).unwrap();

        for i in 0..3 {
            let target = work.path().join(format!("file-{i}.toml"));
            fs::write(&target, format!("content-{i}")).unwrap();
            store.before_modify(&native, &target).unwrap();
            store.commit(format!("run {i}"), &retention(2)).unwrap();
        }

        assert_eq!(store.sets.sets.len(), 2);
    }

    #[test]
    fn reopening_the_store_reloads_persisted_sets() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let target = work.path().join("config.toml");
        fs::write(&target, b"original").unwrap();

        let native = NativeFileSystem;
        {
            let mut store = SnapshotStore::open(data.path()).unwrap();
            store.before_modify(&native, &target).unwrap();
            store.commit("test run", &retention(50)).unwrap();
        }

        let reopened = SnapshotStore::open(data.path()).unwrap();
        assert_eq!(reopened.sets.sets.len(), 1);
    }

    #[test]
    fn after_apply_records_ownership_and_hash() {
        let data = tempdir().unwrap();
        let mut store = SnapshotStore::open(data.path()).unwrap();
        let path = PathBuf::from("/etc/example.conf");
        store.after_apply(&path, "base", "abc123");
        assert_eq!(store.owner_of(&path), Some("base"));
        assert_eq!(store.recorded_hash(&path), Some("abc123"));
    }

    #[test]
    fn ambiguous_prefix_is_snapshot_missing() {
        let data = tempdir().unwrap();
        let mut store = SnapshotStore::open(data.path()).unwrap();
        store.sets.sets.insert(
            "aaaaaaaa1111".to_string(),
            SnapshotSet {
                id: "aaaaaaaa1111".to_string(),
                reason: "one".to_string(),
                created_at: Utc::now(),
                snapshot_ids: vec![],
                insertion_index: 0,
            },
        );
        store.sets.sets.insert(
            "aaaaaaaa2222".to_string(),
            SnapshotSet {
                id: "aaaaaaaa2222".to_string(),
                reason: "two".to_string(),
                created_at: Utc::now(),
                snapshot_ids: vec![],
                insertion_index: 1,
            },
        );

        let err = store.resolve_set(SetSelector::Id("aaaaaaaa")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SnapshotMissing);
    }
}
