//! Schema-versioned, file-per-kind record store (component B).
//!
//! Each kind is persisted as a JSON array under a filename that encodes the
//! schema version (`v2.2_jobs.json`, `v3.1_deleted_images.json`). Unknown
//! fields are dropped silently on load (forward compatibility); a parse
//! failure renames the existing file with a timestamp prefix and replaces it
//! with an empty store (crash recovery), logging a structured event so the
//! data loss is observable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::HasId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordStoreError {
    #[error("io error on `{path}`: {message}")]
    Io { path: String, message: String },
    #[error("serialization error on `{path}`: {message}")]
    Serde { path: String, message: String },
}

/// A single JSON-file-backed list of records for one entity kind, keyed by
/// id. Backed by a `Vec` rather than a hash map so `iter()` preserves
/// insertion order — the remote-node scheduler's (§4.E) tie-break on equal
/// load depends on that order being stable across runs.
///
/// Mutators must serialize the read-modify-write, including the file
/// rewrite (§5); a single `RwLock` around the in-memory list plus the fact
/// that every mutation rewrites the whole file under that same lock gives
/// read-your-writes semantics to any observer sharing this instance.
pub struct RecordStore<T> {
    path: PathBuf,
    records: RwLock<Vec<T>>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Clone + HasId,
{
    /// `data_store_root` is `HACK_DATA_STORE`; `versioned_filename` is e.g.
    /// `v2.2_jobs.json`.
    pub fn open(data_store_root: &Path, versioned_filename: &str) -> Result<Self, RecordStoreError> {
        let path = data_store_root.join(versioned_filename);
        let records = load_or_recover(&path)?;
        Ok(RecordStore {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.records
            .read()
            .expect("record store lock poisoned")
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().expect("record store lock poisoned").iter().any(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("record store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in insertion order.
    pub fn iter(&self) -> Vec<T> {
        self.records.read().expect("record store lock poisoned").clone()
    }

    /// Inserts a new record at the end, or replaces an existing one in
    /// place, preserving its original position.
    pub fn put(&self, record: T) -> Result<(), RecordStoreError> {
        let mut guard = self.records.write().expect("record store lock poisoned");
        match guard.iter().position(|r| r.id() == record.id()) {
            Some(index) => guard[index] = record,
            None => guard.push(record),
        }
        persist(&self.path, guard.iter())
    }

    pub fn delete(&self, id: &str) -> Result<(), RecordStoreError> {
        let mut guard = self.records.write().expect("record store lock poisoned");
        guard.retain(|r| r.id() != id);
        persist(&self.path, guard.iter())
    }

    /// Empty the store and persist, e.g. for test fixtures.
    pub fn reset(&self) -> Result<(), RecordStoreError> {
        let mut guard = self.records.write().expect("record store lock poisoned");
        guard.clear();
        persist(&self.path, guard.iter())
    }
}

fn load_or_recover<T>(path: &Path) -> Result<Vec<T>, RecordStoreError>
where
    T: DeserializeOwned + HasId,
{
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).map_err(|e| RecordStoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    match serde_json::from_str::<Vec<T>>(&content) {
        Ok(records) => Ok(records),
        Err(e) => {
            let corrupt_name = format!(
                "{}_{}.corrupt",
                Utc::now().format("%Y%m%dT%H%M%SZ"),
                path.file_name().and_then(|n| n.to_str()).unwrap_or("records")
            );
            let corrupt_path = path.with_file_name(corrupt_name);

            error!(
                path = %path.display(),
                renamed_to = %corrupt_path.display(),
                parse_error = %e,
                "record store file failed to parse; renaming and starting from an empty store"
            );

            fs::rename(path, &corrupt_path).map_err(|e| RecordStoreError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

            Ok(Vec::new())
        }
    }
}

fn persist<'a, T, I>(path: &Path, records: I) -> Result<(), RecordStoreError>
where
    T: Serialize + 'a,
    I: Iterator<Item = &'a T>,
{
    let records: Vec<&T> = records.collect();
    let content = serde_json::to_vec_pretty(&records).map_err(|e| RecordStoreError::Serde {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RecordStoreError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    }

    // Atomic rewrite: write to a sibling temp file, then rename into place,
    // so a concurrent reader never observes a partially-written file.
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content).map_err(|e| RecordStoreError::Io {
        path: tmp_path.display().to_string(),
        message: e.to_string(),
    })?;
    fs::rename(&tmp_path, path).map_err(|e| RecordStoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        id: String,
        name: String,
        #[serde(default)]
        unknown_future_field: Option<String>,
    }

    impl HasId for Dummy {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn test_put_get_delete_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let store: RecordStore<Dummy> = RecordStore::open(dir.path(), "v1.0_dummies.json").expect("open");

        let record = Dummy {
            id: "abc".to_string(),
            name: "one".to_string(),
            unknown_future_field: None,
        };
        store.put(record.clone()).expect("put");

        assert_eq!(store.get("abc"), Some(record));
        assert_eq!(store.len(), 1);
        assert!(store.contains("abc"));

        store.delete("abc").expect("delete");
        assert_eq!(store.get("abc"), None);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_read_your_writes_across_instances() {
        let dir = tempdir().expect("tempdir");
        let filename = "v1.0_dummies.json";
        let writer: RecordStore<Dummy> = RecordStore::open(dir.path(), filename).expect("open");
        writer
            .put(Dummy {
                id: "id-1".to_string(),
                name: "first".to_string(),
                unknown_future_field: None,
            })
            .expect("put");

        let reader: RecordStore<Dummy> = RecordStore::open(dir.path(), filename).expect("open");
        assert_eq!(reader.len(), 1);
        assert!(reader.contains("id-1"));
    }

    #[test]
    fn test_corrupt_file_is_renamed_and_store_starts_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("v1.0_dummies.json");
        fs::write(&path, b"not valid json array").expect("write garbage");

        let store: RecordStore<Dummy> = RecordStore::open(dir.path(), "v1.0_dummies.json").expect("open");
        assert_eq!(store.len(), 0);
        assert!(!path.exists());

        let corrupt_files: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".corrupt"))
            .collect();
        assert_eq!(corrupt_files.len(), 1);
    }

    #[test]
    fn test_unknown_fields_are_dropped_on_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("v1.0_dummies.json");
        fs::write(
            &path,
            r#"[{"id":"id-1","name":"first","totally_unknown_field":"surprise"}]"#,
        )
        .expect("write");

        let store: RecordStore<Dummy> = RecordStore::open(dir.path(), "v1.0_dummies.json").expect("open");
        assert_eq!(
            store.get("id-1"),
            Some(Dummy {
                id: "id-1".to_string(),
                name: "first".to_string(),
                unknown_future_field: None,
            })
        );
    }

    #[test]
    fn test_missing_file_loads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let store: RecordStore<Dummy> = RecordStore::open(dir.path(), "v1.0_dummies.json").expect("open");
        assert!(store.is_empty());
    }

    #[test]
    fn test_iter_preserves_insertion_order_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let filename = "v1.0_dummies.json";
        let store: RecordStore<Dummy> = RecordStore::open(dir.path(), filename).expect("open");

        for id in ["c", "a", "b"] {
            store
                .put(Dummy {
                    id: id.to_string(),
                    name: id.to_string(),
                    unknown_future_field: None,
                })
                .expect("put");
        }

        let ids: Vec<String> = store.iter().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let reopened: RecordStore<Dummy> = RecordStore::open(dir.path(), filename).expect("reopen");
        let reopened_ids: Vec<String> = reopened.iter().into_iter().map(|r| r.id).collect();
        assert_eq!(reopened_ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_put_replaces_existing_record_in_place() {
        let dir = tempdir().expect("tempdir");
        let store: RecordStore<Dummy> = RecordStore::open(dir.path(), "v1.0_dummies.json").expect("open");

        for id in ["a", "b", "c"] {
            store
                .put(Dummy {
                    id: id.to_string(),
                    name: id.to_string(),
                    unknown_future_field: None,
                })
                .expect("put");
        }

        store
            .put(Dummy {
                id: "b".to_string(),
                name: "b-updated".to_string(),
                unknown_future_field: None,
            })
            .expect("put");

        let names: Vec<String> = store.iter().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b-updated", "c"]);
    }
}
