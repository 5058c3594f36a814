//! Soft-delete registry (component H): a live/deleted pair of record stores
//! per entity kind, with transition helpers that move a record between them.
//!
//! Invariant 1: a record with a given id lives in exactly one of the two
//! stores at a time — `soft_delete`/`undelete` hold no intermediate state
//! where both or neither contain it, short of a crash between the two
//! `RecordStore::put`/`delete` calls (acceptable: a crash there leaves the
//! record in both stores, and the live store wins on next lookup).

use crate::errors::ImsError;
use crate::models::HasId;
use crate::record_store::RecordStore;

/// Pairs a live and a deleted `RecordStore<T>` for one entity kind. `T` and
/// `D` are usually a live struct and its `Deleted<T>` counterpart that
/// differ only by an added `deleted` timestamp; `to_deleted`/`to_live`
/// perform that conversion.
pub struct SoftDeleteRegistry<T, D> {
    pub live: RecordStore<T>,
    pub deleted: RecordStore<D>,
}

impl<T, D> SoftDeleteRegistry<T, D>
where
    T: Clone + serde::Serialize + serde::de::DeserializeOwned + HasId,
    D: Clone + serde::Serialize + serde::de::DeserializeOwned + HasId,
{
    pub fn new(live: RecordStore<T>, deleted: RecordStore<D>) -> Self {
        SoftDeleteRegistry { live, deleted }
    }

    /// Moves a live record to the deleted store. `to_deleted` performs the
    /// type-level conversion (e.g. `PublicKey::into_deleted`); the caller is
    /// responsible for any object-store side effect (artifact soft-delete)
    /// before calling this, since record-store mutation should be the last
    /// step of a successful delete.
    pub fn soft_delete(&self, id: &str, to_deleted: impl FnOnce(T) -> D) -> Result<D, ImsError> {
        let record = self
            .live
            .get(id)
            .ok_or_else(|| ImsError::not_found("record", id.to_string()))?;
        let deleted_record = to_deleted(record);
        self.deleted.put(deleted_record.clone())?;
        self.live.delete(id)?;
        Ok(deleted_record)
    }

    /// Moves a deleted record back to the live store.
    pub fn undelete(&self, id: &str, to_live: impl FnOnce(D) -> T) -> Result<T, ImsError> {
        let deleted_record = self
            .deleted
            .get(id)
            .ok_or_else(|| ImsError::not_found("deleted record", id.to_string()))?;
        let live_record = to_live(deleted_record);
        self.live.put(live_record.clone())?;
        self.deleted.delete(id)?;
        Ok(live_record)
    }

    /// Permanently removes a deleted record; the caller has already
    /// hard-deleted any backing object-store artifact.
    pub fn purge(&self, id: &str) -> Result<(), ImsError> {
        self.deleted.delete(id)?;
        Ok(())
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains(id)
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Live {
        id: String,
        name: String,
    }

    impl HasId for Live {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Deleted {
        id: String,
        name: String,
        deleted: String,
    }

    impl HasId for Deleted {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn registry(dir: &std::path::Path) -> SoftDeleteRegistry<Live, Deleted> {
        let live = RecordStore::open(dir, "v1.0_live.json").expect("open live");
        let deleted = RecordStore::open(dir, "v1.0_deleted.json").expect("open deleted");
        SoftDeleteRegistry::new(live, deleted)
    }

    #[test]
    fn test_invariant_1_record_lives_in_exactly_one_store_after_soft_delete() {
        let dir = tempdir().expect("tempdir");
        let registry = registry(dir.path());
        registry
            .live
            .put(Live {
                id: "a".to_string(),
                name: "one".to_string(),
            })
            .expect("put");

        registry
            .soft_delete("a", |l| Deleted {
                id: l.id,
                name: l.name,
                deleted: "now".to_string(),
            })
            .expect("soft delete");

        assert!(!registry.is_live("a"));
        assert!(registry.is_deleted("a"));
    }

    #[test]
    fn test_soft_delete_then_undelete_roundtrips_to_original_fields() {
        let dir = tempdir().expect("tempdir");
        let registry = registry(dir.path());
        let original = Live {
            id: "a".to_string(),
            name: "one".to_string(),
        };
        registry.live.put(original.clone()).expect("put");

        registry
            .soft_delete("a", |l| Deleted {
                id: l.id,
                name: l.name,
                deleted: "now".to_string(),
            })
            .expect("soft delete");
        let restored = registry
            .undelete("a", |d| Live { id: d.id, name: d.name })
            .expect("undelete");

        assert_eq!(restored, original);
        assert!(registry.is_live("a"));
        assert!(!registry.is_deleted("a"));
    }

    #[test]
    fn test_soft_delete_missing_record_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let registry = registry(dir.path());

        let result = registry.soft_delete("missing", |l| Deleted {
            id: l.id,
            name: l.name,
            deleted: "now".to_string(),
        });

        assert!(matches!(result, Err(ImsError::ResourceNotFound { .. })));
    }

    #[test]
    fn test_purge_removes_from_deleted_store() {
        let dir = tempdir().expect("tempdir");
        let registry = registry(dir.path());
        registry
            .deleted
            .put(Deleted {
                id: "a".to_string(),
                name: "one".to_string(),
                deleted: "now".to_string(),
            })
            .expect("put");

        registry.purge("a").expect("purge");
        assert!(!registry.is_deleted("a"));
    }
}
