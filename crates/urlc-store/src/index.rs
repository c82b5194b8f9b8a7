use std::collections::{HashMap, HashSet};

use tracing::warn;
use urlc_types::{DeletionRequest, ShortId, UrlRecord};

use crate::error::{StoreError, StoreResult};
use crate::traits::StoreStats;

/// Outcome of checking a record against the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The short id is free.
    New,
    /// The identical payload is already stored; nothing to write.
    Duplicate,
}

/// In-process lookup structure shared by the map and file backends.
///
/// Holds every record keyed by short id plus a per-owner index in insertion
/// order. It has no locking of its own; owners wrap it in a lock.
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    records: HashMap<ShortId, UrlRecord>,
    by_owner: HashMap<String, Vec<ShortId>>,
}

impl RecordIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Total records, tombstoned included.
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn admit(&self, record: &UrlRecord) -> StoreResult<Admission> {
        match self.records.get(&record.short_id) {
            None => Ok(Admission::New),
            Some(existing) if existing.payload == record.payload => Ok(Admission::Duplicate),
            Some(_) => Err(StoreError::Conflict(record.short_id.clone())),
        }
    }

    /// Validate a whole batch and return the records that must be written.
    ///
    /// Fails with `Conflict` before anything is applied if any record clashes
    /// with the index or with an earlier record of the same batch.
    pub(crate) fn plan_batch(&self, records: &[UrlRecord]) -> StoreResult<Vec<UrlRecord>> {
        let mut pending: HashMap<&ShortId, &str> = HashMap::new();
        let mut fresh = Vec::new();
        for record in records {
            if self.admit(record)? == Admission::Duplicate {
                continue;
            }
            match pending.get(&record.short_id) {
                Some(payload) if *payload == record.payload => continue,
                Some(_) => return Err(StoreError::Conflict(record.short_id.clone())),
                None => {
                    pending.insert(&record.short_id, &record.payload);
                    fresh.push(record.clone());
                }
            }
        }
        Ok(fresh)
    }

    /// Insert a record that has already been admitted as `New`.
    pub(crate) fn insert(&mut self, record: UrlRecord) {
        self.by_owner
            .entry(record.owner_id.clone())
            .or_default()
            .push(record.short_id.clone());
        self.records.insert(record.short_id.clone(), record);
    }

    /// Apply one record read back from a log during startup replay.
    ///
    /// A repeated key carrying the tombstone flag deletes the earlier record;
    /// a repeated live key is a duplicate and the first payload wins.
    pub(crate) fn replay(&mut self, record: UrlRecord) {
        match self.records.get_mut(&record.short_id) {
            None => self.insert(record),
            Some(existing) if record.deleted => existing.deleted = true,
            Some(existing) => {
                if existing.payload != record.payload {
                    warn!(
                        short_id = %record.short_id,
                        "log repeats a short id with different content; keeping the first"
                    );
                }
            }
        }
    }

    pub(crate) fn resolve(&self, short_id: &ShortId) -> StoreResult<String> {
        match self.records.get(short_id) {
            None => Err(StoreError::NotFound(short_id.to_string())),
            Some(record) if record.deleted => Err(StoreError::Gone(short_id.clone())),
            Some(record) => Ok(record.payload.clone()),
        }
    }

    pub(crate) fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<UrlRecord>> {
        let listed: Vec<UrlRecord> = self
            .by_owner
            .get(owner_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .filter(|record| !record.deleted)
            .cloned()
            .collect();
        if listed.is_empty() {
            return Err(StoreError::NotFound(format!("records of owner {owner_id:?}")));
        }
        Ok(listed)
    }

    /// Tombstoned copies of the live records `requests` may delete.
    pub(crate) fn plan_deletions(&self, requests: &[DeletionRequest]) -> Vec<UrlRecord> {
        let mut seen = HashSet::new();
        requests
            .iter()
            .filter_map(|req| self.records.get(&req.short_id).map(|rec| (req, rec)))
            .filter(|(req, rec)| !rec.deleted && rec.owned_by(&req.owner_id))
            .filter(|(req, _)| seen.insert(req.short_id.clone()))
            .map(|(_, rec)| rec.tombstoned())
            .collect()
    }

    pub(crate) fn tombstone(&mut self, short_id: &ShortId) {
        if let Some(record) = self.records.get_mut(short_id) {
            record.deleted = true;
        }
    }

    pub(crate) fn stats(&self) -> StoreStats {
        StoreStats {
            urls: self.records.values().filter(|r| !r.deleted).count() as u64,
            users: self.by_owner.keys().filter(|o| !o.is_empty()).count() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, payload: &str, owner: &str) -> UrlRecord {
        UrlRecord::new(ShortId::new_unchecked(id), payload, owner)
    }

    #[test]
    fn admit_distinguishes_duplicate_from_conflict() {
        let mut index = RecordIndex::new();
        index.insert(rec("a", "https://a", "u"));
        assert_eq!(index.admit(&rec("b", "https://b", "u")).unwrap(), Admission::New);
        assert_eq!(
            index.admit(&rec("a", "https://a", "other")).unwrap(),
            Admission::Duplicate
        );
        assert!(matches!(
            index.admit(&rec("a", "https://x", "u")),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn plan_batch_dedups_and_detects_intra_batch_conflict() {
        let mut index = RecordIndex::new();
        index.insert(rec("a", "https://a", "u"));

        let plan = index
            .plan_batch(&[
                rec("a", "https://a", "u"),
                rec("b", "https://b", "u"),
                rec("b", "https://b", "u"),
            ])
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].short_id.as_str(), "b");

        let clash = index.plan_batch(&[rec("c", "https://c", "u"), rec("c", "https://d", "u")]);
        assert!(matches!(clash, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn tombstone_hides_payload_and_listing() {
        let mut index = RecordIndex::new();
        index.insert(rec("a", "https://a", "u"));
        index.insert(rec("b", "https://b", "u"));
        index.tombstone(&ShortId::new_unchecked("a"));

        assert!(matches!(
            index.resolve(&ShortId::new_unchecked("a")),
            Err(StoreError::Gone(_))
        ));
        let listed = index.list_by_owner("u").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].payload, "https://b");
        assert_eq!(index.stats(), StoreStats { urls: 1, users: 1 });
    }

    #[test]
    fn plan_deletions_checks_owner_and_liveness() {
        let mut index = RecordIndex::new();
        index.insert(rec("a", "https://a", "u1"));
        index.insert(rec("b", "https://b", "u2"));
        index.insert(rec("c", "https://c", "u1"));
        index.tombstone(&ShortId::new_unchecked("c"));

        let plan = index.plan_deletions(&[
            DeletionRequest::new(ShortId::new_unchecked("a"), "u1"),
            DeletionRequest::new(ShortId::new_unchecked("a"), "u1"),
            DeletionRequest::new(ShortId::new_unchecked("b"), "u1"),
            DeletionRequest::new(ShortId::new_unchecked("c"), "u1"),
            DeletionRequest::new(ShortId::new_unchecked("zz"), "u1"),
        ]);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].short_id.as_str(), "a");
        assert!(plan[0].deleted);
    }

    #[test]
    fn replay_applies_tombstones_and_keeps_first_payload() {
        let mut index = RecordIndex::new();
        let first = rec("a", "https://a", "u");
        index.replay(first.clone());
        index.replay(rec("a", "https://other", "u"));
        assert_eq!(index.resolve(&first.short_id).unwrap(), "https://a");

        index.replay(first.tombstoned());
        assert!(matches!(index.resolve(&first.short_id), Err(StoreError::Gone(_))));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_owner_lists_not_found() {
        let index = RecordIndex::new();
        assert!(matches!(index.list_by_owner("nobody"), Err(StoreError::NotFound(_))));
    }
}
