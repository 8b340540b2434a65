//! Version chains of catalog objects.
//!
//! A [`CatalogMeta`] owns every version of one named object, newest first.
//! The head defines the current state: writers inspect it to detect
//! duplicates and write-write conflicts, readers walk the chain to find the
//! newest version visible to their snapshot.
//!
//! Lock order is always the chain lock first, then the lock of the
//! transaction owning an uncommitted head.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use smol_str::SmolStr;
use strata_transaction::{Timestamp, TxnContext, TxnId, TxnState};
use tracing::{debug, error, trace};

use crate::entry::{CatalogEntry, DatabaseEntry, EntryData, TableEntry};
use crate::error::{CatalogError, CatalogResult};
use crate::types::ObjectKind;

pub struct CatalogMeta {
    kind: ObjectKind,
    name: SmolStr,
    base_dir: String,
    entries: RwLock<VecDeque<Arc<CatalogEntry>>>,
}

impl CatalogMeta {
    pub fn new(kind: ObjectKind, name: &str, base_dir: &str) -> Self {
        Self {
            kind,
            name: SmolStr::new(name),
            base_dir: base_dir.to_string(),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    #[inline]
    pub fn database(name: &str, base_dir: &str) -> Self {
        Self::new(ObjectKind::Database, name, base_dir)
    }

    #[inline]
    pub fn table(name: &str, base_dir: &str) -> Self {
        Self::new(ObjectKind::Table, name, base_dir)
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Storage location of the object: `base_dir/name`.
    pub fn object_dir(&self) -> String {
        format!("{}/{}", self.base_dir, self.name)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Snapshot of the chain, newest first, Dummy included.
    pub fn entries(&self) -> Vec<Arc<CatalogEntry>> {
        self.entries.read().iter().cloned().collect()
    }

    /// The payload a fresh version of this object starts with.
    pub fn default_data(&self) -> EntryData {
        match self.kind {
            ObjectKind::Database => {
                EntryData::Database(DatabaseEntry::new(self.object_dir(), self.name.clone()))
            }
            ObjectKind::Table => EntryData::Table(TableEntry::new(
                self.object_dir(),
                self.name.clone(),
                Vec::new(),
            )),
        }
    }

    /// Creates a new live version of the object for `txn_id`.
    #[inline]
    pub fn create_entry(
        &self,
        txn_id: TxnId,
        begin_ts: Timestamp,
        txn: &Arc<TxnContext>,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        self.create_entry_with(txn_id, begin_ts, txn, self.default_data())
    }

    /// Like [`Self::create_entry`], with an explicit payload.
    pub fn create_entry_with(
        &self,
        txn_id: TxnId,
        begin_ts: Timestamp,
        txn: &Arc<TxnContext>,
        data: EntryData,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        let entry = Arc::new(CatalogEntry::new(txn_id, begin_ts, txn, false, data));
        let mut entries = self.entries.write();

        // Each pass either returns or discards at least one stale version.
        loop {
            let Some(head) = entries.front().cloned() else {
                entries.push_back(Arc::new(CatalogEntry::dummy()));
                entries.push_front(entry.clone());
                trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.create.first");
                return Ok(entry);
            };

            // The object was never created, or all of its versions were purged.
            if head.is_dummy() {
                entries.push_front(entry.clone());
                trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.create.after_dummy");
                return Ok(entry);
            }

            if head.is_committed() {
                if begin_ts > head.commit_ts() {
                    if head.is_deleted() {
                        entries.push_front(entry.clone());
                        trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.create.after_drop");
                        return Ok(entry);
                    }
                    trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.create.duplicate");
                    return Err(self.duplicate());
                }
                trace!(
                    name = %self.name,
                    txn_id = txn_id.raw(),
                    begin_ts = begin_ts.raw(),
                    head_commit_ts = head.commit_ts().raw(),
                    "catalog.create.ww_conflict"
                );
                return Err(self.conflict(
                    "a version committed after the transaction started",
                ));
            }

            // The owner was reclaimed without committing: its versions are abandoned.
            let Some(head_txn) = head.txn() else {
                let removed = discard(&mut entries, head.txn_id());
                trace!(
                    name = %self.name,
                    txn_id = txn_id.raw(),
                    head_txn_id = head.txn_id().raw(),
                    removed,
                    "catalog.create.discard_orphan"
                );
                continue;
            };

            let mut head_state = head_txn.lock();
            let state = *head_state;
            match state {
                TxnState::Started => match head.txn_id().cmp(&txn_id) {
                    Ordering::Less => {
                        trace!(
                            name = %self.name,
                            txn_id = txn_id.raw(),
                            head_txn_id = head.txn_id().raw(),
                            "catalog.create.ww_conflict"
                        );
                        return Err(self.conflict("an older uncommitted version exists"));
                    }
                    Ordering::Greater => {
                        // The older transaction has priority over the head's owner.
                        // The eviction stands even if this Create then fails on
                        // the head underneath.
                        *head_state = TxnState::Rollbacking;
                        let removed = discard(&mut entries, head.txn_id());
                        debug!(
                            name = %self.name,
                            txn_id = txn_id.raw(),
                            evicted_txn_id = head.txn_id().raw(),
                            removed,
                            "catalog.create.evict"
                        );
                    }
                    Ordering::Equal => {
                        if head.is_deleted() {
                            entries.push_front(entry.clone());
                            trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.create.recreate");
                            return Ok(entry);
                        }
                        trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.create.duplicate");
                        return Err(self.duplicate());
                    }
                },
                TxnState::Committing | TxnState::Committed => {
                    trace!(
                        name = %self.name,
                        txn_id = txn_id.raw(),
                        head_txn_id = head.txn_id().raw(),
                        "catalog.create.ww_conflict"
                    );
                    return Err(self.conflict("a committing version exists"));
                }
                TxnState::Rollbacking | TxnState::Rollbacked => {
                    let removed = discard(&mut entries, head.txn_id());
                    trace!(
                        name = %self.name,
                        txn_id = txn_id.raw(),
                        head_txn_id = head.txn_id().raw(),
                        removed,
                        "catalog.create.discard_rollback"
                    );
                }
                state => {
                    error!(
                        name = %self.name,
                        head_txn_id = head.txn_id().raw(),
                        %state,
                        "catalog.create.invalid_state"
                    );
                    return Err(CatalogError::InvalidEntryState {
                        kind: self.kind,
                        name: self.name.to_string(),
                        txn_id: head.txn_id(),
                        state,
                    });
                }
            }
        }
    }

    /// Drops the object for `txn_id`.
    ///
    /// Returns the inserted tombstone, or, when the head is the caller's own
    /// uncommitted version, the removed version.
    pub fn drop_entry(
        &self,
        txn_id: TxnId,
        begin_ts: Timestamp,
        txn: &Arc<TxnContext>,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        let mut entries = self.entries.write();
        let head = match entries.front() {
            Some(head) if !head.is_dummy() => head.clone(),
            _ => {
                trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.drop.not_found");
                return Err(self.not_found());
            }
        };

        if head.is_committed() {
            if begin_ts > head.commit_ts() {
                if head.is_deleted() {
                    trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.drop.already_dropped");
                    return Err(CatalogError::AlreadyDropped {
                        kind: self.kind,
                        name: self.name.to_string(),
                    });
                }
                let tombstone = Arc::new(CatalogEntry::new(
                    txn_id,
                    begin_ts,
                    txn,
                    true,
                    self.default_data(),
                ));
                entries.push_front(tombstone.clone());
                trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.drop.tombstone");
                return Ok(tombstone);
            }
            trace!(
                name = %self.name,
                txn_id = txn_id.raw(),
                begin_ts = begin_ts.raw(),
                head_commit_ts = head.commit_ts().raw(),
                "catalog.drop.ww_conflict"
            );
            return Err(self.conflict(
                "a version committed after the transaction started",
            ));
        }

        // Drop never evicts: any other uncommitted head is a conflict.
        if head.txn_id() == txn_id {
            entries.pop_front();
            trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.drop.own_pending");
            Ok(head)
        } else {
            trace!(
                name = %self.name,
                txn_id = txn_id.raw(),
                head_txn_id = head.txn_id().raw(),
                "catalog.drop.ww_conflict"
            );
            Err(self.conflict("another uncommitted version exists"))
        }
    }

    /// Removes every version produced by `txn_id`. Returns how many were
    /// removed.
    pub fn cleanup(&self, txn_id: TxnId) -> usize {
        let removed = discard(&mut self.entries.write(), txn_id);
        if removed > 0 {
            trace!(name = %self.name, txn_id = txn_id.raw(), removed, "catalog.cleanup");
        }
        removed
    }

    /// Returns the newest version visible to the snapshot `begin_ts` of
    /// transaction `txn_id`.
    pub fn get_entry(&self, txn_id: TxnId, begin_ts: Timestamp) -> CatalogResult<Arc<CatalogEntry>> {
        let entries = self.entries.read();
        for entry in entries.iter() {
            if entry.is_dummy() {
                break;
            }
            let visible = if entry.is_committed() {
                begin_ts > entry.commit_ts()
            } else {
                entry.txn_id() == txn_id
            };
            if !visible {
                continue;
            }
            if entry.is_deleted() {
                trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.get.dropped");
                return Err(CatalogError::ObjectDropped {
                    kind: self.kind,
                    name: self.name.to_string(),
                });
            }
            return Ok(entry.clone());
        }
        trace!(name = %self.name, txn_id = txn_id.raw(), "catalog.get.not_found");
        Err(self.not_found())
    }

    /// Stamps `commit_ts` on every uncommitted version of `txn_id`.
    pub fn commit_entries(&self, txn_id: TxnId, commit_ts: Timestamp) -> usize {
        let entries = self.entries.write();
        entries
            .iter()
            .filter(|entry| !entry.is_dummy() && entry.txn_id() == txn_id)
            .filter(|entry| entry.stamp_commit(commit_ts))
            .count()
    }

    /// Drops committed versions that no snapshot at or after `watermark` can
    /// reach. Returns how many were removed.
    pub fn garbage_collect(&self, watermark: Timestamp) -> usize {
        let mut entries = self.entries.write();
        let Some(visible) = entries.iter().position(|entry| {
            !entry.is_dummy() && entry.is_committed() && entry.commit_ts() < watermark
        }) else {
            return 0;
        };

        let before = entries.len();
        let mut index = 0;
        entries.retain(|entry| {
            let keep = index <= visible || entry.is_dummy() || !entry.is_committed();
            index += 1;
            keep
        });
        let removed = before - entries.len();
        if removed > 0 {
            trace!(name = %self.name, removed, "catalog.gc");
        }
        removed
    }

    /// Replaces the chain content. Used when rebuilding from a document.
    pub(crate) fn restore_entries(&self, restored: Vec<Arc<CatalogEntry>>) {
        let mut entries = self.entries.write();
        entries.clear();
        entries.extend(restored);
        entries.push_back(Arc::new(CatalogEntry::dummy()));
    }

    fn duplicate(&self) -> CatalogError {
        CatalogError::DuplicateObject {
            kind: self.kind,
            name: self.name.to_string(),
        }
    }

    fn not_found(&self) -> CatalogError {
        CatalogError::NotFound {
            kind: self.kind,
            name: self.name.to_string(),
        }
    }

    fn conflict(&self, reason: &'static str) -> CatalogError {
        CatalogError::WriteWriteConflict {
            kind: self.kind,
            name: self.name.to_string(),
            reason,
        }
    }
}

/// Removes every version of `txn_id`, leaving the Dummy in place.
fn discard(entries: &mut VecDeque<Arc<CatalogEntry>>, txn_id: TxnId) -> usize {
    let before = entries.len();
    entries.retain(|entry| entry.is_dummy() || entry.txn_id() != txn_id);
    before - entries.len()
}

impl fmt::Display for CatalogMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} meta, base dir: {}, name: {}, entry count: {}",
            self.kind,
            self.base_dir,
            self.name,
            self.entry_count()
        )
    }
}

impl fmt::Debug for CatalogMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogMeta")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("base_dir", &self.base_dir)
            .field("entry_count", &self.entry_count())
            .finish()
    }
}
