//! Catalog entries: one version of a named object.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use smol_str::SmolStr;
use strata_transaction::{Timestamp, TxnContext, TxnId};

use crate::error::{CatalogError, CatalogResult};
use crate::meta::CatalogMeta;
use crate::types::{ColumnDef, ObjectKind};

/// Payload of a catalog entry.
#[derive(Debug)]
pub enum EntryData {
    /// Tail sentinel of a chain. Always deleted, never carries data.
    Dummy,
    Database(DatabaseEntry),
    Table(TableEntry),
}

impl EntryData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Database(_) => "database",
            Self::Table(_) => "table",
        }
    }
}

#[derive(Debug)]
pub struct DatabaseEntry {
    db_dir: String,
    db_name: SmolStr,
    /// Table chains owned by this database version.
    tables: DashMap<SmolStr, Arc<CatalogMeta>>,
}

impl DatabaseEntry {
    pub fn new(db_dir: String, db_name: SmolStr) -> Self {
        Self {
            db_dir,
            db_name,
            tables: DashMap::new(),
        }
    }

    #[inline]
    pub fn db_dir(&self) -> &str {
        &self.db_dir
    }

    #[inline]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn table_meta(&self, name: &str) -> Option<Arc<CatalogMeta>> {
        self.tables.get(name).map(|meta| meta.value().clone())
    }

    /// Returns the chain for `name`, creating an empty one on first use.
    pub fn table_meta_or_insert(&self, name: &str) -> Arc<CatalogMeta> {
        self.tables
            .entry(SmolStr::new(name))
            .or_insert_with(|| Arc::new(CatalogMeta::table(name, &self.db_dir)))
            .value()
            .clone()
    }

    pub(crate) fn insert_table_meta(&self, meta: Arc<CatalogMeta>) {
        self.tables.insert(SmolStr::new(meta.name()), meta);
    }

    /// All table chains of this database, ordered by name.
    pub fn table_metas(&self) -> Vec<Arc<CatalogMeta>> {
        let mut metas: Vec<_> = self.tables.iter().map(|m| m.value().clone()).collect();
        metas.sort_by(|a, b| a.name().cmp(b.name()));
        metas
    }
}

#[derive(Debug)]
pub struct TableEntry {
    table_dir: String,
    table_name: SmolStr,
    columns: Vec<ColumnDef>,
}

impl TableEntry {
    pub fn new(table_dir: String, table_name: SmolStr, columns: Vec<ColumnDef>) -> Self {
        Self {
            table_dir,
            table_name,
            columns,
        }
    }

    #[inline]
    pub fn table_dir(&self) -> &str {
        &self.table_dir
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One immutable version of a catalog object.
///
/// Only `commit_ts` changes after construction, exactly once, when the
/// producing transaction commits.
#[derive(Debug)]
pub struct CatalogEntry {
    txn_id: TxnId,
    begin_ts: Timestamp,
    commit_ts: OnceLock<Timestamp>,
    deleted: bool,
    /// The producing transaction. Dangling once that transaction is reclaimed.
    txn: Weak<TxnContext>,
    data: EntryData,
}

impl CatalogEntry {
    pub fn new(
        txn_id: TxnId,
        begin_ts: Timestamp,
        txn: &Arc<TxnContext>,
        deleted: bool,
        data: EntryData,
    ) -> Self {
        Self {
            txn_id,
            begin_ts,
            commit_ts: OnceLock::new(),
            deleted,
            txn: Arc::downgrade(txn),
            data,
        }
    }

    pub(crate) fn dummy() -> Self {
        Self {
            txn_id: TxnId::NONE,
            begin_ts: Timestamp::with_ts(0),
            commit_ts: OnceLock::from(Timestamp::with_ts(0)),
            deleted: true,
            txn: Weak::new(),
            data: EntryData::Dummy,
        }
    }

    /// An entry rebuilt from its persisted form; it has no live transaction.
    pub(crate) fn restored(
        txn_id: TxnId,
        begin_ts: Timestamp,
        commit_ts: Timestamp,
        deleted: bool,
        data: EntryData,
    ) -> Self {
        Self {
            txn_id,
            begin_ts,
            commit_ts: OnceLock::from(commit_ts),
            deleted,
            txn: Weak::new(),
            data,
        }
    }

    #[inline]
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    #[inline]
    pub fn begin_ts(&self) -> Timestamp {
        self.begin_ts
    }

    /// Returns the commit timestamp, or `Timestamp::UNCOMMITTED`.
    #[inline]
    pub fn commit_ts(&self) -> Timestamp {
        self.commit_ts
            .get()
            .copied()
            .unwrap_or(Timestamp::UNCOMMITTED)
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.commit_ts().is_committed()
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[inline]
    pub fn is_dummy(&self) -> bool {
        matches!(self.data, EntryData::Dummy)
    }

    /// The producing transaction, if it has not been reclaimed yet.
    #[inline]
    pub fn txn(&self) -> Option<Arc<TxnContext>> {
        self.txn.upgrade()
    }

    #[inline]
    pub fn data(&self) -> &EntryData {
        &self.data
    }

    pub fn as_database(&self) -> CatalogResult<&DatabaseEntry> {
        match &self.data {
            EntryData::Database(db) => Ok(db),
            other => Err(CatalogError::EntryKindMismatch {
                expected: ObjectKind::Database,
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_table(&self) -> CatalogResult<&TableEntry> {
        match &self.data {
            EntryData::Table(table) => Ok(table),
            other => Err(CatalogError::EntryKindMismatch {
                expected: ObjectKind::Table,
                found: other.kind_name(),
            }),
        }
    }

    /// Stamps the commit timestamp. Returns false if it was already set.
    pub(crate) fn stamp_commit(&self, commit_ts: Timestamp) -> bool {
        self.commit_ts.set(commit_ts).is_ok()
    }
}
