//! The catalog: named databases, their tables, and the write sets that tie
//! versions to the transactions that produced them.

use std::sync::Arc;

use dashmap::DashMap;
use smol_str::SmolStr;
use strata_transaction::{Timestamp, TxnContext, TxnId, TxnParticipant};
use tracing::debug;

use crate::document::CatalogDocument;
use crate::entry::{CatalogEntry, EntryData, TableEntry};
use crate::error::{CatalogError, CatalogResult};
use crate::meta::CatalogMeta;
use crate::types::{ColumnDef, ObjectKind};

#[derive(Debug)]
pub struct Catalog {
    base_dir: String,
    databases: DashMap<SmolStr, Arc<CatalogMeta>>,
    /// Chains touched by each in-flight transaction.
    write_sets: DashMap<TxnId, Vec<Arc<CatalogMeta>>>,
}

impl Catalog {
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            databases: DashMap::new(),
            write_sets: DashMap::new(),
        }
    }

    #[inline]
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn create_database(
        &self,
        name: &str,
        txn: &Arc<TxnContext>,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        let meta = self
            .databases
            .entry(SmolStr::new(name))
            .or_insert_with(|| Arc::new(CatalogMeta::database(name, &self.base_dir)))
            .value()
            .clone();
        let entry = meta.create_entry(txn.txn_id(), txn.begin_ts(), txn)?;
        self.record_write(txn.txn_id(), &meta);
        Ok(entry)
    }

    pub fn drop_database(
        &self,
        name: &str,
        txn: &Arc<TxnContext>,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        let meta = self.database_meta(name)?;
        let entry = meta.drop_entry(txn.txn_id(), txn.begin_ts(), txn)?;
        self.record_write(txn.txn_id(), &meta);
        Ok(entry)
    }

    pub fn get_database(&self, name: &str, txn: &TxnContext) -> CatalogResult<Arc<CatalogEntry>> {
        self.database_meta(name)?
            .get_entry(txn.txn_id(), txn.begin_ts())
    }

    /// Every database visible to `txn`, ordered by name.
    pub fn list_databases(&self, txn: &TxnContext) -> Vec<Arc<CatalogEntry>> {
        let mut metas: Vec<_> = self.databases.iter().map(|m| m.value().clone()).collect();
        metas.sort_by(|a, b| a.name().cmp(b.name()));
        metas
            .iter()
            .filter_map(|meta| meta.get_entry(txn.txn_id(), txn.begin_ts()).ok())
            .collect()
    }

    pub fn create_table(
        &self,
        db_name: &str,
        table_name: &str,
        columns: Vec<ColumnDef>,
        txn: &Arc<TxnContext>,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        let db = self.get_database(db_name, txn)?;
        let meta = db.as_database()?.table_meta_or_insert(table_name);
        let data = EntryData::Table(TableEntry::new(
            meta.object_dir(),
            SmolStr::new(table_name),
            columns,
        ));
        let entry = meta.create_entry_with(txn.txn_id(), txn.begin_ts(), txn, data)?;
        self.record_write(txn.txn_id(), &meta);
        Ok(entry)
    }

    pub fn drop_table(
        &self,
        db_name: &str,
        table_name: &str,
        txn: &Arc<TxnContext>,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        let meta = self.table_meta(db_name, table_name, txn)?;
        let entry = meta.drop_entry(txn.txn_id(), txn.begin_ts(), txn)?;
        self.record_write(txn.txn_id(), &meta);
        Ok(entry)
    }

    pub fn get_table(
        &self,
        db_name: &str,
        table_name: &str,
        txn: &TxnContext,
    ) -> CatalogResult<Arc<CatalogEntry>> {
        self.table_meta(db_name, table_name, txn)?
            .get_entry(txn.txn_id(), txn.begin_ts())
    }

    /// Drops versions that no snapshot at or after `watermark` can reach,
    /// in every chain. Returns how many versions were removed.
    pub fn garbage_collect(&self, watermark: Timestamp) -> usize {
        let metas: Vec<_> = self.databases.iter().map(|m| m.value().clone()).collect();
        let mut removed = 0;
        for meta in metas {
            for entry in meta.entries() {
                if let EntryData::Database(db) = entry.data() {
                    for table in db.table_metas() {
                        removed += table.garbage_collect(watermark);
                    }
                }
            }
            removed += meta.garbage_collect(watermark);
        }
        debug!(watermark = watermark.raw(), removed, "catalog.gc");
        removed
    }

    pub fn to_document(&self) -> CatalogDocument {
        let mut metas: Vec<_> = self.databases.iter().map(|m| m.value().clone()).collect();
        metas.sort_by(|a, b| a.name().cmp(b.name()));
        CatalogDocument {
            base_dir: self.base_dir.clone(),
            databases: metas.iter().map(|meta| meta.serialize()).collect(),
        }
    }

    pub fn from_document(doc: &CatalogDocument) -> CatalogResult<Self> {
        let catalog = Self::new(doc.base_dir.clone());
        for db in &doc.databases {
            let meta = CatalogMeta::from_document(db)?;
            catalog
                .databases
                .insert(SmolStr::new(meta.name()), Arc::new(meta));
        }
        Ok(catalog)
    }

    pub fn to_json(&self) -> CatalogResult<String> {
        self.to_document().to_json()
    }

    pub fn from_json(json: &str) -> CatalogResult<Self> {
        Self::from_document(&CatalogDocument::from_json(json)?)
    }

    fn database_meta(&self, name: &str) -> CatalogResult<Arc<CatalogMeta>> {
        self.databases
            .get(name)
            .map(|meta| meta.value().clone())
            .ok_or_else(|| CatalogError::NotFound {
                kind: ObjectKind::Database,
                name: name.to_string(),
            })
    }

    fn table_meta(
        &self,
        db_name: &str,
        table_name: &str,
        txn: &TxnContext,
    ) -> CatalogResult<Arc<CatalogMeta>> {
        let db = self.get_database(db_name, txn)?;
        db.as_database()?
            .table_meta(table_name)
            .ok_or_else(|| CatalogError::NotFound {
                kind: ObjectKind::Table,
                name: table_name.to_string(),
            })
    }

    fn record_write(&self, txn_id: TxnId, meta: &Arc<CatalogMeta>) {
        let mut metas = self.write_sets.entry(txn_id).or_default();
        if !metas.iter().any(|m| Arc::ptr_eq(m, meta)) {
            metas.push(meta.clone());
        }
    }

    /// Number of transactions with pending catalog writes.
    pub fn pending_txn_count(&self) -> usize {
        self.write_sets.len()
    }
}

impl TxnParticipant for Catalog {
    fn on_commit(&self, txn: &TxnContext, commit_ts: Timestamp) {
        if let Some((_, metas)) = self.write_sets.remove(&txn.txn_id()) {
            let stamped: usize = metas
                .iter()
                .map(|meta| meta.commit_entries(txn.txn_id(), commit_ts))
                .sum();
            debug!(
                txn_id = txn.txn_id().raw(),
                commit_ts = commit_ts.raw(),
                stamped,
                "catalog.commit"
            );
        }
    }

    fn on_rollback(&self, txn: &TxnContext) {
        if let Some((_, metas)) = self.write_sets.remove(&txn.txn_id()) {
            let removed: usize = metas.iter().map(|meta| meta.cleanup(txn.txn_id())).sum();
            debug!(txn_id = txn.txn_id().raw(), removed, "catalog.rollback");
        }
    }
}
