//! Persisted form of the catalog.
//!
//! Chains are written with their full history, newest version first, so a
//! durability layer can rebuild them exactly. Dummy sentinels are not written.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strata_transaction::{Timestamp, TxnId};

use crate::entry::{CatalogEntry, DatabaseEntry, EntryData, TableEntry};
use crate::error::{CatalogError, CatalogResult};
use crate::meta::CatalogMeta;
use crate::types::{ColumnDef, ObjectKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub base_dir: String,
    pub databases: Vec<MetaDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDocument {
    pub kind: ObjectKind,
    pub name: String,
    pub base_dir: String,
    pub entries: Vec<EntryDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDocument {
    pub txn_id: TxnId,
    pub begin_ts: Timestamp,
    pub commit_ts: Timestamp,
    pub deleted: bool,
    pub payload: PayloadDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadDocument {
    Database {
        db_dir: String,
        db_name: String,
        tables: Vec<MetaDocument>,
    },
    Table {
        table_dir: String,
        table_name: String,
        columns: Vec<ColumnDef>,
    },
}

impl PayloadDocument {
    fn kind(&self) -> ObjectKind {
        match self {
            Self::Database { .. } => ObjectKind::Database,
            Self::Table { .. } => ObjectKind::Table,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Database { .. } => "database",
            Self::Table { .. } => "table",
        }
    }
}

impl CatalogDocument {
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> CatalogResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The largest transaction id recorded anywhere in the document.
    pub fn max_txn_id(&self) -> TxnId {
        self.databases
            .iter()
            .map(MetaDocument::max_txn_id)
            .max()
            .unwrap_or(TxnId::NONE)
    }

    /// The largest begin or commit timestamp recorded in the document.
    pub fn max_ts(&self) -> Timestamp {
        self.databases
            .iter()
            .map(MetaDocument::max_ts)
            .max()
            .unwrap_or_default()
    }
}

impl MetaDocument {
    fn nested(&self) -> impl Iterator<Item = &MetaDocument> {
        self.entries.iter().flat_map(|entry| match &entry.payload {
            PayloadDocument::Database { tables, .. } => tables.as_slice(),
            PayloadDocument::Table { .. } => &[][..],
        })
    }

    pub fn max_txn_id(&self) -> TxnId {
        let own = self.entries.iter().map(|e| e.txn_id);
        let nested = self.nested().map(MetaDocument::max_txn_id);
        own.chain(nested).max().unwrap_or(TxnId::NONE)
    }

    pub fn max_ts(&self) -> Timestamp {
        let own = self.entries.iter().flat_map(|e| {
            [e.begin_ts, e.commit_ts]
                .into_iter()
                .filter(Timestamp::is_committed)
        });
        let nested = self.nested().map(MetaDocument::max_ts);
        own.chain(nested).max().unwrap_or_default()
    }
}

impl CatalogMeta {
    /// Writes the chain and every version in it, newest first.
    pub fn serialize(&self) -> MetaDocument {
        let entries = self
            .entries()
            .iter()
            .filter_map(|entry| entry_document(entry))
            .collect();
        MetaDocument {
            kind: self.kind(),
            name: self.name().to_string(),
            base_dir: self.base_dir().to_string(),
            entries,
        }
    }

    /// Rebuilds a chain. Versions that were never committed are discarded;
    /// the rest keep their order.
    pub fn from_document(doc: &MetaDocument) -> CatalogResult<Self> {
        let meta = CatalogMeta::new(doc.kind, &doc.name, &doc.base_dir);
        let mut entries = Vec::with_capacity(doc.entries.len());
        for entry in doc.entries.iter().filter(|e| e.commit_ts.is_committed()) {
            if entry.payload.kind() != doc.kind {
                return Err(CatalogError::EntryKindMismatch {
                    expected: doc.kind,
                    found: entry.payload.kind_name(),
                });
            }
            entries.push(Arc::new(CatalogEntry::restored(
                entry.txn_id,
                entry.begin_ts,
                entry.commit_ts,
                entry.deleted,
                entry_data(&entry.payload)?,
            )));
        }
        meta.restore_entries(entries);
        Ok(meta)
    }
}

fn entry_document(entry: &CatalogEntry) -> Option<EntryDocument> {
    let payload = match entry.data() {
        EntryData::Dummy => return None,
        EntryData::Database(db) => PayloadDocument::Database {
            db_dir: db.db_dir().to_string(),
            db_name: db.db_name().to_string(),
            tables: db.table_metas().iter().map(|t| t.serialize()).collect(),
        },
        EntryData::Table(table) => PayloadDocument::Table {
            table_dir: table.table_dir().to_string(),
            table_name: table.table_name().to_string(),
            columns: table.columns().to_vec(),
        },
    };
    Some(EntryDocument {
        txn_id: entry.txn_id(),
        begin_ts: entry.begin_ts(),
        commit_ts: entry.commit_ts(),
        deleted: entry.is_deleted(),
        payload,
    })
}

fn entry_data(payload: &PayloadDocument) -> CatalogResult<EntryData> {
    Ok(match payload {
        PayloadDocument::Database {
            db_dir,
            db_name,
            tables,
        } => {
            let db = DatabaseEntry::new(db_dir.clone(), SmolStr::new(db_name));
            for table in tables {
                db.insert_table_meta(Arc::new(CatalogMeta::from_document(table)?));
            }
            EntryData::Database(db)
        }
        PayloadDocument::Table {
            table_dir,
            table_name,
            columns,
        } => EntryData::Table(TableEntry::new(
            table_dir.clone(),
            SmolStr::new(table_name),
            columns.clone(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use strata_transaction::{TxnContext, TxnState};

    use super::*;
    use crate::types::DataType;

    fn txn(id: u64, begin_ts: u64) -> Arc<TxnContext> {
        Arc::new(TxnContext::new(TxnId::new(id), Timestamp::with_ts(begin_ts)))
    }

    fn commit(meta: &CatalogMeta, txn: &Arc<TxnContext>, commit_ts: u64) {
        meta.commit_entries(txn.txn_id(), Timestamp::with_ts(commit_ts));
        *txn.lock() = TxnState::Committed;
    }

    /// db1: created by txn 1 (ts 15), dropped by txn 2 (ts 25), re-created by
    /// txn 3 which has not committed yet.
    fn history() -> CatalogMeta {
        let meta = CatalogMeta::database("db1", "/data");
        let t1 = txn(1, 10);
        meta.create_entry(t1.txn_id(), t1.begin_ts(), &t1).unwrap();
        commit(&meta, &t1, 15);
        let t2 = txn(2, 20);
        meta.drop_entry(t2.txn_id(), t2.begin_ts(), &t2).unwrap();
        commit(&meta, &t2, 25);
        let t3 = txn(3, 30);
        meta.create_entry(t3.txn_id(), t3.begin_ts(), &t3).unwrap();
        meta
    }

    #[test]
    fn test_serialize_emits_full_history() {
        let meta = history();
        let doc = meta.serialize();

        assert_eq!(doc.kind, ObjectKind::Database);
        assert_eq!(doc.name, "db1");
        assert_eq!(doc.base_dir, "/data");
        assert_eq!(doc.entries.len(), meta.entry_count() - 1);

        let ids: Vec<_> = doc.entries.iter().map(|e| e.txn_id.raw()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(doc.entries[0].commit_ts, Timestamp::UNCOMMITTED);
        assert!(doc.entries[1].deleted);
        assert_eq!(doc.entries[2].commit_ts, Timestamp::with_ts(15));
        assert!(matches!(
            &doc.entries[2].payload,
            PayloadDocument::Database { db_dir, .. } if db_dir == "/data/db1"
        ));
    }

    #[test]
    fn test_restore_keeps_committed_history() {
        let doc = history().serialize();
        let restored = CatalogMeta::from_document(&doc).unwrap();

        // txn 3 never committed and is gone; the Dummy is back at the tail.
        let entries = restored.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].txn_id(), TxnId::new(2));
        assert_eq!(entries[1].txn_id(), TxnId::new(1));
        assert!(entries[2].is_dummy());
        assert!(entries[0].txn().is_none());

        let reader = txn(9, 40);
        assert!(matches!(
            restored.get_entry(reader.txn_id(), reader.begin_ts()),
            Err(CatalogError::ObjectDropped { .. })
        ));
        let old_reader = txn(8, 20);
        assert!(
            restored
                .get_entry(old_reader.txn_id(), old_reader.begin_ts())
                .is_ok()
        );

        // Serializing again reproduces the committed part of the history.
        let again = restored.serialize();
        assert_eq!(again.entries, doc.entries[1..].to_vec());
    }

    #[test]
    fn test_nested_tables_round_trip_through_json() {
        let meta = CatalogMeta::database("db1", "/data");
        let t1 = txn(1, 10);
        let db = meta.create_entry(t1.txn_id(), t1.begin_ts(), &t1).unwrap();
        let table_meta = db.as_database().unwrap().table_meta_or_insert("orders");
        let columns = vec![
            ColumnDef::new("id", DataType::Int64, false),
            ColumnDef::new("note", DataType::Varchar, true),
        ];
        let data = EntryData::Table(TableEntry::new(
            table_meta.object_dir(),
            "orders".into(),
            columns.clone(),
        ));
        table_meta
            .create_entry_with(t1.txn_id(), t1.begin_ts(), &t1, data)
            .unwrap();
        commit(&meta, &t1, 15);
        commit(&table_meta, &t1, 15);

        let json = serde_json::to_string(&meta.serialize()).unwrap();
        let doc: MetaDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.max_txn_id(), TxnId::new(1));
        assert_eq!(doc.max_ts(), Timestamp::with_ts(15));

        let restored = CatalogMeta::from_document(&doc).unwrap();
        let reader = txn(2, 20);
        let db = restored
            .get_entry(reader.txn_id(), reader.begin_ts())
            .unwrap();
        let table = db
            .as_database()
            .unwrap()
            .table_meta("orders")
            .unwrap()
            .get_entry(reader.txn_id(), reader.begin_ts())
            .unwrap();
        let table = table.as_table().unwrap();
        assert_eq!(table.table_dir(), "/data/db1/orders");
        assert_eq!(table.columns(), columns.as_slice());
    }

    #[test]
    fn test_restore_rejects_mismatched_payload() {
        let mut doc = history().serialize();
        doc.kind = ObjectKind::Table;
        assert!(matches!(
            CatalogMeta::from_document(&doc),
            Err(CatalogError::EntryKindMismatch {
                expected: ObjectKind::Table,
                found: "database"
            })
        ));
    }
}
