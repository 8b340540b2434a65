//! Embedded catalog database: transactional DDL over multi-version database
//! and table definitions.

mod database;
mod error;

pub use database::{DEFAULT_BASE_DIR, Database, DatabaseConfig};
pub use error::{Error, Result};
pub use strata_catalog::{
    Catalog, CatalogEntry, CatalogError, ColumnDef, DataType, DatabaseEntry, ObjectKind,
    TableEntry,
};
pub use strata_transaction::{Timestamp, TxnContext, TxnError, TxnId, TxnState};
