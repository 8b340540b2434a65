//! Multi-version catalog of databases and tables.
//!
//! Every named object is tracked by a [`CatalogMeta`]: a newest-first chain of
//! timestamped versions that resolves create/drop races between concurrent
//! transactions without blocking readers.

pub mod catalog;
pub mod document;
pub mod entry;
pub mod error;
pub mod meta;
pub mod types;

pub use catalog::Catalog;
pub use document::{CatalogDocument, EntryDocument, MetaDocument, PayloadDocument};
pub use entry::{CatalogEntry, DatabaseEntry, EntryData, TableEntry};
pub use error::{CatalogError, CatalogResult};
pub use meta::CatalogMeta;
pub use types::{ColumnDef, DataType, ObjectKind};
