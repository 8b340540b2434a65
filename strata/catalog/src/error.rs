use strata_transaction::{TxnError, TxnId, TxnState};
use thiserror::Error;

use crate::types::ObjectKind;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("duplicate {kind} `{name}`")]
    DuplicateObject { kind: ObjectKind, name: String },

    #[error("write-write conflict on {kind} `{name}`: {reason}")]
    WriteWriteConflict {
        kind: ObjectKind,
        name: String,
        reason: &'static str,
    },

    #[error("{kind} `{name}` is already dropped")]
    AlreadyDropped { kind: ObjectKind, name: String },

    #[error("{kind} `{name}` not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("{kind} `{name}` is dropped")]
    ObjectDropped { kind: ObjectKind, name: String },

    #[error("{kind} `{name}` head entry is owned by {txn_id} in unexpected state {state}")]
    InvalidEntryState {
        kind: ObjectKind,
        name: String,
        txn_id: TxnId,
        state: TxnState,
    },

    #[error("expected a {expected} entry, found {found}")]
    EntryKindMismatch {
        expected: ObjectKind,
        found: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transaction error: {0}")]
    Transaction(#[from] TxnError),
}

impl CatalogError {
    /// Returns true for outcomes a caller is expected to resolve by aborting
    /// the transaction and optionally retrying it.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::WriteWriteConflict { .. })
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
