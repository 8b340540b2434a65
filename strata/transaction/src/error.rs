use thiserror::Error;

use crate::context::TxnState;
use crate::timestamp::TxnId;

#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("commit-ts overflow, reached {0}")]
    CommitTsOverflow(u64),

    #[error("txn-id overflow, reached {0}")]
    TxnIdOverflow(u64),

    #[error("commit-ts of {0} is already assigned")]
    CommitTsAssigned(TxnId),
}

#[derive(Error, Debug)]
pub enum TxnError {
    #[error("timestamp error: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("transaction {0} not found")]
    TransactionNotFound(TxnId),

    #[error("transaction {txn_id} is {state}, expected {expected}")]
    InvalidState {
        txn_id: TxnId,
        state: TxnState,
        expected: &'static str,
    },

    #[error("transaction {0} was evicted by an older transaction and has been rolled back")]
    Evicted(TxnId),
}

pub type TxnResult<T> = Result<T, TxnError>;
