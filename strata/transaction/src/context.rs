//! Per-transaction state shared with the catalog.

use std::fmt;
use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::TimestampError;
use crate::timestamp::{Timestamp, TxnId};

/// Lifecycle of a transaction.
///
/// `Started -> Committing -> Committed` on the commit path and
/// `Started -> Rollbacking -> Rollbacked` on the abort path. An older
/// transaction may also move a younger one from `Started` to `Rollbacking`
/// when both contend for the same catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum TxnState {
    Started,
    Committing,
    Committed,
    Rollbacking,
    Rollbacked,
}

pub struct TxnContext {
    txn_id: TxnId,
    begin_ts: Timestamp,
    commit_ts: OnceLock<Timestamp>,
    state: Mutex<TxnState>,
}

impl TxnContext {
    pub fn new(txn_id: TxnId, begin_ts: Timestamp) -> Self {
        Self {
            txn_id,
            begin_ts,
            commit_ts: OnceLock::new(),
            state: Mutex::new(TxnState::Started),
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

    /// Returns the commit timestamp, or `Timestamp::UNCOMMITTED` before commit.
    #[inline]
    pub fn commit_ts(&self) -> Timestamp {
        self.commit_ts
            .get()
            .copied()
            .unwrap_or(Timestamp::UNCOMMITTED)
    }

    pub(crate) fn set_commit_ts(&self, commit_ts: Timestamp) -> Result<(), TimestampError> {
        self.commit_ts
            .set(commit_ts)
            .map_err(|_| TimestampError::CommitTsAssigned(self.txn_id))
    }

    /// Acquires the transaction lock. The state may only be read or changed
    /// through the returned guard; the lock is released when it is dropped.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, TxnState> {
        self.state.lock()
    }

    /// Snapshot of the current state.
    #[inline]
    pub fn state(&self) -> TxnState {
        *self.state.lock()
    }
}

impl fmt::Debug for TxnContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnContext")
            .field("txn_id", &self.txn_id)
            .field("begin_ts", &self.begin_ts)
            .field("commit_ts", &self.commit_ts())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_started() {
        let txn = TxnContext::new(TxnId::new(3), Timestamp::with_ts(7));
        assert_eq!(txn.txn_id(), TxnId::new(3));
        assert_eq!(txn.begin_ts(), Timestamp::with_ts(7));
        assert_eq!(txn.commit_ts(), Timestamp::UNCOMMITTED);
        assert_eq!(txn.state(), TxnState::Started);
    }

    #[test]
    fn test_commit_ts_is_write_once() {
        let txn = TxnContext::new(TxnId::new(1), Timestamp::with_ts(1));
        txn.set_commit_ts(Timestamp::with_ts(5)).unwrap();
        assert!(txn.set_commit_ts(Timestamp::with_ts(6)).is_err());
        assert_eq!(txn.commit_ts(), Timestamp::with_ts(5));
    }

    #[test]
    fn test_state_changes_through_guard() {
        let txn = TxnContext::new(TxnId::new(1), Timestamp::with_ts(1));
        {
            let mut state = txn.lock();
            *state = TxnState::Rollbacking;
        }
        assert_eq!(txn.state(), TxnState::Rollbacking);
        assert_eq!(TxnState::Rollbacking.to_string(), "rollbacking");
    }
}
