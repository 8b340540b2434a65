//! Reference transaction manager.
//!
//! The manager allocates ids and timestamps, tracks active transactions and
//! drives the commit/rollback state machine. Components holding versioned
//! data register as [`TxnParticipant`]s and are told when to stamp or discard
//! the versions a transaction produced.

use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::context::{TxnContext, TxnState};
use crate::error::{TxnError, TxnResult};
use crate::timestamp::{Timestamp, TimestampGenerator, TxnId, TxnIdGenerator};

/// A component that keeps per-transaction versions.
///
/// Callbacks run without the transaction lock held, so implementations may
/// take their own locks before inspecting any transaction's state.
pub trait TxnParticipant: Send + Sync {
    /// Stamps `commit_ts` on every version written by `txn`.
    fn on_commit(&self, txn: &TxnContext, commit_ts: Timestamp);

    /// Physically discards every version written by `txn`.
    fn on_rollback(&self, txn: &TxnContext);
}

pub struct TxnManager {
    ts_generator: TimestampGenerator,
    txn_id_generator: TxnIdGenerator,
    /// Active transactions, ordered by id.
    active_txns: SkipMap<TxnId, Arc<TxnContext>>,
    participants: RwLock<Vec<Arc<dyn TxnParticipant>>>,
    /// Held while a commit timestamp is allocated and stamped, and while a
    /// snapshot is allocated and registered, so neither is seen half done.
    commit_lock: Mutex<()>,
}

impl Default for TxnManager {
    fn default() -> Self {
        Self {
            ts_generator: TimestampGenerator::new(),
            txn_id_generator: TxnIdGenerator::new(),
            active_txns: SkipMap::new(),
            participants: RwLock::new(Vec::new()),
            commit_lock: Mutex::new(()),
        }
    }
}

impl TxnManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_participant(&self, participant: Arc<dyn TxnParticipant>) {
        self.participants.write().push(participant);
    }

    /// Advances the generators past ids and timestamps that were handed out
    /// by a previous process, e.g. after restoring a persisted catalog.
    pub fn observe(&self, max_txn_id: TxnId, max_ts: Timestamp) -> TxnResult<()> {
        self.txn_id_generator.update_if_greater(max_txn_id)?;
        self.ts_generator.update_if_greater(max_ts)?;
        Ok(())
    }

    pub fn begin(&self) -> TxnResult<Arc<TxnContext>> {
        let txn_id = self.txn_id_generator.next()?;
        let txn = {
            let _guard = self.commit_lock.lock();
            let begin_ts = self.ts_generator.next()?;
            let txn = Arc::new(TxnContext::new(txn_id, begin_ts));
            self.active_txns.insert(txn_id, txn.clone());
            txn
        };
        let begin_ts = txn.begin_ts();
        debug!(txn_id = txn_id.raw(), begin_ts = begin_ts.raw(), "txn.begin");
        Ok(txn)
    }

    /// Looks up an active transaction by id.
    pub fn get(&self, txn_id: TxnId) -> Option<Arc<TxnContext>> {
        self.active_txns.get(&txn_id).map(|e| e.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.active_txns.len()
    }

    /// Commits `txn` and returns its commit timestamp.
    ///
    /// A transaction that lost a priority contest is found in `Rollbacking`;
    /// it is rolled back here and [`TxnError::Evicted`] is returned.
    pub fn commit(&self, txn: &TxnContext) -> TxnResult<Timestamp> {
        {
            let mut state = txn.lock();
            let current = *state;
            match current {
                TxnState::Started => *state = TxnState::Committing,
                TxnState::Rollbacking => {
                    drop(state);
                    debug!(txn_id = txn.txn_id().raw(), "txn.commit.evicted");
                    self.rollback(txn)?;
                    return Err(TxnError::Evicted(txn.txn_id()));
                }
                other => {
                    return Err(TxnError::InvalidState {
                        txn_id: txn.txn_id(),
                        state: other,
                        expected: "started",
                    });
                }
            }
        }

        let guard = self.commit_lock.lock();
        let allocated = self
            .ts_generator
            .next()
            .and_then(|ts| txn.set_commit_ts(ts).map(|()| ts));
        let commit_ts = match allocated {
            Ok(ts) => ts,
            Err(e) => {
                drop(guard);
                warn!(txn_id = txn.txn_id().raw(), error = %e, "txn.commit.failed");
                *txn.lock() = TxnState::Rollbacking;
                self.rollback(txn)?;
                return Err(e.into());
            }
        };
        let participants = self.participants.read().clone();
        for participant in &participants {
            participant.on_commit(txn, commit_ts);
        }

        *txn.lock() = TxnState::Committed;
        drop(guard);
        self.active_txns.remove(&txn.txn_id());
        debug!(
            txn_id = txn.txn_id().raw(),
            commit_ts = commit_ts.raw(),
            "txn.commit"
        );
        Ok(commit_ts)
    }

    /// Rolls `txn` back, discarding every version it produced.
    pub fn rollback(&self, txn: &TxnContext) -> TxnResult<()> {
        {
            let mut state = txn.lock();
            let current = *state;
            match current {
                TxnState::Started | TxnState::Rollbacking => *state = TxnState::Rollbacking,
                TxnState::Rollbacked => return Ok(()),
                other => {
                    return Err(TxnError::InvalidState {
                        txn_id: txn.txn_id(),
                        state: other,
                        expected: "started or rollbacking",
                    });
                }
            }
        }

        let participants = self.participants.read().clone();
        for participant in &participants {
            participant.on_rollback(txn);
        }

        *txn.lock() = TxnState::Rollbacked;
        self.active_txns.remove(&txn.txn_id());
        debug!(txn_id = txn.txn_id().raw(), "txn.rollback");
        Ok(())
    }

    /// The minimum begin timestamp of the active transactions, or the current
    /// clock if no transaction is active. Versions committed before the
    /// watermark are visible to every present and future snapshot.
    pub fn low_watermark(&self) -> Timestamp {
        // Every begin timestamp below the clock is registered while the lock
        // is held.
        let _guard = self.commit_lock.lock();
        self.active_txns
            .iter()
            .map(|e| e.value().begin_ts())
            .min()
            .unwrap_or_else(|| self.ts_generator.current())
    }
}
