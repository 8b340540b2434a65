//! Transaction ids and logical timestamps.
//!
//! Begin and commit timestamps are drawn from the same monotonic clock, so a
//! snapshot taken at `begin_ts` sees exactly the versions whose commit
//! timestamp is strictly smaller.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::TimestampError;

/// Logical timestamp used for begin and commit times.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Commit timestamp of a version whose transaction has not committed yet.
    /// It compares greater than every real timestamp.
    pub const UNCOMMITTED: Timestamp = Timestamp(u64::MAX);

    #[inline]
    pub const fn with_ts(timestamp: u64) -> Self {
        Self(timestamp)
    }

    /// Returns the maximum possible commit timestamp.
    #[inline]
    pub const fn max_commit_ts() -> Self {
        Self(u64::MAX - 1)
    }

    /// Returns true unless this is the `UNCOMMITTED` sentinel.
    #[inline]
    pub fn is_committed(&self) -> bool {
        *self < Self::UNCOMMITTED
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_committed() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("uncommitted")
        }
    }
}

/// Transaction identifier. Lower ids belong to earlier-started transactions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TxnId(u64);

impl TxnId {
    /// Reserved for entries that no transaction produced.
    pub const NONE: TxnId = TxnId(0);

    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Monotonic clock handing out begin and commit timestamps.
pub struct TimestampGenerator {
    counter: AtomicU64,
}

impl TimestampGenerator {
    pub fn new() -> Self {
        Self::with_start(1)
    }

    pub fn with_start(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    /// Generate the next timestamp
    pub fn next(&self) -> Result<Timestamp, TimestampError> {
        let mut cur = self.counter.load(Ordering::SeqCst);
        loop {
            if cur > Timestamp::max_commit_ts().raw() {
                return Err(TimestampError::CommitTsOverflow(cur));
            }
            match self.counter.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(Timestamp::with_ts(cur)),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Get the current timestamp without incrementing
    pub fn current(&self) -> Timestamp {
        Timestamp::with_ts(self.counter.load(Ordering::SeqCst))
    }

    /// Moves the clock past `ts` if it is not already there.
    pub fn update_if_greater(&self, ts: Timestamp) -> Result<(), TimestampError> {
        if ts.raw() >= Timestamp::max_commit_ts().raw() {
            return Err(TimestampError::CommitTsOverflow(ts.raw()));
        }
        self.counter.fetch_max(ts.raw() + 1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for TimestampGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction ID generator
pub struct TxnIdGenerator {
    counter: AtomicU64,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        Self::with_start(1)
    }

    pub fn with_start(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start.max(1)),
        }
    }

    /// Generate the next transaction ID
    pub fn next(&self) -> Result<TxnId, TimestampError> {
        let mut cur = self.counter.load(Ordering::SeqCst);
        loop {
            if cur == u64::MAX {
                return Err(TimestampError::TxnIdOverflow(cur));
            }
            match self.counter.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(TxnId::new(cur)),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Update the counter if the given transaction ID is greater than the current value
    pub fn update_if_greater(&self, txn_id: TxnId) -> Result<(), TimestampError> {
        if txn_id.raw() == u64::MAX {
            return Err(TimestampError::TxnIdOverflow(txn_id.raw()));
        }
        self.counter.fetch_max(txn_id.raw() + 1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for TxnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncommitted_sentinel() {
        assert!(Timestamp::with_ts(100).is_committed());
        assert!(Timestamp::max_commit_ts().is_committed());
        assert!(!Timestamp::UNCOMMITTED.is_committed());
        assert!(Timestamp::max_commit_ts() < Timestamp::UNCOMMITTED);
        assert_eq!(Timestamp::UNCOMMITTED.to_string(), "uncommitted");
    }

    #[test]
    fn test_timestamp_generator() {
        let generator = TimestampGenerator::new();
        assert_eq!(generator.current().raw(), 1);

        let ts1 = generator.next().unwrap();
        assert_eq!(ts1.raw(), 1);
        assert_eq!(generator.current().raw(), 2);

        let ts2 = generator.next().unwrap();
        assert_eq!(ts2.raw(), 2);
        assert_eq!(generator.current().raw(), 3);
    }

    #[test]
    fn test_timestamp_generator_overflow() {
        let generator = TimestampGenerator::with_start(Timestamp::max_commit_ts().raw());
        assert_eq!(generator.next().unwrap(), Timestamp::max_commit_ts());
        assert!(matches!(
            generator.next(),
            Err(TimestampError::CommitTsOverflow(_))
        ));
    }

    #[test]
    fn test_txn_id_generator() {
        let generator = TxnIdGenerator::new();
        assert_eq!(generator.next().unwrap(), TxnId::new(1));
        assert_eq!(generator.next().unwrap(), TxnId::new(2));

        // Id 0 is reserved and never handed out.
        let generator = TxnIdGenerator::with_start(0);
        assert_eq!(generator.next().unwrap(), TxnId::new(1));
    }

    #[test]
    fn test_update_if_greater() {
        let ts_generator = TimestampGenerator::new();
        ts_generator
            .update_if_greater(Timestamp::with_ts(100))
            .unwrap();
        assert_eq!(ts_generator.current().raw(), 101);

        ts_generator
            .update_if_greater(Timestamp::with_ts(50))
            .unwrap();
        assert_eq!(ts_generator.current().raw(), 101); // Should not decrease

        let txn_generator = TxnIdGenerator::new();
        txn_generator.update_if_greater(TxnId::new(100)).unwrap();
        assert_eq!(txn_generator.next().unwrap(), TxnId::new(101));
    }
}
