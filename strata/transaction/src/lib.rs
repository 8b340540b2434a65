//! Transaction infrastructure shared by the strata catalog.
//!
//! The catalog consumes a transaction's id, its timestamps and its state
//! (guarded by a per-transaction lock); everything else in this crate is a
//! reference implementation of the subsystem that owns those values.

pub mod context;
pub mod error;
pub mod manager;
pub mod timestamp;

pub use context::{TxnContext, TxnState};
pub use error::{TimestampError, TxnError, TxnResult};
pub use manager::{TxnManager, TxnParticipant};
pub use timestamp::{Timestamp, TimestampGenerator, TxnId, TxnIdGenerator};
