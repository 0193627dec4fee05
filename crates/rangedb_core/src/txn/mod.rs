//! Transactions, snapshots and the global clocks.
//!
//! Transactions are snapshot isolated: a reader sees the versions of every
//! transaction that finished before its snapshot and whose commit timestamp
//! is not after its read timestamp. Writers conflict first-writer-wins.
//! A transaction may prepare before committing, after which its versions
//! block readers until the coordinator resolves it.

mod clock;
mod manager;
mod snapshot;
mod state;
mod writes;

pub use clock::{Clocks, GlobalClock};
pub use manager::{PreparedRecord, TransactionManager};
pub use snapshot::Snapshot;
pub use state::{Transaction, TxnState};
pub use writes::TxnWrites;
