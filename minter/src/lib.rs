//! # Player Minter
//!
//! Long-running loop that polls game servers, accumulates every canonical
//! player name it sees, and periodically submits the names the ledger knows
//! in fixed-size batches.
//!
//! - `store`: the durable accumulated set (load, merge, reconcile, purge)
//! - `ledger`: the `LedgerClient` seam and the file-backed `DryRunLedger`
//! - `scheduler`: the cycle state machine with injectable clock and source
//! - `report`: optional per-cycle JSON report of who is online

pub mod ledger;
pub mod report;
pub mod scheduler;
pub mod store;

pub use ledger::{BatchReceipt, DryRunLedger, LedgerClient, LedgerError, MintEvent};
pub use report::{write_report, ReportError};
pub use scheduler::{
    should_mint, Clock, ConfigError, CyclePhase, CycleReport, PurgePolicy, RegistryPoller,
    Scheduler, SchedulerConfig, SnapshotSource, TokioClock,
};
pub use store::{chunk, AccumulationStore, MergeOutcome, StoreError};
