//! # attsync engine
//!
//! Pull-side sync engine: sources, sinks, the cycle driver and its triggers.
//!
//! This crate provides:
//! - [`SourceConnector`] with relational, text-log and device variants
//! - [`BatchSink`] with an in-memory and a MySQL implementation
//! - [`SyncOrchestrator`] running checkpointed batch cycles
//! - [`Trigger`]s and a [`TickLoop`] for scheduling
//!
//! ## Cycle
//!
//! For every enabled source, in order:
//! 1. Load the checkpoint
//! 2. Fetch records after it
//! 3. Normalize, sort by `(event_time, sequence)`
//! 4. Write batches; save the checkpoint after each committed batch
//!
//! ## Key Invariants
//!
//! - A checkpoint never moves backwards
//! - A checkpoint is saved only after its batch is committed
//! - One source's failure never affects another
//! - Replaying a batch is harmless (insert-ignore on the dedup key)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod mysql;
mod orchestrator;
mod sink;
pub mod source;
mod trigger;

pub use config::SyncConfig;
pub use error::{SinkError, SinkResult, SyncError, SyncResult};
pub use mysql::MySqlSink;
pub use orchestrator::{CycleReport, SourceReport, SyncOrchestrator, SyncState, SyncStats};
pub use sink::{BatchSink, MemorySink};
pub use source::{build_connector, CheckpointMode, SourceConnector};
pub use trigger::{
    trigger_from_settings, DailyTrigger, IntervalTrigger, TickHandle, TickLoop, Trigger,
};
