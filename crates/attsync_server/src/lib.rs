//! # attsync push receiver
//!
//! HTTP endpoint for attendance devices that upload their logs on their own
//! ("push" mode) instead of being polled.
//!
//! This crate provides:
//! - The `/iclock/*` routes of the device push dialect
//! - `ATTLOG` body parsing in the timestamp layouts devices emit
//! - An in-memory pending queue with periodic and shutdown flushes
//! - An optional append-only journal of accepted records
//!
//! # Protocol
//!
//! 1. The device sends `GET /iclock/cdata?SN=...` and receives its options
//! 2. It posts records to `POST /iclock/cdata?SN=...&table=ATTLOG`
//! 3. The receiver answers `OK:<n>` with the number of accepted records
//! 4. `getrequest` and `devicecmd` polls are acknowledged with `OK`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod attlog;
mod directives;
mod error;
mod flush;
mod handler;
mod journal;
mod queue;
mod server;

pub use attlog::{parse_attlog, parse_attlog_line};
pub use directives::option_reply;
pub use error::{ServerError, ServerResult};
pub use flush::{flush_queue, FlushReport};
pub use handler::ReceiverState;
pub use journal::Journal;
pub use queue::PendingQueue;
pub use server::PushReceiver;
