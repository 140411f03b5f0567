//! # attsync device
//!
//! Client for the proprietary attendance-device protocol spoken on TCP port
//! 5005 by HIP/F68S-class terminals.
//!
//! A pull is a strict three-step exchange of 16-byte frames:
//!
//! 1. **Handshake** (`55 AA 01 B0`): any reply is success
//! 2. **Setup** (`55 AA 01 B4`): byte 4 of the reply is the session token
//! 3. **Data request** (`55 AA 01 A4`, token twice): the device streams its log
//!
//! The log is a flat array of fixed-size little-endian records whose layout
//! comes from a [`DeviceProfile`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod decode;
mod error;
pub mod frame;
mod session;

pub use attsync_core::{DeviceProfile, DeviceTimeouts, RecordLayout, RecordOffsets};
pub use client::{DeviceClient, PullOutcome};
pub use decode::{decode_reply, DecodedReply};
pub use error::{ProtocolError, ProtocolResult};
pub use session::{DeviceSession, SessionPhase};
