//! High-level device client.

use crate::decode::{decode_reply, DecodedReply};
use crate::error::ProtocolResult;
use crate::session::DeviceSession;
use attsync_core::DeviceProfile;
use std::thread;
use std::time::{Duration, Instant};

/// Result of one pull.
#[derive(Debug, Clone)]
pub struct PullOutcome {
    /// Token used for the data request.
    pub token: u8,
    /// Bytes received in the data phase.
    pub bytes_received: usize,
    /// Decoded records.
    pub reply: DecodedReply,
    /// Wall time of the whole session.
    pub elapsed: Duration,
}

/// Pulls attendance records from one device.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    addr: String,
    profile: DeviceProfile,
}

impl DeviceClient {
    /// Creates a client for `host:port`.
    pub fn new(addr: impl Into<String>, profile: DeviceProfile) -> Self {
        Self {
            addr: addr.into(),
            profile,
        }
    }

    /// Device address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Decoding profile.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Runs a full session: connect, handshake, setup, data request, decode.
    ///
    /// The socket is released before this returns, on success or failure.
    pub fn pull(&self) -> ProtocolResult<PullOutcome> {
        let start = Instant::now();
        let mut session = DeviceSession::connect(&self.addr, &self.profile)?;

        session.handshake()?;
        thread::sleep(Duration::from_millis(self.profile.timeouts.handshake_pause_ms));

        let token = session.setup()?;
        thread::sleep(Duration::from_millis(self.profile.timeouts.setup_pause_ms));

        let data = session.request_data()?;
        drop(session);

        let reply = decode_reply(&data, &self.profile);
        tracing::info!(
            device = %self.addr,
            token,
            bytes = data.len(),
            records = reply.records.len(),
            noise = reply.noise,
            "device pull finished"
        );

        Ok(PullOutcome {
            token,
            bytes_received: data.len(),
            reply,
            elapsed: start.elapsed(),
        })
    }
}
