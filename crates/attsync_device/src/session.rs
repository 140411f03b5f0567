//! Device session state machine.
//!
//! A session walks strictly through
//! `Connecting → Handshaking → TokenAcquired → Requesting → Streaming → Closed`.
//! Each step has its own read deadline; a timeout or a closed socket aborts
//! the session. The socket is closed when the session is dropped, whatever
//! phase it reached.

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame;
use attsync_core::DeviceProfile;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_CHUNK: usize = 64 * 1024;
const MAX_REPLY: usize = 16 * 1024 * 1024;

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Socket open, nothing sent yet.
    Connecting,
    /// Handshake acknowledged.
    Handshaking,
    /// Setup reply received, token known.
    TokenAcquired,
    /// Data request sent.
    Requesting,
    /// Receiving data chunks.
    Streaming,
    /// Socket shut down.
    Closed,
}

impl SessionPhase {
    /// Returns true while the socket is in use.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionPhase::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Connecting => "connecting",
            SessionPhase::Handshaking => "handshaking",
            SessionPhase::TokenAcquired => "token-acquired",
            SessionPhase::Requesting => "requesting",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// One connection to a device.
pub struct DeviceSession {
    stream: TcpStream,
    peer: SocketAddr,
    profile: DeviceProfile,
    phase: SessionPhase,
    token: Option<u8>,
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("peer", &self.peer)
            .field("phase", &self.phase)
            .field("token", &self.token)
            .finish()
    }
}

impl DeviceSession {
    /// Opens a TCP connection within the profile's connect deadline.
    pub fn connect(addr: &str, profile: &DeviceProfile) -> ProtocolResult<Self> {
        let connect_err = |source: io::Error| ProtocolError::Connection {
            addr: addr.to_string(),
            source,
        };

        let candidates: Vec<SocketAddr> = addr.to_socket_addrs().map_err(connect_err)?.collect();
        let mut last_err =
            io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing");

        for peer in candidates {
            match TcpStream::connect_timeout(&peer, profile.timeouts.connect()) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(connect_err)?;
                    tracing::debug!(device = addr, %peer, "connected");
                    return Ok(Self {
                        stream,
                        peer,
                        profile: profile.clone(),
                        phase: SessionPhase::Connecting,
                        token: None,
                    });
                }
                Err(e) => last_err = e,
            }
        }

        Err(connect_err(last_err))
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Session token, once acquired.
    pub fn token(&self) -> Option<u8> {
        self.token
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn expect_phase(&self, expected: SessionPhase, step: &'static str) -> ProtocolResult<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ProtocolError::OutOfOrder {
                step,
                phase: self.phase,
            })
        }
    }

    fn send(&mut self, frame: &[u8]) -> ProtocolResult<()> {
        tracing::trace!(peer = %self.peer, phase = %self.phase, frame = %frame::hex_preview(frame), "send");
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Reads one reply. `Ok(None)` means the deadline passed.
    fn read_once(&mut self, deadline: Duration) -> ProtocolResult<Option<Bytes>> {
        self.stream.set_read_timeout(Some(deadline))?;
        let mut buf = vec![0u8; READ_CHUNK];
        match self.stream.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                tracing::trace!(peer = %self.peer, phase = %self.phase, len = n, data = %frame::hex_preview(&buf), "recv");
                Ok(Some(Bytes::from(buf)))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_reply(&mut self, deadline: Duration, phase: SessionPhase) -> ProtocolResult<Bytes> {
        match self.read_once(deadline)? {
            None => Err(ProtocolError::Timeout { phase }),
            Some(reply) if reply.is_empty() => Err(ProtocolError::EmptyReply { phase }),
            Some(reply) => Ok(reply),
        }
    }

    /// Phase 1: any non-empty reply to the handshake frame is success.
    pub fn handshake(&mut self) -> ProtocolResult<()> {
        self.expect_phase(SessionPhase::Connecting, "handshake")?;
        self.send(&frame::handshake(self.profile.address))?;
        self.read_reply(self.profile.timeouts.handshake(), SessionPhase::Handshaking)?;
        self.phase = SessionPhase::Handshaking;
        Ok(())
    }

    /// Phase 2: obtains the session token.
    ///
    /// A reply shorter than five bytes leaves the profile's default token in
    /// place.
    pub fn setup(&mut self) -> ProtocolResult<u8> {
        self.expect_phase(SessionPhase::Handshaking, "setup")?;
        self.send(&frame::setup(self.profile.address))?;
        let reply = self.read_reply(self.profile.timeouts.setup(), SessionPhase::TokenAcquired)?;

        let token = frame::token_from_setup_reply(&reply, self.profile.default_token);
        if reply.len() <= frame::TOKEN_OFFSET {
            tracing::debug!(peer = %self.peer, len = reply.len(), token, "short setup reply, using default token");
        }
        self.token = Some(token);
        self.phase = SessionPhase::TokenAcquired;
        Ok(token)
    }

    /// Phase 3: requests the attendance log and collects the reply.
    ///
    /// After the first chunk the session keeps reading until the device has
    /// been quiet for the idle gap or closes the socket. Replies shorter than
    /// the profile's minimum are returned as empty.
    pub fn request_data(&mut self) -> ProtocolResult<Bytes> {
        self.expect_phase(SessionPhase::TokenAcquired, "request data")?;
        let token = self.token.unwrap_or(self.profile.default_token);

        self.send(&frame::data_request(token))?;
        self.phase = SessionPhase::Requesting;

        let first = match self.read_once(self.profile.timeouts.data())? {
            Some(chunk) => chunk,
            None => {
                return Err(ProtocolError::Timeout {
                    phase: SessionPhase::Requesting,
                })
            }
        };
        self.phase = SessionPhase::Streaming;

        let mut data = BytesMut::from(&first[..]);
        let mut open = !first.is_empty();
        while open {
            match self.read_once(self.profile.timeouts.idle_gap())? {
                Some(chunk) if !chunk.is_empty() => {
                    if data.len() + chunk.len() > MAX_REPLY {
                        return Err(ProtocolError::Malformed(format!(
                            "data reply exceeds {MAX_REPLY} bytes"
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }
                _ => open = false,
            }
        }

        self.close();

        if data.len() < self.profile.min_data_len {
            tracing::debug!(peer = %self.peer, len = data.len(), "reply too short, no data");
            return Ok(Bytes::new());
        }
        Ok(data.freeze())
    }

    /// Shuts the socket down. Safe to call more than once.
    pub fn close(&mut self) {
        if self.phase != SessionPhase::Closed {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.phase = SessionPhase::Closed;
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
