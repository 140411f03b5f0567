//! Command frames.
//!
//! Every command is a fixed 16-byte frame starting with `55 AA 01 <cmd>`.
//! Replies start with `AA 55`.
//!
//! | Frame | Bytes |
//! |---|---|
//! | Handshake | `55 AA 01 B0 00 00 00 00 00 00 <addr:4> 17 00` |
//! | Setup | `55 AA 01 B4 00 00 00 00 00 00 <addr:4> 18 00` |
//! | Data request | `55 AA 01 A4 00 00 00 <tok> 20 00 00 00 00 <tok> 19 00` |

/// Length of every command frame.
pub const FRAME_LEN: usize = 16;

/// Prefix of every command frame.
pub const COMMAND_MAGIC: [u8; 3] = [0x55, 0xaa, 0x01];

/// Prefix of the acknowledgment that precedes a data reply.
pub const ACK_MAGIC: [u8; 4] = [0xaa, 0x55, 0x01, 0x01];

/// Full acknowledgment header of a data reply.
pub const ACK_HEADER: [u8; 10] = [0xaa, 0x55, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x19, 0x00];

/// Handshake command byte.
pub const CMD_HANDSHAKE: u8 = 0xb0;
/// Setup command byte.
pub const CMD_SETUP: u8 = 0xb4;
/// Data request command byte.
pub const CMD_DATA: u8 = 0xa4;

const HANDSHAKE_TAIL: u8 = 0x17;
const SETUP_TAIL: u8 = 0x18;
const DATA_TAIL: u8 = 0x19;

/// Position of the session token in the setup reply.
pub const TOKEN_OFFSET: usize = 4;

fn addressed(cmd: u8, address: [u8; 4], tail: u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..3].copy_from_slice(&COMMAND_MAGIC);
    frame[3] = cmd;
    frame[10..14].copy_from_slice(&address);
    frame[14] = tail;
    frame
}

/// Builds the handshake frame.
pub fn handshake(address: [u8; 4]) -> [u8; FRAME_LEN] {
    addressed(CMD_HANDSHAKE, address, HANDSHAKE_TAIL)
}

/// Builds the setup frame.
pub fn setup(address: [u8; 4]) -> [u8; FRAME_LEN] {
    addressed(CMD_SETUP, address, SETUP_TAIL)
}

/// Builds the data request frame for a session token.
pub fn data_request(token: u8) -> [u8; FRAME_LEN] {
    [
        0x55, 0xaa, 0x01, CMD_DATA, //
        0x00, 0x00, 0x00, token, //
        0x20, 0x00, 0x00, 0x00, //
        0x00, token, //
        DATA_TAIL, 0x00,
    ]
}

/// Extracts the session token from a setup reply.
///
/// Replies of at least five bytes carry the token at byte 4
/// (`AA 55 01 00 <tok> ...`); shorter replies fall back to `default`.
pub fn token_from_setup_reply(reply: &[u8], default: u8) -> u8 {
    reply.get(TOKEN_OFFSET).copied().unwrap_or(default)
}

/// Returns true if a data reply starts with the acknowledgment header.
pub fn has_ack_header(data: &[u8]) -> bool {
    data.starts_with(&ACK_MAGIC)
}

/// Space-separated hex of the first 32 bytes, for trace logs.
pub fn hex_preview(data: &[u8]) -> String {
    let shown = &data[..data.len().min(32)];
    let mut out = shown.chunks(1).map(hex::encode).collect::<Vec<_>>().join(" ");
    if data.len() > shown.len() {
        out.push_str(" ..");
    }
    out
}
