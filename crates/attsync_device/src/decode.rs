//! Fixed-layout record decoding.

use crate::frame::has_ack_header;
use attsync_core::{DeviceProfile, DeviceRecord};

/// Records decoded from one data reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedReply {
    /// Plausible records, in reply order.
    pub records: Vec<DeviceRecord>,
    /// Records dropped by the subject-id sanity check.
    pub noise: usize,
    /// Bytes after the last whole record.
    pub trailing: usize,
}

fn read_u32_le(chunk: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&chunk[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Splits a data reply into records according to `profile`.
///
/// When the reply starts with the acknowledgment header, the layout's
/// payload offset is skipped first. A layout whose fields overrun the record
/// decodes nothing.
pub fn decode_reply(data: &[u8], profile: &DeviceProfile) -> DecodedReply {
    let offsets = profile.layout.offsets();
    let payload = if has_ack_header(data) {
        data.get(offsets.payload_offset..).unwrap_or(&[])
    } else {
        data
    };

    let mut reply = DecodedReply::default();
    if profile.layout.validate("decode").is_err() {
        reply.trailing = payload.len();
        return reply;
    }

    let chunks = payload.chunks_exact(offsets.record_size);
    reply.trailing = chunks.remainder().len();

    for (index, chunk) in chunks.enumerate() {
        let subject_id = read_u32_le(chunk, offsets.subject_id);
        if !profile.accepts_subject(subject_id) {
            reply.noise += 1;
            continue;
        }

        reply.records.push(DeviceRecord {
            index: index as u64,
            subject_id,
            timestamp: read_u32_le(chunk, offsets.timestamp),
            work_code: read_u32_le(chunk, offsets.work_code),
            verify_mode: chunk[offsets.verify_mode],
            raw: chunk.to_vec(),
        });
    }

    if reply.noise > 0 || reply.trailing > 0 {
        tracing::debug!(
            records = reply.records.len(),
            noise = reply.noise,
            trailing = reply.trailing,
            "decoded data reply"
        );
    }
    reply
}
