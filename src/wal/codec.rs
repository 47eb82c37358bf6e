//! Record codec
//!
//! Frames a [`LogRecord`] for the log and decodes frames back, one at a time,
//! from a byte buffer.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬─────────┬──────────────┬──────────────────────────┐
//! │ PayloadLen(4)│ CRC (4) │ Sequence (8) │ Payload (bincode op)     │
//! └──────────────┴─────────┴──────────────┴──────────────────────────┘
//! ```
//! All integers little endian. The CRC covers sequence and payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{BurrowError, Result};

use super::{LogRecord, Operation};

/// Header size: PayloadLen (4) + CRC (4) + Sequence (8) = 16 bytes
pub const HEADER_SIZE: usize = 16;

/// Largest payload a frame may declare (64 MB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Result of decoding from the front of a buffer
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// One full record, and how many bytes of the buffer it used
    Complete { record: LogRecord, consumed: usize },

    /// The buffer ends before the frame does
    Incomplete { needed: usize },
}

/// Encode a record into a standalone frame
pub fn encode(record: &LogRecord) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    encode_into(record, &mut buf)?;
    Ok(buf.to_vec())
}

/// Append a record's frame to `buf`, returning the frame length
pub fn encode_into(record: &LogRecord, buf: &mut BytesMut) -> Result<usize> {
    encode_operation_into(record.sequence, &record.operation, buf)
}

/// Append the frame for `operation` at `sequence` without building a record
pub fn encode_operation_into(
    sequence: u64,
    operation: &Operation,
    buf: &mut BytesMut,
) -> Result<usize> {
    let payload = encode_payload(operation)?;
    if payload.len() > MAX_RECORD_SIZE {
        return Err(BurrowError::WriteFailed(format!(
            "record too large: {} bytes (max {})",
            payload.len(),
            MAX_RECORD_SIZE
        )));
    }

    let crc = checksum(sequence, &payload);

    buf.reserve(HEADER_SIZE + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(crc);
    buf.put_u64_le(sequence);
    buf.put_slice(&payload);

    Ok(HEADER_SIZE + payload.len())
}

/// Decode the record at the front of `buf`
///
/// Returns `Incomplete` when the buffer is shorter than the header or the
/// declared frame, and `CorruptRecord` when the frame is whole but invalid.
pub fn decode(buf: &[u8]) -> Result<DecodeOutcome> {
    if buf.len() < HEADER_SIZE {
        return Ok(DecodeOutcome::Incomplete {
            needed: HEADER_SIZE - buf.len(),
        });
    }

    let mut header = &buf[..HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let stored_crc = header.get_u32_le();
    let sequence = header.get_u64_le();

    if payload_len > MAX_RECORD_SIZE {
        return Err(BurrowError::CorruptRecord(format!(
            "declared payload length {} exceeds maximum {}",
            payload_len, MAX_RECORD_SIZE
        )));
    }

    let total = HEADER_SIZE + payload_len;
    if buf.len() < total {
        return Ok(DecodeOutcome::Incomplete {
            needed: total - buf.len(),
        });
    }

    let payload = &buf[HEADER_SIZE..total];
    let computed_crc = checksum(sequence, payload);
    if computed_crc != stored_crc {
        return Err(BurrowError::CorruptRecord(format!(
            "checksum mismatch at sequence {}: stored {:#010x}, computed {:#010x}",
            sequence, stored_crc, computed_crc
        )));
    }

    let operation: Operation = bincode::deserialize(payload).map_err(|e| {
        BurrowError::CorruptRecord(format!("undecodable payload at sequence {}: {}", sequence, e))
    })?;

    Ok(DecodeOutcome::Complete {
        record: LogRecord::new(sequence, operation),
        consumed: total,
    })
}

pub(crate) fn encode_payload(operation: &Operation) -> Result<Vec<u8>> {
    bincode::serialize(operation)
        .map_err(|e| BurrowError::WriteFailed(format!("failed to encode record: {}", e)))
}

pub(crate) fn checksum(sequence: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&sequence.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
