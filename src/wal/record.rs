//! Log record definitions
//!
//! Defines the structure of individual log records.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::codec;

/// A single record in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Sequence number - strictly increasing for the lifetime of a store
    pub sequence: u64,

    /// The mutation this record carries
    pub operation: Operation,
}

/// Mutations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert or overwrite a key
    Set { key: String, value: String },

    /// Delete a key (tombstone)
    Remove { key: String },

    /// Drop every key
    Clear,
}

impl LogRecord {
    pub fn new(sequence: u64, operation: Operation) -> Self {
        Self { sequence, operation }
    }

    /// CRC32 stored in this record's frame (covers sequence, op, key and value)
    pub fn checksum(&self) -> Result<u32> {
        let payload = codec::encode_payload(&self.operation)?;
        Ok(codec::checksum(self.sequence, &payload))
    }
}

impl Operation {
    /// Key touched by this operation, `None` for `Clear`
    pub fn key(&self) -> Option<&str> {
        match self {
            Operation::Set { key, .. } | Operation::Remove { key } => Some(key),
            Operation::Clear => None,
        }
    }

    /// Value written by this operation, `None` unless `Set`
    pub fn value(&self) -> Option<&str> {
        match self {
            Operation::Set { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Approximate heap footprint, used for batch buffer sizing
    pub(crate) fn size_hint(&self) -> usize {
        self.key().map_or(0, str::len) + self.value().map_or(0, str::len) + 16
    }
}
