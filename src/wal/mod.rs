//! Write-Ahead Log Module
//!
//! The log is the source of truth for a store; the in-memory index is
//! rebuilt from it on every open.
//!
//! ## Responsibilities
//! - Append records before any index mutation
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for ordering
//! - Segment rotation, compaction and crash recovery
//!
//! ## Directory Layout
//! ```text
//! {store_dir}/
//!   ├── MANIFEST          live segments (in order) + counters, JSON
//!   ├── segment-1.log
//!   ├── segment-2.log
//!   └── ...
//! ```
//!
//! ## Segment Format
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Record 1                                         │
//! │ ┌─────────┬─────────┬──────────┬──────────────┐  │
//! │ │ Len (4) │ CRC (4) │ Seq (8)  │ Payload      │  │
//! │ └─────────┴─────────┴──────────┴──────────────┘  │
//! ├──────────────────────────────────────────────────┤
//! │ Record 2                                         │
//! │ ┌─────────┬─────────┬──────────┬──────────────┐  │
//! │ │ Len (4) │ CRC (4) │ Seq (8)  │ Payload      │  │
//! │ └─────────┴─────────┴──────────┴──────────────┘  │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod codec;
mod compaction;
mod manager;
mod manifest;
mod reader;
mod record;
mod recovery;
mod segment;

pub use codec::{decode, encode, DecodeOutcome, HEADER_SIZE, MAX_RECORD_SIZE};
pub use compaction::{CompactedSegment, CompactionTicket};
pub use manager::LogManager;
pub use manifest::{Manifest, StoreError, MANIFEST_FILENAME};
pub use reader::{Replay, ReplayStop, SegmentEnd, SegmentReader, StopCause};
pub use record::{LogRecord, Operation};
pub use recovery::{LogRecovery, RecoveryReport};
pub use segment::{parse_segment_id, segment_path, SegmentWriter};
