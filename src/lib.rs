//! # BurrowKV
//!
//! An embedded key-value store for on-device settings and cache data:
//! - Write-ahead log, split into segments, for durability
//! - Crash recovery that truncates a torn tail instead of failing
//! - Single-writer/multi-reader concurrency with atomic batches
//! - Background-friendly compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 StoreHandle (open / close)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Engine                              │
//! │            (Single Writer / Multi Reader)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ LogManager  │ replay → │    Index    │
//!   │ (segments)  │          │  (RwLock)   │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use burrowkv::{Config, Engine};
//!
//! let engine = Engine::open(Config::builder().data_dir("./data").build())?;
//! engine.set("theme", "dark")?;
//! assert_eq!(engine.get("theme")?, Some("dark".to_string()));
//! engine.close()?;
//! # Ok::<(), burrowkv::BurrowError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod index;
pub mod merge;
pub mod engine;
pub mod handle;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BurrowError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::{Engine, EngineStats};
pub use handle::StoreHandle;
pub use index::KeySet;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of BurrowKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
