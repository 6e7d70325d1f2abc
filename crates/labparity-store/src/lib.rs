//! # labparity-store
//!
//! Persisted portal state.
//!
//! This crate provides:
//! - record types (`Submission`, `LeaderboardEntry`, `Team`, `Setting`)
//! - the JSONL snapshot file (`load_snapshot`, `save_snapshot`)
//! - `PortalState` (deterministic in-memory projection)
//! - `Database` (the single lock every reader and writer goes through)
//!
//! ## Data model
//!
//! ```text
//! JSONL (on disk, one tagged record per line)
//!     ↕  load / snapshot
//! PortalState (BTreeMaps keyed by (lab, url), team id, setting key)
//!     ↕  Mutex
//! Database
//! ```

pub mod database;
pub mod jsonl;
pub mod memory;
pub mod record;

pub use database::{BASELINE_URL_SETTING, Database, StoreError};
pub use jsonl::{JsonlError, load_snapshot, save_snapshot};
pub use memory::PortalState;
pub use record::{LeaderboardEntry, Record, Setting, Submission, Team, TeamDraft};
