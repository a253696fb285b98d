//! # convolog-core
//!
//! Core library for convolog - a browsable, searchable store of AI coding
//! assistant conversation logs.
//!
//! This library provides:
//! - A resilient parser for append-only JSONL session logs
//! - Turn grouping that collapses tool-call bursts into coherent messages
//! - An idempotent sync engine normalizing logs into SQLite
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Source files** (session logs, todo snapshots) are read-only inputs
//! - **Parsing and grouping** turn each file into an ordered list of turns
//! - **The sync engine** reconciles turns against the store; re-running it
//!   over the same files is a no-op
//!
//! ## Example
//!
//! ```rust,no_run
//! use convolog_core::{Config, Database, SyncEngine};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let engine = SyncEngine::new(db);
//! let report = engine.sync_all(&config.claude_dir()).expect("sync failed");
//! println!(
//!     "Synced {} messages from {} files",
//!     report.messages_inserted, report.files_processed
//! );
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Database, NewMessage, RowCounts};
pub use error::{Error, Result};
pub use ingest::{FileReport, SyncEngine, SyncReport};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod types;
