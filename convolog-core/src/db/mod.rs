//! Database layer for convolog
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - An FTS5 full-text index over message content, maintained by triggers

pub mod repo;
pub mod schema;

pub use repo::{Database, NewMessage, RowCounts};
