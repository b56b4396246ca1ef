//! safelens storage: relational store backends and workflow checkpoints.
//!
//! The relational store serves query execution with one scoped connection per
//! call. The checkpoint store keeps per-thread workflow snapshots, in memory or
//! in a WAL-mode SQLite database with migrations.

pub mod checkpoint;
pub mod db;
pub mod error;
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod relational;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use db::Database;
pub use error::StoreError;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use relational::{RelationalStore, SqliteStore};
