//! # Result Persistence
//!
//! The persisted store behind resumable runs.
//!
//! - [`ResultStore`]: load / initialize / per-row upsert contract
//! - [`SqliteStore`]: sqlx-backed SQLite implementation
//! - [`MemoryStore`]: in-process implementation for embedding and tests

pub mod error;
pub mod memory_store;
pub mod sqlite_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
pub use store::ResultStore;
