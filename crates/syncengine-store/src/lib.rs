// crates/syncengine-store/src/lib.rs
// ============================================================================
// Module: Sync Engine Store Library
// Description: Public API surface for the SQLite-backed durable store.
// Purpose: Expose SqliteStore and its configuration; implements the
//          syncengine_core::Store trait.
// Dependencies: crate::{config, schema, store, writer}
// ============================================================================

//! ## Overview
//! This crate is the only place in the workspace that depends on `rusqlite`.
//! It implements [`syncengine_core::Store`] against a WAL-journaled SQLite
//! database, with a single background writer thread enforcing the
//! single-writer discipline the runtime assumes.

mod config;
mod schema;
mod store;
mod writer;

pub use config::DEFAULT_BUSY_TIMEOUT_MS;
pub use config::DEFAULT_READ_POOL_SIZE;
pub use config::DEFAULT_WRITER_QUEUE_CAPACITY;
pub use config::JournalMode;
pub use config::StoreConfig;
pub use config::SyncMode;
pub use store::SqliteStore;
pub use syncengine_core::StateRow;
pub use syncengine_core::StateStore;
pub use syncengine_core::Store;
pub use syncengine_core::StoreError;
