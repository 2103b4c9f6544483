// crates/syncengine-store/src/config.rs
// ============================================================================
// Module: Store Configuration
// Description: Connection-level configuration for the SQLite-backed store.
// Purpose: Give callers an explicit struct for path, journal mode, sync mode,
//          timeouts and pool sizing instead of environment variables.
// Dependencies: std::path
// ============================================================================

use std::path::PathBuf;

/// Default busy timeout, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default writer command queue capacity.
pub const DEFAULT_WRITER_QUEUE_CAPACITY: usize = 1_024;
/// Default number of pooled reader connections.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// `SQLite` journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    /// Write-ahead log; allows concurrent readers during a write.
    #[default]
    Wal,
    /// Legacy rollback-journal mode.
    Delete,
}

impl JournalMode {
    /// Returns the `PRAGMA journal_mode` value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` synchronous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Flush on every commit boundary (safest, the default).
    #[default]
    Full,
    /// Relaxed durability, faster commits.
    Normal,
}

impl SyncMode {
    /// Returns the `PRAGMA synchronous` value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Connection-level configuration for [`crate::SqliteStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout applied to every connection.
    pub busy_timeout_ms: u64,
    /// Journal mode applied to every connection.
    pub journal_mode: JournalMode,
    /// Synchronous mode applied to every connection.
    pub sync_mode: SyncMode,
    /// Bound on the writer thread's pending-command queue.
    pub writer_queue_capacity: usize,
    /// Number of pooled read-only connections.
    pub read_pool_size: usize,
}

impl StoreConfig {
    /// Builds a config for `path` with the store's documented defaults: WAL
    /// journaling, full synchronous durability, a 5-second busy timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
            writer_queue_capacity: DEFAULT_WRITER_QUEUE_CAPACITY,
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }
}
