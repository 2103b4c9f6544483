// crates/syncengine-store/src/schema.rs
// ============================================================================
// Module: Schema & Pragmas
// Description: Connection setup and versioned schema initialization.
// Purpose: Apply durability pragmas and create (or migrate) the four
//          append-only tables the store owns.
// Dependencies: rusqlite
// ============================================================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::StoreError;
use crate::config::StoreConfig;

/// Current schema version. Bump this and add a `match` arm in
/// [`initialize_schema`] when the table layout changes.
const SCHEMA_VERSION: i64 = 1;

/// Opens a connection to `config.path` with durability pragmas applied.
pub(crate) fn open_connection(config: &StoreConfig) -> Result<Connection, StoreError> {
    let connection =
        Connection::open(&config.path).map_err(|err| StoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies the pragmas every connection (writer and readers alike) needs.
fn apply_pragmas(connection: &Connection, config: &StoreConfig) -> Result<(), StoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| StoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    Ok(())
}

/// Creates the schema on a fresh database, or validates the stored version
/// against [`SCHEMA_VERSION`] on an existing one. Idempotent: safe to call
/// on every startup.
pub(crate) fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction().map_err(|err| StoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| StoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| StoreError::Db(err.to_string()))?;

    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| StoreError::Db(err.to_string()))?;
            create_tables(&tx)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(found) => {
            return Err(StoreError::VersionMismatch { found, expected: SCHEMA_VERSION });
        }
    }

    tx.commit().map_err(|err| StoreError::Db(err.to_string()))
}

/// Creates the four append-only tables on a fresh database.
fn create_tables(tx: &rusqlite::Transaction<'_>) -> Result<(), StoreError> {
    tx.execute_batch(
        "CREATE TABLE invocations (
            id TEXT PRIMARY KEY,
            flow_token TEXT NOT NULL,
            action_uri TEXT NOT NULL,
            args TEXT NOT NULL,
            seq INTEGER NOT NULL,
            security_context TEXT NOT NULL,
            spec_hash TEXT NOT NULL,
            engine_version TEXT NOT NULL,
            ir_version TEXT NOT NULL
        );
        CREATE INDEX idx_invocations_flow_token ON invocations (flow_token);
        CREATE INDEX idx_invocations_seq ON invocations (seq);

        CREATE TABLE completions (
            id TEXT PRIMARY KEY,
            invocation_id TEXT NOT NULL UNIQUE REFERENCES invocations (id),
            output_case TEXT NOT NULL,
            result TEXT NOT NULL,
            seq INTEGER NOT NULL,
            security_context TEXT NOT NULL
        );
        CREATE INDEX idx_completions_seq ON completions (seq);
        CREATE INDEX idx_completions_invocation_seq ON completions (invocation_id, seq);

        CREATE TABLE sync_firings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            completion_id TEXT NOT NULL REFERENCES completions (id),
            sync_id TEXT NOT NULL,
            binding_hash TEXT NOT NULL,
            seq INTEGER NOT NULL,
            UNIQUE (completion_id, sync_id, binding_hash)
        );
        CREATE INDEX idx_sync_firings_seq ON sync_firings (seq);

        CREATE TABLE provenance_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sync_firing_id INTEGER NOT NULL UNIQUE REFERENCES sync_firings (id),
            invocation_id TEXT NOT NULL REFERENCES invocations (id)
        );

        CREATE TABLE concept_state (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            flow_token TEXT NOT NULL,
            fields TEXT NOT NULL
        );
        CREATE INDEX idx_concept_state_table ON concept_state (table_name, id);",
    )
    .map_err(|err| StoreError::Db(err.to_string()))
}
