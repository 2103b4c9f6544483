// crates/syncengine-store/src/store.rs
// ============================================================================
// Module: SQLite-Backed Store
// Description: Implements `syncengine_core::Store` over a SQLite database.
// Purpose: Durable, deterministic-read persistence for invocations,
//          completions, sync firings, and provenance edges.
// Dependencies: rusqlite, syncengine_core, crate::{config, schema, writer}
// ============================================================================

//! ## Overview
//! [`SqliteStore`] owns one write connection (held by a background thread,
//! see [`crate::writer`]) and a small pool of read-only connections selected
//! round-robin. Every read query ends in `ORDER BY seq ASC, id ASC` (or the
//! surrogate-key equivalent) so identical inputs yield byte-identical output
//! sequences across runs, processes, and restarts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use syncengine_core::ActionRef;
use syncengine_core::BindingHash;
use syncengine_core::Completion;
use syncengine_core::CompletionId;
use syncengine_core::FlowToken;
use syncengine_core::Invocation;
use syncengine_core::InvocationId;
use syncengine_core::OutputCase;
use syncengine_core::ProvenanceEdge;
use syncengine_core::StateRow;
use syncengine_core::StateStore;
use syncengine_core::Store;
use syncengine_core::StoreError;
use syncengine_core::SyncFiring;
use syncengine_core::SyncId;
use syncengine_core::Value;
use syncengine_core::codec;

use crate::config::StoreConfig;
use crate::schema;
use crate::writer::WriteRequest;
use crate::writer::WriterHandle;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed implementation of [`Store`].
pub struct SqliteStore {
    /// Pooled read-only connections, selected round-robin.
    readers: Vec<Mutex<Connection>>,
    /// Index of the next reader to hand out.
    next_reader: AtomicUsize,
    /// Handle to the single background writer thread.
    writer: WriterHandle,
}

impl SqliteStore {
    /// Opens (and if necessary initializes) a store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened, pragmas
    /// cannot be applied, or the schema cannot be created or validated.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut writer_connection = schema::open_connection(&config)?;
        schema::initialize_schema(&mut writer_connection)?;

        let mut readers = Vec::with_capacity(config.read_pool_size.max(1));
        for _ in 0..config.read_pool_size.max(1) {
            readers.push(Mutex::new(schema::open_connection(&config)?));
        }

        let writer = WriterHandle::spawn(writer_connection, config.writer_queue_capacity);

        Ok(Self { readers, next_reader: AtomicUsize::new(0), writer })
    }

    /// Borrows the next reader connection round-robin.
    fn with_reader<T>(
        &self,
        run: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let index = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let guard = self.readers[index]
            .lock()
            .map_err(|_poison_err| StoreError::Db("reader connection mutex poisoned".to_string()))?;
        run(&guard)
    }
}

impl Store for SqliteStore {
    fn write_invocation(&self, invocation: &Invocation) -> Result<(), StoreError> {
        self.writer.submit(|reply| WriteRequest::Invocation(invocation.clone(), reply))
    }

    fn write_completion(&self, completion: &Completion) -> Result<(), StoreError> {
        self.writer.submit(|reply| WriteRequest::Completion(completion.clone(), reply))
    }

    fn write_sync_firing_atomic(
        &self,
        firing: &SyncFiring,
        invocation: &Invocation,
    ) -> Result<(i64, bool), StoreError> {
        self.writer.submit(|reply| {
            WriteRequest::SyncFiringAtomic(firing.clone(), invocation.clone(), reply)
        })
    }

    fn has_firing(
        &self,
        completion_id: &CompletionId,
        sync_id: &SyncId,
        binding_hash: &BindingHash,
    ) -> Result<bool, StoreError> {
        self.with_reader(|connection| {
            connection
                .query_row(
                    "SELECT 1 FROM sync_firings
                     WHERE completion_id = ?1 AND sync_id = ?2 AND binding_hash = ?3",
                    params![completion_id.as_str(), sync_id.as_str(), binding_hash.as_str()],
                    |_row| Ok(()),
                )
                .optional()
                .map(|found| found.is_some())
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }

    fn read_invocation(&self, id: &InvocationId) -> Result<Invocation, StoreError> {
        self.with_reader(|connection| {
            connection
                .query_row(
                    "SELECT id, flow_token, action_uri, args, seq, security_context, spec_hash,
                            engine_version, ir_version
                     FROM invocations WHERE id = ?1",
                    params![id.as_str()],
                    map_invocation_row,
                )
                .optional()
                .map_err(|err| StoreError::Db(err.to_string()))?
                .ok_or_else(|| StoreError::NotFound {
                    table: "invocations".to_string(),
                    id: id.as_str().to_string(),
                })
        })
    }

    fn read_completion(&self, id: &CompletionId) -> Result<Completion, StoreError> {
        self.with_reader(|connection| {
            connection
                .query_row(
                    "SELECT id, invocation_id, output_case, result, seq, security_context
                     FROM completions WHERE id = ?1",
                    params![id.as_str()],
                    map_completion_row,
                )
                .optional()
                .map_err(|err| StoreError::Db(err.to_string()))?
                .ok_or_else(|| StoreError::NotFound {
                    table: "completions".to_string(),
                    id: id.as_str().to_string(),
                })
        })
    }

    fn read_flow(
        &self,
        flow: &FlowToken,
    ) -> Result<(Vec<Invocation>, Vec<Completion>), StoreError> {
        self.with_reader(|connection| {
            let mut invocation_stmt = connection
                .prepare(
                    "SELECT id, flow_token, action_uri, args, seq, security_context, spec_hash,
                            engine_version, ir_version
                     FROM invocations WHERE flow_token = ?1 ORDER BY seq ASC, id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            let invocations = invocation_stmt
                .query_map(params![flow.as_str()], map_invocation_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))?;

            let mut completion_stmt = connection
                .prepare(
                    "SELECT c.id, c.invocation_id, c.output_case, c.result, c.seq, c.security_context
                     FROM completions c JOIN invocations i ON i.id = c.invocation_id
                     WHERE i.flow_token = ?1 ORDER BY c.seq ASC, c.id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            let completions = completion_stmt
                .query_map(params![flow.as_str()], map_completion_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))?;

            Ok((invocations, completions))
        })
    }

    fn read_sync_firings_for_completion(
        &self,
        completion_id: &CompletionId,
    ) -> Result<Vec<SyncFiring>, StoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT id, completion_id, sync_id, binding_hash, seq FROM sync_firings
                     WHERE completion_id = ?1 ORDER BY seq ASC, id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            stmt.query_map(params![completion_id.as_str()], map_sync_firing_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }

    fn read_provenance(
        &self,
        invocation_id: &InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT pe.id, pe.sync_firing_id, pe.invocation_id
                     FROM provenance_edges pe JOIN sync_firings sf ON sf.id = pe.sync_firing_id
                     WHERE pe.invocation_id = ?1 ORDER BY sf.seq ASC, pe.id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            stmt.query_map(params![invocation_id.as_str()], map_provenance_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }

    fn read_triggered(&self, completion_id: &CompletionId) -> Result<Vec<Invocation>, StoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT i.id, i.flow_token, i.action_uri, i.args, i.seq, i.security_context,
                            i.spec_hash, i.engine_version, i.ir_version
                     FROM invocations i
                     JOIN provenance_edges pe ON pe.invocation_id = i.id
                     JOIN sync_firings sf ON sf.id = pe.sync_firing_id
                     WHERE sf.completion_id = ?1 ORDER BY i.seq ASC, i.id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            stmt.query_map(params![completion_id.as_str()], map_invocation_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }

    fn get_last_seq(&self) -> Result<u64, StoreError> {
        self.with_reader(|connection| {
            let max_seq: i64 = connection
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) FROM (
                        SELECT seq FROM invocations
                        UNION ALL
                        SELECT seq FROM completions
                     )",
                    params![],
                    |row| row.get(0),
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            Ok(u64::try_from(max_seq).unwrap_or(0))
        })
    }

    fn get_last_seq_for_flow(&self, flow: &FlowToken) -> Result<u64, StoreError> {
        self.with_reader(|connection| {
            let max_seq: i64 = connection
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) FROM (
                        SELECT seq FROM invocations WHERE flow_token = ?1
                        UNION ALL
                        SELECT c.seq FROM completions c JOIN invocations i ON i.id = c.invocation_id
                        WHERE i.flow_token = ?1
                     )",
                    params![flow.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            Ok(u64::try_from(max_seq).unwrap_or(0))
        })
    }

    fn get_pending_invocations(&self, flow: &FlowToken) -> Result<Vec<Invocation>, StoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT i.id, i.flow_token, i.action_uri, i.args, i.seq, i.security_context,
                            i.spec_hash, i.engine_version, i.ir_version
                     FROM invocations i LEFT JOIN completions c ON c.invocation_id = i.id
                     WHERE i.flow_token = ?1 AND c.id IS NULL
                     ORDER BY i.seq ASC, i.id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            stmt.query_map(params![flow.as_str()], map_invocation_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }

    fn find_orphaned_sync_firings(&self) -> Result<Vec<SyncFiring>, StoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT sf.id, sf.completion_id, sf.sync_id, sf.binding_hash, sf.seq
                     FROM sync_firings sf LEFT JOIN provenance_edges pe ON pe.sync_firing_id = sf.id
                     WHERE pe.id IS NULL
                     ORDER BY sf.seq ASC, sf.id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            stmt.query_map(params![], map_sync_firing_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }

    fn find_incomplete_flows(&self) -> Result<Vec<FlowToken>, StoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT DISTINCT flow_token FROM (
                        SELECT i.flow_token AS flow_token
                        FROM invocations i LEFT JOIN completions c ON c.invocation_id = i.id
                        WHERE c.id IS NULL
                        UNION
                        SELECT i2.flow_token AS flow_token
                        FROM sync_firings sf
                        JOIN completions c2 ON c2.id = sf.completion_id
                        JOIN invocations i2 ON i2.id = c2.invocation_id
                        LEFT JOIN provenance_edges pe ON pe.sync_firing_id = sf.id
                        WHERE pe.id IS NULL
                     ) ORDER BY flow_token ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            stmt.query_map(params![], |row| {
                let token: String = row.get(0)?;
                Ok(FlowToken::new(token))
            })
            .and_then(|rows| rows.collect())
            .map_err(|err| StoreError::Db(err.to_string()))
        })
    }
}

impl StateStore for SqliteStore {
    fn write_state_row(&self, table: &str, flow: &FlowToken, fields: Value) -> Result<i64, StoreError> {
        let table = table.to_string();
        let flow = flow.clone();
        self.writer.submit(|reply| WriteRequest::StateRow(table, flow, fields, reply))
    }

    fn read_state_rows(&self, table: &str) -> Result<Vec<StateRow>, StoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT id, flow_token, fields FROM concept_state
                     WHERE table_name = ?1 ORDER BY id ASC",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            stmt.query_map(params![table], map_state_row)
                .and_then(|rows| rows.collect())
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Decodes a JSON TEXT column into a [`Value`].
fn decode_value(column: rusqlite::types::ValueRef<'_>) -> rusqlite::Result<Value> {
    let text = column.as_str()?;
    codec::decode(text.as_bytes()).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            text.len(),
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

/// Maps one row of the `invocations` table.
fn map_invocation_row(row: &Row<'_>) -> rusqlite::Result<Invocation> {
    let seq: i64 = row.get(4)?;
    Ok(Invocation {
        id: InvocationId::new(row.get::<_, String>(0)?),
        flow_token: FlowToken::new(row.get::<_, String>(1)?),
        action_uri: ActionRef::new(row.get::<_, String>(2)?),
        args: decode_value(row.get_ref(3)?)?,
        seq: u64::try_from(seq).unwrap_or(0),
        security_context: decode_value(row.get_ref(5)?)?,
        spec_hash: row.get(6)?,
        engine_version: row.get(7)?,
        ir_version: row.get(8)?,
    })
}

/// Maps one row of the `completions` table.
fn map_completion_row(row: &Row<'_>) -> rusqlite::Result<Completion> {
    let seq: i64 = row.get(4)?;
    Ok(Completion {
        id: CompletionId::new(row.get::<_, String>(0)?),
        invocation_id: InvocationId::new(row.get::<_, String>(1)?),
        output_case: OutputCase::new(row.get::<_, String>(2)?),
        result: decode_value(row.get_ref(3)?)?,
        seq: u64::try_from(seq).unwrap_or(0),
        security_context: decode_value(row.get_ref(5)?)?,
    })
}

/// Maps one row of the `sync_firings` table.
fn map_sync_firing_row(row: &Row<'_>) -> rusqlite::Result<SyncFiring> {
    let seq: i64 = row.get(4)?;
    Ok(SyncFiring {
        id: row.get(0)?,
        completion_id: CompletionId::new(row.get::<_, String>(1)?),
        sync_id: SyncId::new(row.get::<_, String>(2)?),
        binding_hash: BindingHash::new(row.get::<_, String>(3)?),
        seq: u64::try_from(seq).unwrap_or(0),
    })
}

/// Maps one row of the `provenance_edges` table.
fn map_provenance_row(row: &Row<'_>) -> rusqlite::Result<ProvenanceEdge> {
    Ok(ProvenanceEdge {
        id: row.get(0)?,
        sync_firing_id: row.get(1)?,
        invocation_id: InvocationId::new(row.get::<_, String>(2)?),
    })
}

/// Maps one row of the `concept_state` table.
fn map_state_row(row: &Row<'_>) -> rusqlite::Result<StateRow> {
    Ok(StateRow {
        id: row.get(0)?,
        flow_token: FlowToken::new(row.get::<_, String>(1)?),
        fields: decode_value(row.get_ref(2)?)?,
    })
}
