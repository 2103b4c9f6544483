// crates/syncengine-store/src/writer.rs
// ============================================================================
// Module: Background Writer
// Description: The single write connection, owned by a dedicated thread, and
//              the channel-based handle other threads submit writes through.
// Purpose: Enforce single-writer discipline without forcing every caller
//          onto one lock per operation.
// Dependencies: rusqlite, std::sync::mpsc, syncengine_core
// ============================================================================

//! ## Overview
//! Exactly one thread ever touches the write connection. Callers submit a
//! [`WriteRequest`] over a bounded `mpsc::sync_channel` and block on a
//! one-shot reply channel; the writer thread processes requests strictly in
//! the order they arrive, which is also the order [`crate::SqliteStore`]'s
//! write methods are called in from the single-consumer engine loop.

use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::params;
use syncengine_core::Completion;
use syncengine_core::FlowToken;
use syncengine_core::Invocation;
use syncengine_core::StoreError;
use syncengine_core::SyncFiring;
use syncengine_core::Value;
use syncengine_core::codec;

/// One write operation submitted to the writer thread, paired with the
/// channel its result is sent back on.
pub(crate) enum WriteRequest {
    /// Insert an invocation (conflict-on-id is a silent no-op).
    Invocation(Invocation, mpsc::Sender<Result<(), StoreError>>),
    /// Insert a completion (conflict-on-any-unique-key is a silent no-op).
    Completion(Completion, mpsc::Sender<Result<(), StoreError>>),
    /// The atomic firing + invocation + provenance write.
    SyncFiringAtomic(
        SyncFiring,
        Invocation,
        mpsc::Sender<Result<(i64, bool), StoreError>>,
    ),
    /// Insert a row into a concept state table.
    StateRow(String, FlowToken, Value, mpsc::Sender<Result<i64, StoreError>>),
}

/// Handle to the background writer thread.
pub(crate) struct WriterHandle {
    sender: mpsc::SyncSender<WriteRequest>,
    join_handle: Option<JoinHandle<()>>,
}

impl WriterHandle {
    /// Spawns the writer thread, which takes ownership of `connection`.
    pub(crate) fn spawn(connection: Connection, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(queue_capacity);
        let join_handle = thread::spawn(move || run_writer_loop(connection, &receiver));
        Self { sender, join_handle: Some(join_handle) }
    }

    /// Submits a write and blocks for its result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Overloaded`] if the writer thread has exited
    /// (the queue is disconnected) or the reply channel was dropped.
    pub(crate) fn submit<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<T, StoreError>>) -> WriteRequest,
    ) -> Result<T, StoreError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.sender.send(build(reply_tx)).map_err(|_send_err| StoreError::Overloaded)?;
        reply_rx.recv().map_err(|_recv_err| StoreError::Overloaded)?
    }
}

impl Drop for WriterHandle {
    fn drop(&mut self) {
        if let Some(join_handle) = self.join_handle.take() {
            drop(join_handle.join());
        }
    }
}

/// The writer thread's body: drain requests until every sender is dropped.
fn run_writer_loop(mut connection: Connection, receiver: &mpsc::Receiver<WriteRequest>) {
    while let Ok(request) = receiver.recv() {
        match request {
            WriteRequest::Invocation(invocation, reply) => {
                let result = write_invocation(&mut connection, &invocation);
                drop(reply.send(result));
            }
            WriteRequest::Completion(completion, reply) => {
                let result = write_completion(&mut connection, &completion);
                drop(reply.send(result));
            }
            WriteRequest::SyncFiringAtomic(firing, invocation, reply) => {
                let result = write_sync_firing_atomic(&mut connection, &firing, &invocation);
                drop(reply.send(result));
            }
            WriteRequest::StateRow(table, flow, fields, reply) => {
                let result = write_state_row(&mut connection, &table, &flow, &fields);
                drop(reply.send(result));
            }
        }
    }
}

/// Inserts one row into a concept state table, returning its surrogate id.
fn write_state_row(
    connection: &mut Connection,
    table: &str,
    flow: &FlowToken,
    fields: &Value,
) -> Result<i64, StoreError> {
    let encoded = encode_value(fields)?;
    connection
        .execute(
            "INSERT INTO concept_state (table_name, flow_token, fields) VALUES (?1, ?2, ?3)",
            params![table, flow.as_str(), encoded],
        )
        .map_err(sqlite_error_to_store_error)?;
    Ok(connection.last_insert_rowid())
}

/// Inserts `invocation`, ignoring a conflict on `id`.
fn write_invocation(connection: &mut Connection, invocation: &Invocation) -> Result<(), StoreError> {
    let args = encode_value(&invocation.args)?;
    let security_context = encode_value(&invocation.security_context)?;
    connection
        .execute(
            "INSERT INTO invocations (
                id, flow_token, action_uri, args, seq, security_context, spec_hash,
                engine_version, ir_version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (id) DO NOTHING",
            params![
                invocation.id.as_str(),
                invocation.flow_token.as_str(),
                invocation.action_uri.as_str(),
                args,
                i64::try_from(invocation.seq).unwrap_or(i64::MAX),
                security_context,
                invocation.spec_hash,
                invocation.engine_version,
                invocation.ir_version,
            ],
        )
        .map_err(sqlite_error_to_store_error)?;
    Ok(())
}

/// Inserts `completion`, ignoring a conflict on any unique key (including a
/// second completion for the same invocation).
fn write_completion(connection: &mut Connection, completion: &Completion) -> Result<(), StoreError> {
    let result = encode_value(&completion.result)?;
    let security_context = encode_value(&completion.security_context)?;
    connection
        .execute(
            "INSERT INTO completions (
                id, invocation_id, output_case, result, seq, security_context
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT DO NOTHING",
            params![
                completion.id.as_str(),
                completion.invocation_id.as_str(),
                completion.output_case.as_str(),
                result,
                i64::try_from(completion.seq).unwrap_or(i64::MAX),
                security_context,
            ],
        )
        .map_err(sqlite_error_to_store_error)?;
    Ok(())
}

/// The crash-atomic firing + invocation + provenance write.
fn write_sync_firing_atomic(
    connection: &mut Connection,
    firing: &SyncFiring,
    invocation: &Invocation,
) -> Result<(i64, bool), StoreError> {
    let tx = connection.transaction().map_err(|err| StoreError::Db(err.to_string()))?;

    let inserted = tx
        .execute(
            "INSERT INTO sync_firings (completion_id, sync_id, binding_hash, seq)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (completion_id, sync_id, binding_hash) DO NOTHING",
            params![
                firing.completion_id.as_str(),
                firing.sync_id.as_str(),
                firing.binding_hash.as_str(),
                i64::try_from(firing.seq).unwrap_or(i64::MAX),
            ],
        )
        .map_err(sqlite_error_to_store_error)?
        > 0;

    if !inserted {
        let existing_id: i64 = tx
            .query_row(
                "SELECT id FROM sync_firings
                 WHERE completion_id = ?1 AND sync_id = ?2 AND binding_hash = ?3",
                params![
                    firing.completion_id.as_str(),
                    firing.sync_id.as_str(),
                    firing.binding_hash.as_str(),
                ],
                |row| row.get(0),
            )
            .map_err(sqlite_error_to_store_error)?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        return Ok((existing_id, false));
    }

    let firing_id = tx.last_insert_rowid();

    let args = encode_value(&invocation.args)?;
    let security_context = encode_value(&invocation.security_context)?;
    tx.execute(
        "INSERT INTO invocations (
            id, flow_token, action_uri, args, seq, security_context, spec_hash,
            engine_version, ir_version
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (id) DO NOTHING",
        params![
            invocation.id.as_str(),
            invocation.flow_token.as_str(),
            invocation.action_uri.as_str(),
            args,
            i64::try_from(invocation.seq).unwrap_or(i64::MAX),
            security_context,
            invocation.spec_hash,
            invocation.engine_version,
            invocation.ir_version,
        ],
    )
    .map_err(sqlite_error_to_store_error)?;

    tx.execute(
        "INSERT INTO provenance_edges (sync_firing_id, invocation_id)
         VALUES (?1, ?2)
         ON CONFLICT (sync_firing_id) DO NOTHING",
        params![firing_id, invocation.id.as_str()],
    )
    .map_err(sqlite_error_to_store_error)?;

    tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
    Ok((firing_id, true))
}

/// Canonically encodes a value for storage as a TEXT column.
fn encode_value(value: &syncengine_core::Value) -> Result<String, StoreError> {
    let bytes = codec::encode(value).map_err(|err| StoreError::MarshalError(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| StoreError::MarshalError(err.to_string()))
}

/// Maps a foreign-key violation to [`StoreError::FkViolation`]; everything
/// else becomes [`StoreError::Db`].
fn sqlite_error_to_store_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err
        && failure.code == ErrorCode::ConstraintViolation
        && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    {
        return StoreError::FkViolation { table: "unknown".to_string(), column: "unknown".to_string() };
    }
    StoreError::Db(err.to_string())
}

