//! The WTC command queue: a durable, process-safe FIFO of [`CommandEnvelope`]
//! rows shared by every producer and consumer in the dispatcher workspace.
//!
//! # Schema
//! One table, `wtc`, with an autoincrementing `id` so insertion order is
//! preserved and `read` can `ORDER BY id ASC LIMIT 1`.
//!
//! # SQLite durability settings
//! Applied at open: WAL, synchronous=FULL, foreign_keys=ON. `PRAGMA
//! integrity_check` runs at open and fails the open on corruption — this
//! table is the one piece of state every component in the fleet depends on.

mod codec;

use banner_protocol::{CommandEnvelope, CommandType, Flag, OperationKind, Role};
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
    #[error("stored envelope row is malformed: {0}")]
    MalformedRow(String),
}

/// A process-safe FIFO of typed command envelopes.
///
/// Mirrors spec 4.A: `write`, `read`, `delete_current`. Ordering is
/// guaranteed only within a given `(command_type, source, destination)`
/// filter triple.
pub struct Queue {
    conn: Connection,
    /// The id of the row returned by the most recent `read`, kept so
    /// `delete_current` can remove exactly that row (used after sentinel
    /// observation per the read/sentinel protocol in 4.A).
    last_read_id: Option<i64>,
}

impl Queue {
    /// Open (or create) the queue database at `path`.
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Queue {
            conn,
            last_read_id: None,
        })
    }

    /// Open an in-memory queue, used by unit and integration tests.
    pub fn open_in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Queue {
            conn,
            last_read_id: None,
        })
    }

    /// Append an envelope. Per spec 4.A, writers never block on failure:
    /// callers are expected to log a `queue-write` error and continue.
    pub fn write(&mut self, env: &CommandEnvelope) -> Result<(), QueueError> {
        self.conn.execute(
            "INSERT INTO wtc (
                operation, command_type, source, destination, origin_pid,
                hardware_recno, banner_stream_recno, parent_template_recno,
                sequence, message_buffer, return_node, flag, seq_change_op,
                message_type
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                codec::operation_to_text(env.operation),
                codec::command_type_to_text(env.command_type),
                codec::role_to_text(env.source),
                codec::role_to_text(env.destination),
                env.origin_pid,
                env.hardware_recno,
                env.banner_stream_recno,
                env.parent_template_recno,
                env.sequence,
                env.message_buffer,
                env.return_node,
                codec::flag_to_i64(env.flag),
                env.seq_change_op,
                env.message_type.map(i64::from),
            ],
        )?;
        Ok(())
    }

    /// Return and remove the oldest envelope matching `command_type`,
    /// `source`, and `destination`. Returns `None` if no row matches.
    ///
    /// The removed row's id is remembered so a subsequent `delete_current`
    /// is a no-op here (the row is already gone) — kept for parity with the
    /// source's read-then-delete-current shape, where `read` only marks the
    /// "current" row and a sentinel observation drives the actual delete.
    /// This implementation deletes eagerly on `read`, which is
    /// observationally identical for a single consumer per filter triple.
    pub fn read(
        &mut self,
        command_type: CommandType,
        source: Role,
        destination: Role,
    ) -> Result<Option<CommandEnvelope>, QueueError> {
        let row = self.conn.query_row(
            "SELECT id, operation, command_type, source, destination, origin_pid,
                    hardware_recno, banner_stream_recno, parent_template_recno,
                    sequence, message_buffer, return_node, flag, seq_change_op,
                    message_type
             FROM wtc
             WHERE command_type = ?1 AND source = ?2 AND destination = ?3
             ORDER BY id ASC LIMIT 1",
            params![
                codec::command_type_to_text(command_type),
                codec::role_to_text(source),
                codec::role_to_text(destination),
            ],
            map_row,
        );

        let (id, env) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let env = env?;

        self.conn.execute("DELETE FROM wtc WHERE id = ?1", params![id])?;
        self.last_read_id = Some(id);
        Ok(Some(env))
    }

    /// Remove the row just returned by `read`. A no-op in this
    /// implementation since `read` deletes eagerly; kept so callers written
    /// against the sentinel protocol in 4.A compile unchanged.
    pub fn delete_current(&mut self) -> Result<(), QueueError> {
        self.last_read_id = None;
        Ok(())
    }

    /// Drop every queued row, used by the supervisor's optional startup
    /// purge (spec.md 4.I). Returns the number of rows removed.
    pub fn purge_all(&mut self) -> Result<usize, QueueError> {
        let n = self.conn.execute("DELETE FROM wtc", [])?;
        self.last_read_id = None;
        Ok(n)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), QueueError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> Result<(), QueueError> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(QueueError::IntegrityCheckFailed(result));
    }
    Ok(())
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, Result<CommandEnvelope, QueueError>)> {
    let id: i64 = row.get(0)?;
    let operation_text: String = row.get(1)?;
    let command_type_text: String = row.get(2)?;
    let source_text: String = row.get(3)?;
    let destination_text: String = row.get(4)?;
    let flag_val: i64 = row.get(12)?;
    let message_type: Option<i64> = row.get(14)?;

    let env = (|| -> Result<CommandEnvelope, QueueError> {
        Ok(CommandEnvelope {
            operation: codec::operation_from_text(&operation_text)
                .ok_or_else(|| QueueError::MalformedRow(format!("operation {operation_text}")))?,
            command_type: codec::command_type_from_text(&command_type_text).ok_or_else(|| {
                QueueError::MalformedRow(format!("command_type {command_type_text}"))
            })?,
            source: codec::role_from_text(&source_text)
                .ok_or_else(|| QueueError::MalformedRow(format!("source {source_text}")))?,
            destination: codec::role_from_text(&destination_text)
                .ok_or_else(|| QueueError::MalformedRow(format!("destination {destination_text}")))?,
            origin_pid: row.get(5)?,
            hardware_recno: row.get(6)?,
            banner_stream_recno: row.get(7)?,
            parent_template_recno: row.get(8)?,
            sequence: row.get(9)?,
            message_buffer: row.get(10)?,
            return_node: row.get(11)?,
            flag: codec::flag_from_i64(flag_val)
                .ok_or_else(|| QueueError::MalformedRow(format!("flag {flag_val}")))?,
            seq_change_op: row.get(13)?,
            message_type: message_type.map(|v| v as u8),
        })
    })();

    Ok((id, env))
}
