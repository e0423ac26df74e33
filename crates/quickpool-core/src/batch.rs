//! Task bodies shared by the Coordinator's `executeInContext`,
//! `executeBatch`, and `loadFile` operations.
//!
//! These are plain functions over `&rusqlite::Connection` rather than
//! methods — they run inside a [`crate::task::Task`] on a connection's
//! worker thread, so they take the engine handle as a parameter instead of
//! capturing `self`.

use std::io::{BufRead, BufReader};
use std::path::Path;

use rusqlite::Connection as SqliteConnection;

use crate::error::{PoolError, Result};
use crate::value::{BatchCommand, BatchParams, BatchResult, ColumnMeta, ExecResult, LoadFileResult, Row, Value};

/// Run one prepared statement with bound `params`, collecting rows only if
/// the statement produces any (a bare `SELECT` shape).
pub(crate) fn execute_statement(
    conn: &SqliteConnection,
    sql: &str,
    params: &[Value],
) -> Result<ExecResult> {
    let mut stmt = conn.prepare(sql)?;
    let metadata = column_metadata(&stmt);

    let mut rows_out = Vec::new();
    {
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            rows_out.push(materialize_row(row, &metadata)?);
        }
    }

    let rows_affected = conn.changes() as i64;
    let insert_id = Some(conn.last_insert_rowid());

    Ok(ExecResult {
        rows_affected,
        insert_id,
        rows: if rows_out.is_empty() && metadata.is_empty() {
            None
        } else {
            Some(rows_out)
        },
        metadata: if metadata.is_empty() { None } else { Some(metadata) },
    })
}

/// Execute a literal statement with no parameters and no row collection —
/// used for `BEGIN EXCLUSIVE TRANSACTION`, `COMMIT`, `ROLLBACK`, and the
/// per-line statements of `loadFile`.
fn execute_literal(conn: &SqliteConnection, sql: &str) -> Result<i64> {
    conn.execute_batch(sql)?;
    Ok(conn.changes() as i64)
}

/// Run `commands` inside `BEGIN EXCLUSIVE TRANSACTION … COMMIT`, rolling
/// back on the first failing statement
pub(crate) fn execute_batch(conn: &SqliteConnection, commands: &[BatchCommand]) -> Result<BatchResult> {
    if commands.is_empty() {
        return Err(PoolError::BatchAborted {
            first_error: "no SQL commands provided".to_string(),
        });
    }

    conn.execute_batch("BEGIN EXCLUSIVE TRANSACTION")?;

    let mut rows_affected = 0i64;
    for command in commands {
        let param_sets: Vec<&[Value]> = match &command.params {
            BatchParams::Single(p) => vec![p.as_slice()],
            BatchParams::Many(sets) => sets.iter().map(|s| s.as_slice()).collect(),
        };

        for params in param_sets {
            match run_one_statement(conn, &command.sql, params) {
                Ok(changes) => rows_affected += changes,
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(PoolError::BatchAborted {
                        first_error: e.to_string(),
                    });
                }
            }
        }
    }

    conn.execute_batch("COMMIT")?;
    Ok(BatchResult { rows_affected })
}

fn run_one_statement(conn: &SqliteConnection, sql: &str, params: &[Value]) -> Result<i64> {
    let mut stmt = conn.prepare(sql)?;
    stmt.execute(rusqlite::params_from_iter(params.iter()))?;
    Ok(conn.changes() as i64)
}

/// Read one statement per line from `path` and run each inside a single
/// exclusive transaction, rolling back on the first error.
pub(crate) fn load_file(conn: &SqliteConnection, path: &Path) -> Result<LoadFileResult> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    conn.execute_batch("BEGIN EXCLUSIVE TRANSACTION")?;

    let mut rows_affected = 0i64;
    let mut commands = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match execute_literal(conn, &line) {
            Ok(changes) => {
                rows_affected += changes;
                commands += 1;
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(PoolError::BatchAborted {
                    first_error: e.to_string(),
                });
            }
        }
    }

    conn.execute_batch("COMMIT")?;
    Ok(LoadFileResult {
        rows_affected,
        commands,
    })
}

fn column_metadata(stmt: &rusqlite::Statement<'_>) -> Vec<ColumnMeta> {
    stmt.column_names()
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnMeta {
            column_name: name.to_string(),
            column_declared_type: stmt.column_decltype(i).map(|s| s.to_string()),
            column_index: i,
        })
        .collect()
}

fn materialize_row(row: &rusqlite::Row<'_>, metadata: &[ColumnMeta]) -> Result<Row> {
    let mut out = Vec::with_capacity(metadata.len());
    for (i, col) in metadata.iter().enumerate() {
        let value: rusqlite::types::Value = row.get(i)?;
        out.push((col.column_name.clone(), Value::from(value)));
    }
    Ok(out)
}
