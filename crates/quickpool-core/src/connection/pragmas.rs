use rusqlite::Connection as SqliteConnection;

use crate::error::Result;

/// Role a [`super::Connection`] plays within a [`crate::pool::Pool`] —
/// determines which PRAGMAs are applied at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Writer,
    Reader,
}

/// Fixed, non-configurable knobs — the busy timeout and the WAL journal
/// size limit are deliberately not parameters of this function.
const BUSY_TIMEOUT_MS: u64 = 30_000;
const JOURNAL_SIZE_LIMIT_BYTES: i64 = 6_291_456; // 6 MiB

/// Apply the PRAGMAs a freshly opened connection must carry.
///
/// Must run *before* the connection is handed back to its caller: a
/// connection that has not had its busy timeout and synchronous level set
/// is not considered open by this crate.
pub fn apply_pragmas(conn: &SqliteConnection, role: ConnectionRole) -> Result<()> {
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    if role == ConnectionRole::Writer {
        // journal_mode must be set on a writable handle; a read-only
        // connection inherits WAL mode from the file the writer already put
        // it in and cannot itself flip the journal mode.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "journal_size_limit", JOURNAL_SIZE_LIMIT_BYTES)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_pragmas_set_wal() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let conn = SqliteConnection::open(tmp.path()).unwrap();
        apply_pragmas(&conn, ConnectionRole::Writer).unwrap();

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |r| r.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let sync: i64 = conn
            .pragma_query_value(None, "synchronous", |r| r.get(0))
            .unwrap();
        assert_eq!(sync, 1); // NORMAL
    }

    #[test]
    fn reader_pragmas_do_not_touch_journal_mode() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        // in-memory DBs can't do WAL; a reader never tries to.
        apply_pragmas(&conn, ConnectionRole::Reader).unwrap();

        let sync: i64 = conn
            .pragma_query_value(None, "synchronous", |r| r.get(0))
            .unwrap();
        assert_eq!(sync, 1);
    }
}
