use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use rusqlite::{Connection as SqliteConnection, OpenFlags};
use tracing::{debug, warn};

use super::pragmas::{apply_pragmas, ConnectionRole};
use super::EMPTY_LOCK_ID;
use crate::error::{PoolError, Result};
use crate::task::{await_task, make_blocking_task, make_task, Task};

struct Shared {
    tenant: String,
    fifo: VecDeque<Task>,
    busy: bool,
    closed: bool,
    done: bool,
}

impl Shared {
    fn drained(&self) -> bool {
        self.fifo.is_empty() && !self.busy
    }
}

/// One engine handle, owned exclusively by a dedicated worker thread, plus
/// the tenant/FIFO/busy bookkeeping a [`crate::pool::Pool`] needs to route
/// work to it
///
/// All public methods are cheap and non-blocking except [`Connection::close`]
/// and [`Connection::clear_lock`], which wait on the drain condition, and
/// [`Connection::run_sync`], which waits for one task to finish running on
/// the worker thread.
pub struct Connection {
    role: ConnectionRole,
    shared: Arc<Mutex<Shared>>,
    condvar: Arc<Condvar>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Open an engine handle at `path` in the given role and configure it
    /// (busy timeout, synchronous level, and — for a writer — WAL mode)
    /// before returning.
    pub fn open(path: &Path, role: ConnectionRole) -> Result<Self> {
        let flags = match role {
            ConnectionRole::Writer => {
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_FULL_MUTEX
            }
            ConnectionRole::Reader => {
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX
            }
        };

        let open_failed = |message: String| PoolError::OpenFailed {
            path: path.to_path_buf(),
            message,
        };

        let conn = SqliteConnection::open_with_flags(path, flags)
            .map_err(|e| open_failed(e.to_string()))?;
        apply_pragmas(&conn, role).map_err(|e| open_failed(e.to_string()))?;

        let shared = Arc::new(Mutex::new(Shared {
            tenant: EMPTY_LOCK_ID.to_string(),
            fifo: VecDeque::new(),
            busy: false,
            closed: false,
            done: false,
        }));
        let condvar = Arc::new(Condvar::new());
        let worker = spawn_worker(path.to_path_buf(), conn, shared.clone(), condvar.clone());

        Ok(Self {
            role,
            shared,
            condvar,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Append `task` to the FIFO and wake the worker. Fails with
    /// [`PoolError::ConnectionClosed`] if the connection has been closed;
    /// the check and the enqueue are atomic under the connection mutex.
    pub fn queue_work(&self, task: Task) -> Result<()> {
        {
            let mut guard = self.shared.lock().expect("connection mutex poisoned");
            if guard.closed {
                return Err(PoolError::ConnectionClosed);
            }
            guard.fifo.push_back(task);
        }
        self.condvar.notify_all();
        Ok(())
    }

    /// Queue `f` and await its result — the async bridge used by the
    /// Coordinator's `executeInContext`/`executeBatch`/`loadFile`/
    /// `refreshSchema` surface.
    pub async fn run_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (task, rx) = make_task(f);
        self.queue_work(task)?;
        await_task(rx).await
    }

    /// Queue `f` and block the calling thread until it completes. Used by
    /// admission-tier operations (hook installation, ATTACH/DETACH) that are
    /// synchronous by nature but must still run on the connection's own
    /// worker thread.
    ///
    /// Safe to call from inside a `tokio` runtime thread: the wait uses a
    /// plain `std::sync::mpsc` channel rather than
    /// `tokio::sync::oneshot::Receiver::blocking_recv`, which panics under
    /// that documented precondition. This still blocks the calling thread
    /// until the connection's own worker thread replies, matching the
    /// admission tier's single-threaded, cooperative scheduling model.
    pub fn run_sync<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (task, rx) = make_blocking_task(f);
        self.queue_work(task)?;
        rx.recv().unwrap_or(Err(PoolError::TaskCancelled))
    }

    /// Post a schema-probing statement and await its completion
    pub async fn refresh_schema(&self) -> Result<()> {
        self.run_async(|conn| {
            conn.execute_batch("PRAGMA table_info('sqlite_master')")
                .map_err(|e| PoolError::SchemaRefreshFailed(e.to_string()))
        })
        .await
    }

    /// Bind this connection to `id`. Pure bookkeeping: does not touch the
    /// FIFO or `busy`.
    pub fn activate_lock(&self, id: &str) {
        let mut guard = self.shared.lock().expect("connection mutex poisoned");
        guard.tenant = id.to_string();
    }

    /// Wait until the FIFO is empty and no task is running, then reset the
    /// tenant to the sentinel. This is the "drain-before-clear" invariant:
    /// a tenant must never be released while its work is still in flight.
    pub fn clear_lock(&self) {
        let mut guard = self.shared.lock().expect("connection mutex poisoned");
        guard = self
            .condvar
            .wait_while(guard, |s| !s.drained())
            .expect("connection mutex poisoned");
        guard.tenant = EMPTY_LOCK_ID.to_string();
    }

    pub fn matches_lock(&self, id: &str) -> bool {
        let guard = self.shared.lock().expect("connection mutex poisoned");
        guard.tenant == id
    }

    pub fn is_empty_lock(&self) -> bool {
        self.matches_lock(EMPTY_LOCK_ID)
    }

    /// Refuse new work, drain outstanding work, stop and join the worker
    /// thread, and close the engine handle. Idempotent.
    pub fn close(&self) {
        {
            let mut guard = self.shared.lock().expect("connection mutex poisoned");
            guard.closed = true;
        }

        {
            let guard = self.shared.lock().expect("connection mutex poisoned");
            let mut guard = self
                .condvar
                .wait_while(guard, |s| !s.drained())
                .expect("connection mutex poisoned");
            guard.done = true;
        }
        self.condvar.notify_all();

        let handle = self
            .worker
            .lock()
            .expect("worker handle mutex poisoned")
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("connection worker thread panicked while shutting down");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_worker(
    path: PathBuf,
    conn: SqliteConnection,
    shared: Arc<Mutex<Shared>>,
    condvar: Arc<Condvar>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("quickpool-conn-{}", path.display()))
        .spawn(move || {
            let conn = conn;
            loop {
                let task = {
                    let guard = shared.lock().expect("connection mutex poisoned");
                    let mut guard = condvar
                        .wait_while(guard, |s| s.fifo.is_empty() && !s.done)
                        .expect("connection mutex poisoned");
                    match guard.fifo.pop_front() {
                        Some(task) => Some(task),
                        None => {
                            debug_assert!(guard.done);
                            None
                        }
                    }
                };

                let Some(task) = task else {
                    break;
                };

                {
                    let mut guard = shared.lock().expect("connection mutex poisoned");
                    guard.busy = true;
                }

                task(&conn);

                {
                    let mut guard = shared.lock().expect("connection mutex poisoned");
                    guard.busy = false;
                }
                condvar.notify_all();
            }
            debug!(path = %path.display(), "connection worker exiting");
        })
        .expect("failed to spawn connection worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;

    fn open_writer(path: &Path) -> Connection {
        Connection::open(path, ConnectionRole::Writer).unwrap()
    }

    #[tokio::test]
    async fn queue_and_run_task() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let conn = open_writer(tmp.path());

        conn.run_async(|c| {
            c.execute_batch("CREATE TABLE t(x INTEGER)")?;
            c.execute("INSERT INTO t VALUES (42)", [])?;
            Ok(())
        })
        .await
        .unwrap();

        let val: i64 = conn
            .run_async(|c| Ok(c.query_row("SELECT x FROM t", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(val, 42);
    }

    #[tokio::test]
    async fn tenancy_bookkeeping() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let conn = open_writer(tmp.path());

        assert!(conn.is_empty_lock());
        conn.activate_lock("ctx-1");
        assert!(conn.matches_lock("ctx-1"));
        assert!(!conn.is_empty_lock());

        conn.run_async(|c| Ok(c.execute_batch("CREATE TABLE t(x)")?))
            .await
            .unwrap();

        conn.clear_lock();
        assert!(conn.is_empty_lock());
    }

    #[tokio::test]
    async fn closed_connection_rejects_new_work() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let conn = open_writer(tmp.path());
        conn.close();

        let err = conn
            .run_async(|c| Ok(c.execute_batch("CREATE TABLE t(x)")?))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn tasks_run_in_submission_order() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let conn = open_writer(tmp.path());
        conn.run_async(|c| Ok(c.execute_batch("CREATE TABLE seq(n INTEGER)")?))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20i64 {
            let (task, rx) = make_task(move |c: &rusqlite::Connection| {
                c.execute("INSERT INTO seq VALUES (?1)", [i])?;
                Ok(())
            });
            conn.queue_work(task).unwrap();
            handles.push(rx);
        }
        for rx in handles {
            await_task(rx).await.unwrap();
        }

        let values: Vec<i64> = conn
            .run_async(|c| {
                let mut stmt = c.prepare("SELECT n FROM seq ORDER BY rowid")?;
                let rows = stmt
                    .query_map([], |r| r.get::<_, i64>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }
}
