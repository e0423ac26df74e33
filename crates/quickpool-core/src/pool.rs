//! The Pool component: one write Connection plus N read Connections, lock
//! admission, ATTACH/DETACH fan-out, and hook wiring

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::batch;
use crate::callback::{
    op_code, Dispatcher, HookRelay, PoolCallbacks, TableUpdate, TransactionEvent, TransactionFinalized,
};
use crate::config::LockClass;
use crate::connection::{Connection, ConnectionRole};
use crate::error::{PoolError, Result};
use crate::task::Task;
use crate::value::{BatchCommand, BatchResult, ExecResult, LoadFileResult, Value};

/// Owns one write [`Connection`] and N read `Connection`s for a single
/// database name, and everything needed to admit, queue, and route lock
/// contexts across them
pub struct Pool {
    db_name: Arc<str>,
    documents_path: PathBuf,
    write: Connection,
    reads: Vec<Connection>,
    read_queue: Mutex<VecDeque<String>>,
    write_queue: Mutex<VecDeque<String>>,
    callbacks: Arc<dyn PoolCallbacks>,
}

impl Pool {
    /// Open the write connection and `num_read_connections` read
    /// connections, then wire the update/commit/rollback hooks onto the
    /// write connection. On any connection failure, unwinds whatever was
    /// already opened
    pub fn open(
        db_name: Arc<str>,
        documents_path: PathBuf,
        db_path: &Path,
        num_read_connections: u32,
        callbacks: Arc<dyn PoolCallbacks>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        let write = Connection::open(db_path, ConnectionRole::Writer)?;

        let mut reads = Vec::with_capacity(num_read_connections as usize);
        for _ in 0..num_read_connections {
            match Connection::open(db_path, ConnectionRole::Reader) {
                Ok(conn) => reads.push(conn),
                Err(e) => {
                    write.close();
                    for conn in &reads {
                        conn.close();
                    }
                    return Err(e);
                }
            }
        }

        let hook_relay = Arc::new(HookRelay::new(callbacks.clone(), dispatcher));
        if let Err(e) = install_hooks(&write, db_name.clone(), hook_relay) {
            write.close();
            for conn in &reads {
                conn.close();
            }
            return Err(e);
        }

        info!(
            db_name = %db_name,
            readers = num_read_connections,
            compatibility_mode = num_read_connections == 0,
            "pool opened"
        );

        Ok(Self {
            db_name,
            documents_path,
            write,
            reads,
            read_queue: Mutex::new(VecDeque::new()),
            write_queue: Mutex::new(VecDeque::new()),
            callbacks,
        })
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// `N = 0` is compatibility mode: every read lock routes to the write
    /// connection. This is a routing rule, not a mode flag.
    fn compatibility_mode(&self) -> bool {
        self.reads.is_empty()
    }

    /// Request a read lock for `context_id`
    pub fn read_lock(&self, context_id: &str) {
        if self.compatibility_mode() {
            self.write_lock(context_id);
            return;
        }

        let mut queue = self.read_queue.lock().expect("read queue mutex poisoned");
        if !queue.is_empty() {
            queue.push_back(context_id.to_string());
            return;
        }

        if let Some(conn) = self.reads.iter().find(|c| c.is_empty_lock()) {
            drop(queue);
            self.activate(conn, context_id, LockClass::Read);
        } else {
            queue.push_back(context_id.to_string());
        }
    }

    /// Request a write lock for `context_id`
    pub fn write_lock(&self, context_id: &str) {
        if self.write.is_empty_lock() {
            self.activate(&self.write, context_id, LockClass::Write);
        } else {
            let mut queue = self.write_queue.lock().expect("write queue mutex poisoned");
            queue.push_back(context_id.to_string());
        }
    }

    /// Dispatch a lock request by class.
    pub fn request_lock(&self, context_id: &str, class: LockClass) {
        match class {
            LockClass::Read => self.read_lock(context_id),
            LockClass::Write => self.write_lock(context_id),
        }
    }

    fn activate(&self, conn: &Connection, context_id: &str, _class: LockClass) {
        conn.activate_lock(context_id);
        self.callbacks.on_context_available(&self.db_name, context_id);
    }

    /// Release `context_id`. If another context of the same class is
    /// waiting, it is activated directly on this connection — tenancy never
    /// passes through the sentinel in that case
    pub fn close_context(&self, context_id: &str) {
        if self.write.matches_lock(context_id) {
            self.release(&self.write, LockClass::Write);
            return;
        }
        for conn in &self.reads {
            if conn.matches_lock(context_id) {
                self.release(conn, LockClass::Read);
                return;
            }
        }
        // Unknown context id: a no-op.
    }

    fn release(&self, conn: &Connection, class: LockClass) {
        let queue = match class {
            LockClass::Read => &self.read_queue,
            LockClass::Write => &self.write_queue,
        };

        let next = {
            let mut queue = queue.lock().expect("wait queue mutex poisoned");
            queue.pop_front()
        };

        match next {
            Some(next_id) => self.activate(conn, &next_id, class),
            None => conn.clear_lock(),
        }
    }

    /// Locate the connection tenanted by `context_id` (write first, then
    /// reads) — the only way tasks reach a connection
    fn find_connection(&self, context_id: &str) -> Option<&Connection> {
        if self.write.matches_lock(context_id) {
            return Some(&self.write);
        }
        self.reads.iter().find(|c| c.matches_lock(context_id))
    }

    /// Forward `task` to the connection tenanted by `context_id`.
    pub fn queue_in_context(&self, context_id: &str, task: Task) -> Result<()> {
        let conn = self
            .find_connection(context_id)
            .ok_or_else(|| PoolError::ContextUnavailable(context_id.to_string()))?;
        conn.queue_work(task)
    }

    /// Run one statement in `context_id` and return its result
    pub async fn execute_in_context(
        &self,
        context_id: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecResult> {
        let conn = self
            .find_connection(context_id)
            .ok_or_else(|| PoolError::ContextUnavailable(context_id.to_string()))?;
        let sql = sql.to_string();
        conn.run_async(move |c| batch::execute_statement(c, &sql, &params))
            .await
    }

    /// Run `commands` inside one exclusive transaction in `context_id`,
    /// rolling back on the first failure
    pub async fn execute_batch(
        &self,
        context_id: &str,
        commands: Vec<BatchCommand>,
    ) -> Result<BatchResult> {
        let conn = self
            .find_connection(context_id)
            .ok_or_else(|| PoolError::ContextUnavailable(context_id.to_string()))?;
        conn.run_async(move |c| batch::execute_batch(c, &commands)).await
    }

    /// Load and execute one statement per line of `path` in `context_id`
    /// inside a single exclusive transaction
    pub async fn load_file(&self, context_id: &str, path: PathBuf) -> Result<LoadFileResult> {
        let conn = self
            .find_connection(context_id)
            .ok_or_else(|| PoolError::ContextUnavailable(context_id.to_string()))?;
        conn.run_async(move |c| batch::load_file(c, &path)).await
    }

    /// Refresh the schema cache on every connection in the pool
    pub async fn refresh_schema(&self) -> Result<()> {
        self.write.refresh_schema().await?;
        for conn in &self.reads {
            conn.refresh_schema().await?;
        }
        Ok(())
    }

    fn all_connections(&self) -> impl Iterator<Item = &Connection> {
        std::iter::once(&self.write).chain(self.reads.iter())
    }

    fn all_untenanted(&self) -> bool {
        self.all_connections().all(|c| c.is_empty_lock())
    }

    /// ATTACH `file_to_attach` under `alias`, requiring every connection to
    /// be untenanted. On failure after a partial attach, issues a
    /// compensating DETACH.
    pub fn attach(&self, file_to_attach: &Path, alias: &str) -> Result<()> {
        if !self.all_untenanted() {
            return Err(PoolError::AttachBlocked(
                "some connections were locked".to_string(),
            ));
        }

        let sql = format!(
            "ATTACH DATABASE '{}' AS {}",
            escape_sql_literal(&file_to_attach.to_string_lossy()),
            quote_ident(alias)
        );

        for (i, conn) in self.all_connections().enumerate() {
            let stmt = sql.clone();
            if let Err(e) = conn.run_sync(move |c| Ok(c.execute_batch(&stmt)?)) {
                for conn in self.all_connections().take(i) {
                    let detach_sql = format!("DETACH DATABASE {}", quote_ident(alias));
                    if let Err(de) = conn.run_sync(move |c| Ok(c.execute_batch(&detach_sql)?)) {
                        warn!(alias, error = %de, "compensating DETACH failed after partial ATTACH");
                    }
                }
                return Err(e);
            }
        }

        Ok(())
    }

    /// DETACH `alias`, requiring every connection to be untenanted
    pub fn detach(&self, alias: &str) -> Result<()> {
        if !self.all_untenanted() {
            return Err(PoolError::AttachBlocked(
                "some connections were locked".to_string(),
            ));
        }

        let sql = format!("DETACH DATABASE {}", quote_ident(alias));
        for conn in self.all_connections() {
            let stmt = sql.clone();
            conn.run_sync(move |c| Ok(c.execute_batch(&stmt)?))?;
        }
        Ok(())
    }

    /// Close every connection in the pool. Idempotent per-connection.
    pub fn close_all(&self) {
        self.write.close();
        for conn in &self.reads {
            conn.close();
        }
    }

    pub fn documents_path(&self) -> &Path {
        &self.documents_path
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn escape_sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn install_hooks(write: &Connection, db_name: Arc<str>, hook_relay: Arc<HookRelay>) -> Result<()> {
    let update_name = db_name.clone();
    let update_relay = hook_relay.clone();
    let commit_name = db_name.clone();
    let commit_relay = hook_relay.clone();
    let rollback_name = db_name;
    let rollback_relay = hook_relay;

    write.run_sync(move |conn| {
        conn.update_hook(Some(
            move |action: rusqlite::hooks::Action, schema: &str, table: &str, row_id: i64| {
                let op_code = match action {
                    rusqlite::hooks::Action::SQLITE_INSERT => op_code::INSERT,
                    rusqlite::hooks::Action::SQLITE_UPDATE => op_code::UPDATE,
                    rusqlite::hooks::Action::SQLITE_DELETE => op_code::DELETE,
                    _ => return,
                };
                update_relay.relay_table_update(TableUpdate {
                    db_name: update_name.to_string(),
                    op_code,
                    schema_name: schema.to_string(),
                    table_name: table.to_string(),
                    row_id,
                });
            },
        ));

        conn.commit_hook(Some(move || {
            commit_relay.relay_transaction_finalized(TransactionFinalized {
                db_name: commit_name.to_string(),
                event: TransactionEvent::Commit,
            });
            // Never veto a commit from this layer
            false
        }));

        conn.rollback_hook(Some(move || {
            rollback_relay.relay_transaction_finalized(TransactionFinalized {
                db_name: rollback_name.to_string(),
                event: TransactionEvent::Rollback,
            });
        }));

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::ImmediateDispatcher;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingCallbacks {
        available: StdMutex<Vec<(String, String)>>,
        updates: StdMutex<Vec<TableUpdate>>,
        finalized: StdMutex<Vec<TransactionFinalized>>,
    }

    impl PoolCallbacks for RecordingCallbacks {
        fn on_context_available(&self, db_name: &str, context_id: &str) {
            self.available
                .lock()
                .unwrap()
                .push((db_name.to_string(), context_id.to_string()));
        }
        fn on_table_update(&self, update: TableUpdate) {
            self.updates.lock().unwrap().push(update);
        }
        fn on_transaction_finalized(&self, finalized: TransactionFinalized) {
            self.finalized.lock().unwrap().push(finalized);
        }
    }

    fn open_pool(reads: u32, callbacks: Arc<RecordingCallbacks>) -> (Pool, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("test.sqlite3");
        let pool = Pool::open(
            Arc::from("test"),
            dir.path().to_path_buf(),
            &db_path,
            reads,
            callbacks,
            Arc::new(ImmediateDispatcher),
        )
        .unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn basic_single_writer_scenario() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let (pool, _dir) = open_pool(0, callbacks.clone());

        pool.write_lock("c1");
        assert_eq!(
            callbacks.available.lock().unwrap().last(),
            Some(&("test".to_string(), "c1".to_string()))
        );

        pool.execute_in_context("c1", "CREATE TABLE t(x)", vec![])
            .await
            .unwrap();
        let result = pool
            .execute_in_context(
                "c1",
                "INSERT INTO t VALUES (1),(2)",
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 2);

        let select = pool
            .execute_in_context("c1", "SELECT x FROM t ORDER BY x", vec![])
            .await
            .unwrap();
        let rows = select.rows.unwrap();
        assert_eq!(rows.len(), 2);

        pool.close_context("c1");
        assert!(pool.write.is_empty_lock());
    }

    #[tokio::test]
    async fn concurrent_readers_respect_pool_size() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let (pool, _dir) = open_pool(3, callbacks.clone());

        pool.read_lock("r1");
        pool.read_lock("r2");
        pool.read_lock("r3");
        pool.read_lock("r4");

        let available = callbacks.available.lock().unwrap().clone();
        assert_eq!(available.len(), 3);
        assert!(available.iter().any(|(_, id)| id == "r1"));
        assert!(available.iter().any(|(_, id)| id == "r3"));
        assert!(!available.iter().any(|(_, id)| id == "r4"));

        pool.close_context("r1");
        let available = callbacks.available.lock().unwrap().clone();
        assert!(available.iter().any(|(_, id)| id == "r4"));
    }

    /// T.3: among several contexts queued behind an already-full class,
    /// the k-th enqueued one activates strictly before the (k+1)-th, no
    /// matter how many are waiting at once.
    #[tokio::test]
    async fn queued_waiters_activate_in_strict_fifo_order() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let (pool, _dir) = open_pool(1, callbacks.clone());

        pool.read_lock("r0"); // takes the single read slot
        pool.read_lock("r1");
        pool.read_lock("r2");
        pool.read_lock("r3");

        let available = callbacks.available.lock().unwrap().clone();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].1, "r0");

        pool.close_context("r0");
        let available = callbacks.available.lock().unwrap().clone();
        assert_eq!(available.len(), 2);
        assert_eq!(available[1].1, "r1");

        pool.close_context("r1");
        let available = callbacks.available.lock().unwrap().clone();
        assert_eq!(available.len(), 3);
        assert_eq!(available[2].1, "r2");

        pool.close_context("r2");
        let available = callbacks.available.lock().unwrap().clone();
        assert_eq!(available.len(), 4);
        assert_eq!(available[3].1, "r3");
    }

    #[tokio::test]
    async fn writer_queues_behind_writer_but_not_reader() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let (pool, _dir) = open_pool(2, callbacks.clone());

        pool.write_lock("w1");
        pool.read_lock("r1");
        pool.write_lock("w2");

        let available = callbacks.available.lock().unwrap().clone();
        assert!(available.iter().any(|(_, id)| id == "w1"));
        assert!(available.iter().any(|(_, id)| id == "r1"));
        assert!(!available.iter().any(|(_, id)| id == "w2"));

        pool.close_context("w1");
        let available = callbacks.available.lock().unwrap().clone();
        assert!(available.iter().any(|(_, id)| id == "w2"));
    }

    #[tokio::test]
    async fn attach_blocked_while_locked() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let (pool, dir) = open_pool(1, callbacks);
        let side_path = dir.path().join("side.sqlite3");
        {
            let c = rusqlite::Connection::open(&side_path).unwrap();
            c.execute_batch("CREATE TABLE s(y INTEGER); INSERT INTO s VALUES (9)")
                .unwrap();
        }

        pool.read_lock("r1");
        let err = pool.attach(&side_path, "aux").unwrap_err();
        assert!(matches!(err, PoolError::AttachBlocked(_)));

        pool.close_context("r1");
        pool.attach(&side_path, "aux").unwrap();

        let result = pool
            .execute_in_context("nobody", "SELECT 1", vec![])
            .await;
        assert!(matches!(result, Err(PoolError::ContextUnavailable(_))));
    }

    #[tokio::test]
    async fn close_context_on_unknown_id_is_noop() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let (pool, _dir) = open_pool(0, callbacks);
        pool.close_context("does-not-exist");
    }

    #[tokio::test]
    async fn update_hook_fires_on_insert() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let (pool, _dir) = open_pool(0, callbacks.clone());

        pool.write_lock("c1");
        pool.execute_in_context("c1", "CREATE TABLE t(x)", vec![])
            .await
            .unwrap();
        pool.execute_in_context("c1", "INSERT INTO t VALUES (5)", vec![])
            .await
            .unwrap();

        let updates = callbacks.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].op_code, op_code::INSERT);
        assert_eq!(updates[0].table_name, "t");

        let finalized = callbacks.finalized.lock().unwrap().clone();
        assert!(finalized
            .iter()
            .any(|f| f.event == TransactionEvent::Commit));
    }
}
