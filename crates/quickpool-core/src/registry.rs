//! The process-wide Registry: named [`crate::pool::Pool`]s keyed by
//! database name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::callback::{Dispatcher, PoolCallbacks};
use crate::config::{resolve_db_path, LockClass, PoolOptions};
use crate::error::{PoolError, Result};
use crate::pool::Pool;
use crate::task::Task;
use crate::value::{BatchCommand, BatchResult, ExecResult, LoadFileResult, Value};

/// Remove `path`, treating a missing file as success rather than an error.
fn remove_file_if_present(path: &std::path::Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PoolError::Io(e)),
    }
}

/// Append `suffix` to a path's file name, e.g. `app.sqlite3` + `-wal` →
/// `app.sqlite3-wal` — the naming convention SQLite itself uses for its WAL
/// and shared-memory sidecar files.
fn with_appended_extension(path: &std::path::Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().expect("db path has a file name").to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Owns every open [`Pool`] in the process, keyed by database name. A
/// database name maps 1:1 to a `Pool` — opening an already-open name is
/// rejected rather than silently returning the existing one.
pub struct Registry {
    documents_path: PathBuf,
    pools: Mutex<HashMap<String, Arc<Pool>>>,
}

impl Registry {
    pub fn new(documents_path: PathBuf) -> Self {
        Self {
            documents_path,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Open `db_name`, failing with [`PoolError::AlreadyOpen`] if it is
    /// already registered.
    pub fn open(
        &self,
        db_name: &str,
        options: PoolOptions,
        callbacks: Arc<dyn PoolCallbacks>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<()> {
        let mut pools = self.pools.lock().expect("registry mutex poisoned");
        if pools.contains_key(db_name) {
            return Err(PoolError::AlreadyOpen(db_name.to_string()));
        }

        let db_path = resolve_db_path(&self.documents_path, options.location.as_deref(), db_name);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = Pool::open(
            Arc::from(db_name),
            self.documents_path.clone(),
            &db_path,
            options.num_read_connections,
            callbacks,
            dispatcher,
        )?;
        pools.insert(db_name.to_string(), Arc::new(pool));
        Ok(())
    }

    /// Close `db_name` and remove it from the registry. Fails with
    /// [`PoolError::NotOpen`] if `db_name` is not currently open — closing
    /// the same name twice fails on the second call.
    pub fn close(&self, db_name: &str) -> Result<()> {
        let pool = self.pools.lock().expect("registry mutex poisoned").remove(db_name);
        match pool {
            Some(pool) => {
                pool.close_all();
                info!(db_name, "pool closed");
                Ok(())
            }
            None => Err(PoolError::NotOpen(db_name.to_string())),
        }
    }

    /// Close `db_name` (if open) and delete its on-disk file along with its
    /// `-wal` and `-shm` siblings. Unlike [`Registry::close`], deleting an
    /// unopened name is not an error — the "close first" step is only
    /// performed when there is a pool to close.
    pub fn delete(&self, db_name: &str, location: Option<&str>) -> Result<()> {
        match self.close(db_name) {
            Ok(()) | Err(PoolError::NotOpen(_)) => {}
            Err(e) => return Err(e),
        }
        let db_path = resolve_db_path(&self.documents_path, location, db_name);
        remove_file_if_present(&db_path)?;
        remove_file_if_present(&with_appended_extension(&db_path, "-wal"))?;
        remove_file_if_present(&with_appended_extension(&db_path, "-shm"))?;
        Ok(())
    }

    fn get(&self, db_name: &str) -> Result<Arc<Pool>> {
        self.pools
            .lock()
            .expect("registry mutex poisoned")
            .get(db_name)
            .cloned()
            .ok_or_else(|| PoolError::NotOpen(db_name.to_string()))
    }

    pub fn request_lock(&self, db_name: &str, context_id: &str, class: LockClass) -> Result<()> {
        self.get(db_name)?.request_lock(context_id, class);
        Ok(())
    }

    pub fn release_lock(&self, db_name: &str, context_id: &str) -> Result<()> {
        self.get(db_name)?.close_context(context_id);
        Ok(())
    }

    pub fn queue_in_context(&self, db_name: &str, context_id: &str, task: Task) -> Result<()> {
        self.get(db_name)?.queue_in_context(context_id, task)
    }

    pub async fn execute_in_context(
        &self,
        db_name: &str,
        context_id: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecResult> {
        self.get(db_name)?
            .execute_in_context(context_id, sql, params)
            .await
    }

    pub async fn execute_batch(
        &self,
        db_name: &str,
        context_id: &str,
        commands: Vec<BatchCommand>,
    ) -> Result<BatchResult> {
        self.get(db_name)?.execute_batch(context_id, commands).await
    }

    pub async fn load_file(&self, db_name: &str, context_id: &str, path: PathBuf) -> Result<LoadFileResult> {
        self.get(db_name)?.load_file(context_id, path).await
    }

    pub async fn refresh_schema(&self, db_name: &str) -> Result<()> {
        self.get(db_name)?.refresh_schema().await
    }

    pub fn attach(&self, db_name: &str, file_to_attach: &Path, alias: &str) -> Result<()> {
        self.get(db_name)?.attach(file_to_attach, alias)
    }

    pub fn detach(&self, db_name: &str, alias: &str) -> Result<()> {
        self.get(db_name)?.detach(alias)
    }

    /// Close every open pool, e.g. at process shutdown.
    pub fn close_all(&self) {
        let mut pools = self.pools.lock().expect("registry mutex poisoned");
        for (db_name, pool) in pools.drain() {
            pool.close_all();
            info!(db_name, "pool closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{ImmediateDispatcher, TableUpdate, TransactionFinalized};

    struct NoopCallbacks;
    impl PoolCallbacks for NoopCallbacks {
        fn on_context_available(&self, _db_name: &str, _context_id: &str) {}
        fn on_table_update(&self, _update: TableUpdate) {}
        fn on_transaction_finalized(&self, _finalized: TransactionFinalized) {}
    }

    fn registry() -> (Registry, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        (Registry::new(dir.path().to_path_buf()), dir)
    }

    #[test]
    fn double_open_is_rejected() {
        let (registry, _dir) = registry();
        registry
            .open(
                "app",
                PoolOptions::default(),
                Arc::new(NoopCallbacks),
                Arc::new(ImmediateDispatcher),
            )
            .unwrap();

        let err = registry
            .open(
                "app",
                PoolOptions::default(),
                Arc::new(NoopCallbacks),
                Arc::new(ImmediateDispatcher),
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::AlreadyOpen(_)));
    }

    #[test]
    fn double_close_fails_the_second_time() {
        let (registry, _dir) = registry();
        registry
            .open(
                "app",
                PoolOptions::default(),
                Arc::new(NoopCallbacks),
                Arc::new(ImmediateDispatcher),
            )
            .unwrap();

        registry.close("app").unwrap();
        let err = registry.close("app").unwrap_err();
        assert!(matches!(err, PoolError::NotOpen(_)));
    }

    #[test]
    fn delete_of_unopened_name_is_not_an_error() {
        let (registry, _dir) = registry();
        registry.delete("ghost", None).unwrap();
    }

    #[tokio::test]
    async fn delete_removes_wal_and_shm_siblings() {
        let (registry, dir) = registry();
        registry
            .open(
                "app",
                PoolOptions::default(),
                Arc::new(NoopCallbacks),
                Arc::new(ImmediateDispatcher),
            )
            .unwrap();
        registry
            .request_lock("app", "c1", LockClass::Write)
            .unwrap();
        registry
            .execute_in_context("app", "c1", "CREATE TABLE t(x)", vec![])
            .await
            .unwrap();
        registry.release_lock("app", "c1").unwrap();

        let db_path = dir.path().join("app.sqlite3");
        let wal_path = dir.path().join("app.sqlite3-wal");
        let shm_path = dir.path().join("app.sqlite3-shm");
        std::fs::write(&wal_path, b"stray wal bytes").unwrap();
        std::fs::write(&shm_path, b"stray shm bytes").unwrap();

        registry.delete("app", None).unwrap();

        assert!(!db_path.exists());
        assert!(!wal_path.exists());
        assert!(!shm_path.exists());
    }

    #[test]
    fn operating_on_unopened_db_fails() {
        let (registry, _dir) = registry();
        let err = registry.release_lock("ghost", "c1").unwrap_err();
        assert!(matches!(err, PoolError::NotOpen(_)));
    }

    #[tokio::test]
    async fn reopen_after_close_succeeds() {
        let (registry, _dir) = registry();
        registry
            .open(
                "app",
                PoolOptions::default(),
                Arc::new(NoopCallbacks),
                Arc::new(ImmediateDispatcher),
            )
            .unwrap();
        registry
            .request_lock("app", "c1", LockClass::Write)
            .unwrap();
        registry
            .execute_in_context("app", "c1", "CREATE TABLE t(x)", vec![])
            .await
            .unwrap();
        registry.release_lock("app", "c1").unwrap();
        registry.close("app").unwrap();

        registry
            .open(
                "app",
                PoolOptions::default(),
                Arc::new(NoopCallbacks),
                Arc::new(ImmediateDispatcher),
            )
            .unwrap();
    }
}
