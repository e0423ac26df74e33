pub mod batch;
pub mod callback;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod registry;
pub mod task;
pub mod value;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

pub use callback::{Dispatcher, ImmediateDispatcher, PoolCallbacks, TableUpdate, TransactionEvent, TransactionFinalized};
pub use config::{LockClass, PoolOptions, PoolOptionsBuilder};
pub use error::{PoolError, Result};
pub use value::{BatchCommand, BatchParams, BatchResult, ColumnMeta, ExecResult, LoadFileResult, Row, Value};

use registry::Registry;

/// The single public entry point. Wraps one process-wide [`Registry`] and
/// exposes exactly the operations of the external interface as async
/// methods, so that a binding author never touches `Registry`,
/// `pool::Pool`, or `connection::Connection` directly.
pub struct Coordinator {
    registry: Registry,
}

impl Coordinator {
    /// Create a coordinator rooted at `documents_path` — the directory
    /// under which every database name resolves to its own `.sqlite3`
    /// file.
    pub fn new(documents_path: impl Into<PathBuf>) -> Self {
        Self {
            registry: Registry::new(documents_path.into()),
        }
    }

    /// Open `db_name`, creating its file and connections if needed.
    /// Fails with [`PoolError::AlreadyOpen`] if `db_name` is already open
    /// in this process.
    pub async fn open(
        &self,
        db_name: &str,
        options: PoolOptions,
        callbacks: Arc<dyn PoolCallbacks>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<()> {
        self.registry.open(db_name, options, callbacks, dispatcher)
    }

    /// Close `db_name`. Fails with [`PoolError::NotOpen`] if `db_name` is
    /// not currently open — closing the same name twice fails on the
    /// second call.
    pub async fn close(&self, db_name: &str) -> Result<()> {
        self.registry.close(db_name)
    }

    /// Close `db_name` if open, then delete its on-disk file.
    pub async fn delete(&self, db_name: &str, location: Option<&str>) -> Result<()> {
        self.registry.delete(db_name, location)
    }

    /// Request a lock of `class` for `context_id` on `db_name`. Never
    /// blocks: if the connection is unavailable the context is queued and
    /// the registered [`PoolCallbacks::on_context_available`] fires later.
    pub async fn request_lock(&self, db_name: &str, context_id: &str, class: LockClass) -> Result<()> {
        self.registry.request_lock(db_name, context_id, class)
    }

    /// Release `context_id`'s lock on `db_name`, activating the next
    /// waiter of the same class if one is queued.
    pub async fn release_lock(&self, db_name: &str, context_id: &str) -> Result<()> {
        self.registry.release_lock(db_name, context_id)
    }

    /// Run one statement with bound `params` in `context_id`.
    pub async fn execute_in_context(
        &self,
        db_name: &str,
        context_id: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecResult> {
        self.registry
            .execute_in_context(db_name, context_id, sql, params)
            .await
    }

    /// Run `commands` inside one exclusive transaction in `context_id`,
    /// rolling back on the first failing statement.
    pub async fn execute_batch(
        &self,
        db_name: &str,
        context_id: &str,
        commands: Vec<BatchCommand>,
    ) -> Result<BatchResult> {
        self.registry.execute_batch(db_name, context_id, commands).await
    }

    /// Load and run one statement per line of `path` in `context_id`
    /// inside a single exclusive transaction.
    pub async fn load_file(&self, db_name: &str, context_id: &str, path: PathBuf) -> Result<LoadFileResult> {
        self.registry.load_file(db_name, context_id, path).await
    }

    /// Refresh the schema cache on every connection of `db_name`.
    pub async fn refresh_schema(&self, db_name: &str) -> Result<()> {
        self.registry.refresh_schema(db_name).await
    }

    /// ATTACH `file_to_attach` as `alias` on every connection of
    /// `db_name`. Requires every connection to be untenanted.
    pub async fn attach(&self, db_name: &str, file_to_attach: &std::path::Path, alias: &str) -> Result<()> {
        self.registry.attach(db_name, file_to_attach, alias)
    }

    /// DETACH `alias` from every connection of `db_name`. Requires every
    /// connection to be untenanted.
    pub async fn detach(&self, db_name: &str, alias: &str) -> Result<()> {
        self.registry.detach(db_name, alias)
    }

    /// Close every open database, e.g. at process shutdown.
    pub async fn close_all(&self) {
        self.registry.close_all();
        info!("coordinator closed all pools");
    }
}
