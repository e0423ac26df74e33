pub mod attach;
pub mod batch;
pub mod detach;
pub mod exec;
pub mod info;
pub mod init;
pub mod load_file;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quickpool_core::{Coordinator, ImmediateDispatcher, PoolCallbacks, TableUpdate, TransactionFinalized};

/// A [`PoolCallbacks`] that logs every notification at `info`/`debug`
/// level instead of acting on it — the CLI has no long-lived host loop to
/// hand these off to.
struct LoggingCallbacks;

impl PoolCallbacks for LoggingCallbacks {
    fn on_context_available(&self, db_name: &str, context_id: &str) {
        tracing::debug!(db_name, context_id, "context available");
    }
    fn on_table_update(&self, update: TableUpdate) {
        tracing::debug!(?update, "table update");
    }
    fn on_transaction_finalized(&self, finalized: TransactionFinalized) {
        tracing::debug!(?finalized, "transaction finalized");
    }
}

/// Open `db_name` under `documents_path` for the lifetime of one CLI
/// invocation. The CLI has no background dispatch loop, so hook
/// notifications are simply logged in place via [`ImmediateDispatcher`].
pub async fn open_coordinator(
    documents_path: &Path,
    db_name: &str,
    num_read_connections: u32,
) -> anyhow::Result<Coordinator> {
    let coordinator = Coordinator::new(documents_path.to_path_buf());
    let options = quickpool_core::PoolOptions::builder()
        .num_read_connections(num_read_connections)
        .build();
    coordinator
        .open(db_name, options, Arc::new(LoggingCallbacks), Arc::new(ImmediateDispatcher))
        .await?;
    Ok(coordinator)
}

/// Parse a single CLI-supplied parameter into a [`quickpool_core::Value`],
/// preferring the narrowest SQLite-native type that round-trips it.
pub fn parse_value(raw: &str) -> quickpool_core::Value {
    if raw == "NULL" {
        return quickpool_core::Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return quickpool_core::Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return quickpool_core::Value::Real(f);
    }
    quickpool_core::Value::Text(raw.to_string())
}

pub fn default_documents_path() -> PathBuf {
    PathBuf::from(".")
}

/// The context id every CLI-issued lock uses — a single process has no
/// concurrent contexts of its own to distinguish.
pub const CLI_CONTEXT: &str = "cli";
