//! The capability-based callback bundle a host installs when it opens a
//! database.
//!
//! The source this crate is modeled on stores raw C function pointers and a
//! hand-rolled trampoline with a `void*` back-pointer as user-data. Rust
//! closures already capture their environment, so there is nothing to
//! trampoline through: a [`PoolCallbacks`] implementor is handed to the
//! [`crate::pool::Pool`] as an `Arc<dyn PoolCallbacks>` and lives exactly as
//! long as the Pool does.

use std::sync::Arc;

/// `PRAGMA`-independent SQLite opcode constants used by `onTableUpdate`,
/// matching the engine's own convention.
pub mod op_code {
    pub const DELETE: i32 = 9;
    pub const INSERT: i32 = 18;
    pub const UPDATE: i32 = 23;
}

/// One row-level change notification forwarded from the engine's update
/// hook.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TableUpdate {
    pub db_name: String,
    pub op_code: i32,
    /// The engine's own schema name the change occurred in (`"main"`, or an
    /// attached alias) — distinct from `db_name`, which is this Pool's name.
    pub schema_name: String,
    pub table_name: String,
    pub row_id: i64,
}

/// How a write transaction on the write Connection finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransactionEvent {
    Commit = 0,
    Rollback = 1,
}

/// One transaction-finalized notification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionFinalized {
    pub db_name: String,
    pub event: TransactionEvent,
}

/// The three notifications a host receives from a [`crate::pool::Pool`].
///
/// `on_context_available` runs synchronously on the admission thread that
/// triggered the activation. `on_table_update` and
/// `on_transaction_finalized` run on the engine's own thread inside a hook
/// and MUST NOT call back into the engine — implementors should forward
/// them through a [`Dispatcher`] rather than act on them directly.
pub trait PoolCallbacks: Send + Sync {
    fn on_context_available(&self, db_name: &str, context_id: &str);
    fn on_table_update(&self, update: TableUpdate);
    fn on_transaction_finalized(&self, finalized: TransactionFinalized);
}

/// A caller-supplied single-threaded dispatch primitive.
///
/// The Hook Relay posts onto this from inside an engine hook instead of
/// invoking [`PoolCallbacks`] directly, so that the host-side handler is
/// free to re-enter the engine through the normal lock/queue paths once it
/// runs on its own thread.
pub trait Dispatcher: Send + Sync {
    fn post(&self, job: Box<dyn FnOnce() + Send>);
}

/// A [`Dispatcher`] that runs jobs immediately on whatever thread posts
/// them. Only appropriate for hosts that are themselves single-threaded and
/// already serialize access to the engine (e.g. tests) — see the
/// reentrancy warning on [`Dispatcher`].
pub struct ImmediateDispatcher;

impl Dispatcher for ImmediateDispatcher {
    fn post(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

pub(crate) struct HookRelay {
    callbacks: Arc<dyn PoolCallbacks>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl HookRelay {
    pub(crate) fn new(callbacks: Arc<dyn PoolCallbacks>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            callbacks,
            dispatcher,
        }
    }

    pub(crate) fn relay_table_update(&self, update: TableUpdate) {
        let callbacks = self.callbacks.clone();
        self.dispatcher
            .post(Box::new(move || callbacks.on_table_update(update)));
    }

    pub(crate) fn relay_transaction_finalized(&self, finalized: TransactionFinalized) {
        let callbacks = self.callbacks.clone();
        self.dispatcher
            .post(Box::new(move || callbacks.on_transaction_finalized(finalized)));
    }
}
