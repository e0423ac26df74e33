//! The Task Envelope: the unit of deferred work posted into a [`crate::connection::Connection`].
//!
//! A task is a closure over the engine handle. Per the failure semantics
//! tasks are expected to uphold, a task owns its own completion plumbing —
//! it never lets an error escape as a panic, it reports it through a
//! channel it holds itself.

use crate::error::{PoolError, Result};

/// A unit of work queued onto a connection's worker thread.
///
/// Boxed and type-erased: the worker only ever knows how to run it, never
/// what it produces. The closure is responsible for sending its own result
/// out through whatever channel it captured when it was constructed.
pub type Task = Box<dyn FnOnce(&rusqlite::Connection) + Send + 'static>;

/// Build a [`Task`] that runs `f` and reports its result through a fresh
/// oneshot channel, returning the receiving end as a future.
///
/// This is the bridge between the core's thread-per-connection execution
/// model and the `async fn` surface the [`crate::Coordinator`] exposes: the
/// task runs on the connection's dedicated OS thread, but the caller awaits
/// it like any other future.
pub fn make_task<F, T>(f: F) -> (Task, tokio::sync::oneshot::Receiver<Result<T>>)
where
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    let task: Task = Box::new(move |conn| {
        let result = f(conn);
        // The receiver may have been dropped (e.g. the awaiting future was
        // cancelled); there is nothing to do about that here, the task still
        // ran to completion against the engine.
        let _ = tx.send(result);
    });
    (task, rx)
}

/// Await a task's oneshot receiver, translating a dropped sender into
/// [`PoolError::TaskCancelled`].
pub async fn await_task<T>(rx: tokio::sync::oneshot::Receiver<Result<T>>) -> Result<T> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(PoolError::TaskCancelled),
    }
}

/// Build a [`Task`] that runs `f` and reports its result through a fresh
/// `std::sync::mpsc` channel, returning the receiving end for a blocking
/// wait.
///
/// Used by [`crate::connection::Connection::run_sync`], which admission-tier
/// callers (`Pool::open`'s hook installation, `Pool::attach`/`Pool::detach`)
/// invoke synchronously — including, via `Coordinator`, from inside an
/// `async fn` body already running on a tokio worker thread.
/// `tokio::sync::oneshot::Receiver::blocking_recv` panics when called from
/// such a thread; `std::sync::mpsc::Receiver::recv` carries no
/// runtime-context check and simply blocks the calling thread until the
/// connection's dedicated worker thread sends its result, which is exactly
/// what a synchronous admission-tier call is meant to do.
pub fn make_blocking_task<F, T>(f: F) -> (Task, std::sync::mpsc::Receiver<Result<T>>)
where
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    let task: Task = Box::new(move |conn| {
        let result = f(conn);
        let _ = tx.send(result);
    });
    (task, rx)
}
