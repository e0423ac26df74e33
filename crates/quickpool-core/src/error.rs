use std::path::PathBuf;

/// All errors produced by quickpool-core.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("database '{0}' is already open")]
    AlreadyOpen(String),

    #[error("database '{0}' is not open")]
    NotOpen(String),

    #[error("failed to open database at {}: {message}", path.display())]
    OpenFailed { path: PathBuf, message: String },

    #[error("context '{0}' is not the tenant of any connection")]
    ContextUnavailable(String),

    #[error("ATTACH/DETACH blocked: {0}")]
    AttachBlocked(String),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("engine error: {0}")]
    EngineError(#[from] rusqlite::Error),

    #[error("batch aborted: {first_error}")]
    BatchAborted { first_error: String },

    #[error("schema refresh failed: {0}")]
    SchemaRefreshFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task was dropped before it completed (connection shut down mid-flight)")]
    TaskCancelled,
}

pub type Result<T> = std::result::Result<T, PoolError>;
