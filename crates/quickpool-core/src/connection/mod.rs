//! The Connection component: one engine handle plus a dedicated worker
//! thread that serializes tasks posted to it

pub mod pragmas;
mod worker;

pub use pragmas::ConnectionRole;
pub use worker::Connection;

/// The sentinel tenant value meaning "no context is bound to this
/// connection"
pub const EMPTY_LOCK_ID: &str = "";
