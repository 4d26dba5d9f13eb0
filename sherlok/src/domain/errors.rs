//! Structured error types for the monitor
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! The taxonomy follows the failure classes of the event path, the command
//! shell, and the connection handling; callbacks never propagate these to the
//! host, they swallow and log.

use thiserror::Error;

use sherlok_runtime::GuestCallError;

/// Failures on the event path. Callbacks log these and return.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Event for a method/class/thread the registry has never seen; dropped.
    #[error("event for unregistered {kind} {id:x}")]
    NotRegistered { kind: &'static str, id: u64 },

    /// Exit or contention event not matching the recorded state; dropped
    /// with a diagnostic.
    #[error("state mismatch: {0}")]
    StateMismatch(String),

    /// Negative counter or impossible generation. Fatal and intentional;
    /// the caller aborts with a dump.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Resource(#[from] std::io::Error),

    /// Reflective call into the host failed; pending exception state is
    /// cleared and the operation becomes a no-op.
    #[error(transparent)]
    GuestCall(#[from] GuestCallError),
}

/// Failures of the command interpreter, returned to the shell client as a
/// single `Command failed` event.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownVerb(String),

    #[error("invalid option -{flag}: {reason}")]
    BadOption { flag: char, reason: String },

    #[error("missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("invalid value for {key}: {value}")]
    BadValue { key: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of the shell connection. The accept loop recovers by closing the
/// client and listening again.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("login rejected")]
    LoginRejected,

    #[error("client disconnected")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Abort on a broken invariant (negative counter, impossible generation).
/// Intentionally fatal: continuing would publish corrupt figures.
pub fn fatal_invariant(detail: &str) -> ! {
    log::error!("invariant violation: {detail}");
    panic!("invariant violation: {detail}");
}
