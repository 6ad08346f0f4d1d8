//! Crate-wide error taxonomy shared by every backend and the router facade.

use std::time::Duration;

/// Result of router and backend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the router and its backends.
///
/// Errors are never recovered internally; they are always returned to the
/// caller. The only internal recovery is the skill-panic catcher, which
/// translates a panicking executor into [`Error::SkillPanic`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The path did not resolve to a mount, file, record or snapshot.
    #[error("not found: {0}")]
    NotFound(String),

    /// The session's path allow-list rejected the operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A mutating operation was attempted on a read-only mount.
    #[error("read-only: {0}")]
    ReadOnly(String),

    /// A malformed argument, such as a non-numeric `top_k` value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation does not apply to the target, such as reading the
    /// memory mount directory as a file.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A host I/O failure surfaced by a backend.
    #[error("i/o error: {0}")]
    Io(String),

    /// The named skill is not registered.
    #[error("skill not found: {0}")]
    SkillNotFound(String),

    /// The skill executed but reported failure in its response.
    #[error("skill error: {0}")]
    Skill(String),

    /// The skill executor panicked; the panic was caught and the process
    /// kept running.
    #[error("skill panic: {0}")]
    SkillPanic(String),

    /// A skill execution exceeded its timeout. The late result, if any,
    /// is discarded.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A session, skill or snapshot with this name already exists.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// The operation conflicts with current state, such as deleting the
    /// current snapshot or mounting over an occupied mountpoint.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl Error {
    /// Map a host I/O error for `path` into the taxonomy.
    ///
    /// Missing paths become [`Error::NotFound`]; everything else is
    /// reported as [`Error::Io`] with the OS message preserved.
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_owned()),
            _ => Error::Io(format!("{path}: {err}")),
        }
    }
}
