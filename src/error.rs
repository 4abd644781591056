//! Crate-wide error kinds.
//!
//! Lower layers never leak a raw `errno` past the boundary they own: a
//! syscall failure is classified here and propagated as one of these kinds.

use std::io;

/// The kinds of failure the storage/IPC core distinguishes.
///
/// Transient conditions (`EINTR`-likes, `EAGAIN`) are retried by the caller
/// and never become a `StoreError` at all; everything else that reaches a
/// caller is one of the variants below.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// File or socket descriptor exhaustion (`ENFILE`/`EMFILE`). Non-fatal:
    /// the admission controller raises load in response.
    #[error("descriptor exhaustion: {0}")]
    Exhaustion(#[source] io::Error),

    /// No space left on a cache_dir's backing filesystem (`ENOSPC`). The
    /// owning SwapDir is marked `disk_full` and admission is disabled for it.
    #[error("no space left on device")]
    NoSpace,

    /// A swap.state record or on-disk file header failed validation. The
    /// offending record is skipped and counted; callers track totals to
    /// decide whether a directory needs a full rebuild.
    #[error("corrupt record: {0}")]
    Corruption(String),

    /// A received IPC frame had the wrong type tag or was truncated.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An answer's questioner id did not match this process; the answer
    /// belongs to a prior incarnation and was dropped.
    #[error("stale answer dropped")]
    StaleAnswer,

    /// A Forwarder/Inquirer request exceeded its wall-clock timeout.
    #[error("request timed out")]
    Timeout,

    /// Unrecoverable: registration timeout, listener-cache invariant
    /// violation, or similarly impossible-to-continue condition. The
    /// process that observes this is expected to abort.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Catch-all for I/O errors that don't fit a more specific kind above,
    /// still passed through with their original `io::Error`.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Classifies a raw OS error the way the async disk I/O layer and the
    /// SwapDir engines do: `ENFILE`/`EMFILE` become [`StoreError::Exhaustion`],
    /// `ENOSPC` becomes [`StoreError::NoSpace`], everything else passes
    /// through as [`StoreError::Io`].
    pub fn from_errno(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENFILE) | Some(libc::EMFILE) => StoreError::Exhaustion(err),
            Some(libc::ENOSPC) => StoreError::NoSpace,
            _ => StoreError::Io(err),
        }
    }

    /// True for conditions a caller should retry rather than surface.
    pub fn is_transient(err: &io::Error) -> bool {
        matches!(
            err.raw_os_error(),
            Some(libc::EINTR) | Some(libc::EAGAIN) | Some(libc::ENOENT)
        )
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
