//! Async disk I/O requests: one opcode per filesystem syscall the worker
//! threads may run on the engine's behalf, reshaped from a C tagged struct
//! into an enum of owned operations.

use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::PathBuf;

use crate::aio::buffer_pool::PooledBuffer;

/// One requested disk operation, owning everything its worker thread needs
/// to run it without touching shared state.
pub enum Opcode {
    Open {
        path: PathBuf,
        options: std::fs::OpenOptions,
    },
    Read {
        fd: RawOrOwned,
        offset: u64,
        buffer: PooledBuffer,
    },
    Write {
        fd: RawOrOwned,
        offset: u64,
        buffer: PooledBuffer,
    },
    Close {
        fd: OwnedFd,
    },
    Unlink {
        path: PathBuf,
    },
    Truncate {
        path: PathBuf,
        length: u64,
    },
    Stat {
        path: PathBuf,
    },
}

/// A request may reference a descriptor it does not own (still open
/// elsewhere) — mirrors the original's bare `int fd` used across Read/Write.
pub enum RawOrOwned {
    Borrowed(std::os::fd::RawFd),
    Owned(OwnedFd),
}

impl RawOrOwned {
    pub fn as_raw(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;
        match self {
            RawOrOwned::Borrowed(fd) => *fd,
            RawOrOwned::Owned(fd) => fd.as_raw_fd(),
        }
    }
}

/// What a completed (or cancelled) request reports back.
pub struct Completion {
    pub ret: i64,
    pub errno: i32,
    pub buffer: Option<PooledBuffer>,
    pub file: Option<File>,
    pub stat: Option<std::fs::Metadata>,
}

impl Completion {
    pub fn ok(ret: i64) -> Self {
        Completion {
            ret,
            errno: 0,
            buffer: None,
            file: None,
            stat: None,
        }
    }

    pub fn failed(errno: i32) -> Self {
        Completion {
            ret: -1,
            errno,
            buffer: None,
            file: None,
            stat: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.ret < 0
    }
}

/// A queued-or-in-flight operation plus its cancellation flag and completion
/// callback. `cancelled` is checked by the worker before running the
/// operation but the operation still runs — "a cancelled
/// request is still executed but its result is discarded; user callback is
/// not invoked."
pub struct AsyncRequest {
    pub opcode: Opcode,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
    pub callback: Option<Box<dyn FnOnce(Completion) + Send>>,
}

impl AsyncRequest {
    pub fn new(opcode: Opcode, callback: impl FnOnce(Completion) + Send + 'static) -> (Self, CancelToken) {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let token = CancelToken(flag.clone());
        (
            AsyncRequest {
                opcode,
                cancelled: flag,
                callback: Some(Box::new(callback)),
            },
            token,
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::Acquire)
    }
}

/// A handle the submitter keeps to cancel a request still queued or in
/// flight. Cancelling after completion is a harmless no-op.
#[derive(Clone)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }
}
