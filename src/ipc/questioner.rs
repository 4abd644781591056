//! Questioner identity and request correlation.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifies the OS process that asked a question. Travels on every
/// outgoing request and is echoed on every response; a response whose `qid`
/// does not match [`QuestionerId::mine`] belongs to a prior incarnation of
/// this process (e.g. a restarted strand whose pid got reused) and must be
/// silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionerId(libc::pid_t);

impl QuestionerId {
    /// The questioner id of the current process.
    pub fn mine() -> Self {
        QuestionerId(unsafe { libc::getpid() })
    }

    /// Whether `self` (taken from a received answer) still belongs to this
    /// process incarnation.
    pub fn is_mine(&self) -> bool {
        *self == Self::mine()
    }

    /// Raw pid value, exposed for logging only.
    pub fn raw(&self) -> libc::pid_t {
        self.0
    }
}

/// Process-local monotonic correlator for a pending IPC request.
///
/// `Index` 0 means "unset"; [`RequestIdAllocator`] skips it when wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    questioner: QuestionerId,
    index: NonZeroU32,
}

impl RequestId {
    /// The process that sent this request.
    pub fn questioner(&self) -> QuestionerId {
        self.questioner
    }

    /// The correlator value, unique among this questioner's concurrently
    /// pending requests.
    pub fn index(&self) -> NonZeroU32 {
        self.index
    }

    /// Rejects an answer whose questioner does not match this process,
    /// mirroring `Ipc::Mine()`'s `rejectAnswerIfStale`.
    pub fn reject_if_stale(&self) -> crate::error::Result<()> {
        if self.questioner.is_mine() {
            Ok(())
        } else {
            Err(crate::error::StoreError::StaleAnswer)
        }
    }
}

/// Issues fresh, non-zero, wrapping request indices for the current process.
#[derive(Debug, Default)]
pub struct RequestIdAllocator {
    next: AtomicU32,
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocates the next `RequestId`, skipping zero on wraparound.
    pub fn next(&self) -> RequestId {
        loop {
            let candidate = self.next.fetch_add(1, Ordering::Relaxed);
            if let Some(index) = NonZeroU32::new(candidate) {
                return RequestId {
                    questioner: QuestionerId::mine(),
                    index,
                };
            }
            // candidate was 0 (wrapped); loop to draw the next value.
        }
    }
}
