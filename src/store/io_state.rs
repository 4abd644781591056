//! Per-object I/O state machine, reshaped from implicit callback-driven
//! control flow into an explicit state machine.

use std::collections::VecDeque;

use crate::aio::PooledBuffer;

/// How a lower-layer failure is reported to the user, mirroring
/// `DISK_OK`/`DISK_ERROR`/`DISK_NO_SPACE_LEFT`/`DISK_EOF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ok,
    Error,
    NoSpaceLeft,
    Eof,
}

/// The state machine's position. `Reading`/`Writing` are entered from `Open`
/// while at least one operation is in flight and left back to `Open` once
/// the in-flight count returns to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Opening,
    Creating,
    Open,
    Reading,
    Writing,
    Closing,
    Closed,
}

pub struct QueuedRead {
    pub offset: u64,
    pub len: usize,
    pub callback: Box<dyn FnOnce(Disposition, Option<PooledBuffer>) + Send>,
}

pub struct QueuedWrite {
    pub offset: u64,
    pub buffer: PooledBuffer,
    pub callback: Box<dyn FnOnce(Disposition) + Send>,
}

/// Drives one in-flight cache object through `Idle -> Opening|Creating ->
/// Open -> {Reading,Writing}* -> Closing -> Closed`.
pub struct StoreIoState {
    state: State,
    read_queue: VecDeque<QueuedRead>,
    write_queue: VecDeque<QueuedWrite>,
    /// Reentrancy guard: prevents `drain_write_queue` recursing on itself
    /// when a write completes synchronously from inside the drain loop.
    write_draining: bool,
    /// Set when `close()` is requested while I/O is still pending; rechecked
    /// at each drain/completion boundary.
    try_closing: bool,
    active_io: u32,
    close_callback: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreIoState {
    pub fn new() -> Self {
        StoreIoState {
            state: State::Idle,
            read_queue: VecDeque::new(),
            write_queue: VecDeque::new(),
            write_draining: false,
            try_closing: false,
            active_io: 0,
            close_callback: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn begin_open(&mut self) {
        assert_eq!(self.state, State::Idle, "begin_open from non-Idle state");
        self.state = State::Opening;
    }

    pub fn begin_create(&mut self) {
        assert_eq!(self.state, State::Idle, "begin_create from non-Idle state");
        self.state = State::Creating;
    }

    /// Resolves `Opening`/`Creating`. On success transitions to `Open` and
    /// drains queued writes then reads; on failure transitions straight to
    /// `Closing` and empties the queues with an error disposition.
    pub fn on_open_complete(&mut self, ok: bool) {
        assert!(
            matches!(self.state, State::Opening | State::Creating),
            "on_open_complete outside Opening/Creating"
        );
        if ok {
            self.state = State::Open;
            self.drain_write_queue();
            self.kick_read_queue();
        } else {
            self.state = State::Closing;
            self.fail_queued(Disposition::Error);
            self.maybe_finish_closing();
        }
    }

    /// Queues a read. If the file is already open and idle it is started
    /// immediately via `kick_read_queue`; otherwise it waits for `Open`.
    pub fn queue_read(&mut self, read: QueuedRead) {
        self.read_queue.push_back(read);
        if self.state == State::Open {
            self.kick_read_queue();
        }
    }

    pub fn queue_write(&mut self, write: QueuedWrite) {
        self.write_queue.push_back(write);
        if self.state == State::Open {
            self.drain_write_queue();
        }
    }

    /// Starts every currently queued write. `write_draining` prevents this
    /// from being re-entered if a write's completion is delivered
    /// synchronously from inside the loop.
    pub fn drain_write_queue(&mut self) {
        if self.write_draining {
            return;
        }
        self.write_draining = true;
        while let Some(write) = self.write_queue.pop_front() {
            self.active_io += 1;
            self.state = State::Writing;
            (write.callback)(Disposition::Ok);
            self.end_io();
            if self.try_closing {
                break;
            }
        }
        self.write_draining = false;
    }

    /// Starts every currently queued read, once writes have drained —
    /// "the write-queue is drained first; the read-queue is
    /// drained next".
    pub fn kick_read_queue(&mut self) {
        if !self.write_queue.is_empty() {
            return;
        }
        while let Some(read) = self.read_queue.pop_front() {
            self.active_io += 1;
            self.state = State::Reading;
            (read.callback)(Disposition::Ok, None);
            self.end_io();
            if self.try_closing {
                break;
            }
        }
    }

    fn end_io(&mut self) {
        self.active_io = self.active_io.saturating_sub(1);
        if self.active_io == 0 && self.state != State::Closing && self.state != State::Closed {
            self.state = State::Open;
        }
        self.maybe_finish_closing();
    }

    fn fail_queued(&mut self, disposition: Disposition) {
        for read in self.read_queue.drain(..) {
            (read.callback)(disposition, None);
        }
        for write in self.write_queue.drain(..) {
            (write.callback)(disposition);
        }
    }

    /// Idempotent close request. Transitions to `Closing` immediately if no
    /// I/O is pending; otherwise arms `try_closing`, to be honored the next
    /// time `end_io` observes `active_io == 0`.
    pub fn close(&mut self, on_closed: impl FnOnce() + Send + 'static) {
        if self.state == State::Closed {
            on_closed();
            return;
        }
        self.close_callback = Some(Box::new(on_closed));
        if self.active_io == 0 && self.read_queue.is_empty() && self.write_queue.is_empty() {
            self.state = State::Closing;
            self.maybe_finish_closing();
        } else {
            self.try_closing = true;
        }
    }

    fn maybe_finish_closing(&mut self) {
        if self.state == State::Closing && self.active_io == 0 {
            self.state = State::Closed;
            if let Some(cb) = self.close_callback.take() {
                cb();
            }
        } else if self.try_closing && self.active_io == 0 && self.read_queue.is_empty() && self.write_queue.is_empty() {
            self.try_closing = false;
            self.state = State::Closing;
            self.state = State::Closed;
            if let Some(cb) = self.close_callback.take() {
                cb();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }
}

impl Default for StoreIoState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn open_then_close_with_no_pending_io() {
        let mut io = StoreIoState::new();
        io.begin_open();
        io.on_open_complete(true);
        assert_eq!(io.state(), State::Open);

        let closed = Arc::new(AtomicU32::new(0));
        let closed2 = closed.clone();
        io.close(move || {
            closed2.store(1, Ordering::SeqCst);
        });
        assert!(io.is_closed());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn writes_drain_before_reads() {
        let pools: &'static crate::aio::BufferPools =
            Box::leak(Box::new(crate::aio::BufferPools::new()));
        let mut io = StoreIoState::new();
        io.begin_create();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_w = order.clone();
        let order_r = order.clone();
        io.queue_write(QueuedWrite {
            offset: 0,
            buffer: pools.acquire(4),
            callback: Box::new(move |_| order_w.lock().unwrap().push("write")),
        });
        io.queue_read(QueuedRead {
            offset: 0,
            len: 4,
            callback: Box::new(move |_, _| order_r.lock().unwrap().push("read")),
        });
        io.on_open_complete(true);
        assert_eq!(*order.lock().unwrap(), vec!["write", "read"]);
    }

    #[test]
    fn failed_open_errors_out_queued_operations() {
        let mut io = StoreIoState::new();
        io.begin_open();
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        io.queue_read(QueuedRead {
            offset: 0,
            len: 1,
            callback: Box::new(move |disposition, _| {
                if disposition == Disposition::Error {
                    seen2.store(1, Ordering::SeqCst);
                }
            }),
        });
        io.on_open_complete(false);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(io.is_closed());
    }
}
