//! Async disk I/O thread pool.
//!
//! N worker threads block on a condition variable for queued requests; a
//! two-tier primary/overflow queue avoids blocking the main loop on
//! contention; a done queue is drained with `try_lock`.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::aio::buffer_pool::BufferPools;
use crate::aio::request::{AsyncRequest, CancelToken, Completion, Opcode, RawOrOwned};

/// Queue-length threshold above which [`IoThreadPool::load_factor`] starts
/// reporting non-zero load — `NUMTHREADS × ndirs × 5` in the original.
pub fn magic1(num_threads: usize, num_dirs: usize) -> usize {
    num_threads.max(1) * num_dirs.max(1) * 5
}

/// Queue-length threshold above which swap-in open/create requests are
/// refused outright — `MAGIC1 × 20`.
pub fn magic2(num_threads: usize, num_dirs: usize) -> usize {
    magic1(num_threads, num_dirs) * 20
}

struct FinishedRequest {
    callback: Option<Box<dyn FnOnce(Completion) + Send>>,
    completion: Completion,
}

/// A pool of worker threads executing [`AsyncRequest`]s off a primary queue,
/// reporting completions through a done queue polled from the main loop.
pub struct IoThreadPool {
    primary: Arc<(Mutex<VecDeque<AsyncRequest>>, Condvar)>,
    overflow: Mutex<VecDeque<AsyncRequest>>,
    done: Arc<Mutex<VecDeque<FinishedRequest>>>,
    queue_len: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    buffer_pools: &'static BufferPools,
    handles: Vec<std::thread::JoinHandle<()>>,
    magic1: usize,
    magic2: usize,
}

impl IoThreadPool {
    /// Spawns `num_threads` workers. Each blocks signals the way
    /// `aio_thread_loop` does (`SIGPIPE`, `SIGCHLD`, `SIGHUP`, `SIGTERM`,
    /// `SIGINT`, `SIGALRM`, ...) so host signal delivery cannot interrupt a
    /// thread mid-wait on the condition variable.
    pub fn start(num_threads: usize, num_dirs: usize, buffer_pools: &'static BufferPools) -> Self {
        let primary = Arc::new((Mutex::new(VecDeque::new()), Condvar::new()));
        let done = Arc::new(Mutex::new(VecDeque::new()));
        let queue_len = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            let primary = primary.clone();
            let done = done.clone();
            let shutdown = shutdown.clone();
            handles.push(std::thread::spawn(move || {
                block_disruptive_signals();
                worker_loop(primary, done, shutdown);
            }));
        }

        IoThreadPool {
            primary,
            overflow: Mutex::new(VecDeque::new()),
            done,
            queue_len,
            shutdown,
            buffer_pools,
            handles,
            magic1: magic1(num_threads, num_dirs),
            magic2: magic2(num_threads, num_dirs),
        }
    }

    pub fn buffer_pools(&self) -> &'static BufferPools {
        self.buffer_pools
    }

    /// Current combined queue depth (primary + overflow), for backpressure
    /// decisions.
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// A load-proportional score once [`Self::queue_len`] exceeds MAGIC1;
    /// zero otherwise.
    pub fn load_factor(&self) -> f64 {
        let len = self.queue_len();
        if len <= self.magic1 {
            0.0
        } else {
            (len - self.magic1) as f64 / self.magic1.max(1) as f64
        }
    }

    /// Whether swap-in open/create requests should be refused outright.
    pub fn is_overloaded(&self) -> bool {
        self.queue_len() > self.magic2
    }

    /// Submits a request. Tries the primary queue's mutex without blocking;
    /// on contention, parks it in the overflow queue for the next
    /// [`Self::drain_overflow`] call to pick up — mirrors `aio_queue_request`'s
    /// `request_queue2` fallback.
    pub fn submit(&self, opcode: Opcode, callback: impl FnOnce(Completion) + Send + 'static) -> CancelToken {
        let (request, token) = AsyncRequest::new(opcode, callback);
        self.queue_len.fetch_add(1, Ordering::Relaxed);
        match self.primary.0.try_lock() {
            Some(mut guard) => {
                guard.push_back(request);
                self.primary.1.notify_one();
            }
            None => {
                self.overflow.lock().push_back(request);
            }
        }
        token
    }

    /// Opportunistically moves overflow requests into the primary queue.
    /// Call this from the main loop alongside [`Self::poll_done`].
    pub fn drain_overflow(&self) {
        let mut overflow = self.overflow.lock();
        if overflow.is_empty() {
            return;
        }
        if let Some(mut primary) = self.primary.0.try_lock() {
            primary.extend(overflow.drain(..));
            self.primary.1.notify_all();
        }
    }

    /// Processes one completed request, invoking its callback. Returns
    /// `true` if one was processed, `false` if the done queue was empty.
    /// Entries belonging to a cancelled request are silently dropped
    /// (no callback invoked) and the next entry is tried, matching
    /// `aio_poll_done`'s `AIO_REPOLL` loop.
    pub fn poll_done(&self) -> bool {
        loop {
            let next = self.done.lock().pop_front();
            match next {
                Some(finished) => {
                    self.queue_len.fetch_sub(1, Ordering::Relaxed);
                    if let Some(callback) = finished.callback {
                        callback(finished.completion);
                    }
                    return true;
                }
                None => return false,
            }
        }
    }

    /// Blocks (spinning on [`Self::drain_overflow`]/[`Self::poll_done`])
    /// until the queue is empty.
    pub fn sync(&self) {
        loop {
            self.drain_overflow();
            while self.poll_done() {}
            if self.queue_len() == 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        self.primary.1.notify_all();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn block_disruptive_signals() {
    use nix::sys::signal::{SigSet, Signal};
    let mut set = SigSet::empty();
    for sig in [
        Signal::SIGPIPE,
        Signal::SIGCHLD,
        Signal::SIGHUP,
        Signal::SIGTERM,
        Signal::SIGINT,
        Signal::SIGALRM,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
    ] {
        set.add(sig);
    }
    if let Err(e) = set.thread_block() {
        warn!("failed to block signals on aio worker thread: {e}");
    }
}

fn worker_loop(
    primary: Arc<(Mutex<VecDeque<AsyncRequest>>, Condvar)>,
    done: Arc<Mutex<VecDeque<FinishedRequest>>>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        let request = {
            let (lock, cvar) = &*primary;
            let mut guard = lock.lock();
            loop {
                if let Some(request) = guard.pop_front() {
                    break Some(request);
                }
                if shutdown.load(Ordering::Acquire) {
                    break None;
                }
                cvar.wait_for(&mut guard, Duration::from_millis(200));
            }
        };
        let Some(request) = request else {
            return;
        };
        let was_cancelled_before = request.is_cancelled();
        let completion = execute(request.opcode);
        let finished = if was_cancelled_before {
            // Dropping `completion` here performs any compensation a
            // completed-but-cancelled operation needs: an `OwnedFd`/`File`
            // inside it closes on drop, a `PooledBuffer` recycles on drop —
            // mirrors `aio_cleanup_request`'s per-opcode cancellation cleanup.
            drop(completion);
            FinishedRequest {
                callback: None,
                completion: Completion::failed(libc::EINTR),
            }
        } else {
            FinishedRequest {
                callback: request.callback,
                completion,
            }
        };
        done.lock().push_back(finished);
    }
}

fn execute(opcode: Opcode) -> Completion {
    use std::io::{Read, Seek, SeekFrom, Write};
    match opcode {
        Opcode::Open { path, options } => match options.open(&path) {
            Ok(file) => {
                let mut c = Completion::ok(0);
                c.file = Some(file);
                c
            }
            Err(e) => Completion::failed(e.raw_os_error().unwrap_or(libc::EIO)),
        },
        Opcode::Read {
            fd,
            offset,
            mut buffer,
        } => {
            let mut file = borrow_file(fd.as_raw());
            let result = (|| -> std::io::Result<usize> {
                file.seek(SeekFrom::Start(offset))?;
                file.read(buffer.as_mut_slice())
            })();
            match result {
                Ok(n) => {
                    let mut c = Completion::ok(n as i64);
                    c.buffer = Some(buffer);
                    c
                }
                Err(e) => Completion::failed(e.raw_os_error().unwrap_or(libc::EIO)),
            }
        }
        Opcode::Write { fd, offset, buffer } => {
            let mut file = borrow_file(fd.as_raw());
            let result = (|| -> std::io::Result<usize> {
                file.seek(SeekFrom::Start(offset))?;
                file.write(buffer.as_slice())
            })();
            match result {
                Ok(n) => Completion::ok(n as i64),
                Err(e) => Completion::failed(e.raw_os_error().unwrap_or(libc::EIO)),
            }
        }
        Opcode::Close { fd } => {
            // Dropping the OwnedFd performs the close(); std does not
            // surface close()'s return value, matching the original's
            // "close() result is rarely actionable" treatment upstream.
            drop(fd);
            Completion::ok(0)
        }
        Opcode::Unlink { path } => match std::fs::remove_file(&path) {
            Ok(()) => Completion::ok(0),
            Err(e) => Completion::failed(e.raw_os_error().unwrap_or(libc::EIO)),
        },
        Opcode::Truncate { path, length } => match std::fs::OpenOptions::new().write(true).open(&path) {
            Ok(file) => match file.set_len(length) {
                Ok(()) => Completion::ok(0),
                Err(e) => Completion::failed(e.raw_os_error().unwrap_or(libc::EIO)),
            },
            Err(e) => Completion::failed(e.raw_os_error().unwrap_or(libc::EIO)),
        },
        Opcode::Stat { path } => match std::fs::metadata(&path) {
            Ok(meta) => {
                let mut c = Completion::ok(0);
                c.stat = Some(meta);
                c
            }
            Err(e) => Completion::failed(e.raw_os_error().unwrap_or(libc::EIO)),
        },
    }
}

/// Wraps a borrowed raw fd so `Read`/`Write` can use `std::fs::File`'s
/// convenience methods without taking ownership (and thus without closing
/// the descriptor when the wrapper goes out of scope).
fn borrow_file(raw: std::os::fd::RawFd) -> std::mem::ManuallyDrop<std::fs::File> {
    use std::os::fd::FromRawFd;
    std::mem::ManuallyDrop::new(unsafe { std::fs::File::from_raw_fd(raw) })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    fn pools() -> &'static BufferPools {
        Box::leak(Box::new(BufferPools::new()))
    }

    #[test]
    fn write_then_read_round_trips_through_the_pool() {
        let pool = IoThreadPool::start(2, 1, pools());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");

        let mut open_opts = std::fs::OpenOptions::new();
        open_opts.create(true).write(true).read(true);
        let (tx, rx) = mpsc::channel();
        pool.submit(
            Opcode::Open {
                path: path.clone(),
                options: open_opts,
            },
            move |completion| tx.send(completion).unwrap(),
        );
        let opened = loop {
            pool.drain_overflow();
            if pool.poll_done() {
                break rx.recv().unwrap();
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        assert!(!opened.is_error());
        let file = opened.file.unwrap();

        let mut buf = pool.buffer_pools().acquire(5);
        buf.as_mut_slice().copy_from_slice(b"hello");
        let raw = {
            use std::os::fd::AsRawFd;
            file.as_raw_fd()
        };
        std::mem::forget(file); // keep fd alive; Write op owns a borrowed copy
        let (tx2, rx2) = mpsc::channel();
        pool.submit(
            Opcode::Write {
                fd: RawOrOwned::Borrowed(raw),
                offset: 0,
                buffer: buf,
            },
            move |completion| tx2.send(completion).unwrap(),
        );
        let written = loop {
            pool.drain_overflow();
            if pool.poll_done() {
                break rx2.recv().unwrap();
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(written.ret, 5);

        pool.shutdown();
        let _ = Path::new(&path);
    }

    #[test]
    fn backpressure_thresholds_scale_with_threads_and_dirs() {
        assert_eq!(magic1(4, 2), 40);
        assert_eq!(magic2(4, 2), 800);
    }
}
