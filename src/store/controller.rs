//! Store controller: chooses a cache_dir for a new object and drives its
//! I/O through an engine-appropriate path, riding on top of [`StoreIoState`]
//! for the UFS engine's queued-read/write semantics.

use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::aio::{Completion, IoThreadPool, Opcode, RawOrOwned};
use crate::cache_key::CacheKey;
use crate::store::coss::{ReadOutcome as CossReadOutcome, WriteOutcome as CossWriteOutcome};
use crate::store::io_state::{Disposition, StoreIoState};
use crate::store::swap_dir::{SwapDir, SwapEngine};

pub struct StoreController {
    dirs: Vec<SwapDir>,
    io_pool: &'static IoThreadPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { dir_index: usize },
    NoSpace,
    Collision,
}

impl StoreController {
    pub fn new(dirs: Vec<SwapDir>, io_pool: &'static IoThreadPool) -> Self {
        StoreController { dirs, io_pool }
    }

    pub fn dir(&self, index: usize) -> Option<&SwapDir> {
        self.dirs.get(index)
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    /// Picks the least-loaded cache_dir willing to admit an object of
    /// `object_size`, skipping any that refuse admission under backpressure.
    pub fn choose_dir(&self, object_size: u64) -> Option<usize> {
        self.dirs
            .iter()
            .enumerate()
            .map(|(index, dir)| (index, dir.can_store(self.io_pool, object_size)))
            .filter(|(_, admission)| !admission.refuse)
            .min_by(|(_, a), (_, b)| a.load.partial_cmp(&b.load).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(index, _)| index)
    }

    /// Stores `bytes` for `key`, picking a cache_dir and writing through the
    /// engine-appropriate path. UFS allocates a file number and writes via
    /// the async I/O layer; COSS appends into its current membuf
    /// synchronously and lets `flush_due` drive the eventual disk write.
    pub fn store(&mut self, key: CacheKey, bytes: &[u8], now: u32) -> StoreOutcome {
        let Some(dir_index) = self.choose_dir(bytes.len() as u64) else {
            return StoreOutcome::NoSpace;
        };
        let dir = &mut self.dirs[dir_index];
        match &mut dir.engine {
            SwapEngine::Ufs(ufs) => match ufs.allocate(key, bytes.len() as u64, now) {
                Ok(file_n) => {
                    let path = ufs.path_for(file_n);
                    if let Err(e) = Self::write_through_pool(self.io_pool, &path, bytes) {
                        warn!("ufs write failed for file_n {file_n}: {e}");
                        let _ = ufs.release(&key, now);
                        return StoreOutcome::NoSpace;
                    }
                    StoreOutcome::Stored { dir_index }
                }
                Err(e) => {
                    warn!("ufs allocate failed: {e}");
                    StoreOutcome::NoSpace
                }
            },
            SwapEngine::Coss(coss) => {
                let mut evicted = Vec::new();
                match coss.write(key, bytes, &mut |k| evicted.push(k)) {
                    CossWriteOutcome::Written(_) => {
                        for key in evicted {
                            debug!("coss rotation evicted {key:?}");
                        }
                        StoreOutcome::Stored { dir_index }
                    }
                    CossWriteOutcome::Collision => StoreOutcome::Collision,
                }
            }
        }
    }

    /// Reads an object back. For COSS this may be served straight from a
    /// membuf; for UFS the bytes always come from disk via a
    /// [`StoreIoState`]-driven read (the caller owns the state machine
    /// instance for the object's lifetime, this just performs one read).
    pub fn read_coss_in_memory(&self, dir_index: usize, key: &CacheKey, len: usize) -> Option<Vec<u8>> {
        match self.dirs.get(dir_index).map(|d| &d.engine) {
            Some(SwapEngine::Coss(coss)) => match coss.read(key, len) {
                CossReadOutcome::InMemory(bytes) => Some(bytes),
                _ => None,
            },
            _ => None,
        }
    }

    /// Flushes any cache_dir with pending membuf writes (COSS only; UFS
    /// writes already go straight through the async I/O layer in `store`).
    pub fn flush_due(&mut self) {
        for dir in &mut self.dirs {
            if let SwapEngine::Coss(coss) = &mut dir.engine {
                coss.sync();
            }
        }
    }

    /// Translates a raw disk-layer failure into the four-way disposition the
    /// store IO state machine surfaces to callers.
    pub fn classify_io_error(err: &std::io::Error) -> Disposition {
        match err.raw_os_error() {
            Some(libc::ENOSPC) => Disposition::NoSpaceLeft,
            Some(0) => Disposition::Ok,
            _ if err.kind() == std::io::ErrorKind::UnexpectedEof => Disposition::Eof,
            _ => Disposition::Error,
        }
    }

    /// Drives one queued read through a `StoreIoState` for a UFS-backed
    /// object, translating disk errors via `classify_io_error`.
    pub fn ufs_read_through(
        &self,
        dir_index: usize,
        io: &mut StoreIoState,
        file_n: u32,
        offset: u64,
        len: usize,
        callback: impl FnOnce(Disposition, Option<Vec<u8>>) + Send + 'static,
    ) {
        let Some(SwapEngine::Ufs(ufs)) = self.dirs.get(dir_index).map(|d| &d.engine) else {
            callback(Disposition::Error, None);
            return;
        };
        let path = ufs.path_for(file_n);
        io.begin_open();
        match Self::read_through_pool(self.io_pool, &path, offset, len) {
            Ok(bytes) => {
                io.on_open_complete(true);
                if bytes.len() < len {
                    callback(Disposition::Eof, None);
                } else {
                    callback(Disposition::Ok, Some(bytes));
                }
            }
            Err(e) => {
                io.on_open_complete(false);
                callback(Self::classify_io_error(&e), None);
            }
        }
    }

    /// Submits `opcode` to `pool` and blocks this call, spinning on
    /// `poll_done`, until its completion arrives — the same
    /// submit-then-spin shape `CossDir::sync` uses to keep a disk op off
    /// the calling thread without turning every caller into a callback.
    fn run_blocking(pool: &IoThreadPool, opcode: Opcode) -> Completion {
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let slot: Arc<parking_lot::Mutex<Option<Completion>>> = Arc::new(parking_lot::Mutex::new(None));
        let slot2 = slot.clone();
        pool.submit(opcode, move |completion| {
            *slot2.lock() = Some(completion);
            done2.store(true, Ordering::SeqCst);
        });
        while !done.load(Ordering::SeqCst) {
            pool.poll_done();
        }
        slot.lock().take().expect("callback always runs before done is observed set")
    }

    /// Creates (or truncates) `path` and writes `bytes` to it, routed
    /// entirely through the async I/O thread pool.
    fn write_through_pool(pool: &IoThreadPool, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut options = std::fs::OpenOptions::new();
        options.create(true).write(true).truncate(true);
        let opened = Self::run_blocking(pool, Opcode::Open { path: path.to_owned(), options });
        if opened.is_error() {
            return Err(std::io::Error::from_raw_os_error(opened.errno));
        }
        let file = opened.file.expect("a successful Open completion always carries a file");
        let raw = file.as_raw_fd();

        let mut buffer = pool.buffer_pools().acquire(bytes.len());
        buffer.as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
        let written = Self::run_blocking(
            pool,
            Opcode::Write {
                fd: RawOrOwned::Borrowed(raw),
                offset: 0,
                buffer,
            },
        );

        let fd: OwnedFd = file.into();
        Self::run_blocking(pool, Opcode::Close { fd });

        if written.is_error() {
            return Err(std::io::Error::from_raw_os_error(written.errno));
        }
        Ok(())
    }

    /// Opens `path` and reads up to `len` bytes starting at `offset`,
    /// routed entirely through the async I/O thread pool. A short read
    /// (fewer than `len` bytes back) signals EOF to the caller.
    fn read_through_pool(pool: &IoThreadPool, path: &Path, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        let opened = Self::run_blocking(pool, Opcode::Open { path: path.to_owned(), options });
        if opened.is_error() {
            return Err(std::io::Error::from_raw_os_error(opened.errno));
        }
        let file = opened.file.expect("a successful Open completion always carries a file");
        let raw = file.as_raw_fd();

        let buffer = pool.buffer_pools().acquire(len);
        let read = Self::run_blocking(
            pool,
            Opcode::Read {
                fd: RawOrOwned::Borrowed(raw),
                offset,
                buffer,
            },
        );

        let fd: OwnedFd = file.into();
        Self::run_blocking(pool, Opcode::Close { fd });

        if read.is_error() {
            return Err(std::io::Error::from_raw_os_error(read.errno));
        }
        let n = read.ret.max(0) as usize;
        let mut bytes = read.buffer.map(|b| b.into_vec()).unwrap_or_default();
        bytes.truncate(n.min(len));
        Ok(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::aio::BufferPools;
    use crate::store::coss::CossDir;
    use crate::store::ufs::{Layout, UfsDir};

    fn pool() -> &'static IoThreadPool {
        let pools: &'static BufferPools = Box::leak(Box::new(BufferPools::new()));
        Box::leak(Box::new(IoThreadPool::start(1, 1, pools)))
    }

    #[test]
    fn chooses_least_loaded_admitting_dir() {
        let tmp1 = tempfile::tempdir().unwrap();
        let tmp2 = tempfile::tempdir().unwrap();
        let io_pool = pool();
        let ufs1 = UfsDir::open(tmp1.path(), Layout::new(2, 2), 1000, false, |_| {}).unwrap();
        let ufs2 = UfsDir::open(tmp2.path(), Layout::new(2, 2), 1000, false, |_| {}).unwrap();
        let mut controller = StoreController::new(
            vec![
                SwapDir::new(SwapEngine::Ufs(ufs1)),
                SwapDir::new(SwapEngine::Ufs(ufs2)),
            ],
            io_pool,
        );
        let key = CacheKey::new([5; 16]);
        let outcome = controller.store(key, b"hello", 1);
        assert!(matches!(outcome, StoreOutcome::Stored { .. }));
    }

    #[test]
    fn no_space_when_every_dir_refuses() {
        let tmp = tempfile::tempdir().unwrap();
        let io_pool = pool();
        let pools: &'static BufferPools = Box::leak(Box::new(BufferPools::new()));
        let coss = CossDir::open(&tmp.path().join("stripe"), 4, 4, 4, io_pool, pools).unwrap();
        let mut controller = StoreController::new(vec![SwapDir::new(SwapEngine::Coss(coss))], io_pool);
        let key = CacheKey::new([6; 16]);
        let outcome = controller.store(key, b"too much data for this tiny dir", 1);
        assert_eq!(outcome, StoreOutcome::NoSpace);
    }
}
