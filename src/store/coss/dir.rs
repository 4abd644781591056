//! COSS stripe engine: one append-mostly file per cache_dir,
//! in-memory buffered writes, log-structured wraparound.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;

use crate::aio::{BufferPools, IoThreadPool, Opcode, RawOrOwned};
use crate::cache_key::CacheKey;
use crate::store::coss::membuf::MemBuf;

/// Maximum addressable byte offset for a given block-size, per the 25-bit
/// file-number field: `(2^25) << blksz_bits`.
pub fn max_addressable(block_size: u32) -> u64 {
    let blksz_bits = block_size.trailing_zeros();
    (1u64 << 25) << blksz_bits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(u64),
    /// The allocator needed to evict the entry currently being written in
    /// order to make room for it; the caller should reallocate and retry.
    Collision,
}

pub enum ReadOutcome {
    InMemory(Vec<u8>),
    FromDisk(u64),
    NotFound,
}

pub struct CossDir {
    path: PathBuf,
    file: File,
    pool: &'static IoThreadPool,
    buffer_pools: &'static BufferPools,
    max_size: u64,
    membuf_capacity: usize,
    current_offset: u64,
    membufs: VecDeque<MemBuf>,
    index: HashMap<CacheKey, u64>,
}

impl CossDir {
    /// Opens (creating if needed) the stripe file and starts with a single
    /// current membuf at offset 0: exactly one `current_membuf` exists at
    /// all times once running.
    pub fn open(
        path: &Path,
        max_size: u64,
        block_size: u32,
        membuf_capacity: usize,
        pool: &'static IoThreadPool,
        buffer_pools: &'static BufferPools,
    ) -> std::io::Result<Self> {
        if max_size > max_addressable(block_size) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "max_size exceeds addressable range for this block size",
            ));
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let mut membufs = VecDeque::new();
        membufs.push_back(MemBuf::new(0, membuf_capacity));
        Ok(CossDir {
            path: path.to_owned(),
            file,
            pool,
            buffer_pools,
            max_size,
            membuf_capacity,
            current_offset: 0,
            membufs,
            index: HashMap::new(),
        })
    }

    /// The log-structured write cursor, not the sum of resident object bytes.
    pub fn current_size(&self) -> u64 {
        self.current_offset
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Appends `bytes` for `key` into the current membuf, rotating to a
    /// fresh one if the write would cross `diskend`. `on_evict` is called
    /// for every entry whose backing range is about to be overwritten.
    pub fn write(
        &mut self,
        key: CacheKey,
        bytes: &[u8],
        on_evict: &mut impl FnMut(CacheKey),
    ) -> WriteOutcome {
        let needs_rotate = self.membufs.back().is_none_or(|b| bytes.len() > b.remaining());
        if needs_rotate {
            if self.rotate_membuf(key, on_evict) {
                return WriteOutcome::Collision;
            }
        }
        let buf = self.membufs.back_mut().expect("rotate always leaves a current membuf");
        let offset = buf.append(key, bytes);
        self.index.insert(key, offset);
        WriteOutcome::Written(offset)
    }

    /// Freezes the current membuf, advances `current_offset` (wrapping to 0
    /// past `max_size` — the log-structured circular file), evicts any
    /// entries whose range the new membuf is about to own, and pushes the
    /// new current membuf. Returns `true` if `curfn_key` itself was among
    /// the evicted range (a collision the caller must retry past).
    fn rotate_membuf(&mut self, curfn_key: CacheKey, on_evict: &mut impl FnMut(CacheKey)) -> bool {
        if let Some(buf) = self.membufs.back_mut() {
            buf.full = true;
        }
        self.current_offset += self.membuf_capacity as u64;
        if self.current_offset + self.membuf_capacity as u64 > self.max_size {
            self.current_offset = 0;
        }
        let new_start = self.current_offset;
        let new_end = new_start + self.membuf_capacity as u64;

        let victims: Vec<CacheKey> = self
            .index
            .iter()
            .filter(|(_, &offset)| offset >= new_start && offset < new_end)
            .map(|(key, _)| *key)
            .collect();

        let mut collision = false;
        for key in victims {
            if key == curfn_key {
                collision = true;
                continue;
            }
            self.index.remove(&key);
            on_evict(key);
        }

        self.membufs.push_back(MemBuf::new(new_start, self.membuf_capacity));
        // bound memory: only the current and one prior (still-flushing) membuf
        // need to stay resident once fully written.
        while self.membufs.len() > 2 && self.membufs.front().is_some_and(|b| b.full && !b.writing) {
            self.membufs.pop_front();
        }
        collision
    }

    /// Looks up `key`: served from a resident membuf if still in memory,
    /// else the caller must issue a disk read at the returned offset.
    pub fn read(&self, key: &CacheKey, len: usize) -> ReadOutcome {
        let Some(&offset) = self.index.get(key) else {
            return ReadOutcome::NotFound;
        };
        for buf in &self.membufs {
            if let Some(bytes) = buf.read_at(offset, len) {
                return ReadOutcome::InMemory(bytes.to_vec());
            }
        }
        ReadOutcome::FromDisk(offset)
    }

    /// A read whose membuf has already been evicted but whose index entry
    /// is still considered valid is refused; the object is reallocated to
    /// the current write cursor and the caller is told the object moved.
    pub fn relocate_after_evicted_read(
        &mut self,
        key: CacheKey,
        bytes: &[u8],
        on_evict: &mut impl FnMut(CacheKey),
    ) -> WriteOutcome {
        self.write(key, bytes, on_evict)
    }

    /// Flushes every `full && !writing` membuf to disk through the async
    /// I/O thread pool, blocking this call until all of them land.
    pub fn sync(&mut self) {
        loop {
            let Some(pos) = self.membufs.iter().position(|b| b.full && !b.writing) else {
                break;
            };
            let (disk_start, bytes) = {
                let buf = &self.membufs[pos];
                (buf.disk_start, buf.as_bytes().to_vec())
            };
            self.membufs[pos].writing = true;

            let mut pooled = self.buffer_pools.acquire(bytes.len());
            pooled.as_mut_slice()[..bytes.len()].copy_from_slice(&bytes);

            let done = Arc::new(AtomicBool::new(false));
            let done2 = done.clone();
            self.pool.submit(
                Opcode::Write {
                    fd: RawOrOwned::Borrowed(self.file.as_raw_fd()),
                    offset: disk_start,
                    buffer: pooled,
                },
                move |completion| {
                    if completion.is_error() {
                        warn!("coss stripe write failed at offset {disk_start}");
                    }
                    done2.store(true, Ordering::SeqCst);
                },
            );
            while !done.load(Ordering::SeqCst) {
                self.pool.poll_done();
            }
            self.membufs[pos].writing = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
