//! Fixed-capacity MPMC shared-memory ring: one SPSC ring per
//! `(producer, consumer)` kid pair, packed into a single shared-memory
//! segment labeled `"cf"`. `memmap2` backs the segment; atomics are placed
//! directly in the mapped bytes via `AtomicU32::from_ptr` so every worker
//! process, having mapped the same file, observes the same
//! head/tail/signal state.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// One element published on the collapsed-forwarding queue. `entry_ref` is
/// a [`crate::cache_key::CacheKey`]'s raw bytes; kept untyped here to avoid
/// a dependency from `cf` onto the higher-level store crate modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CfQueueElement {
    pub producer_kid_id: u32,
    pub entry_ref: [u8; 16],
}

const HEADER_BYTES: usize = 16; // head, tail, reader_signal, padding (u32 each)

/// The outcome of a [`CfQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Pushed, and the reader-signal flag was newly set — the caller should
    /// send a `CollapsedForwardingNotification` to the consumer.
    Notified,
    /// Pushed, but a notification is already in flight for this pair (the
    /// reader-signal flag was already set) —'s "at-most-one
    /// notification in flight per (producer, consumer)" invariant.
    AlreadyPending,
    /// The pair's ring was full; the element is dropped for this consumer.
    Full,
}

/// A shared-memory-backed collection of `num_workers * (num_workers - 1)`
/// single-producer/single-consumer rings, one per ordered kid pair.
pub struct CfQueue {
    mmap: MmapMut,
    num_workers: u32,
    capacity: u32,
}

impl CfQueue {
    fn pair_stride(capacity: u32) -> usize {
        HEADER_BYTES + capacity as usize * size_of::<CfQueueElement>()
    }

    /// Total segment size for `num_workers` kids with `capacity` slots per
    /// pairwise ring.
    pub fn segment_size(num_workers: u32, capacity: u32) -> usize {
        let pairs = num_workers as usize * (num_workers.saturating_sub(1)) as usize;
        pairs * Self::pair_stride(capacity)
    }

    /// Creates (or truncates) the backing file and maps it, zero-initializing
    /// every pair's header.
    pub fn create(path: &Path, num_workers: u32, capacity: u32) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(Self::segment_size(num_workers, capacity) as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(CfQueue {
            mmap,
            num_workers,
            capacity,
        })
    }

    /// Maps an already-created segment (a worker process joining after the
    /// Coordinator created it).
    pub fn open(path: &Path, num_workers: u32, capacity: u32) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        let expected = Self::segment_size(num_workers, capacity) as u64;
        if file.metadata()?.len() != expected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "cf queue segment size does not match expected (num_workers, capacity)",
            ));
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(CfQueue {
            mmap,
            num_workers,
            capacity,
        })
    }

    fn pair_index(&self, producer: u32, consumer: u32) -> usize {
        assert!(producer != consumer, "a worker does not queue to itself");
        // kid ids are 1-based; compress (producer, consumer) into a dense
        // index over the num_workers * (num_workers - 1) ordered pairs.
        let p = (producer - 1) as usize;
        let mut c = (consumer - 1) as usize;
        if c > p {
            c -= 1;
        }
        p * (self.num_workers as usize - 1) + c
    }

    fn pair_offset(&self, producer: u32, consumer: u32) -> usize {
        self.pair_index(producer, consumer) * Self::pair_stride(self.capacity)
    }

    fn atomics_at(&self, offset: usize) -> (&AtomicU32, &AtomicU32, &AtomicU32) {
        let base = self.mmap.as_ptr() as usize + offset;
        unsafe {
            (
                &*(base as *const AtomicU32),
                &*((base + 4) as *const AtomicU32),
                &*((base + 8) as *const AtomicU32),
            )
        }
    }

    fn slot_ptr(&self, offset: usize, index: u32) -> *mut CfQueueElement {
        let body = self.mmap.as_ptr() as usize + offset + HEADER_BYTES;
        (body + index as usize * size_of::<CfQueueElement>()) as *mut CfQueueElement
    }

    /// Pushes `elem` onto the `producer -> consumer` ring.
    pub fn push(&self, producer: u32, consumer: u32, elem: CfQueueElement) -> PushOutcome {
        let offset = self.pair_offset(producer, consumer);
        let (head, tail, signal) = self.atomics_at(offset);

        let t = tail.load(Ordering::Acquire);
        let h = head.load(Ordering::Acquire);
        if t.wrapping_sub(h) >= self.capacity {
            return PushOutcome::Full;
        }

        let slot = self.slot_ptr(offset, t % self.capacity);
        unsafe { slot.write(elem) };
        tail.store(t.wrapping_add(1), Ordering::Release);

        if signal.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            PushOutcome::Notified
        } else {
            PushOutcome::AlreadyPending
        }
    }

    /// Pops one element from the `producer -> consumer` ring, if any.
    pub fn pop(&self, producer: u32, consumer: u32) -> Option<CfQueueElement> {
        let offset = self.pair_offset(producer, consumer);
        let (head, tail, _) = self.atomics_at(offset);

        let h = head.load(Ordering::Acquire);
        let t = tail.load(Ordering::Acquire);
        if h == t {
            return None;
        }
        let slot = self.slot_ptr(offset, h % self.capacity);
        let elem = unsafe { slot.read() };
        head.store(h.wrapping_add(1), Ordering::Release);
        Some(elem)
    }

    /// Clears the reader-signal flag for the `producer -> consumer` pair —
    /// called once the consumer has drained the ring in response to a
    /// notification, re-arming it for the next push.
    pub fn clear_reader_signal(&self, producer: u32, consumer: u32) {
        let offset = self.pair_offset(producer, consumer);
        let (_, _, signal) = self.atomics_at(offset);
        signal.store(0, Ordering::Release);
    }

    pub fn num_workers(&self) -> u32 {
        self.num_workers
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

// SAFETY: every access goes through the atomics/raw pointer helpers above,
// which only ever touch disjoint per-pair regions of the mapped segment.
unsafe impl Send for CfQueue {}
unsafe impl Sync for CfQueue {}

#[cfg(test)]
mod test {
    use super::*;

    fn elem(producer: u32) -> CfQueueElement {
        CfQueueElement {
            producer_kid_id: producer,
            entry_ref: [7u8; 16],
        }
    }

    #[test]
    fn push_then_pop_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cf.seg");
        let queue = CfQueue::create(&path, 3, 4).unwrap();

        assert_eq!(queue.push(1, 2, elem(1)), PushOutcome::Notified);
        let popped = queue.pop(1, 2).unwrap();
        assert_eq!(popped.producer_kid_id, 1);
        assert!(queue.pop(1, 2).is_none());
    }

    #[test]
    fn second_push_before_clear_is_already_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cf.seg");
        let queue = CfQueue::create(&path, 3, 4).unwrap();

        assert_eq!(queue.push(1, 2, elem(1)), PushOutcome::Notified);
        assert_eq!(queue.push(1, 2, elem(1)), PushOutcome::AlreadyPending);
        queue.clear_reader_signal(1, 2);
        // drain then push again should re-notify
        queue.pop(1, 2).unwrap();
        queue.pop(1, 2).unwrap();
        assert_eq!(queue.push(1, 2, elem(1)), PushOutcome::Notified);
    }

    #[test]
    fn full_ring_reports_full_and_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cf.seg");
        let queue = CfQueue::create(&path, 3, 2).unwrap();

        assert_eq!(queue.push(1, 2, elem(1)), PushOutcome::Notified);
        assert_eq!(queue.push(1, 2, elem(1)), PushOutcome::AlreadyPending);
        assert_eq!(queue.push(1, 2, elem(1)), PushOutcome::Full);
    }

    #[test]
    fn distinct_pairs_do_not_interfere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cf.seg");
        let queue = CfQueue::create(&path, 3, 4).unwrap();

        queue.push(1, 2, elem(1));
        queue.push(1, 3, elem(1));
        queue.push(2, 1, elem(2));

        assert!(queue.pop(1, 2).is_some());
        assert!(queue.pop(1, 2).is_none());
        assert!(queue.pop(1, 3).is_some());
        assert!(queue.pop(2, 1).is_some());
    }
}
