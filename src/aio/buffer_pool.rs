//! Size-class buffer pools for read/write requests.
//!
//! Read/write buffers are drawn from fixed size-class pools rather than
//! calling the general allocator for every request, bounding allocation
//! churn under sustained disk I/O.

use parking_lot::Mutex;

/// The size classes buffers are bucketed into. Requests larger than the
/// largest bucket fall back to a one-off `Vec` allocation.
const SIZE_CLASSES: [usize; 7] = [128, 512, 1024, 2048, 4096, 8192, 16384];

struct SizeClassPool {
    size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// A pool-backed (or, above the largest size class, freestanding) buffer.
/// Returning it via `Drop` recycles it into its size class.
pub struct PooledBuffer {
    data: Vec<u8>,
    class: Option<usize>,
    pools: Option<&'static BufferPools>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.pools = None; // skip recycling; caller now owns the bytes
        std::mem::take(&mut self.data)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let (Some(class), Some(pools)) = (self.class, self.pools) {
            let data = std::mem::take(&mut self.data);
            pools.recycle(class, data);
        }
    }
}

/// Owns one free-list per size class. A single instance is shared by every
/// worker thread in an [`crate::aio::pool::IoThreadPool`].
pub struct BufferPools {
    classes: Vec<SizeClassPool>,
}

impl Default for BufferPools {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPools {
    pub fn new() -> Self {
        BufferPools {
            classes: SIZE_CLASSES
                .iter()
                .map(|&size| SizeClassPool {
                    size,
                    free: Mutex::new(Vec::new()),
                })
                .collect(),
        }
    }

    fn class_index_for(&self, requested: usize) -> Option<usize> {
        self.classes.iter().position(|c| requested <= c.size)
    }

    /// Draws a zero-filled buffer of at least `requested` bytes from the
    /// smallest size class that fits, or allocates a one-off buffer above
    /// the largest class.
    pub fn acquire(self: &'static Self, requested: usize) -> PooledBuffer {
        match self.class_index_for(requested) {
            Some(idx) => {
                let class = &self.classes[idx];
                let mut data = class.free.lock().pop().unwrap_or_default();
                data.clear();
                data.resize(class.size, 0);
                PooledBuffer {
                    data,
                    class: Some(idx),
                    pools: Some(self),
                }
            }
            None => PooledBuffer {
                data: vec![0u8; requested],
                class: None,
                pools: None,
            },
        }
    }

    fn recycle(&self, class: usize, data: Vec<u8>) {
        self.classes[class].free.lock().push(data);
    }
}
