//! Capability abstraction over the two SwapDir engines.
//!
//! A closed, two-member set reads more naturally in Rust as a tagged enum
//! dispatched by `match` than as a `dyn` trait object — there is no third
//! engine waiting in the wings and no need to erase the type.

use crate::aio::IoThreadPool;
use crate::store::coss::CossDir;
use crate::store::ufs::UfsDir;

pub enum SwapEngine {
    Ufs(UfsDir),
    Coss(CossDir),
}

impl SwapEngine {
    pub fn current_size(&self) -> u64 {
        match self {
            SwapEngine::Ufs(dir) => dir.current_size(),
            SwapEngine::Coss(dir) => dir.current_size(),
        }
    }

    pub fn max_size(&self) -> u64 {
        match self {
            SwapEngine::Ufs(dir) => dir.max_size(),
            SwapEngine::Coss(dir) => dir.max_size(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SwapEngine::Ufs(_) => "ufs",
            SwapEngine::Coss(_) => "coss",
        }
    }
}

/// Result of a `can_store()` admission check: a load-proportional score the
/// caller weighs against other cache_dirs, plus a hard refusal once
/// capacity or disk-thread backlog is exhausted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    pub load: f64,
    pub refuse: bool,
}

pub struct SwapDir {
    pub engine: SwapEngine,
}

impl SwapDir {
    pub fn new(engine: SwapEngine) -> Self {
        SwapDir { engine }
    }

    /// Combines the engine's own fill level with the async I/O layer's
    /// queue-depth backpressure ( MAGIC1/MAGIC2 thresholds).
    pub fn can_store(&self, io_pool: &IoThreadPool, object_size: u64) -> Admission {
        let disk_full = self.engine.current_size().saturating_add(object_size) > self.engine.max_size();
        Admission {
            load: io_pool.load_factor(),
            refuse: disk_full || io_pool.is_overloaded(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::aio::BufferPools;
    use crate::store::coss::CossDir;

    #[test]
    fn refuses_when_object_would_exceed_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let pools: &'static BufferPools = Box::leak(Box::new(BufferPools::new()));
        let pool: &'static IoThreadPool = Box::leak(Box::new(IoThreadPool::start(1, 1, pools)));
        let coss = CossDir::open(&dir.path().join("stripe"), 16, 8, 8, pool, pools).unwrap();
        let swap_dir = SwapDir::new(SwapEngine::Coss(coss));
        let admission = swap_dir.can_store(pool, 100);
        assert!(admission.refuse);
    }
}
