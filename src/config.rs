//! Configuration consumed by the core, but not parsed by it.
//!
//! The config-file parser itself is an external collaborator; these types
//! only describe the shape a caller hands in, mirroring the `cache_dir`
//! declarations and SMP options of Squid's own `squid.conf`.

use std::path::PathBuf;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// One `cache_dir` declaration: either a UFS two-level hierarchy or a COSS
/// append-mostly stripe file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum CacheDirConfig {
    /// `<path> <size-MB> <L1> <L2>`
    Ufs {
        path: PathBuf,
        size_mb: u64,
        l1: u32,
        l2: u32,
        /// Diagnostic mode: stat every resident file and compare sizes on rebuild.
        double_check: bool,
    },
    /// `<path> <size-MB> max-size=<bytes> block-size=<bytes> [IOEngine=<name>]`
    Coss {
        path: PathBuf,
        size_mb: u64,
        max_size: u64,
        block_size: u32,
        io_engine: Option<String>,
    },
}

impl CacheDirConfig {
    /// The configured cache root path, regardless of engine kind.
    pub fn path(&self) -> &std::path::Path {
        match self {
            CacheDirConfig::Ufs { path, .. } => path,
            CacheDirConfig::Coss { path, .. } => path,
        }
    }

    /// Validates engine-specific constraints that are cheap to check eagerly
    /// rather than discover at first I/O.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            CacheDirConfig::Ufs { l1, l2, .. } => {
                if *l1 == 0 || *l2 == 0 {
                    return Err("L1/L2 directory counts must be nonzero".into());
                }
                Ok(())
            }
            CacheDirConfig::Coss {
                max_size,
                block_size,
                ..
            } => {
                if !block_size.is_power_of_two() || *block_size > 8192 {
                    return Err(format!(
                        "block-size {block_size} must be a power of two no greater than 8192"
                    ));
                }
                let blksz_bits = block_size.trailing_zeros();
                // A 25-bit block index addresses blocks 0..=2^25-1, so
                // max_addressable itself (the 2^25'th block's end) is one
                // block past the last addressable byte.
                let max_addressable = (1u64 << 25) << blksz_bits;
                if *max_size >= max_addressable {
                    return Err(format!(
                        "max-size {max_size} exceeds addressable range {max_addressable} for block-size {block_size}"
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Options governing the SMP deployment as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SmpConfig {
    /// Number of strand (worker) processes.
    pub workers: u32,
    /// Directory holding `coordinator.ipc` and `kid-<N>.ipc` sockets.
    pub state_dir: PathBuf,
    /// Whether shared listener sockets should use an accept filter (BSD-ism,
    /// kept as an opaque pass-through option).
    pub accept_filter: Option<String>,
    /// Per-client-IP concurrent connection cap enforced above the core.
    pub client_ip_max_connections: Option<u32>,
}

impl SmpConfig {
    /// Path to the Coordinator's control socket.
    pub fn coordinator_socket(&self) -> PathBuf {
        self.state_dir.join("coordinator.ipc")
    }

    /// Path to a given strand's control socket.
    pub fn strand_socket(&self, kid_id: u32) -> PathBuf {
        self.state_dir.join(format!("kid-{kid_id}.ipc"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn coss_block_size_must_be_power_of_two() {
        let cfg = CacheDirConfig::Coss {
            path: "/tmp/coss".into(),
            size_mb: 1,
            max_size: 1024 * 1024,
            block_size: 500,
            io_engine: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn coss_max_size_bounds_checked() {
        let cfg = CacheDirConfig::Coss {
            path: "/tmp/coss".into(),
            size_mb: 1,
            max_size: (1u64 << 25) << 13, // block-size=8192 << 25 bits overflows by one bit
            block_size: 8192,
            io_engine: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ufs_rejects_zero_levels() {
        let cfg = CacheDirConfig::Ufs {
            path: "/tmp/ufs".into(),
            size_mb: 10,
            l1: 0,
            l2: 256,
            double_check: false,
        };
        assert!(cfg.validate().is_err());
    }
}
