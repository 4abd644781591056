//! `sbuf_stats` action: string-buffer allocator statistics, simplified to
//! the live/alloc/byte counters that matter for aggregation.

use crate::mgr::action::{ActionProfile, Mergeable, OutputFormat};

pub const PROFILE: ActionProfile = ActionProfile {
    name: "sbuf",
    description: "SBuf allocator statistics",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SbufStatsAction {
    pub live_buffers: u64,
    pub alloc_count: u64,
    pub bytes_allocated: u64,
    pub bytes_at_destruct: u64,
}

impl SbufStatsAction {
    pub fn write_text(&self, out: &mut String) {
        out.push_str(&format!("live buffers: {}\n", self.live_buffers));
        out.push_str(&format!("total allocations: {}\n", self.alloc_count));
        out.push_str(&format!("bytes allocated: {}\n", self.bytes_allocated));
        out.push_str(&format!("bytes at destruct: {}\n", self.bytes_at_destruct));
    }
}

impl Mergeable for SbufStatsAction {
    fn add(&mut self, other: &Self) {
        self.live_buffers += other.live_buffers;
        self.alloc_count += other.alloc_count;
        self.bytes_allocated += other.bytes_allocated;
        self.bytes_at_destruct += other.bytes_at_destruct;
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&self.live_buffers.to_le_bytes());
        out.extend_from_slice(&self.alloc_count.to_le_bytes());
        out.extend_from_slice(&self.bytes_allocated.to_le_bytes());
        out.extend_from_slice(&self.bytes_at_destruct.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 32 {
            return None;
        }
        Some(SbufStatsAction {
            live_buffers: u64::from_le_bytes(bytes[0..8].try_into().ok()?),
            alloc_count: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
            bytes_allocated: u64::from_le_bytes(bytes[16..24].try_into().ok()?),
            bytes_at_destruct: u64::from_le_bytes(bytes[24..32].try_into().ok()?),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_sums_all_counters() {
        let mut a = SbufStatsAction {
            live_buffers: 1,
            alloc_count: 2,
            bytes_allocated: 3,
            bytes_at_destruct: 4,
        };
        let b = a;
        a.add(&b);
        assert_eq!(a.live_buffers, 2);
        assert_eq!(a.bytes_at_destruct, 8);
    }
}
