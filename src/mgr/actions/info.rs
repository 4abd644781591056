//! `info` action: mixed store-stats/rusage fields. Aggregation
//! sums counts and preserves the earliest `squid_start` across kids.

use crate::mgr::action::{ActionProfile, Mergeable, OutputFormat};

pub const PROFILE: ActionProfile = ActionProfile {
    name: "info",
    description: "general runtime information",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfoAction {
    pub squid_start: u32,
    pub store_swap_size: u64,
    pub store_mem_size: u64,
    pub client_http_requests: u64,
    pub cpu_time: f64,
}

impl InfoAction {
    pub fn write_text(&self, out: &mut String) {
        out.push_str(&format!("Start Time: {}\n", self.squid_start));
        out.push_str(&format!("Storage Swap size: {} KB\n", self.store_swap_size / 1024));
        out.push_str(&format!("Storage Mem size: {} KB\n", self.store_mem_size / 1024));
        out.push_str(&format!("Client HTTP requests: {}\n", self.client_http_requests));
        out.push_str(&format!("CPU Time: {:.3} seconds\n", self.cpu_time));
    }
}

impl Mergeable for InfoAction {
    fn add(&mut self, other: &Self) {
        self.squid_start = self.squid_start.min(other.squid_start);
        self.store_swap_size += other.store_swap_size;
        self.store_mem_size += other.store_mem_size;
        self.client_http_requests += other.client_http_requests;
        self.cpu_time += other.cpu_time;
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 8 * 4);
        out.extend_from_slice(&self.squid_start.to_le_bytes());
        out.extend_from_slice(&self.store_swap_size.to_le_bytes());
        out.extend_from_slice(&self.store_mem_size.to_le_bytes());
        out.extend_from_slice(&self.client_http_requests.to_le_bytes());
        out.extend_from_slice(&self.cpu_time.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 4 + 8 * 4 {
            return None;
        }
        Some(InfoAction {
            squid_start: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            store_swap_size: u64::from_le_bytes(bytes[4..12].try_into().ok()?),
            store_mem_size: u64::from_le_bytes(bytes[12..20].try_into().ok()?),
            client_http_requests: u64::from_le_bytes(bytes[20..28].try_into().ok()?),
            cpu_time: f64::from_le_bytes(bytes[28..36].try_into().ok()?),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_preserves_earliest_start_and_sums_counts() {
        let mut a = InfoAction {
            squid_start: 1000,
            store_swap_size: 10,
            store_mem_size: 5,
            client_http_requests: 1,
            cpu_time: 0.5,
        };
        let b = InfoAction {
            squid_start: 500,
            store_swap_size: 20,
            store_mem_size: 5,
            client_http_requests: 2,
            cpu_time: 0.25,
        };
        a.add(&b);
        assert_eq!(a.squid_start, 500);
        assert_eq!(a.store_swap_size, 30);
        assert_eq!(a.client_http_requests, 3);
    }
}
