//! `store_io` action: create-path call counters, summed across strands.

use crate::mgr::action::{ActionProfile, Mergeable, OutputFormat};

pub const PROFILE: ActionProfile = ActionProfile {
    name: "store_io",
    description: "storage engine IO interface statistics",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StoreIoAction {
    pub create_calls: f64,
    pub create_select_fail: f64,
    pub create_create_fail: f64,
    pub create_success: f64,
}

impl StoreIoAction {
    pub fn write_text(&self, out: &mut String) {
        out.push_str(&format!("create.calls = {}\n", self.create_calls));
        out.push_str(&format!("create.select_fail = {}\n", self.create_select_fail));
        out.push_str(&format!("create.create_fail = {}\n", self.create_create_fail));
        out.push_str(&format!("create.success = {}\n", self.create_success));
    }
}

impl Mergeable for StoreIoAction {
    fn add(&mut self, other: &Self) {
        self.create_calls += other.create_calls;
        self.create_select_fail += other.create_select_fail;
        self.create_create_fail += other.create_create_fail;
        self.create_success += other.create_success;
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&self.create_calls.to_le_bytes());
        out.extend_from_slice(&self.create_select_fail.to_le_bytes());
        out.extend_from_slice(&self.create_create_fail.to_le_bytes());
        out.extend_from_slice(&self.create_success.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 32 {
            return None;
        }
        Some(StoreIoAction {
            create_calls: f64::from_le_bytes(bytes[0..8].try_into().ok()?),
            create_select_fail: f64::from_le_bytes(bytes[8..16].try_into().ok()?),
            create_create_fail: f64::from_le_bytes(bytes[16..24].try_into().ok()?),
            create_success: f64::from_le_bytes(bytes[24..32].try_into().ok()?),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_sums_counters() {
        let mut a = StoreIoAction {
            create_calls: 1.0,
            ..Default::default()
        };
        let b = StoreIoAction {
            create_calls: 2.0,
            create_success: 2.0,
            ..Default::default()
        };
        a.add(&b);
        assert_eq!(a.create_calls, 3.0);
        assert_eq!(a.create_success, 2.0);
    }
}
