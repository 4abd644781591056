//! `counters` action: sum of per-kid named double counters.

use crate::mgr::action::{ActionProfile, Mergeable, OutputFormat};

pub const NUM_COUNTERS: usize = 64;

pub const PROFILE: ActionProfile = ActionProfile {
    name: "counters",
    description: "traffic and resource counters",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountersAction {
    pub values: [f64; NUM_COUNTERS],
}

impl CountersAction {
    pub fn collect_local(source: &[f64; NUM_COUNTERS]) -> Self {
        CountersAction { values: *source }
    }

    pub fn write_text(&self, out: &mut String) {
        for (i, v) in self.values.iter().enumerate() {
            out.push_str(&format!("counter.{i} = {v}\n"));
        }
    }
}

impl Mergeable for CountersAction {
    fn add(&mut self, other: &Self) {
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
    }

    fn encode(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != NUM_COUNTERS * 8 {
            return None;
        }
        let mut values = [0.0f64; NUM_COUNTERS];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            values[i] = f64::from_le_bytes(chunk.try_into().ok()?);
        }
        Some(CountersAction { values })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_sums_element_wise() {
        let mut a = CountersAction { values: [1.0; NUM_COUNTERS] };
        let b = CountersAction { values: [2.0; NUM_COUNTERS] };
        a.add(&b);
        assert_eq!(a.values[0], 3.0);
    }

    #[test]
    fn encode_decode_round_trips() {
        let mut values = [0.0; NUM_COUNTERS];
        values[3] = 42.5;
        let action = CountersAction { values };
        let decoded = CountersAction::decode(&action.encode()).unwrap();
        assert_eq!(decoded, action);
    }
}
