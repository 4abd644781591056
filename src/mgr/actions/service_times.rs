//! `service_times` action: 19-point percentile arrays, element-wise sum on
//! aggregation.

use crate::mgr::action::{ActionProfile, Mergeable, OutputFormat};

pub const NUM_POINTS: usize = 19;

pub const PROFILE: ActionProfile = ActionProfile {
    name: "service_times",
    description: "service time percentiles",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceTimesAction {
    pub samples: [f64; NUM_POINTS],
}

impl ServiceTimesAction {
    pub fn write_text(&self, out: &mut String) {
        for (i, sample) in self.samples.iter().enumerate() {
            out.push_str(&format!("percentile.{i} = {sample}\n"));
        }
    }
}

impl Mergeable for ServiceTimesAction {
    fn add(&mut self, other: &Self) {
        for (a, b) in self.samples.iter_mut().zip(&other.samples) {
            *a += b;
        }
    }

    fn encode(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != NUM_POINTS * 8 {
            return None;
        }
        let mut samples = [0.0; NUM_POINTS];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            samples[i] = f64::from_le_bytes(chunk.try_into().ok()?);
        }
        Some(ServiceTimesAction { samples })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut samples = [0.0; NUM_POINTS];
        samples[18] = 3.14;
        let action = ServiceTimesAction { samples };
        let decoded = ServiceTimesAction::decode(&action.encode()).unwrap();
        assert_eq!(decoded, action);
    }
}
