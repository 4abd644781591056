//! `5min`/`60min` interval actions: per-kid sampled rate arrays.
//!
//! Aggregation takes the union of windows (earliest start, latest end) and
//! sums counts.

use crate::mgr::action::{ActionProfile, Mergeable, OutputFormat};

pub const PROFILE_5MIN: ActionProfile = ActionProfile {
    name: "5min",
    description: "5 minute average of counter rates",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

pub const PROFILE_60MIN: ActionProfile = ActionProfile {
    name: "60min",
    description: "60 minute average of counter rates",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalAction {
    pub window_start: u32,
    pub window_end: u32,
    pub rates: Vec<f64>,
}

impl IntervalAction {
    pub fn write_text(&self, out: &mut String) {
        out.push_str(&format!("window = [{}, {}]\n", self.window_start, self.window_end));
        for (i, rate) in self.rates.iter().enumerate() {
            out.push_str(&format!("rate.{i} = {rate}\n"));
        }
    }
}

impl Mergeable for IntervalAction {
    fn add(&mut self, other: &Self) {
        self.window_start = self.window_start.min(other.window_start);
        self.window_end = self.window_end.max(other.window_end);
        if self.rates.len() < other.rates.len() {
            self.rates.resize(other.rates.len(), 0.0);
        }
        for (a, b) in self.rates.iter_mut().zip(&other.rates) {
            *a += b;
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.rates.len() * 8);
        out.extend_from_slice(&self.window_start.to_le_bytes());
        out.extend_from_slice(&self.window_end.to_le_bytes());
        for rate in &self.rates {
            out.extend_from_slice(&rate.to_le_bytes());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 || (bytes.len() - 8) % 8 != 0 {
            return None;
        }
        let window_start = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
        let window_end = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
        let rates = bytes[8..]
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Some(IntervalAction {
            window_start,
            window_end,
            rates,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_unions_window_and_sums_rates() {
        let mut a = IntervalAction {
            window_start: 100,
            window_end: 200,
            rates: vec![1.0, 2.0],
        };
        let b = IntervalAction {
            window_start: 50,
            window_end: 250,
            rates: vec![3.0, 4.0],
        };
        a.add(&b);
        assert_eq!(a.window_start, 50);
        assert_eq!(a.window_end, 250);
        assert_eq!(a.rates, vec![4.0, 6.0]);
    }
}
