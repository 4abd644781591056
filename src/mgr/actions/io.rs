//! `io` action: per-protocol read-size histograms, generalized across a
//! small protocol enum.

use crate::mgr::action::{ActionProfile, Mergeable, OutputFormat};

pub const BUCKETS: usize = 16;

pub const PROFILE: ActionProfile = ActionProfile {
    name: "io",
    description: "HTTP/FTP/Gopher I/O size histograms",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Ftp,
    Gopher,
}

pub const ALL_PROTOCOLS: [Protocol; 3] = [Protocol::Http, Protocol::Ftp, Protocol::Gopher];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoHistogram {
    pub buckets: [u64; BUCKETS],
}

impl IoHistogram {
    /// Records one read of `size` bytes into the appropriate power-of-two bucket.
    pub fn record(&mut self, size: usize) {
        let bucket = if size == 0 {
            0
        } else {
            (usize::BITS - size.leading_zeros()).min(BUCKETS as u32 - 1) as usize
        };
        self.buckets[bucket] += 1;
    }

    fn add(&mut self, other: &Self) {
        for (a, b) in self.buckets.iter_mut().zip(&other.buckets) {
            *a += b;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoAction {
    pub http: IoHistogram,
    pub ftp: IoHistogram,
    pub gopher: IoHistogram,
}

impl IoAction {
    pub fn histogram_mut(&mut self, protocol: Protocol) -> &mut IoHistogram {
        match protocol {
            Protocol::Http => &mut self.http,
            Protocol::Ftp => &mut self.ftp,
            Protocol::Gopher => &mut self.gopher,
        }
    }

    pub fn write_text(&self, out: &mut String) {
        for (name, hist) in [("http", &self.http), ("ftp", &self.ftp), ("gopher", &self.gopher)] {
            out.push_str(&format!("{name}: {:?}\n", hist.buckets));
        }
    }
}

impl Mergeable for IoAction {
    fn add(&mut self, other: &Self) {
        self.http.add(&other.http);
        self.ftp.add(&other.ftp);
        self.gopher.add(&other.gopher);
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BUCKETS * 3 * 8);
        for hist in [&self.http, &self.ftp, &self.gopher] {
            for bucket in &hist.buckets {
                out.extend_from_slice(&bucket.to_le_bytes());
            }
        }
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != BUCKETS * 3 * 8 {
            return None;
        }
        let mut values = bytes.chunks_exact(8).map(|c| u64::from_le_bytes(c.try_into().unwrap()));
        let mut read_hist = || -> IoHistogram {
            let mut h = IoHistogram::default();
            for bucket in h.buckets.iter_mut() {
                *bucket = values.next().unwrap();
            }
            h
        };
        Some(IoAction {
            http: read_hist(),
            ftp: read_hist(),
            gopher: read_hist(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_buckets_by_log2_size() {
        let mut hist = IoHistogram::default();
        hist.record(1);
        hist.record(1000);
        assert_eq!(hist.buckets[0], 1);
        assert!(hist.buckets[10] >= 1);
    }

    #[test]
    fn add_sums_all_three_protocols() {
        let mut a = IoAction::default();
        a.http.record(4);
        let mut b = IoAction::default();
        b.http.record(4);
        a.add(&b);
        assert_eq!(a.http.buckets.iter().sum::<u64>(), 2);
    }
}
