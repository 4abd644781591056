//! COSS SwapDir: append-mostly stripe file with in-memory write buffering.

pub mod dir;
pub mod membuf;

pub use dir::{max_addressable, CossDir, ReadOutcome, WriteOutcome};
pub use membuf::MemBuf;
