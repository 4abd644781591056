//! UFS SwapDir: classic two-level directory hierarchy.

pub mod dir;
pub mod file_map;
pub mod layout;
pub mod rebuild;
pub mod swap_log;

pub use dir::{ResidentEntry, UfsDir};
pub use layout::Layout;
