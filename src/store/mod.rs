//! Cache storage engine: the UFS and COSS SwapDir implementations, the
//! per-object I/O state machine, and the controller that picks between
//! configured cache_dirs.

pub mod controller;
pub mod coss;
pub mod io_state;
pub mod swap_dir;
pub mod ufs;

pub use controller::{StoreController, StoreOutcome};
pub use io_state::{Disposition, StoreIoState};
pub use swap_dir::{Admission, SwapDir, SwapEngine};
