//! Async disk I/O strategy: the layer neither engine is
//! allowed to bypass for a synchronous disk syscall.

pub mod buffer_pool;
pub mod pool;
pub mod request;

pub use buffer_pool::{BufferPools, PooledBuffer};
pub use pool::{magic1, magic2, IoThreadPool};
pub use request::{AsyncRequest, CancelToken, Completion, Opcode, RawOrOwned};
