//! Cache storage engine and SMP coordination core for a forward/reverse
//! HTTP caching proxy.
//!
//! This crate owns five subsystems, each a top-level module:
//! - [`ipc`]: the typed message frame, UDS transport, and the
//!   Port/Strand/Coordinator process topology that lets worker processes
//!   ("strands") coordinate through a singleton Coordinator.
//! - [`aio`]: the async disk I/O strategy every SwapDir engine is built on —
//!   a worker thread pool with size-classed buffer pools and backpressure.
//! - [`cf`]: the collapsed-forwarding queue, letting one strand tell its
//!   peers about newly written data without routing through the Coordinator.
//! - [`store`]: the UFS and COSS SwapDir engines and the per-object I/O
//!   state machine that drives them.
//! - [`mgr`]: the cache manager action registry (`counters`, `info`,
//!   `io`, ...), aggregated across strands via `ipc`'s Forwarder/Inquirer.
//!
//! What this crate does not do: parse HTTP, evaluate ACLs, resolve DNS,
//! terminate TLS, parse the configuration file format, or implement the
//! listener socket itself. [`config`] only describes the shape of
//! already-parsed configuration a caller hands in.

pub mod aio;
pub mod cache_key;
pub mod cf;
pub mod config;
pub mod error;
pub mod ipc;
pub mod mgr;
pub mod store;

pub use cache_key::CacheKey;
pub use error::{Result, StoreError};
