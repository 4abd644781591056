//! Port: the receive loop shared by every IPC endpoint.
//!
//! A cooperative loop that pulls one message at a time from a channel and
//! dispatches it into virtual handler methods. The channel is a
//! [`UdsTransport`] and the dispatch target is a [`PortHandler`].

use std::path::Path;
use std::time::Duration;

use log::warn;

use crate::ipc::frame::Frame;
use crate::ipc::transport::UdsTransport;

/// Implemented by whatever logic should react to received frames — a
/// [`crate::ipc::strand::Strand`] or [`crate::ipc::coordinator::Coordinator`].
pub trait PortHandler {
    /// Handles one received, type-validated frame.
    fn receive(&mut self, frame: Frame);
}

/// A bound Unix-domain datagram endpoint driving a single-threaded,
/// cooperative receive loop.
pub struct Port {
    transport: UdsTransport,
}

impl Port {
    /// Binds a new port at `path`.
    pub fn bind(path: &Path) -> std::io::Result<Self> {
        Ok(Port {
            transport: UdsTransport::bind(path)?,
        })
    }

    /// This port's transport, for sending requests from the same socket a
    /// `Strand`/`Coordinator` receives on.
    pub fn transport(&self) -> &UdsTransport {
        &self.transport
    }

    /// Pulls and dispatches at most one pending frame. Returns `true` if a
    /// frame was processed, `false` if none was pending.
    pub fn poll_once(&self, handler: &mut dyn PortHandler) -> crate::error::Result<bool> {
        match self.transport.recv()? {
            Some(frame) => {
                handler.receive(frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs the cooperative loop until `should_stop` returns true, sleeping
    /// briefly between empty polls rather than busy-spinning. Without a
    /// dedicated `poll`/`epoll` wait on the datagram socket, a short sleep
    /// stands in for a blocking read.
    pub fn run(
        &self,
        handler: &mut dyn PortHandler,
        mut should_stop: impl FnMut() -> bool,
        idle_sleep: Duration,
    ) -> crate::error::Result<()> {
        while !should_stop() {
            match self.poll_once(handler) {
                Ok(true) => {}
                Ok(false) => std::thread::sleep(idle_sleep),
                Err(e) => {
                    warn!("port {:?} receive error: {e}", self.transport.path());
                    std::thread::sleep(idle_sleep);
                }
            }
        }
        Ok(())
    }
}
