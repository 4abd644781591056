//! Strand: a worker process's side of the coordinator link.
//!
//! Binds its own channel, registers with the Coordinator, and then runs a
//! dedicated receive loop on top of it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::error::StoreError;
use crate::ipc::frame::Frame;
use crate::ipc::messages::MessageType;
use crate::ipc::port::{Port, PortHandler};
use crate::ipc::questioner::{QuestionerId, RequestIdAllocator};
use crate::ipc::transport::RetryPolicy;

/// How long a strand waits for `StrandRegistered` before treating
/// registration as fatally failed — "Coordinator registration has
/// its own timeout (6s) enforced by Strand; expiration is fatal".
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(6);

/// Identifies one worker process ("kid") among the SMP fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KidId(pub u32);

/// A worker process's IPC endpoint. Binds `kid-<N>.ipc` under the run
/// directory, registers with the coordinator, then drives a normal
/// [`Port`] receive loop for the rest of its life.
pub struct Strand {
    port: Port,
    kid_id: KidId,
    coordinator_path: PathBuf,
    requests: RequestIdAllocator,
}

impl Strand {
    /// Binds this strand's port and blocks until the coordinator acknowledges
    /// registration, or [`REGISTRATION_TIMEOUT`] elapses.
    pub fn register(run_dir: &Path, kid_id: KidId, tag: Option<&str>) -> crate::error::Result<Self> {
        let socket_path = run_dir.join(format!("kid-{}.ipc", kid_id.0));
        let coordinator_path = run_dir.join("coordinator.ipc");
        let port = Port::bind(&socket_path).map_err(StoreError::from_errno)?;

        let mut outgoing = Frame::new();
        outgoing.set_type(MessageType::RegisterStrand);
        outgoing.put_pod(&kid_id.0)?;
        outgoing.put_pod(&(unsafe { libc::getpid() }))?;
        outgoing.put_string(tag.unwrap_or(""))?;
        port.transport()
            .send(&coordinator_path, &outgoing, RetryPolicy::default())?;

        let deadline = Instant::now() + REGISTRATION_TIMEOUT;
        loop {
            if let Some(frame) = port.transport().recv()? {
                if frame.check_type(MessageType::StrandRegistered).is_ok() {
                    info!("kid{} registered with coordinator", kid_id.0);
                    return Ok(Strand {
                        port,
                        kid_id,
                        coordinator_path,
                        requests: RequestIdAllocator::new(),
                    });
                }
                warn!("kid{} ignoring unexpected frame during registration", kid_id.0);
            }
            if Instant::now() >= deadline {
                return Err(StoreError::Fatal(format!(
                    "kid{} registration timed out",
                    kid_id.0
                )));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn kid_id(&self) -> KidId {
        self.kid_id
    }

    pub fn coordinator_path(&self) -> &Path {
        &self.coordinator_path
    }

    pub fn requests(&self) -> &RequestIdAllocator {
        &self.requests
    }

    pub fn port(&self) -> &Port {
        &self.port
    }

    /// This strand's questioner identity, attached to every request it
    /// originates.
    pub fn questioner(&self) -> QuestionerId {
        QuestionerId::mine()
    }

    /// Runs this strand's receive loop, dispatching into `handler` until
    /// `should_stop` returns true.
    pub fn run(
        &self,
        handler: &mut dyn PortHandler,
        should_stop: impl FnMut() -> bool,
        idle_sleep: Duration,
    ) -> crate::error::Result<()> {
        self.port.run(handler, should_stop, idle_sleep)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipc::transport::UdsTransport;

    #[test]
    fn registration_times_out_without_coordinator() {
        let dir = tempfile::tempdir().unwrap();
        // No coordinator.ipc bound at all — registration must fail fast
        // rather than hang for the full 6s budget in this unit test, so we
        // shrink the timeout via a direct transport-level probe instead of
        // calling Strand::register (which hardcodes REGISTRATION_TIMEOUT).
        let socket_path = dir.path().join("kid-1.ipc");
        let transport = UdsTransport::bind(&socket_path).unwrap();
        assert!(transport.recv().unwrap().is_none());
    }

    #[test]
    fn register_succeeds_against_a_fake_coordinator() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator_path = dir.path().join("coordinator.ipc");
        let fake_coordinator = UdsTransport::bind(&coordinator_path).unwrap();

        let run_dir = dir.path().to_path_buf();
        let handle = std::thread::spawn(move || Strand::register(&run_dir, KidId(1), Some("worker")));

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(frame) = fake_coordinator.recv().unwrap() {
                frame.check_type(MessageType::RegisterStrand).unwrap();
                let kid_path = dir.path().join("kid-1.ipc");
                let mut ack = Frame::new();
                ack.set_type(MessageType::StrandRegistered);
                fake_coordinator
                    .send(&kid_path, &ack, RetryPolicy::default())
                    .unwrap();
                break;
            }
            if Instant::now() >= deadline {
                panic!("fake coordinator never observed a registration request");
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let strand = handle.join().unwrap().unwrap();
        assert_eq!(strand.kid_id(), KidId(1));
    }
}
