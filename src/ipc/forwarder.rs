//! Forwarder: the strand-side "one question, one ack" template.
//!
//! A request in flight owns a boxed continuation invoked exactly once,
//! either with the answer or with a timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::warn;

use crate::ipc::frame::Frame;
use crate::ipc::questioner::{RequestId, RequestIdAllocator};

/// What a parked request's continuation is eventually invoked with.
pub enum ForwarderOutcome {
    Acked(Frame),
    TimedOut,
}

type Continuation = Box<dyn FnOnce(ForwarderOutcome) + Send>;

struct PendingRequest {
    deadline: Instant,
    continuation: Continuation,
}

/// Owns the per-process pending-request map described in
/// ("Pending-request map"), keyed by `RequestId.index`.
pub struct Forwarder {
    allocator: RequestIdAllocator,
    pending: HashMap<u32, PendingRequest>,
    default_timeout: Duration,
}

impl Forwarder {
    pub fn new(default_timeout: Duration) -> Self {
        Forwarder {
            allocator: RequestIdAllocator::new(),
            pending: HashMap::new(),
            default_timeout,
        }
    }

    /// Allocates a fresh `RequestId`, lets `build` turn it into an outgoing
    /// frame, and parks `on_complete` until [`Self::handle_remote_ack`] or
    /// [`Self::sweep_timeouts`] resolves it. Returns the frame ready to send.
    pub fn begin(
        &mut self,
        build: impl FnOnce(RequestId) -> crate::error::Result<Frame>,
        on_complete: impl FnOnce(ForwarderOutcome) + Send + 'static,
    ) -> crate::error::Result<Frame> {
        self.begin_with_timeout(build, on_complete, self.default_timeout)
    }

    pub fn begin_with_timeout(
        &mut self,
        build: impl FnOnce(RequestId) -> crate::error::Result<Frame>,
        on_complete: impl FnOnce(ForwarderOutcome) + Send + 'static,
        timeout: Duration,
    ) -> crate::error::Result<Frame> {
        let request_id = self.allocator.next();
        let frame = build(request_id)?;
        self.pending.insert(
            request_id.index().get(),
            PendingRequest {
                deadline: Instant::now() + timeout,
                continuation: Box::new(on_complete),
            },
        );
        Ok(frame)
    }

    /// Dispatches a remote ack to its parked continuation. An index with no
    /// matching entry is silently ignored (already answered, timed out, or a
    /// stray from a restarted peer — `RequestId::reject_if_stale` handles the
    /// questioner-mismatch half of this check upstream).
    pub fn handle_remote_ack(&mut self, index: u32, response: Frame) {
        match self.pending.remove(&index) {
            Some(pending) => (pending.continuation)(ForwarderOutcome::Acked(response)),
            None => warn!("forwarder: ack for unknown or already-resolved request {index}"),
        }
    }

    /// Resolves every request whose deadline has passed with `TimedOut`.
    pub fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(idx, _)| *idx)
            .collect();
        for idx in expired {
            if let Some(pending) = self.pending.remove(&idx) {
                (pending.continuation)(ForwarderOutcome::TimedOut);
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipc::messages::MessageType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn ack_resolves_the_matching_continuation() {
        let mut forwarder = Forwarder::new(Duration::from_secs(1));
        let observed = Arc::new(AtomicU32::new(0));
        let observed2 = observed.clone();

        let frame = forwarder
            .begin(
                |id| {
                    let mut f = Frame::new();
                    f.set_type(MessageType::CacheMgrRequest);
                    f.put_pod(&id.index().get())?;
                    Ok(f)
                },
                move |outcome| {
                    if let ForwarderOutcome::Acked(_) = outcome {
                        observed2.store(1, Ordering::SeqCst);
                    }
                },
            )
            .unwrap();

        let mut reply = frame;
        let index = reply.get_pod::<u32>().unwrap();
        assert_eq!(forwarder.pending_count(), 1);

        let mut ack = Frame::new();
        ack.set_type(MessageType::CacheMgrResponse);
        forwarder.handle_remote_ack(index, ack);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert_eq!(forwarder.pending_count(), 0);
    }

    #[test]
    fn timeout_sweep_resolves_stale_entries() {
        let mut forwarder = Forwarder::new(Duration::from_millis(1));
        let observed = Arc::new(AtomicU32::new(0));
        let observed2 = observed.clone();
        forwarder
            .begin(
                |id| {
                    let mut f = Frame::new();
                    f.set_type(MessageType::CacheMgrRequest);
                    f.put_pod(&id.index().get())?;
                    Ok(f)
                },
                move |outcome| {
                    if let ForwarderOutcome::TimedOut = outcome {
                        observed2.store(1, Ordering::SeqCst);
                    }
                },
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        forwarder.sweep_timeouts();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert_eq!(forwarder.pending_count(), 0);
    }
}
