//! Collapsed forwarding: lets a worker that wrote new data
//! for a cache key tell every peer worker waiting on that key, without
//! routing through the Coordinator.

pub mod queue;

use std::path::Path;

use log::{debug, warn};

use crate::cache_key::CacheKey;
use crate::cf::queue::{CfQueue, CfQueueElement, PushOutcome};
use crate::ipc::frame::Frame;
use crate::ipc::messages::MessageType;
use crate::ipc::strand::KidId;
use crate::ipc::transport::{RetryPolicy, UdsTransport};

/// Default capacity of a single worker-to-worker queue.
pub const DEFAULT_QUEUE_CAPACITY: u32 = 1024;

/// Coordinates this process's view of the shared collapsed-forwarding
/// segment: pushing new-data announcements out to peers, and draining
/// announcements addressed to this worker.
pub struct CollapsedForwarding {
    queue: CfQueue,
    kid_id: KidId,
    run_dir: std::path::PathBuf,
}

impl CollapsedForwarding {
    /// Creates the shared segment (Coordinator-side, before workers start).
    pub fn create_segment(
        run_dir: &Path,
        num_workers: u32,
        capacity: u32,
    ) -> std::io::Result<()> {
        CfQueue::create(&run_dir.join("cf.seg"), num_workers, capacity).map(|_| ())
    }

    /// Joins the already-created segment as worker `kid_id`.
    pub fn join(run_dir: &Path, kid_id: KidId, num_workers: u32, capacity: u32) -> std::io::Result<Self> {
        let queue = CfQueue::open(&run_dir.join("cf.seg"), num_workers, capacity)?;
        Ok(CollapsedForwarding {
            queue,
            kid_id,
            run_dir: run_dir.to_owned(),
        })
    }

    /// Announces new data for `key` to every other worker, sending a
    /// `CollapsedForwardingNotification` to whichever ones just transitioned
    /// their reader-signal flag from clear to set.
    pub fn new_data(&self, key: &CacheKey, transport: &UdsTransport) -> crate::error::Result<()> {
        let elem = CfQueueElement {
            producer_kid_id: self.kid_id.0,
            entry_ref: *key.as_bytes(),
        };
        for consumer in 1..=self.queue.num_workers() {
            if consumer == self.kid_id.0 {
                continue;
            }
            match self.queue.push(self.kid_id.0, consumer, elem) {
                PushOutcome::Notified => self.notify(consumer, transport)?,
                PushOutcome::AlreadyPending => {
                    debug!("kid{consumer} already has a pending cf notification");
                }
                PushOutcome::Full => {
                    warn!("cf push queue overflow for kid{consumer}, dropping element");
                }
            }
        }
        Ok(())
    }

    fn notify(&self, consumer: u32, transport: &UdsTransport) -> crate::error::Result<()> {
        let mut frame = Frame::new();
        frame.set_type(MessageType::CollapsedForwardingNotification);
        frame.put_pod(&self.kid_id.0)?;
        let addr = self.run_dir.join(format!("kid-{consumer}.ipc"));
        transport.send(&addr, &frame, RetryPolicy::default())
    }

    /// Handles an incoming `CollapsedForwardingNotification`: clears the
    /// sender's reader-signal flag, then drains every available element
    /// from that sender, invoking `on_new_data` for each.
    pub fn handle_notification(
        &self,
        frame: &mut Frame,
        mut on_new_data: impl FnMut(CfQueueElement),
    ) -> crate::error::Result<()> {
        frame.check_type(MessageType::CollapsedForwardingNotification)?;
        let from: u32 = frame.get_pod()?;
        self.queue.clear_reader_signal(from, self.kid_id.0);
        self.drain_from(from, &mut on_new_data);
        Ok(())
    }

    /// Pops every element currently queued from `producer` to this worker.
    pub fn drain_from(&self, producer: u32, on_new_data: &mut impl FnMut(CfQueueElement)) {
        while let Some(elem) = self.queue.pop(producer, self.kid_id.0) {
            if elem.producer_kid_id != producer {
                warn!(
                    "cf queue mismatch: slot under kid{producer} carries producer_kid_id {}",
                    elem.producer_kid_id
                );
            }
            on_new_data(elem);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notify_and_drain_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        CollapsedForwarding::create_segment(dir.path(), 3, 4).unwrap();

        let producer = CollapsedForwarding::join(dir.path(), KidId(1), 3, 4).unwrap();
        let consumer = CollapsedForwarding::join(dir.path(), KidId(2), 3, 4).unwrap();

        let _kid2_port = UdsTransport::bind(&dir.path().join("kid-2.ipc")).unwrap();
        let kid1_transport = UdsTransport::bind(&dir.path().join("kid-1.ipc")).unwrap();

        let key = CacheKey::new([3u8; 16]);
        producer.new_data(&key, &kid1_transport).unwrap();

        let mut received = Vec::new();
        consumer.drain_from(1, &mut |elem| received.push(elem));
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].entry_ref, *key.as_bytes());
    }

    #[test]
    fn handle_notification_clears_signal_and_drains() {
        let dir = tempfile::tempdir().unwrap();
        CollapsedForwarding::create_segment(dir.path(), 2, 4).unwrap();
        let producer = CollapsedForwarding::join(dir.path(), KidId(1), 2, 4).unwrap();
        let consumer = CollapsedForwarding::join(dir.path(), KidId(2), 2, 4).unwrap();
        let _kid2_port = UdsTransport::bind(&dir.path().join("kid-2.ipc")).unwrap();
        let kid1_transport = UdsTransport::bind(&dir.path().join("kid-1.ipc")).unwrap();

        let key = CacheKey::new([9u8; 16]);
        producer.new_data(&key, &kid1_transport).unwrap();

        let mut notification = Frame::new();
        notification.set_type(MessageType::CollapsedForwardingNotification);
        notification.put_pod(&1u32).unwrap();

        let mut received = Vec::new();
        consumer
            .handle_notification(&mut notification, |elem| received.push(elem))
            .unwrap();
        assert_eq!(received.len(), 1);
    }
}
