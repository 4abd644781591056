//! A stray ack for a request this process never parked — the signature of a
//! reply addressed to a prior incarnation whose pid got reused — must be
//! dropped without disturbing any request that's actually still pending.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use squidcore::ipc::forwarder::{Forwarder, ForwarderOutcome};
use squidcore::ipc::frame::Frame;
use squidcore::ipc::messages::MessageType;
use squidcore::ipc::questioner::RequestIdAllocator;

#[test]
fn unmatched_ack_index_is_dropped_and_leaves_the_real_pending_request_alone() {
    let mut forwarder = Forwarder::new(Duration::from_secs(5));
    let acked = Arc::new(AtomicU32::new(0));
    let acked2 = acked.clone();

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
                    acked2.store(1, Ordering::SeqCst);
                }
            },
        )
        .unwrap();
    let real_index = { frame }.get_pod::<u32>().unwrap();
    assert_eq!(forwarder.pending_count(), 1);

    // A stray ack from a restarted peer's previous incarnation, carrying an
    // index this process never allocated.
    let stray_index = real_index + 1000;
    let mut stray_ack = Frame::new();
    stray_ack.set_type(MessageType::CacheMgrResponse);
    forwarder.handle_remote_ack(stray_index, stray_ack);

    assert_eq!(acked.load(Ordering::SeqCst), 0, "stray ack must not resolve the real request");
    assert_eq!(forwarder.pending_count(), 1, "the real request is still parked");

    let mut real_ack = Frame::new();
    real_ack.set_type(MessageType::CacheMgrResponse);
    forwarder.handle_remote_ack(real_index, real_ack);
    assert_eq!(acked.load(Ordering::SeqCst), 1);
    assert_eq!(forwarder.pending_count(), 0);
}

#[test]
fn a_request_id_this_process_allocated_always_passes_its_own_staleness_check() {
    // Every RequestId this process can construct is stamped with its own
    // QuestionerId::mine() at allocation time, so reject_if_stale() can only
    // ever fail for an id that arrived over the wire from a different
    // incarnation — not one minted locally.
    let allocator = RequestIdAllocator::new();
    for _ in 0..5 {
        let id = allocator.next();
        assert!(id.reject_if_stale().is_ok());
        assert!(id.questioner().is_mine());
    }
}
