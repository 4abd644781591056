//! Worker 1 writes new data for key K and announces it; worker 2, waiting on
//! K, must receive at most one notification datagram and pop exactly one
//! queue element identifying producer 1 — even with a third, uninvolved
//! worker sharing the same segment.

use squidcore::cache_key::CacheKey;
use squidcore::cf::CollapsedForwarding;
use squidcore::ipc::strand::KidId;
use squidcore::ipc::transport::UdsTransport;

#[test]
fn one_notification_one_element_even_with_a_bystander_worker() {
    let dir = tempfile::tempdir().unwrap();
    CollapsedForwarding::create_segment(dir.path(), 3, 8).unwrap();

    let worker1 = CollapsedForwarding::join(dir.path(), KidId(1), 3, 8).unwrap();
    let worker2 = CollapsedForwarding::join(dir.path(), KidId(2), 3, 8).unwrap();
    let _worker3 = CollapsedForwarding::join(dir.path(), KidId(3), 3, 8).unwrap();

    let kid1_transport = UdsTransport::bind(&dir.path().join("kid-1.ipc")).unwrap();
    let kid2_transport = UdsTransport::bind(&dir.path().join("kid-2.ipc")).unwrap();
    let _kid3_transport = UdsTransport::bind(&dir.path().join("kid-3.ipc")).unwrap();

    let key = CacheKey::new([7u8; 16]);
    worker1.new_data(&key, &kid1_transport).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    let mut notification = loop {
        if let Some(frame) = kid2_transport.recv().unwrap() {
            break frame;
        }
        assert!(std::time::Instant::now() < deadline, "worker 2 never received a notification");
        std::thread::sleep(std::time::Duration::from_millis(5));
    };
    // No second notification should have been queued for the same pending element.
    assert!(kid2_transport.recv().unwrap().is_none());

    let mut received = Vec::new();
    worker2.handle_notification(&mut notification, |elem| received.push(elem)).unwrap();

    assert_eq!(received.len(), 1);
    assert_eq!(received[0].producer_kid_id, 1);
    assert_eq!(received[0].entry_ref, *key.as_bytes());
}
