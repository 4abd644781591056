//! Three strands each report a `counters` snapshot; fanning a `counters`
//! query out through an `Inquirer` must sum every strand's values
//! element-wise, in kid-id order, regardless of the order replies are fed in.

use std::time::Duration;

use squidcore::ipc::coordinator::StrandRecord;
use squidcore::ipc::frame::Frame;
use squidcore::ipc::inquirer::{Aggregator, Inquirer};
use squidcore::ipc::messages::MessageType;
use squidcore::ipc::strand::KidId;
use squidcore::mgr::action::Mergeable;
use squidcore::mgr::actions::counters::{CountersAction, NUM_COUNTERS};

/// Bridges `CountersAction`'s `Mergeable` trait onto `Inquirer`'s
/// `Aggregator` trait: a `CacheMgrResponse` frame from each strand carries
/// one `counters` snapshot as a fixed-length byte blob.
struct CountersAggregator(CountersAction);

impl Aggregator for CountersAggregator {
    type Output = CountersAction;

    fn merge(&mut self, mut response: Frame) -> squidcore::error::Result<()> {
        response.check_type(MessageType::CacheMgrResponse)?;
        let bytes = response.get_fixed(NUM_COUNTERS * 8)?;
        let snapshot = CountersAction::decode(bytes).expect("well-formed counters payload");
        self.0.add(&snapshot);
        Ok(())
    }

    fn finish(self) -> CountersAction {
        self.0
    }
}

fn strand_record(kid: u32) -> StrandRecord {
    StrandRecord {
        kid_id: KidId(kid),
        pid: 0,
        tag: None,
    }
}

fn counters_response(requests: f64, hits: f64) -> Frame {
    // counter.0 = client_http_requests, counter.1 = client_http_hits; the
    // rest are left at zero for this scenario.
    let mut values = [0.0f64; NUM_COUNTERS];
    values[0] = requests;
    values[1] = hits;
    let action = CountersAction { values };

    let mut frame = Frame::new();
    frame.set_type(MessageType::CacheMgrResponse);
    frame.put_fixed(&action.encode()).unwrap();
    frame
}

#[test]
fn counters_action_sums_across_every_strand() {
    let strands = vec![strand_record(3), strand_record(1), strand_record(2)];
    let per_strand = [(3u32, 40.0, 4.0), (1u32, 100.0, 60.0), (2u32, 55.0, 20.0)];

    let zeroed = CountersAction { values: [0.0; NUM_COUNTERS] };
    let mut inquirer = Inquirer::new(&strands, CountersAggregator(zeroed), Duration::from_secs(1));

    while let Some(target) = inquirer.next_target() {
        let (_, requests, hits) = per_strand.iter().find(|(kid, ..)| KidId(*kid) == target).unwrap();
        inquirer.on_response(counters_response(*requests, *hits)).unwrap();
    }
    assert!(inquirer.is_exhausted());

    let aggregated = inquirer.finish().unwrap();
    assert_eq!(aggregated.values[0], 195.0, "client_http_requests summed across all three strands");
    assert_eq!(aggregated.values[1], 84.0, "client_http_hits summed across all three strands");
    assert!(aggregated.values[2..].iter().all(|&v| v == 0.0));
}

#[test]
fn a_strand_that_never_answers_contributes_nothing() {
    let strands = vec![strand_record(1), strand_record(2)];
    let zeroed = CountersAction { values: [0.0; NUM_COUNTERS] };
    let mut inquirer = Inquirer::new(&strands, CountersAggregator(zeroed), Duration::from_millis(0));

    inquirer.next_target();
    inquirer.on_timeout();
    inquirer.next_target();
    inquirer.on_response(counters_response(10.0, 3.0)).unwrap();

    let aggregated = inquirer.finish().unwrap();
    assert_eq!(aggregated.values[0], 10.0);
    assert_eq!(aggregated.values[1], 3.0);
}
