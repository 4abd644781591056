//! Inquirer: the Coordinator-side fan-out template.
//!
//! Takes a snapshot of registered strands sorted by kid-id for determinism,
//! then walks them one at a time — send, await one response, aggregate or
//! skip on timeout, advance — until exhausted, at which point the aggregate
//! is finalized. Modeled as an explicit state machine rather than a
//! coroutine: the driver calls [`Inquirer::next_target`],
//! [`Inquirer::on_response`]/[`Inquirer::on_timeout`], and finally
//! [`Inquirer::finish`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::ipc::coordinator::StrandRecord;
use crate::ipc::frame::Frame;
use crate::ipc::strand::KidId;

/// Accumulates per-strand `CacheMgrResponse` frames into one merged result,
/// mirroring an `Action`'s `add(other)` method.
pub trait Aggregator {
    type Output;
    fn merge(&mut self, response: Frame) -> crate::error::Result<()>;
    fn finish(self) -> Self::Output;
}

/// Drives a single fan-out round across the strands present when it was
/// created. Strands that register after the Inquirer starts are not visited
/// — a fresh query would pick them up.
pub struct Inquirer<A: Aggregator> {
    remaining: VecDeque<KidId>,
    aggregator: Option<A>,
    per_strand_timeout: Duration,
    current_deadline: Option<Instant>,
}

impl<A: Aggregator> Inquirer<A> {
    pub fn new(strands: &[StrandRecord], aggregator: A, per_strand_timeout: Duration) -> Self {
        let mut ids: Vec<KidId> = strands.iter().map(|s| s.kid_id).collect();
        ids.sort_by_key(|k| k.0);
        Inquirer {
            remaining: ids.into(),
            aggregator: Some(aggregator),
            per_strand_timeout,
            current_deadline: None,
        }
    }

    /// The next strand to query, arming its per-strand deadline. `None` once
    /// every strand has been visited.
    pub fn next_target(&mut self) -> Option<KidId> {
        let target = *self.remaining.front()?;
        self.current_deadline = Some(Instant::now() + self.per_strand_timeout);
        Some(target)
    }

    /// Whether the strand currently at the front of the queue has overrun
    /// its per-strand timeout.
    pub fn current_target_expired(&self) -> bool {
        matches!(self.current_deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// A response arrived for the strand at the front of the queue: merge it
    /// and advance.
    pub fn on_response(&mut self, response: Frame) -> crate::error::Result<()> {
        self.remaining.pop_front();
        self.current_deadline = None;
        if let Some(agg) = self.aggregator.as_mut() {
            agg.merge(response)?;
        }
        Ok(())
    }

    /// The strand at the front of the queue timed out: skip it without
    /// aggregating anything from it. A per-strand timeout advances the
    /// iterator past a dead strand.
    pub fn on_timeout(&mut self) {
        self.remaining.pop_front();
        self.current_deadline = None;
    }

    /// Whether every strand has been visited (answered, skipped, or timed out).
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Consumes the Inquirer, producing the aggregated result.
    pub fn finish(self) -> Option<A::Output> {
        self.aggregator.map(Aggregator::finish)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipc::messages::MessageType;

    struct SumAggregator(u64);
    impl Aggregator for SumAggregator {
        type Output = u64;
        fn merge(&mut self, mut response: Frame) -> crate::error::Result<()> {
            response.check_type(MessageType::CacheMgrResponse)?;
            self.0 += response.get_pod::<u64>()?;
            Ok(())
        }
        fn finish(self) -> u64 {
            self.0
        }
    }

    fn record(kid: u32) -> StrandRecord {
        StrandRecord {
            kid_id: KidId(kid),
            pid: 0,
            tag: None,
        }
    }

    fn response_with(value: u64) -> Frame {
        let mut f = Frame::new();
        f.set_type(MessageType::CacheMgrResponse);
        f.put_pod(&value).unwrap();
        f
    }

    #[test]
    fn visits_strands_in_kid_id_order() {
        let strands = vec![record(3), record(1), record(2)];
        let mut inquirer = Inquirer::new(&strands, SumAggregator(0), Duration::from_secs(1));
        assert_eq!(inquirer.next_target(), Some(KidId(1)));
        inquirer.on_response(response_with(10)).unwrap();
        assert_eq!(inquirer.next_target(), Some(KidId(2)));
        inquirer.on_response(response_with(20)).unwrap();
        assert_eq!(inquirer.next_target(), Some(KidId(3)));
        inquirer.on_response(response_with(5)).unwrap();
        assert!(inquirer.is_exhausted());
        assert_eq!(inquirer.finish(), Some(35));
    }

    #[test]
    fn dead_strand_is_skipped_without_aggregating() {
        let strands = vec![record(1), record(2)];
        let mut inquirer = Inquirer::new(&strands, SumAggregator(0), Duration::from_millis(0));
        inquirer.next_target();
        inquirer.on_timeout();
        inquirer.next_target();
        inquirer.on_response(response_with(7)).unwrap();
        assert!(inquirer.is_exhausted());
        assert_eq!(inquirer.finish(), Some(7));
    }
}
