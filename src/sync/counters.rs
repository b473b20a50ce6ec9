pub const QUEUE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Copy,
    Compute,
    Graphics,
}

impl QueueKind {
    pub const ALL: [QueueKind; QUEUE_COUNT] = [QueueKind::Copy, QueueKind::Compute, QueueKind::Graphics];

    pub fn index(self) -> usize {
        match self {
            QueueKind::Copy => 0,
            QueueKind::Compute => 1,
            QueueKind::Graphics => 2,
        }
    }
}

/// One monotonically increasing fence counter per queue per frame slot.
///
/// A counter only moves when the submission that will signal it is being
/// recorded; waits therefore always target work that actually exists.
pub struct FrameCounters {
    values: Vec<[u64; QUEUE_COUNT]>,
}

impl FrameCounters {
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0);
        Self {
            values: vec![[0; QUEUE_COUNT]; slot_count],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.values.len()
    }

    /// Last value recorded for this slot's submission on `queue`.
    pub fn value(&self, slot: usize, queue: QueueKind) -> u64 {
        self.values[slot][queue.index()]
    }

    /// Reserves the next signal value for `queue`, greater than every value
    /// the queue has been asked to signal for any slot.
    pub fn bump(&mut self, slot: usize, queue: QueueKind) -> u64 {
        let next = self.queue_max(queue) + 1;
        self.values[slot][queue.index()] = next;
        next
    }

    fn queue_max(&self, queue: QueueKind) -> u64 {
        self.values
            .iter()
            .map(|slot| slot[queue.index()])
            .max()
            .unwrap_or(0)
    }

    /// Computes the full-drain target (`max(all) + 1`) and stamps every
    /// counter to it, so no stale low value can satisfy a later wait early.
    pub fn drain_target(&mut self) -> u64 {
        let target = self
            .values
            .iter()
            .flat_map(|slot| slot.iter().copied())
            .max()
            .unwrap_or(0)
            + 1;
        for slot in &mut self.values {
            slot.fill(target);
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_monotonic_per_queue_across_slots() {
        let mut counters = FrameCounters::new(2);
        assert_eq!(counters.bump(0, QueueKind::Copy), 1);
        assert_eq!(counters.bump(1, QueueKind::Copy), 2);
        assert_eq!(counters.bump(0, QueueKind::Copy), 3);
        // other queues advance independently
        assert_eq!(counters.bump(0, QueueKind::Graphics), 1);
        assert_eq!(counters.value(1, QueueKind::Copy), 2);
    }

    #[test]
    fn drain_target_exceeds_everything_and_levels_all_counters() {
        let mut counters = FrameCounters::new(3);
        counters.bump(0, QueueKind::Copy);
        counters.bump(0, QueueKind::Graphics);
        counters.bump(1, QueueKind::Copy);
        counters.bump(1, QueueKind::Graphics);
        counters.bump(2, QueueKind::Compute);

        let target = counters.drain_target();
        assert_eq!(target, 3);
        for slot in 0..3 {
            for queue in QueueKind::ALL {
                assert_eq!(counters.value(slot, queue), target);
            }
        }
    }

    #[test]
    fn back_to_back_drains_stay_consistent() {
        let mut counters = FrameCounters::new(2);
        counters.bump(0, QueueKind::Graphics);

        let first = counters.drain_target();
        let second = counters.drain_target();
        assert_eq!(second, first + 1);
        for slot in 0..2 {
            for queue in QueueKind::ALL {
                assert_eq!(counters.value(slot, queue), second);
            }
        }
    }

    #[test]
    fn bump_after_drain_continues_past_the_target() {
        let mut counters = FrameCounters::new(2);
        let target = counters.drain_target();
        assert_eq!(counters.bump(0, QueueKind::Copy), target + 1);
    }
}
