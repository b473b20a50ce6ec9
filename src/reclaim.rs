use std::any::Any;

struct ReclaimSlot {
    handles: Vec<Box<dyn Any + Send>>,
    used: bool,
}

/// Keeps type-erased owned handles alive until the GPU work that reads them
/// has retired, then drops them.
///
/// Handles are added to whichever frame slot is currently being recorded.
/// The render loop must wait on a slot's fence value before clearing it;
/// nothing here re-checks that.
pub struct ReclaimQueue {
    slots: Vec<ReclaimSlot>,
    current: usize,
}

impl ReclaimQueue {
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0);
        let slots = (0..slot_count)
            .map(|_| ReclaimSlot {
                handles: Vec::new(),
                used: false,
            })
            .collect();
        Self { slots, current: 0 }
    }

    /// Selects the slot that subsequent `add` calls are recorded against.
    pub fn begin_slot(&mut self, index: usize) {
        debug_assert!(index < self.slots.len());
        self.current = index;
    }

    /// Parks an owned handle until the current slot's submission retires.
    pub fn add<T: Send + 'static>(&mut self, handle: T) {
        self.slots[self.current].handles.push(Box::new(handle));
    }

    /// Marks the slot's recording pass as submitted; its handles are now
    /// tied to a trackable fence value.
    pub fn set_used(&mut self, index: usize) {
        self.slots[index].used = true;
    }

    /// Drops every handle queued for a submitted slot. Call only after the
    /// slot's fence value has been observed signaled.
    pub fn clear(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if slot.used {
            log::trace!("reclaiming {} handles for frame slot {}", slot.handles.len(), index);
            slot.handles.clear();
            slot.used = false;
        }
    }

    /// Teardown path: drops everything regardless of slot state. Valid only
    /// after a full GPU drain.
    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            slot.handles.clear();
            slot.used = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn handles_survive_until_their_slot_is_cleared() {
        let tracker = Arc::new(());
        let mut reclaim = ReclaimQueue::new(2);

        reclaim.begin_slot(0);
        reclaim.add(tracker.clone());
        reclaim.set_used(0);
        assert_eq!(Arc::strong_count(&tracker), 2);

        // clearing the other slot must not touch slot 0's handles
        reclaim.set_used(1);
        reclaim.clear(1);
        assert_eq!(Arc::strong_count(&tracker), 2);

        reclaim.clear(0);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn clear_skips_slots_that_were_never_submitted() {
        let tracker = Arc::new(());
        let mut reclaim = ReclaimQueue::new(2);

        reclaim.begin_slot(1);
        reclaim.add(tracker.clone());
        reclaim.clear(1);
        assert_eq!(Arc::strong_count(&tracker), 2);

        reclaim.set_used(1);
        reclaim.clear(1);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn clear_all_drops_even_unsubmitted_handles() {
        let tracker = Arc::new(());
        let mut reclaim = ReclaimQueue::new(3);

        reclaim.begin_slot(0);
        reclaim.add(tracker.clone());
        reclaim.begin_slot(2);
        reclaim.add(tracker.clone());

        reclaim.clear_all();
        assert_eq!(Arc::strong_count(&tracker), 1);
    }
}
