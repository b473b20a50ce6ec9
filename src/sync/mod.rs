mod counters;
mod timelines;

use anyhow::Context;
use ash::vk;

pub use counters::{FrameCounters, QUEUE_COUNT, QueueKind};
pub use timelines::QueueTimelines;

use crate::caps::QueueSet;

/// Sequences dependent work across the copy, compute and graphics queues
/// for rotating frame slots, and offers a synchronous full drain for
/// structural changes and shutdown.
pub struct FrameSync {
    pub counters: FrameCounters,
    pub timelines: QueueTimelines,
}

impl FrameSync {
    pub fn new(device: std::sync::Arc<ash::Device>, slot_count: usize) -> anyhow::Result<Self> {
        Ok(Self {
            counters: FrameCounters::new(slot_count),
            timelines: QueueTimelines::new(device)?,
        })
    }

    /// CPU-side wait until the slot's previous graphics submission retired.
    /// Graphics is the last queue in the frame chain, so its value covers
    /// the copy and compute work feeding it.
    pub fn wait_slot_retired(&self, slot: usize) -> anyhow::Result<()> {
        let value = self.counters.value(slot, QueueKind::Graphics);
        if value > 0 {
            self.timelines.wait(QueueKind::Graphics, value)?;
        }
        Ok(())
    }

    /// Full drain: every queue signals `max(all counters) + 1` and the CPU
    /// waits for all of them. Counters are stamped to the target, so calling
    /// this twice in a row is harmless.
    pub fn wait_for_gpu_to_finish(
        &mut self,
        device: &ash::Device,
        queues: &QueueSet,
    ) -> anyhow::Result<()> {
        let target = self.counters.drain_target();
        log::debug!("draining all queues to fence value {target}");

        for kind in QueueKind::ALL {
            let signal_semaphores = [self.timelines.semaphore(kind)];
            let signal_values = [target];
            let mut timeline_info =
                vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
            let submit_info = vk::SubmitInfo::default()
                .signal_semaphores(&signal_semaphores)
                .push_next(&mut timeline_info);
            unsafe {
                device
                    .queue_submit(queues.for_kind(kind), &[submit_info], vk::Fence::null())
                    .with_context(|| format!("failed to submit drain signal on {kind:?} queue"))?;
            }
        }

        self.timelines.wait_all(target)
    }

    pub fn destroy(&mut self) {
        self.timelines.destroy();
    }
}
