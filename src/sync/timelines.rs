use std::sync::Arc;

use anyhow::Context;
use ash::vk;

use crate::sync::{QUEUE_COUNT, QueueKind};

/// One timeline semaphore per hardware queue. The semaphores carry the fence
/// counter values produced by `FrameCounters`.
pub struct QueueTimelines {
    device: Arc<ash::Device>,
    semaphores: [vk::Semaphore; QUEUE_COUNT],
}

impl QueueTimelines {
    pub fn new(device: Arc<ash::Device>) -> anyhow::Result<Self> {
        let mut semaphores = [vk::Semaphore::null(); QUEUE_COUNT];
        for (index, semaphore) in semaphores.iter_mut().enumerate() {
            *semaphore = create_timeline_semaphore(&device)
                .with_context(|| format!("failed to create timeline semaphore {index}"))?;
        }
        Ok(Self { device, semaphores })
    }

    pub fn semaphore(&self, queue: QueueKind) -> vk::Semaphore {
        self.semaphores[queue.index()]
    }

    /// Blocks the calling thread until `queue`'s timeline reaches `value`.
    pub fn wait(&self, queue: QueueKind, value: u64) -> anyhow::Result<()> {
        let semaphores = [self.semaphores[queue.index()]];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe {
            self.device
                .wait_semaphores(&wait_info, u64::MAX)
                .with_context(|| format!("failed waiting for {queue:?} timeline value {value}"))
        }
    }

    /// Blocks until every queue's timeline reaches `value`.
    pub fn wait_all(&self, value: u64) -> anyhow::Result<()> {
        let values = [value; QUEUE_COUNT];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&self.semaphores)
            .values(&values);
        unsafe {
            self.device
                .wait_semaphores(&wait_info, u64::MAX)
                .with_context(|| format!("failed waiting for all timelines to reach {value}"))
        }
    }

    pub fn destroy(&mut self) {
        log::trace!("Destroying queue timelines");
        for semaphore in &mut self.semaphores {
            unsafe {
                self.device.destroy_semaphore(*semaphore, None);
            }
            *semaphore = vk::Semaphore::null();
        }
    }
}

fn create_timeline_semaphore(device: &ash::Device) -> anyhow::Result<vk::Semaphore> {
    let mut type_info = vk::SemaphoreTypeCreateInfo::default()
        .semaphore_type(vk::SemaphoreType::TIMELINE)
        .initial_value(0);
    let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
    unsafe {
        device
            .create_semaphore(&create_info, None)
            .context("failed to create timeline semaphore")
    }
}
