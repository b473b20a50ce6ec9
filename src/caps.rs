use ash::vk;

use crate::sync::QueueKind;
use crate::vulkan::DeviceContext;

/// The hardware queues a frame is spread across. On devices without
/// dedicated compute/transfer families these may alias the graphics queue.
#[derive(Clone, Copy)]
pub struct QueueSet {
    pub graphics: vk::Queue,
    pub compute: vk::Queue,
    pub transfer: vk::Queue,
    pub present: vk::Queue,
}

impl QueueSet {
    pub fn for_kind(&self, kind: QueueKind) -> vk::Queue {
        match kind {
            QueueKind::Copy => self.transfer,
            QueueKind::Compute => self.compute,
            QueueKind::Graphics => self.graphics,
        }
    }
}

pub struct RenderCaps {
    pub device_context: DeviceContext,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub queues: QueueSet,
}
