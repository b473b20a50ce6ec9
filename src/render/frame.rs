use anyhow::Context;
use ash::vk;

use crate::sync::{QUEUE_COUNT, QueueKind};
use crate::vulkan::QueueFamiliesIndices;

/// One frame slot's recording state: a command pool and primary command
/// buffer per queue, plus the binary semaphore gating the swapchain image.
/// Retirement is tracked by the queue timelines, not a per-frame fence.
pub struct Frame {
    pub index: usize,
    pub image_available: vk::Semaphore,
    pub swapchain_image_index: u32,
    pools: [vk::CommandPool; QUEUE_COUNT],
    commands: [vk::CommandBuffer; QUEUE_COUNT],
}

impl Frame {
    pub fn new(
        device: &ash::Device,
        families: &QueueFamiliesIndices,
        index: usize,
    ) -> anyhow::Result<Self> {
        let family_of = |kind: QueueKind| match kind {
            QueueKind::Copy => families.transfer,
            QueueKind::Compute => families.compute,
            QueueKind::Graphics => families.graphics,
        };

        let mut pools = [vk::CommandPool::null(); QUEUE_COUNT];
        let mut commands = [vk::CommandBuffer::null(); QUEUE_COUNT];
        for kind in QueueKind::ALL {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(family_of(kind))
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let pool = unsafe {
                device
                    .create_command_pool(&pool_info, None)
                    .with_context(|| format!("failed to create {kind:?} command pool"))?
            };
            pools[kind.index()] = pool;

            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffers = unsafe {
                device
                    .allocate_command_buffers(&alloc_info)
                    .with_context(|| format!("failed to allocate {kind:?} command buffer"))?
            };
            commands[kind.index()] = buffers[0];
        }

        let image_available = unsafe {
            device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .context("failed to create image available semaphore")?
        };

        Ok(Self {
            index,
            image_available,
            swapchain_image_index: 0,
            pools,
            commands,
        })
    }

    pub fn command(&self, kind: QueueKind) -> vk::CommandBuffer {
        self.commands[kind.index()]
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        log::trace!("Destroying Frame {}", self.index);
        unsafe {
            for pool in self.pools {
                device.destroy_command_pool(pool, None);
            }
            device.destroy_semaphore(self.image_available, None);
        }
    }
}
