use std::{ffi::CStr, sync::Arc};

use anyhow::Context;
use ash::vk;

use crate::caps::QueueSet;

use super::physical::QueueFamiliesIndices;

fn get_required_device_extensions() -> [&'static CStr; 1] {
    [ash::khr::swapchain::NAME]
}

pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamiliesIndices,
) -> anyhow::Result<(Arc<ash::Device>, QueueSet)> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = families
        .unique()
        .into_iter()
        .map(|index| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(index)
                .queue_priorities(&queue_priorities)
        })
        .collect::<Vec<_>>();

    let device_extensions = get_required_device_extensions();
    let device_extensions_ptrs = device_extensions
        .iter()
        .map(|ext| ext.as_ptr())
        .collect::<Vec<_>>();

    // timeline semaphores carry the per-queue fence counters
    let mut features12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions_ptrs)
        .push_next(&mut features12)
        .push_next(&mut features13);

    let device = Arc::new(unsafe {
        instance
            .create_device(physical_device, &device_create_info, None)
            .context("failed to create logical device.")?
    });

    let queues = QueueSet {
        graphics: unsafe { device.get_device_queue(families.graphics, 0) },
        present: unsafe { device.get_device_queue(families.present, 0) },
        compute: unsafe { device.get_device_queue(families.compute, 0) },
        transfer: unsafe { device.get_device_queue(families.transfer, 0) },
    };

    log::trace!("Created logical device");

    Ok((device, queues))
}
