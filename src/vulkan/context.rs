use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use winit::window::Window;

use crate::caps::{QueueSet, RenderCaps};

use super::device::create_logical_device;
use super::device_context::DeviceContext;
use super::instance::{InstanceBundle, create_instance};
use super::physical::{QueueFamiliesIndices, pick_physical_device};

/// Everything the render thread needs to create and own a swapchain.
pub struct SwapchainCreateCaps {
    pub instance: ash::Instance,
    pub device: Arc<ash::Device>,
    pub physical_device: vk::PhysicalDevice,
    pub surface_instance: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub queue_families: QueueFamiliesIndices,
}

pub struct VulkanContext {
    device: Arc<ash::Device>,
    device_context: DeviceContext,
    queues: QueueSet,
    queue_families: QueueFamiliesIndices,
    physical_device: vk::PhysicalDevice,

    surface_instance: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    instance: ash::Instance,
}

impl VulkanContext {
    pub fn new(window: &Window) -> anyhow::Result<Self> {
        let InstanceBundle {
            instance,
            surface_instance,
            surface,
            debug_messenger,
        } = create_instance(window).context("failed to create instance")?;

        let (physical_device, queue_families) =
            pick_physical_device(&instance, &surface_instance, surface)
                .context("failed to pick physical device")?;

        let (device, queues) = create_logical_device(&instance, physical_device, queue_families)
            .context("failed to create logical device")?;

        let debug_utils = debug_messenger
            .as_ref()
            .map(|_| Arc::new(ash::ext::debug_utils::Device::new(&instance, &device)));

        let device_context = DeviceContext {
            device: device.clone(),
            debug_utils,
        };

        Ok(Self {
            device,
            device_context,
            queues,
            queue_families,
            physical_device,
            surface_instance,
            surface,
            debug_messenger,
            instance,
        })
    }

    pub fn render_caps(&self) -> RenderCaps {
        RenderCaps {
            device_context: self.device_context.clone(),
            instance: self.instance.clone(),
            physical_device: self.physical_device,
            queues: self.queues,
        }
    }

    pub fn swapchain_caps(&self) -> SwapchainCreateCaps {
        SwapchainCreateCaps {
            instance: self.instance.clone(),
            device: self.device.clone(),
            physical_device: self.physical_device,
            surface_instance: self.surface_instance.clone(),
            surface: self.surface,
            queue_families: self.queue_families,
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::trace!("Destroying Vulkan Context");
        unsafe {
            log::trace!("  Destroying Device");
            self.device.destroy_device(None);
        }
        if let Some((debug_utils, messenger)) = &self.debug_messenger {
            log::trace!("  Destroying debug messenger");
            unsafe {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
        }
        log::trace!("  Destroying Surface");
        unsafe {
            self.surface_instance.destroy_surface(self.surface, None);
        }
        log::trace!("  Destroying Instance");
        unsafe {
            self.instance.destroy_instance(None);
        }
        log::trace!("Vulkan Context Destroyed");
    }
}
