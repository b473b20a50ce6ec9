use std::ffi::CStr;

use anyhow::Context;
use ash::{khr::surface, vk};

fn get_required_device_extensions() -> [&'static CStr; 1] {
    [ash::khr::swapchain::NAME]
}

#[derive(Clone, Copy)]
pub struct QueueFamiliesIndices {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamiliesIndices {
    /// Deduplicated family list for device-queue creation.
    pub fn unique(&self) -> Vec<u32> {
        let mut families = vec![self.graphics, self.present, self.compute, self.transfer];
        families.sort_unstable();
        families.dedup();
        families
    }

    /// Families that touch shared geometry buffers (everything but present).
    pub fn sharing(&self) -> Vec<u32> {
        let mut families = vec![self.graphics, self.compute, self.transfer];
        families.sort_unstable();
        families.dedup();
        families
    }
}

pub fn pick_physical_device(
    instance: &ash::Instance,
    surface: &ash::khr::surface::Instance,
    surface_khr: vk::SurfaceKHR,
) -> anyhow::Result<(vk::PhysicalDevice, QueueFamiliesIndices)> {
    let devices = unsafe {
        instance
            .enumerate_physical_devices()
            .context("failed to enumerate physical devices")?
    };
    let device = devices
        .into_iter()
        .find(|device| is_device_suitable(instance, surface, surface_khr, *device))
        .context("No suitable physical device.")?;

    let props = unsafe { instance.get_physical_device_properties(device) };
    log::debug!("Selected physical device: {:?}", unsafe {
        CStr::from_ptr(props.device_name.as_ptr())
    });

    let families = find_queue_families(instance, surface, surface_khr, device);
    let graphics = families
        .graphics
        .ok_or_else(|| anyhow::anyhow!("missing graphics queue family"))?;
    let present = families
        .present
        .ok_or_else(|| anyhow::anyhow!("missing present queue family"))?;

    // dedicated async families when present, otherwise everything runs on
    // the graphics family's queue
    let compute = families.dedicated_compute.unwrap_or(graphics);
    let transfer = families.dedicated_transfer.unwrap_or(compute);

    log::debug!(
        "Queue families: graphics={graphics} present={present} compute={compute} transfer={transfer}"
    );

    Ok((
        device,
        QueueFamiliesIndices {
            graphics,
            present,
            compute,
            transfer,
        },
    ))
}

#[derive(Default)]
struct FamilyScan {
    graphics: Option<u32>,
    present: Option<u32>,
    dedicated_compute: Option<u32>,
    dedicated_transfer: Option<u32>,
}

fn is_device_suitable(
    instance: &ash::Instance,
    surface: &surface::Instance,
    surface_khr: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> bool {
    let families = find_queue_families(instance, surface, surface_khr, device);
    let extension_support = check_device_extension_support(instance, device);
    let is_swapchain_adequate =
        match super::surface::SurfaceSupportDetails::new(device, surface, surface_khr) {
            Ok(details) => !details.formats.is_empty() && !details.present_modes.is_empty(),
            Err(_) => {
                log::warn!("failed to query swapchain support details");
                false
            }
        };

    families.graphics.is_some()
        && families.present.is_some()
        && extension_support
        && is_swapchain_adequate
}

fn find_queue_families(
    instance: &ash::Instance,
    surface: &surface::Instance,
    surface_khr: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> FamilyScan {
    let mut scan = FamilyScan::default();

    let props = unsafe { instance.get_physical_device_queue_family_properties(device) };
    for (index, family) in props.iter().filter(|f| f.queue_count > 0).enumerate() {
        let index = index as u32;
        let flags = family.queue_flags;

        if flags.contains(vk::QueueFlags::GRAPHICS) && scan.graphics.is_none() {
            scan.graphics = Some(index);
        }

        if flags.contains(vk::QueueFlags::COMPUTE)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && scan.dedicated_compute.is_none()
        {
            scan.dedicated_compute = Some(index);
        }

        if flags.contains(vk::QueueFlags::TRANSFER)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && !flags.contains(vk::QueueFlags::COMPUTE)
            && scan.dedicated_transfer.is_none()
        {
            scan.dedicated_transfer = Some(index);
        }

        let present_support =
            unsafe { surface.get_physical_device_surface_support(device, index, surface_khr) };
        match present_support {
            Ok(true) if scan.present.is_none() => {
                scan.present = Some(index);
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("failed to query present support for queue family {index}: {e}");
            }
        }
    }

    scan
}

fn check_device_extension_support(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let required_extensions = get_required_device_extensions();

    let extension_props = match unsafe { instance.enumerate_device_extension_properties(device) } {
        Ok(props) => props,
        Err(e) => {
            log::warn!("Failed to enumerate device extension properties: {e}");
            return false;
        }
    };

    for required in required_extensions.iter() {
        let found = extension_props.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            required == &name
        });

        if !found {
            log::warn!(
                "Required device extension not supported: {}",
                required.to_string_lossy()
            );
            return false;
        }
    }

    true
}
