use std::{ptr, sync::Arc};

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::buffer::{DeviceBacking, HostBacking};
use crate::vulkan::DeviceContext;

/// One VMA-backed buffer. Host-visible buffers stay persistently mapped for
/// their whole lifetime; device-local ones carry a null `mapped` pointer.
pub struct GpuBuffer {
    allocator: Arc<vk_mem::Allocator>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    mapped: *mut u8,
    size: u64,
}

// the raw handle and mapped pointer are exclusively owned; cross-thread use
// is limited to disjoint mapped regions
unsafe impl Send for GpuBuffer {}
unsafe impl Sync for GpuBuffer {}

impl GpuBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Null unless the buffer was created host-visible.
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.mapped
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.allocator.unmap_memory(&mut self.allocation);
            }
            self.allocator.destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}

fn create_buffer(
    allocator: &Arc<vk_mem::Allocator>,
    device_context: &DeviceContext,
    size: u64,
    usage: vk::BufferUsageFlags,
    families: &[u32],
    host_mapped: bool,
    name: &str,
) -> anyhow::Result<GpuBuffer> {
    let mut create_info = vk::BufferCreateInfo::default().size(size).usage(usage);
    create_info = if families.len() > 1 {
        create_info
            .sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(families)
    } else {
        create_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
    };

    let allocation_info = vk_mem::AllocationCreateInfo {
        usage: if host_mapped {
            vk_mem::MemoryUsage::AutoPreferHost
        } else {
            vk_mem::MemoryUsage::AutoPreferDevice
        },
        flags: if host_mapped {
            vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE
        } else {
            vk_mem::AllocationCreateFlags::empty()
        },
        ..Default::default()
    };

    let (buffer, mut allocation) = unsafe { allocator.create_buffer(&create_info, &allocation_info) }
        .context("device memory allocator could not satisfy buffer request")?;

    let mapped = if host_mapped {
        match unsafe { allocator.map_memory(&mut allocation) } {
            Ok(mapped) => mapped,
            Err(e) => {
                unsafe { allocator.destroy_buffer(buffer, &mut allocation) };
                return Err(e).context("failed to map host-visible buffer");
            }
        }
    } else {
        ptr::null_mut()
    };

    let raw = GpuBuffer {
        allocator: allocator.clone(),
        buffer,
        allocation,
        mapped,
        size,
    };
    device_context.name_object(raw.buffer, name)?;
    Ok(raw)
}

/// Backing for CPU-written shared buffers (uniform-style data the render
/// thread writes directly).
pub struct HostVisibleBacking {
    allocator: Arc<vk_mem::Allocator>,
    device_context: DeviceContext,
    usage: vk::BufferUsageFlags,
    families: Vec<u32>,
    label: &'static str,
    generation: u32,
}

impl HostVisibleBacking {
    pub fn new(
        allocator: Arc<vk_mem::Allocator>,
        device_context: DeviceContext,
        usage: vk::BufferUsageFlags,
        families: Vec<u32>,
        label: &'static str,
    ) -> Self {
        Self {
            allocator,
            device_context,
            usage,
            families,
            label,
            generation: 0,
        }
    }
}

impl HostBacking for HostVisibleBacking {
    type Raw = GpuBuffer;

    fn create(&mut self, size: u64) -> anyhow::Result<GpuBuffer> {
        self.generation += 1;
        create_buffer(
            &self.allocator,
            &self.device_context,
            size,
            self.usage,
            &self.families,
            true,
            &format!("{}(gen {})", self.label, self.generation),
        )
    }

    fn migrate(&mut self, src: &GpuBuffer, dst: &GpuBuffer, len: u64) {
        debug_assert!(len <= src.size && len <= dst.size);
        unsafe {
            ptr::copy_nonoverlapping(src.mapped, dst.mapped, len as usize);
        }
    }
}

/// Backing for device-local shared buffers (geometry, meshlets, indirect
/// arguments). Transfer usage is always added so generations can be copied
/// forward and staged uploads can land.
pub struct DeviceLocalBacking {
    allocator: Arc<vk_mem::Allocator>,
    device_context: DeviceContext,
    usage: vk::BufferUsageFlags,
    families: Vec<u32>,
    label: &'static str,
    generation: u32,
}

impl DeviceLocalBacking {
    pub fn new(
        allocator: Arc<vk_mem::Allocator>,
        device_context: DeviceContext,
        usage: vk::BufferUsageFlags,
        families: Vec<u32>,
        label: &'static str,
    ) -> Self {
        Self {
            allocator,
            device_context,
            usage: usage | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            families,
            label,
            generation: 0,
        }
    }
}

impl DeviceBacking for DeviceLocalBacking {
    type Raw = GpuBuffer;

    fn create(&mut self, size: u64) -> anyhow::Result<GpuBuffer> {
        self.generation += 1;
        create_buffer(
            &self.allocator,
            &self.device_context,
            size,
            self.usage,
            &self.families,
            false,
            &format!("{}(gen {})", self.label, self.generation),
        )
    }
}

/// One temporary upload-heap buffer; lives until the copy-queue submission
/// that reads it retires.
pub fn create_staging_buffer(
    allocator: &Arc<vk_mem::Allocator>,
    device_context: &DeviceContext,
    size: u64,
    name: &str,
) -> anyhow::Result<GpuBuffer> {
    create_buffer(
        allocator,
        device_context,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        &[],
        true,
        name,
    )
}
