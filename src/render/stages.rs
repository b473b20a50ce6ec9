use anyhow::Context;
use ash::vk;
use smallvec::SmallVec;

use crate::buffer::{DeviceLocalBacking, SharedSlice};
use crate::caps::QueueSet;
use crate::model::{GeometryArena, ModelManager};
use crate::reclaim::ReclaimQueue;
use crate::render::frame::Frame;
use crate::render::swapchain::SwapchainContext;
use crate::sync::{FrameSync, QueueKind};
use crate::upload::{UploadStage, WorkerPool};

/// Copy stage: migrates retired buffer generations forward, then lands all
/// staged uploads, in one transfer-queue submission that signals the copy
/// timeline for this slot.
pub fn submit_copy_stage(
    device: &ash::Device,
    queues: &QueueSet,
    sync: &mut FrameSync,
    frame: &Frame,
    arena: &mut GeometryArena<DeviceLocalBacking>,
    models: &mut ModelManager,
    stage: &mut UploadStage,
    pool: &WorkerPool,
    reclaim: &mut ReclaimQueue,
) -> anyhow::Result<u64> {
    let _span = tracy_client::span!("copy_stage");
    let cmd = frame.command(QueueKind::Copy);
    begin(device, cmd).context("failed to begin copy command buffer")?;

    let migrated = arena.record_pending_copies(device, cmd);
    if migrated {
        // staged uploads may target ranges the migration just rewrote
        // (freed holes below the old generation's size), so order the
        // transfer writes
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }

    models.flush_uploads(arena, stage)?;
    stage.copy_and_clear(pool, device, cmd, reclaim)?;

    end(device, cmd).context("failed to end copy command buffer")?;

    let value = sync.counters.bump(frame.index, QueueKind::Copy);
    let signal_semaphores = [sync.timelines.semaphore(QueueKind::Copy)];
    let signal_values = [value];
    let commands = [cmd];
    let mut timeline_info =
        vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&commands)
        .signal_semaphores(&signal_semaphores)
        .push_next(&mut timeline_info);
    unsafe {
        device
            .queue_submit(queues.transfer, &[submit_info], vk::Fence::null())
            .context("failed to submit copy stage")?;
    }
    Ok(value)
}

/// Compute stage: resets the per-pipeline draw counters the culling pass
/// accumulates into. Waits on this frame's copy value so it never runs
/// ahead of the data it gates.
pub fn submit_compute_stage(
    device: &ash::Device,
    queues: &QueueSet,
    sync: &mut FrameSync,
    frame: &Frame,
    arena: &GeometryArena<DeviceLocalBacking>,
    counters: SharedSlice,
    copy_value: u64,
) -> anyhow::Result<u64> {
    let _span = tracy_client::span!("compute_stage");
    let cmd = frame.command(QueueKind::Compute);
    begin(device, cmd).context("failed to begin compute command buffer")?;

    if let Some(raw) = arena.counters.raw() {
        unsafe {
            device.cmd_fill_buffer(cmd, raw.handle(), counters.offset, counters.size, 0);
        }
    }

    end(device, cmd).context("failed to end compute command buffer")?;

    let value = sync.counters.bump(frame.index, QueueKind::Compute);
    let wait_semaphores = [sync.timelines.semaphore(QueueKind::Copy)];
    let wait_values = [copy_value];
    let wait_stages = [vk::PipelineStageFlags::TRANSFER];
    let signal_semaphores = [sync.timelines.semaphore(QueueKind::Compute)];
    let signal_values = [value];
    let commands = [cmd];
    let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
        .wait_semaphore_values(&wait_values)
        .signal_semaphore_values(&signal_values);
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&commands)
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .signal_semaphores(&signal_semaphores)
        .push_next(&mut timeline_info);
    unsafe {
        device
            .queue_submit(queues.compute, &[submit_info], vk::Fence::null())
            .context("failed to submit compute stage")?;
    }
    Ok(value)
}

/// Graphics stage: transitions the swapchain image, runs the clear pass and
/// hands the image to present. Waits on this frame's compute value (the
/// indirect arguments it will consume) and on image acquisition.
pub fn submit_graphics_stage(
    device: &ash::Device,
    queues: &QueueSet,
    sync: &mut FrameSync,
    frame: &Frame,
    swapchain: &SwapchainContext,
    compute_value: u64,
) -> anyhow::Result<u64> {
    let _span = tracy_client::span!("graphics_stage");
    let cmd = frame.command(QueueKind::Graphics);
    begin(device, cmd).context("failed to begin graphics command buffer")?;

    let image = swapchain.images[frame.swapchain_image_index as usize];
    record_clear_pass(device, cmd, image);

    end(device, cmd).context("failed to end graphics command buffer")?;

    let value = sync.counters.bump(frame.index, QueueKind::Graphics);

    let wait_semaphores: SmallVec<[vk::Semaphore; 2]> = SmallVec::from_slice(&[
        sync.timelines.semaphore(QueueKind::Compute),
        frame.image_available,
    ]);
    // binary semaphore entries carry a placeholder value
    let wait_values: SmallVec<[u64; 2]> = SmallVec::from_slice(&[compute_value, 0]);
    let wait_stages: SmallVec<[vk::PipelineStageFlags; 2]> = SmallVec::from_slice(&[
        vk::PipelineStageFlags::DRAW_INDIRECT,
        vk::PipelineStageFlags::TRANSFER,
    ]);
    let signal_semaphores: SmallVec<[vk::Semaphore; 2]> = SmallVec::from_slice(&[
        sync.timelines.semaphore(QueueKind::Graphics),
        swapchain.image_semaphores[frame.swapchain_image_index as usize],
    ]);
    let signal_values: SmallVec<[u64; 2]> = SmallVec::from_slice(&[value, 0]);

    let commands = [cmd];
    let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
        .wait_semaphore_values(&wait_values)
        .signal_semaphore_values(&signal_values);
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&commands)
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .signal_semaphores(&signal_semaphores)
        .push_next(&mut timeline_info);
    unsafe {
        device
            .queue_submit(queues.graphics, &[submit_info], vk::Fence::null())
            .context("failed to submit graphics stage")?;
    }
    Ok(value)
}

fn begin(device: &ash::Device, cmd: vk::CommandBuffer) -> ash::prelude::VkResult<()> {
    unsafe {
        device.begin_command_buffer(
            cmd,
            &vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
        )
    }
}

fn end(device: &ash::Device, cmd: vk::CommandBuffer) -> ash::prelude::VkResult<()> {
    unsafe { device.end_command_buffer(cmd) }
}

fn record_clear_pass(device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image) {
    let clear_color = vk::ClearColorValue {
        float32: [0.392, 0.584, 0.929, 1.0],
    };

    transition_image(
        device,
        cmd,
        image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::AccessFlags::empty(),
        vk::AccessFlags::TRANSFER_WRITE,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
    );

    unsafe {
        device.cmd_clear_color_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &clear_color,
            &[color_range()],
        );
    }

    transition_image(
        device,
        cmd,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::AccessFlags::empty(),
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    );
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[allow(clippy::too_many_arguments)]
fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .image(image)
        .subresource_range(color_range())
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}
