use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use crossbeam_channel::Receiver;
#[cfg(feature = "tracing")]
use tracy_client::frame_mark;

use crate::buffer::{HostSharedBuffer, HostVisibleBacking, SharedHostBuffer, SharedSlice};
use crate::caps::RenderCaps;
use crate::messages::{EngineControl, ModelCommand, ShutdownPhase};
use crate::model::{GeometryArena, ModelManager};
use crate::reclaim::ReclaimQueue;
use crate::render::{
    frame::Frame,
    frame_ring::FrameRing,
    present::present_frame,
    stages::{submit_compute_stage, submit_copy_stage, submit_graphics_stage},
    swapchain::SwapchainContext,
};
use crate::sync::FrameSync;
use crate::upload::{UploadStage, WorkerPool};
use crate::vulkan::SwapchainCreateCaps;

const FRAME_SLOTS: usize = 2;
const UPLOAD_WORKERS: usize = 4;
/// One draw counter per submission path (direct, indirect, mesh shading).
const CULL_COUNTER_COUNT: u64 = 3;

/// Per-frame constants the culling and draw passes read.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FrameGlobals {
    frame_index: u32,
    model_count: u32,
    counter_base: u32,
    _pad: u32,
}

fn write_frame_globals(buffer: &HostSharedBuffer, slice: SharedSlice, globals: FrameGlobals) {
    let Some(raw) = buffer.raw() else { return };
    let bytes = bytemuck::bytes_of(&globals);
    debug_assert!(bytes.len() as u64 <= slice.size);
    unsafe {
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            raw.mapped_ptr().add(slice.offset as usize),
            bytes.len(),
        );
    }
}

pub fn render_thread(
    caps: RenderCaps,
    control: Arc<EngineControl>,
    swapchain_caps: SwapchainCreateCaps,
    commands: Receiver<ModelCommand>,
) -> anyhow::Result<()> {
    let device = caps.device_context.device.clone();
    let queue_families = swapchain_caps.queue_families;

    let mut swapchain = SwapchainContext::new(&swapchain_caps, [800, 600])
        .context("failed to create Swapchain Context")?;

    let allocator_info =
        vk_mem::AllocatorCreateInfo::new(&caps.instance, &device, caps.physical_device);
    let allocator = Arc::new(
        unsafe { vk_mem::Allocator::new(allocator_info) }
            .context("failed to create device memory allocator")?,
    );

    let mut arena = GeometryArena::device_local(&allocator, &caps.device_context, &queue_families);
    let mut models = ModelManager::default();
    let mut upload = UploadStage::new(allocator.clone(), caps.device_context.clone());
    let pool = WorkerPool::new(UPLOAD_WORKERS).context("failed to create upload worker pool")?;
    let mut reclaim = ReclaimQueue::new(FRAME_SLOTS);
    let mut sync = FrameSync::new(device.clone(), FRAME_SLOTS)
        .context("failed to create frame sync state")?;

    let frames = (0..FRAME_SLOTS)
        .map(|index| Frame::new(&device, &queue_families, index))
        .collect::<anyhow::Result<Vec<Frame>>>()?;
    let mut ring = FrameRing::new(frames);

    // the per-pipeline counters the culling pass accumulates into; zeroed by
    // the compute stage every frame
    let counters = arena
        .counters
        .allocate(CULL_COUNTER_COUNT * size_of::<u32>() as u64, &mut reclaim)
        .context("failed to allocate cull counters")?;

    // per-slot frame constants, CPU-written through the mapped shared buffer
    let mut globals = SharedHostBuffer::new(HostVisibleBacking::new(
        allocator.clone(),
        caps.device_context.clone(),
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        queue_families.sharing(),
        "frame-globals",
    ));
    let frame_globals = (0..FRAME_SLOTS)
        .map(|_| globals.allocate(size_of::<FrameGlobals>() as u64, true))
        .collect::<anyhow::Result<Vec<SharedSlice>>>()
        .context("failed to allocate frame globals")?;

    let mut frame_counter: u64 = 0;

    while control.phase() == ShutdownPhase::Running {
        let _frame_span = tracy_client::span!("frame");

        while let Ok(command) = commands.try_recv() {
            match command {
                ModelCommand::Add(bundle) => {
                    let key = models.add_model(&bundle, &mut arena, &mut reclaim)?;
                    log::debug!(
                        "registered model {key:?} ({} models resident)",
                        models.model_count()
                    );
                }
            }
        }

        let frame = ring.acquire();
        let slot = frame.index;

        // slot retirement gates reuse of everything recorded two frames ago
        sync.wait_slot_retired(slot)?;
        reclaim.clear(slot);
        reclaim.begin_slot(slot);

        write_frame_globals(
            &globals,
            frame_globals[slot],
            FrameGlobals {
                frame_index: frame_counter as u32,
                model_count: models.model_count() as u32,
                counter_base: (counters.offset / size_of::<u32>() as u64) as u32,
                _pad: 0,
            },
        );
        frame_counter += 1;

        let (image_index, _suboptimal) = swapchain
            .acquire_next_image(frame.image_available)
            .context("failed to acquire next image")?;
        frame.swapchain_image_index = image_index;

        let copy_value = submit_copy_stage(
            &device,
            &caps.queues,
            &mut sync,
            frame,
            &mut arena,
            &mut models,
            &mut upload,
            &pool,
            &mut reclaim,
        )?;
        let compute_value = submit_compute_stage(
            &device,
            &caps.queues,
            &mut sync,
            frame,
            &arena,
            counters,
            copy_value,
        )?;
        submit_graphics_stage(&device, &caps.queues, &mut sync, frame, &swapchain, compute_value)?;

        present_frame(caps.queues.present, frame, &swapchain)
            .context("failed to present frame")?;

        reclaim.set_used(slot);

        #[cfg(feature = "tracing")]
        frame_mark();
    }

    // structural teardown: nothing below is safe while any queue still runs
    sync.wait_for_gpu_to_finish(&device, &caps.queues)
        .context("render: failed to drain queues")?;
    reclaim.clear_all();

    ring.destroy(&device);
    sync.destroy();
    swapchain.destroy();
    drop(models);
    drop(upload);
    drop(globals);
    drop(arena);
    drop(pool);
    drop(allocator);

    log::debug!("Render thread shutting down");
    Ok(())
}
