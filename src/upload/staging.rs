use std::ops::Range;
use std::sync::Arc;

use anyhow::Context;
use ash::vk;

use crate::buffer::{GpuBuffer, create_staging_buffer};
use crate::reclaim::ReclaimQueue;
use crate::upload::pool::{JobHandle, WorkerPool};
use crate::vulkan::DeviceContext;

/// Caps the bytes handed to a single memcpy task so one batch never pins an
/// unbounded working set.
const MAX_BATCH_BYTES: u64 = 250 * 1024 * 1024;

/// Staging rows are padded out to the copy-engine row pitch.
const ROW_PITCH_ALIGNMENT: u64 = 256;

enum CopyTarget {
    Buffer {
        dst: vk::Buffer,
        dst_offset: u64,
    },
    Texture {
        dst: vk::Image,
        extent: vk::Extent3D,
        subresource: vk::ImageSubresourceLayers,
        src_row_pitch: u64,
        staged_row_pitch: u64,
        rows: u32,
        texels_per_row: u32,
    },
}

struct PendingUpload {
    staging: Arc<GpuBuffer>,
    bytes: Box<[u8]>,
    target: CopyTarget,
}

impl PendingUpload {
    fn staged_size(&self) -> u64 {
        self.staging.size()
    }

    fn run_memcpy(&self) {
        let mapped = self.staging.mapped_ptr();
        debug_assert!(!mapped.is_null());
        match &self.target {
            CopyTarget::Buffer { .. } => unsafe {
                std::ptr::copy_nonoverlapping(self.bytes.as_ptr(), mapped, self.bytes.len());
            },
            CopyTarget::Texture {
                src_row_pitch,
                staged_row_pitch,
                rows,
                ..
            } => {
                let staged =
                    unsafe { std::slice::from_raw_parts_mut(mapped, self.staging.size() as usize) };
                copy_rows(
                    &self.bytes,
                    *src_row_pitch as usize,
                    staged,
                    *staged_row_pitch as usize,
                    *rows as usize,
                );
            }
        }
    }
}

/// Batches CPU-to-GPU byte uploads: every queued region gets its own
/// temporary upload buffer, the CPU-side copies run on the worker pool, and
/// one copy-queue command list carries the whole batch to the GPU.
pub struct UploadStage {
    allocator: Arc<vk_mem::Allocator>,
    device_context: DeviceContext,
    buffers: Vec<Arc<PendingUpload>>,
    textures: Vec<Arc<PendingUpload>>,
    upload_counter: u64,
}

impl UploadStage {
    pub fn new(allocator: Arc<vk_mem::Allocator>, device_context: DeviceContext) -> Self {
        Self {
            allocator,
            device_context,
            buffers: Vec::new(),
            textures: Vec::new(),
            upload_counter: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }

    /// Queues a byte-region copy into `dst` at `dst_offset`.
    pub fn queue_buffer(
        &mut self,
        bytes: Box<[u8]>,
        dst: vk::Buffer,
        dst_offset: u64,
    ) -> anyhow::Result<()> {
        self.upload_counter += 1;
        let staging = create_staging_buffer(
            &self.allocator,
            &self.device_context,
            bytes.len() as u64,
            &format!("staging-buffer-{}", self.upload_counter),
        )
        .context("failed to create buffer staging memory")?;

        self.buffers.push(Arc::new(PendingUpload {
            staging: Arc::new(staging),
            bytes,
            target: CopyTarget::Buffer { dst, dst_offset },
        }));
        Ok(())
    }

    /// Queues a 2D subresource upload. `bytes` is tightly packed
    /// (`width * bytes_per_texel` per row); the staged copy re-pitches each
    /// row to the aligned pitch the copy engine wants. The destination image
    /// must already be in `TRANSFER_DST_OPTIMAL`.
    pub fn queue_texture(
        &mut self,
        bytes: Box<[u8]>,
        dst: vk::Image,
        width: u32,
        height: u32,
        bytes_per_texel: u32,
    ) -> anyhow::Result<()> {
        let src_row_pitch = width as u64 * bytes_per_texel as u64;
        let staged_row_pitch = align_row_pitch(src_row_pitch);
        debug_assert_eq!(bytes.len() as u64, src_row_pitch * height as u64);

        self.upload_counter += 1;
        let staging = create_staging_buffer(
            &self.allocator,
            &self.device_context,
            staged_row_pitch * height as u64,
            &format!("staging-texture-{}", self.upload_counter),
        )
        .context("failed to create texture staging memory")?;

        self.textures.push(Arc::new(PendingUpload {
            staging: Arc::new(staging),
            bytes,
            target: CopyTarget::Texture {
                dst,
                extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
                subresource: vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
                src_row_pitch,
                staged_row_pitch,
                rows: height,
                texels_per_row: (staged_row_pitch / bytes_per_texel as u64) as u32,
            },
        }));
        Ok(())
    }

    /// Runs every queued CPU copy on the worker pool, blocks until they are
    /// all done, then records the GPU copies into `cmd`. Staging buffers are
    /// parked in the reclaim queue for the active frame slot; the pending
    /// lists come back empty.
    pub fn copy_and_clear(
        &mut self,
        pool: &WorkerPool,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        reclaim: &mut ReclaimQueue,
    ) -> anyhow::Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let _span = tracy_client::span!("upload_copy_and_clear");

        // texture descriptors are indexed after all buffer descriptors, so
        // both kinds share one batch sequence
        let all: Vec<Arc<PendingUpload>> = self
            .buffers
            .iter()
            .chain(self.textures.iter())
            .cloned()
            .collect();
        let sizes: Vec<u64> = all.iter().map(|upload| upload.staged_size()).collect();

        let handles: Vec<JobHandle> = partition_batches(&sizes, MAX_BATCH_BYTES)
            .into_iter()
            .map(|range| {
                let batch = all[range].to_vec();
                pool.submit(move || {
                    for upload in &batch {
                        upload.run_memcpy();
                    }
                })
            })
            .collect();

        // the GPU copy below consumes the staging contents, so this barrier
        // is not overlappable with the recording
        for handle in handles {
            handle.wait();
        }

        for upload in &self.buffers {
            let CopyTarget::Buffer { dst, dst_offset } = &upload.target else {
                unreachable!()
            };
            let region = vk::BufferCopy::default()
                .src_offset(0)
                .dst_offset(*dst_offset)
                .size(upload.bytes.len() as u64);
            unsafe {
                device.cmd_copy_buffer(cmd, upload.staging.handle(), *dst, &[region]);
            }
        }

        for upload in &self.textures {
            let CopyTarget::Texture {
                dst,
                extent,
                subresource,
                texels_per_row,
                ..
            } = &upload.target
            else {
                unreachable!()
            };
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(*texels_per_row)
                .buffer_image_height(0)
                .image_subresource(*subresource)
                .image_extent(*extent);
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    upload.staging.handle(),
                    *dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
        }

        for upload in self.buffers.drain(..).chain(self.textures.drain(..)) {
            reclaim.add(upload.staging.clone());
        }
        Ok(())
    }
}

fn align_row_pitch(bytes_per_row: u64) -> u64 {
    (bytes_per_row + ROW_PITCH_ALIGNMENT - 1) & !(ROW_PITCH_ALIGNMENT - 1)
}

/// Greedy split of `sizes` into contiguous runs whose sums stay under
/// `cap`. An oversized single entry still gets a batch of its own.
fn partition_batches(sizes: &[u64], cap: u64) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut batch_bytes = 0u64;

    for (index, &size) in sizes.iter().enumerate() {
        if index > start && batch_bytes + size > cap {
            batches.push(start..index);
            start = index;
            batch_bytes = 0;
        }
        batch_bytes += size;
    }
    if start < sizes.len() {
        batches.push(start..sizes.len());
    }
    batches
}

/// Copies `rows` rows from a tightly pitched source into a wider-pitched
/// destination; each side advances by its own stride.
fn copy_rows(src: &[u8], src_pitch: usize, dst: &mut [u8], dst_pitch: usize, rows: usize) {
    debug_assert!(src_pitch <= dst_pitch);
    for row in 0..rows {
        let src_row = &src[row * src_pitch..row * src_pitch + src_pitch];
        dst[row * dst_pitch..row * dst_pitch + src_pitch].copy_from_slice(src_row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_respect_the_byte_cap() {
        let sizes = [100, 100, 100, 100, 100];
        let batches = partition_batches(&sizes, 250);
        assert_eq!(batches, vec![0..2, 2..4, 4..5]);
    }

    #[test]
    fn oversized_entries_get_their_own_batch() {
        let sizes = [1000, 10, 10];
        let batches = partition_batches(&sizes, 250);
        assert_eq!(batches, vec![0..1, 1..3]);
    }

    #[test]
    fn one_small_list_is_one_batch() {
        assert_eq!(partition_batches(&[5, 5, 5], 250), vec![0..3]);
        assert!(partition_batches(&[], 250).is_empty());
    }

    #[test]
    fn row_copies_honor_both_pitches() {
        let src: Vec<u8> = (0..6).collect(); // two rows of three bytes
        let mut dst = vec![0xff; 8]; // pitch four
        copy_rows(&src, 3, &mut dst, 4, 2);
        assert_eq!(dst, [0, 1, 2, 0xff, 3, 4, 5, 0xff]);
    }

    #[test]
    fn row_pitch_aligns_up_to_the_copy_granularity() {
        assert_eq!(align_row_pitch(1), 256);
        assert_eq!(align_row_pitch(256), 256);
        assert_eq!(align_row_pitch(257), 512);
        assert_eq!(align_row_pitch(1024), 1024);
    }
}
