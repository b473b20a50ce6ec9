use std::mem::size_of;
use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use slotmap::SlotMap;

use crate::buffer::{DeviceBacking, DeviceLocalBacking, SharedDeviceBuffer, SharedSlice};
use crate::model::mesh::{IndirectArgs, MeshBundle, SubmissionMode};
use crate::reclaim::ReclaimQueue;
use crate::upload::UploadStage;
use crate::vulkan::{DeviceContext, QueueFamiliesIndices};

slotmap::new_key_type! { pub struct ModelKey; }

/// The shared device-local buffers all model data is packed into: geometry,
/// meshlet tables, per-model indirect arguments and per-pipeline counters.
pub struct GeometryArena<B: DeviceBacking>
where
    B::Raw: Send + Sync + 'static,
{
    pub vertices: SharedDeviceBuffer<B>,
    pub indices: SharedDeviceBuffer<B>,
    pub meshlets: SharedDeviceBuffer<B>,
    pub indirect: SharedDeviceBuffer<B>,
    pub counters: SharedDeviceBuffer<B>,
}

impl<B: DeviceBacking> GeometryArena<B>
where
    B::Raw: Send + Sync + 'static,
{
    pub fn new(mut make_backing: impl FnMut(&'static str) -> B) -> Self {
        Self {
            vertices: SharedDeviceBuffer::new(make_backing("shared-vertices")),
            indices: SharedDeviceBuffer::new(make_backing("shared-indices")),
            meshlets: SharedDeviceBuffer::new(make_backing("shared-meshlets")),
            indirect: SharedDeviceBuffer::new(make_backing("shared-indirect-args")),
            counters: SharedDeviceBuffer::new(make_backing("shared-counters")),
        }
    }
}

impl GeometryArena<DeviceLocalBacking> {
    pub fn device_local(
        allocator: &Arc<vk_mem::Allocator>,
        device_context: &DeviceContext,
        families: &QueueFamiliesIndices,
    ) -> Self {
        let sharing = families.sharing();
        let backing = |usage: vk::BufferUsageFlags, label: &'static str| {
            DeviceLocalBacking::new(
                allocator.clone(),
                device_context.clone(),
                usage,
                sharing.clone(),
                label,
            )
        };
        Self {
            vertices: SharedDeviceBuffer::new(backing(
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
                "shared-vertices",
            )),
            indices: SharedDeviceBuffer::new(backing(
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
                "shared-indices",
            )),
            meshlets: SharedDeviceBuffer::new(backing(
                vk::BufferUsageFlags::STORAGE_BUFFER,
                "shared-meshlets",
            )),
            indirect: SharedDeviceBuffer::new(backing(
                vk::BufferUsageFlags::INDIRECT_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
                "shared-indirect-args",
            )),
            counters: SharedDeviceBuffer::new(backing(
                vk::BufferUsageFlags::STORAGE_BUFFER,
                "shared-counters",
            )),
        }
    }

    /// Records every staged old-generation migration. The copy stage calls
    /// this each frame before any staged uploads land.
    pub fn record_pending_copies(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> bool {
        let mut recorded = false;
        for buffer in [
            &mut self.vertices,
            &mut self.indices,
            &mut self.meshlets,
            &mut self.indirect,
            &mut self.counters,
        ] {
            if let Some(pending) = buffer.take_pending_copy() {
                let region = vk::BufferCopy::default()
                    .src_offset(0)
                    .dst_offset(0)
                    .size(pending.len);
                unsafe {
                    device.cmd_copy_buffer(cmd, pending.src.handle(), pending.dst.handle(), &[region]);
                }
                recorded = true;
            }
        }
        recorded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaTarget {
    Vertices,
    Indices,
    Meshlets,
    Indirect,
}

struct PendingGeometryUpload {
    target: ArenaTarget,
    slice: SharedSlice,
    bytes: Box<[u8]>,
}

pub struct ModelEntry {
    pub vertices: SharedSlice,
    pub indices: SharedSlice,
    pub meshlets: Option<SharedSlice>,
    pub args: SharedSlice,
    pub mode: SubmissionMode,
    pub index_count: u32,
}

/// Registry of renderable models. Adding a model sub-allocates its data out
/// of the arena and queues the byte uploads; removing it returns every
/// slice to the arena's free lists.
#[derive(Default)]
pub struct ModelManager {
    models: SlotMap<ModelKey, ModelEntry>,
    pending: Vec<PendingGeometryUpload>,
}

impl ModelManager {
    pub fn add_model<B: DeviceBacking>(
        &mut self,
        bundle: &MeshBundle,
        arena: &mut GeometryArena<B>,
        reclaim: &mut ReclaimQueue,
    ) -> anyhow::Result<ModelKey>
    where
        B::Raw: Send + Sync + 'static,
    {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&bundle.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&bundle.indices);

        let vertices = arena
            .vertices
            .allocate(vertex_bytes.len() as u64, reclaim)
            .context("failed to allocate vertex range")?;
        let indices = arena
            .indices
            .allocate(index_bytes.len() as u64, reclaim)
            .context("failed to allocate index range")?;

        let meshlets = if bundle.meshlets.is_empty() {
            None
        } else {
            let meshlet_bytes: &[u8] = bytemuck::cast_slice(&bundle.meshlets);
            let slice = arena
                .meshlets
                .allocate(meshlet_bytes.len() as u64, reclaim)
                .context("failed to allocate meshlet range")?;
            self.pending.push(PendingGeometryUpload {
                target: ArenaTarget::Meshlets,
                slice,
                bytes: meshlet_bytes.into(),
            });
            Some(slice)
        };

        let args_slice = arena
            .indirect
            .allocate(size_of::<IndirectArgs>() as u64, reclaim)
            .context("failed to allocate indirect-args range")?;

        let args = IndirectArgs {
            index_count: bundle.indices.len() as u32,
            // the culling pass raises this on the GPU-driven path
            instance_count: match bundle.mode {
                SubmissionMode::Indirect => 0,
                _ => 1,
            },
            first_index: (indices.offset / size_of::<u32>() as u64) as u32,
            vertex_offset: (vertices.offset / size_of::<crate::model::Vertex>() as u64) as i32,
            first_instance: 0,
        };

        self.pending.push(PendingGeometryUpload {
            target: ArenaTarget::Vertices,
            slice: vertices,
            bytes: vertex_bytes.into(),
        });
        self.pending.push(PendingGeometryUpload {
            target: ArenaTarget::Indices,
            slice: indices,
            bytes: index_bytes.into(),
        });
        self.pending.push(PendingGeometryUpload {
            target: ArenaTarget::Indirect,
            slice: args_slice,
            bytes: bytemuck::bytes_of(&args).into(),
        });

        Ok(self.models.insert(ModelEntry {
            vertices,
            indices,
            meshlets,
            args: args_slice,
            mode: bundle.mode,
            index_count: bundle.indices.len() as u32,
        }))
    }

    /// Returns the model's ranges to the arena. The GPU may still read them
    /// this frame; ranges only become reusable for allocations recorded
    /// afterwards, which is safe because reuse flows through the same
    /// staged-upload path.
    pub fn remove_model<B: DeviceBacking>(
        &mut self,
        key: ModelKey,
        arena: &mut GeometryArena<B>,
    ) -> bool
    where
        B::Raw: Send + Sync + 'static,
    {
        let Some(entry) = self.models.remove(key) else {
            return false;
        };
        arena.vertices.release(entry.vertices);
        arena.indices.release(entry.indices);
        if let Some(meshlets) = entry.meshlets {
            arena.meshlets.release(meshlets);
        }
        arena.indirect.release(entry.args);
        true
    }

    /// Queues every pending byte upload against the arena's current
    /// generations. Must run after all model mutations for the frame, right
    /// before the staging pipeline records; earlier resolution could target
    /// a generation that a later growth retires.
    pub fn flush_uploads(
        &mut self,
        arena: &GeometryArena<DeviceLocalBacking>,
        stage: &mut UploadStage,
    ) -> anyhow::Result<()> {
        for upload in self.pending.drain(..) {
            let buffer = match upload.target {
                ArenaTarget::Vertices => &arena.vertices,
                ArenaTarget::Indices => &arena.indices,
                ArenaTarget::Meshlets => &arena.meshlets,
                ArenaTarget::Indirect => &arena.indirect,
            };
            let handle = buffer
                .raw()
                .expect("arena buffer with allocations but no backing")
                .handle();
            stage.queue_buffer(upload.bytes, handle, upload.slice.offset)?;
        }
        Ok(())
    }

    pub fn entry(&self, key: ModelKey) -> Option<&ModelEntry> {
        self.models.get(key)
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn pending_upload_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;

    use super::*;
    use crate::model::mesh::{Meshlet, Vertex};

    #[derive(Default)]
    struct TestBacking {
        next_id: u32,
    }

    struct TestRaw {
        _id: u32,
    }

    impl DeviceBacking for TestBacking {
        type Raw = TestRaw;

        fn create(&mut self, _size: u64) -> anyhow::Result<TestRaw> {
            self.next_id += 1;
            Ok(TestRaw { _id: self.next_id })
        }
    }

    fn bundle(vertex_count: usize, index_count: usize, meshlet_count: usize) -> MeshBundle {
        MeshBundle {
            vertices: vec![Vertex::zeroed(); vertex_count],
            indices: vec![0; index_count],
            meshlets: vec![Meshlet::zeroed(); meshlet_count],
            mode: SubmissionMode::Indirect,
        }
    }

    fn arena() -> GeometryArena<TestBacking> {
        GeometryArena::new(|_| TestBacking::default())
    }

    #[test]
    fn models_pack_contiguously_into_the_arena() {
        let mut arena = arena();
        let mut manager = ModelManager::default();
        let mut reclaim = ReclaimQueue::new(2);

        let a = manager
            .add_model(&bundle(3, 6, 1), &mut arena, &mut reclaim)
            .unwrap();
        let b = manager
            .add_model(&bundle(4, 3, 0), &mut arena, &mut reclaim)
            .unwrap();

        let vertex_size = size_of::<Vertex>() as u64;
        let a = manager.entry(a).unwrap();
        let b = manager.entry(b).unwrap();
        assert_eq!(a.vertices.offset, 0);
        assert_eq!(b.vertices.offset, 3 * vertex_size);
        assert_eq!(a.indices.offset, 0);
        assert_eq!(b.indices.offset, 24);
        assert_eq!(a.args.size, size_of::<IndirectArgs>() as u64);
        assert!(a.meshlets.is_some());
        assert!(b.meshlets.is_none());
        assert_eq!(arena.vertices.size(), 7 * vertex_size);
    }

    #[test]
    fn removing_a_model_lets_an_equal_one_reuse_its_ranges() {
        let mut arena = arena();
        let mut manager = ModelManager::default();
        let mut reclaim = ReclaimQueue::new(2);

        let first = manager
            .add_model(&bundle(8, 12, 0), &mut arena, &mut reclaim)
            .unwrap();
        manager
            .add_model(&bundle(8, 12, 0), &mut arena, &mut reclaim)
            .unwrap();

        let removed_offsets = {
            let entry = manager.entry(first).unwrap();
            (entry.vertices.offset, entry.indices.offset, entry.args.offset)
        };
        assert!(manager.remove_model(first, &mut arena));

        let size_before = arena.vertices.size();
        let replacement = manager
            .add_model(&bundle(8, 12, 0), &mut arena, &mut reclaim)
            .unwrap();
        let entry = manager.entry(replacement).unwrap();
        assert_eq!(entry.vertices.offset, removed_offsets.0);
        assert_eq!(entry.indices.offset, removed_offsets.1);
        assert_eq!(entry.args.offset, removed_offsets.2);
        assert_eq!(arena.vertices.size(), size_before);
    }

    #[test]
    fn indirect_args_index_into_the_shared_ranges() {
        let mut arena = arena();
        let mut manager = ModelManager::default();
        let mut reclaim = ReclaimQueue::new(2);

        manager
            .add_model(&bundle(5, 9, 0), &mut arena, &mut reclaim)
            .unwrap();
        let key = manager
            .add_model(&bundle(2, 3, 0), &mut arena, &mut reclaim)
            .unwrap();
        let entry = manager.entry(key).unwrap();

        // second model starts after the first's 9 indices and 5 vertices
        let args_upload = manager
            .pending
            .iter()
            .find(|u| u.target == ArenaTarget::Indirect && u.slice == entry.args)
            .unwrap();
        let args: IndirectArgs = *bytemuck::from_bytes(&args_upload.bytes);
        assert_eq!(args.first_index, 9);
        assert_eq!(args.vertex_offset, 5);
        assert_eq!(args.index_count, 3);
        assert_eq!(args.instance_count, 0);
    }

    #[test]
    fn uploads_accumulate_until_flushed() {
        let mut arena = arena();
        let mut manager = ModelManager::default();
        let mut reclaim = ReclaimQueue::new(2);

        manager
            .add_model(&bundle(1, 3, 2), &mut arena, &mut reclaim)
            .unwrap();
        // meshlets + vertices + indices + args
        assert_eq!(manager.pending_upload_count(), 4);
    }
}
