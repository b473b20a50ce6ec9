use std::sync::Arc;

use crate::alloc::FreeListAllocator;
use crate::buffer::{DeviceBacking, SharedSlice};
use crate::reclaim::ReclaimQueue;

/// A whole-buffer migration the copy stage must record before the buffer is
/// read again: `len` bytes from the retired generation into the current one.
pub struct PendingCopy<R> {
    pub src: Arc<R>,
    pub dst: Arc<R>,
    pub len: u64,
}

/// Device-local variant of the shared buffer.
///
/// The backing memory has no CPU mapping, so growth cannot migrate contents
/// immediately: the retiring generation is staged in `old` and copied
/// forward on the copy queue by the next frame's copy stage. Every replaced
/// generation is also parked in the reclaim queue so it outlives whatever
/// GPU work still reads it.
pub struct SharedDeviceBuffer<B: DeviceBacking>
where
    B::Raw: Send + Sync + 'static,
{
    backing: B,
    buffer: Option<Arc<B::Raw>>,
    old: Option<Arc<B::Raw>>,
    old_len: u64,
    size: u64,
    free: FreeListAllocator,
}

impl<B: DeviceBacking> SharedDeviceBuffer<B>
where
    B::Raw: Send + Sync + 'static,
{
    pub fn new(backing: B) -> Self {
        Self {
            backing,
            buffer: None,
            old: None,
            old_len: 0,
            size: 0,
            free: FreeListAllocator::default(),
        }
    }

    pub fn allocate(
        &mut self,
        size: u64,
        reclaim: &mut ReclaimQueue,
    ) -> anyhow::Result<SharedSlice> {
        if let Some(index) = self.free.find(size) {
            let range = self.free.take(index);
            let offset = self.free.allocate(range, size);
            return Ok(SharedSlice { offset, size });
        }

        let offset = self.size;
        self.extend(self.size + size, reclaim)?;
        Ok(SharedSlice { offset, size })
    }

    pub fn release(&mut self, slice: SharedSlice) {
        self.free.release(slice.offset, slice.size);
    }

    fn extend(&mut self, new_size: u64, reclaim: &mut ReclaimQueue) -> anyhow::Result<()> {
        if new_size <= self.size {
            return Ok(());
        }

        let new_buffer = Arc::new(self.backing.create(new_size)?);

        if let Some(current) = self.buffer.take() {
            reclaim.add(current.clone());
            if self.old.is_none() {
                // stage the retiring generation for the GPU copy
                self.old_len = self.size;
                self.old = Some(current);
            }
            // otherwise a growth is already pending and the first staged
            // generation stays the single source to copy forward; the
            // generation replaced here was created after it and never
            // received data the chain could lose
        }

        log::debug!("device shared buffer grown {} -> {} bytes", self.size, new_size);
        self.buffer = Some(new_buffer);
        self.size = new_size;
        Ok(())
    }

    /// Takes the staged old-generation copy, if any. The copy stage calls
    /// this every frame and records the returned migration; after the take,
    /// only the reclaim queue keeps the retired generation alive.
    pub fn take_pending_copy(&mut self) -> Option<PendingCopy<B::Raw>> {
        let src = self.old.take()?;
        let dst = self
            .buffer
            .as_ref()
            .expect("staged old buffer without a current generation")
            .clone();
        Some(PendingCopy {
            src,
            dst,
            len: self.old_len,
        })
    }

    pub fn raw(&self) -> Option<&Arc<B::Raw>> {
        self.buffer.as_ref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestBacking {
        next_id: u32,
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TestRaw {
        id: u32,
        size: u64,
    }

    impl DeviceBacking for TestBacking {
        type Raw = TestRaw;

        fn create(&mut self, size: u64) -> anyhow::Result<TestRaw> {
            self.next_id += 1;
            Ok(TestRaw {
                id: self.next_id,
                size,
            })
        }
    }

    fn shared() -> (SharedDeviceBuffer<TestBacking>, ReclaimQueue) {
        (SharedDeviceBuffer::new(TestBacking::default()), ReclaimQueue::new(2))
    }

    const KB: u64 = 1024;

    #[test]
    fn growth_and_relinquish_sequence() {
        let (mut shared, mut reclaim) = shared();

        assert_eq!(shared.allocate(12, &mut reclaim).unwrap().offset, 0);
        assert_eq!(shared.size(), 12);

        let second = shared.allocate(12, &mut reclaim).unwrap();
        assert_eq!(second.offset, 12);
        assert_eq!(shared.size(), 24);

        shared.release(second);
        assert_eq!(shared.allocate(12, &mut reclaim).unwrap().offset, 12);
        assert_eq!(shared.size(), 24);

        assert_eq!(shared.allocate(12, &mut reclaim).unwrap().offset, 24);
        assert_eq!(shared.size(), 36);

        assert_eq!(shared.allocate(20 * KB, &mut reclaim).unwrap().offset, 36);
        assert_eq!(shared.size(), 20 * KB + 36);

        let thirty = shared.allocate(30 * KB, &mut reclaim).unwrap();
        assert_eq!(thirty.offset, 20 * KB + 36);
        assert_eq!(shared.size(), 50 * KB + 36);

        assert_eq!(shared.allocate(50 * KB, &mut reclaim).unwrap().offset, 50 * KB + 36);
        assert_eq!(shared.size(), 100 * KB + 36);

        // the freed 30 KB hole serves both of these without growing
        shared.release(thirty);
        assert_eq!(shared.allocate(20 * KB, &mut reclaim).unwrap().offset, 20 * KB + 36);
        assert_eq!(shared.size(), 100 * KB + 36);
        assert_eq!(shared.allocate(10 * KB, &mut reclaim).unwrap().offset, 40 * KB + 36);
        assert_eq!(shared.size(), 100 * KB + 36);
    }

    #[test]
    fn repeated_growth_keeps_the_first_staged_generation() {
        let (mut shared, mut reclaim) = shared();

        shared.allocate(100, &mut reclaim).unwrap(); // generation 1
        shared.allocate(100, &mut reclaim).unwrap(); // generation 2, stages 1
        shared.allocate(100, &mut reclaim).unwrap(); // generation 3, must not restage

        let pending = shared.take_pending_copy().unwrap();
        assert_eq!(pending.src.id, 1);
        assert_eq!(pending.dst.id, 3);
        assert_eq!(pending.len, 100);

        // nothing further staged until the next growth
        assert!(shared.take_pending_copy().is_none());
    }

    #[test]
    fn first_growth_has_nothing_to_copy() {
        let (mut shared, mut reclaim) = shared();
        shared.allocate(64, &mut reclaim).unwrap();
        assert!(shared.take_pending_copy().is_none());
    }

    #[test]
    fn zero_delta_extension_skips_recreation() {
        let (mut shared, mut reclaim) = shared();
        shared.allocate(64, &mut reclaim).unwrap();
        let generation = shared.raw().unwrap().id;

        shared.extend(64, &mut reclaim).unwrap();
        shared.extend(10, &mut reclaim).unwrap();

        assert_eq!(shared.raw().unwrap().id, generation);
        assert_eq!(shared.size(), 64);
    }

    #[test]
    fn retired_generations_live_in_the_reclaim_queue() {
        let (mut shared, mut reclaim) = shared();
        shared.allocate(10, &mut reclaim).unwrap();
        shared.allocate(10, &mut reclaim).unwrap();

        let pending = shared.take_pending_copy().unwrap();
        // reclaim queue still holds the retired generation
        assert_eq!(Arc::strong_count(&pending.src), 2);

        reclaim.set_used(0);
        reclaim.clear(0);
        assert_eq!(Arc::strong_count(&pending.src), 1);
    }
}
