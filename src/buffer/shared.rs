use crate::alloc::FreeListAllocator;
use crate::buffer::{HostBacking, SharedSlice};

/// One growable CPU-mapped buffer whose space is multiplexed among many
/// logical allocations.
///
/// Running out of room reallocates the backing buffer at exactly
/// `current + request` bytes; the appended region starts at the old size.
pub struct SharedHostBuffer<B: HostBacking> {
    backing: B,
    buffer: Option<B::Raw>,
    size: u64,
    free: FreeListAllocator,
}

impl<B: HostBacking> SharedHostBuffer<B> {
    pub fn new(backing: B) -> Self {
        Self {
            backing,
            buffer: None,
            size: 0,
            free: FreeListAllocator::default(),
        }
    }

    /// Hands out a free range, growing the buffer when no hole fits.
    /// `copy_on_grow` controls whether the previous generation's bytes are
    /// migrated into the new buffer.
    pub fn allocate(&mut self, size: u64, copy_on_grow: bool) -> anyhow::Result<SharedSlice> {
        if let Some(index) = self.free.find(size) {
            let range = self.free.take(index);
            let offset = self.free.allocate(range, size);
            return Ok(SharedSlice { offset, size });
        }

        let offset = self.size;
        self.extend(self.size + size, copy_on_grow)?;
        Ok(SharedSlice { offset, size })
    }

    /// Returns a slice's range to the free list. The buffer does not track
    /// outstanding leases; callers release before dropping their handle.
    pub fn release(&mut self, slice: SharedSlice) {
        self.free.release(slice.offset, slice.size);
    }

    fn extend(&mut self, new_size: u64, copy_old: bool) -> anyhow::Result<()> {
        // a request already covered by earlier growth skips recreation
        if new_size <= self.size {
            return Ok(());
        }

        let new_buffer = self.backing.create(new_size)?;
        if let Some(old) = self.buffer.take()
            && copy_old
        {
            self.backing.migrate(&old, &new_buffer, self.size);
        }

        log::debug!("host shared buffer grown {} -> {} bytes", self.size, new_size);
        self.buffer = Some(new_buffer);
        self.size = new_size;
        Ok(())
    }

    pub fn raw(&self) -> Option<&B::Raw> {
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
        migrations: Vec<(u32, u32, u64)>,
        next_id: u32,
    }

    struct TestRaw {
        id: u32,
        bytes: Vec<u8>,
    }

    impl HostBacking for TestBacking {
        type Raw = TestRaw;

        fn create(&mut self, size: u64) -> anyhow::Result<TestRaw> {
            self.next_id += 1;
            Ok(TestRaw {
                id: self.next_id,
                bytes: vec![0; size as usize],
            })
        }

        fn migrate(&mut self, src: &TestRaw, dst: &TestRaw, len: u64) {
            self.migrations.push((src.id, dst.id, len));
        }
    }

    #[test]
    fn growth_appends_at_the_old_size() {
        let mut shared = SharedHostBuffer::new(TestBacking::default());

        let a = shared.allocate(40, true).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(shared.size(), 40);

        let b = shared.allocate(24, true).unwrap();
        assert_eq!(b.offset, 40);
        assert_eq!(shared.size(), 64);
    }

    #[test]
    fn growth_migrates_previous_contents_when_asked() {
        let mut shared = SharedHostBuffer::new(TestBacking::default());
        shared.allocate(16, true).unwrap();
        shared.allocate(16, true).unwrap();
        shared.allocate(16, false).unwrap();

        // first growth had nothing to copy; second copied 16 bytes of
        // generation 1 into generation 2; third was told not to
        assert_eq!(shared.backing.migrations, [(1, 2, 16)]);
        assert_eq!(shared.buffer.as_ref().unwrap().bytes.len(), 48);
    }

    #[test]
    fn released_ranges_are_reused_before_growing() {
        let mut shared = SharedHostBuffer::new(TestBacking::default());
        let first = shared.allocate(12, true).unwrap();
        let second = shared.allocate(12, true).unwrap();
        assert_eq!((first.offset, second.offset), (0, 12));

        shared.release(second);
        let again = shared.allocate(12, true).unwrap();
        assert_eq!(again.offset, 12);
        assert_eq!(shared.size(), 24);
    }
}
