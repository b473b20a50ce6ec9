/// One unallocated byte range inside a buffer's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    pub offset: u64,
    pub size: u64,
}

/// Tracks fragmented free space inside one linear buffer.
///
/// Ranges are kept sorted by size ascending so a lower-bound binary search
/// finds the smallest range that still fits a request. Adjacent free ranges
/// are never merged; returned space goes back in as-is.
#[derive(Debug, Default)]
pub struct FreeListAllocator {
    ranges: Vec<FreeRange>,
}

impl FreeListAllocator {
    /// Index of the smallest free range with `size >= requested`, if any.
    /// `None` is not an error here; whether to grow is the owner's call.
    pub fn find(&self, requested: u64) -> Option<usize> {
        let index = self.ranges.partition_point(|r| r.size < requested);
        (index < self.ranges.len()).then_some(index)
    }

    pub fn take(&mut self, index: usize) -> FreeRange {
        self.ranges.remove(index)
    }

    /// Consumes `requested` bytes from the front of `range`, reinserting any
    /// leftover as a new free range. Returns the allocation offset.
    pub fn allocate(&mut self, range: FreeRange, requested: u64) -> u64 {
        debug_assert!(range.size >= requested);
        if range.size > requested {
            self.insert(range.offset + requested, range.size - requested);
        }
        range.offset
    }

    /// Inserts a free range, preserving size order. Equal sizes keep
    /// insertion order so earlier-released ranges are reused first.
    pub fn insert(&mut self, offset: u64, size: u64) {
        let at = self.ranges.partition_point(|r| r.size <= size);
        self.ranges.insert(at, FreeRange { offset, size });
    }

    /// Returns previously allocated space to the free list.
    pub fn release(&mut self, offset: u64, size: u64) {
        self.insert(offset, size);
    }

    /// Sum of all free bytes.
    pub fn free_total(&self) -> u64 {
        self.ranges.iter().map(|r| r.size).sum()
    }

    #[cfg(test)]
    fn ranges(&self) -> &[FreeRange] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(entries: &[(u64, u64)]) -> FreeListAllocator {
        let mut list = FreeListAllocator::default();
        for &(offset, size) in entries {
            list.insert(offset, size);
        }
        list
    }

    #[test]
    fn find_selects_smallest_sufficient_range() {
        let list = list_of(&[(0, 12), (100, 36), (500, 1000)]);

        let index = list.find(20).unwrap();
        assert_eq!(list.ranges()[index], FreeRange { offset: 100, size: 36 });
    }

    #[test]
    fn find_reports_no_match_when_everything_is_too_small() {
        let list = list_of(&[(0, 12), (100, 36)]);
        assert!(list.find(37).is_none());
        assert!(list_of(&[]).find(1).is_none());
    }

    #[test]
    fn allocate_splits_leftover_at_the_tail() {
        let mut list = list_of(&[(100, 36)]);
        let index = list.find(20).unwrap();
        let range = list.take(index);

        let offset = list.allocate(range, 20);

        assert_eq!(offset, 100);
        assert_eq!(list.ranges(), &[FreeRange { offset: 120, size: 16 }]);
    }

    #[test]
    fn allocate_exact_fit_leaves_nothing_behind() {
        let mut list = list_of(&[(64, 32)]);
        let range = list.take(list.find(32).unwrap());

        assert_eq!(list.allocate(range, 32), 64);
        assert!(list.ranges().is_empty());
    }

    #[test]
    fn insert_keeps_size_order_and_ties_in_insertion_order() {
        let mut list = FreeListAllocator::default();
        list.insert(300, 16);
        list.insert(0, 8);
        list.insert(100, 16);
        list.insert(200, 64);

        let sizes: Vec<u64> = list.ranges().iter().map(|r| r.size).collect();
        assert_eq!(sizes, [8, 16, 16, 64]);
        // the 16-byte range released first stays ahead of the later one
        assert_eq!(list.ranges()[1].offset, 300);
        assert_eq!(list.ranges()[2].offset, 100);
    }

    #[test]
    fn release_then_reacquire_returns_the_same_offset() {
        let mut list = FreeListAllocator::default();
        list.release(12, 12);

        let range = list.take(list.find(12).unwrap());
        assert_eq!(list.allocate(range, 12), 12);
    }

    #[test]
    fn free_ranges_never_overlap_and_bytes_are_conserved() {
        // random-ish alloc/release churn over a fixed 1 KiB space
        let capacity = 1024u64;
        let mut list = list_of(&[(0, capacity)]);
        let mut live: Vec<(u64, u64)> = Vec::new();

        let requests = [100u64, 7, 250, 33, 64, 128, 1, 90];
        for (step, &size) in requests.iter().enumerate() {
            let range = list.take(list.find(size).unwrap());
            let offset = list.allocate(range, size);
            live.push((offset, size));

            // release every other allocation to churn the list
            if step % 2 == 1 {
                let (offset, size) = live.remove(0);
                list.release(offset, size);
            }

            let allocated: u64 = live.iter().map(|&(_, s)| s).sum();
            assert_eq!(allocated + list.free_total(), capacity);

            let mut regions: Vec<(u64, u64)> = live
                .iter()
                .copied()
                .chain(list.ranges().iter().map(|r| (r.offset, r.size)))
                .collect();
            regions.sort_unstable();
            for pair in regions.windows(2) {
                assert!(
                    pair[0].0 + pair[0].1 <= pair[1].0,
                    "regions {:?} and {:?} overlap",
                    pair[0],
                    pair[1]
                );
            }
        }
    }
}
