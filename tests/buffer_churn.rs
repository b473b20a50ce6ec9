//! Drives the shared device buffer, free-list reuse and deferred reclaim
//! together the way the render loop does, over a simulated two-slot frame
//! rotation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gaia::buffer::{DeviceBacking, SharedDeviceBuffer, SharedSlice};
use gaia::reclaim::ReclaimQueue;

struct CountingBacking {
    live: Arc<AtomicUsize>,
    next_id: u32,
}

struct RawBuffer {
    id: u32,
    live: Arc<AtomicUsize>,
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DeviceBacking for CountingBacking {
    type Raw = RawBuffer;

    fn create(&mut self, _size: u64) -> anyhow::Result<RawBuffer> {
        self.next_id += 1;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(RawBuffer {
            id: self.next_id,
            live: self.live.clone(),
        })
    }
}

fn shared_buffer() -> (SharedDeviceBuffer<CountingBacking>, Arc<AtomicUsize>) {
    let live = Arc::new(AtomicUsize::new(0));
    let backing = CountingBacking {
        live: live.clone(),
        next_id: 0,
    };
    (SharedDeviceBuffer::new(backing), live)
}

fn assert_disjoint(slices: &[SharedSlice], capacity: u64) {
    let mut regions: Vec<(u64, u64)> = slices.iter().map(|s| (s.offset, s.size)).collect();
    regions.sort_unstable();
    for pair in regions.windows(2) {
        assert!(
            pair[0].0 + pair[0].1 <= pair[1].0,
            "slices {:?} and {:?} overlap",
            pair[0],
            pair[1]
        );
    }
    if let Some(&(offset, size)) = regions.last() {
        assert!(offset + size <= capacity);
    }
}

#[test]
fn generations_retire_with_their_frame_slot() {
    let (mut shared, live) = shared_buffer();
    let mut reclaim = ReclaimQueue::new(2);

    // frame 0, slot 0: first growth creates generation 1
    reclaim.begin_slot(0);
    shared.allocate(64, &mut reclaim).unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 1);
    assert!(shared.take_pending_copy().is_none());
    reclaim.set_used(0);

    // frame 1, slot 1: growth retires generation 1 into the reclaim queue
    reclaim.begin_slot(1);
    shared.allocate(64, &mut reclaim).unwrap();
    let pending = shared.take_pending_copy().unwrap();
    assert_eq!(pending.src.id, 1);
    assert_eq!(pending.dst.id, 2);
    assert_eq!(live.load(Ordering::SeqCst), 2);
    drop(pending);
    reclaim.set_used(1);

    // slot 0's fence came back; nothing of generation 1 lives there
    reclaim.clear(0);
    assert_eq!(live.load(Ordering::SeqCst), 2);

    // slot 1's fence came back; generation 1 is finally released
    reclaim.clear(1);
    assert_eq!(live.load(Ordering::SeqCst), 1);

    drop(shared);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn churn_reuses_holes_and_never_hands_out_overlapping_ranges() {
    let (mut shared, _live) = shared_buffer();
    let mut reclaim = ReclaimQueue::new(2);

    let mut slices: Vec<SharedSlice> = (0..8)
        .map(|i| shared.allocate(48 + i * 16, &mut reclaim).unwrap())
        .collect();
    assert_disjoint(&slices, shared.size());

    // free every other allocation, then request sizes that fit the holes
    let freed: Vec<SharedSlice> = [6, 4, 2, 0].iter().map(|&i| slices.remove(i)).collect();
    for slice in &freed {
        shared.release(*slice);
    }

    let size_before = shared.size();
    for slice in &freed {
        let reused = shared.allocate(slice.size, &mut reclaim).unwrap();
        assert_eq!(reused.offset, slice.offset, "exact-fit hole not reused");
        slices.push(reused);
    }
    assert_eq!(shared.size(), size_before, "reuse must not grow the buffer");
    assert_disjoint(&slices, shared.size());

    // an oversized request cannot fit any hole and must append at the end
    let big = shared.allocate(4096, &mut reclaim).unwrap();
    assert_eq!(big.offset, size_before);
    assert_eq!(shared.size(), size_before + 4096);
    slices.push(big);
    assert_disjoint(&slices, shared.size());
}
