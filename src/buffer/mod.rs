mod backing;
mod shared;
mod shared_gpu;
mod vma;

pub use backing::{DeviceBacking, HostBacking};
pub use shared::SharedHostBuffer;
pub use shared_gpu::{PendingCopy, SharedDeviceBuffer};
pub use vma::{DeviceLocalBacking, GpuBuffer, HostVisibleBacking, create_staging_buffer};

pub type HostSharedBuffer = SharedHostBuffer<HostVisibleBacking>;
pub type GpuSharedBuffer = SharedDeviceBuffer<DeviceLocalBacking>;

/// Non-owning handle to a sub-allocation inside a shared buffer.
///
/// The shared buffer it came from keeps exclusive ownership of the backing
/// memory; holders must `release` the slice back before dropping whatever
/// carried it, or the range stays leased until the buffer itself goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedSlice {
    pub offset: u64,
    pub size: u64,
}
