/// Creates the raw buffers a host-visible shared buffer grows through.
///
/// Injected so the growth protocol stays independent of the device layer;
/// production code plugs in the VMA-backed implementation.
pub trait HostBacking {
    type Raw;

    fn create(&mut self, size: u64) -> anyhow::Result<Self::Raw>;

    /// Copies the first `len` bytes of `src` into `dst`. Both buffers are
    /// CPU-mapped for the lifetime of the raw handle.
    fn migrate(&mut self, src: &Self::Raw, dst: &Self::Raw, len: u64);
}

/// Creates raw buffers for a device-local shared buffer. Contents migration
/// is not part of this seam: device-local generations are copied on the GPU
/// by the per-frame copy stage.
pub trait DeviceBacking {
    type Raw;

    fn create(&mut self, size: u64) -> anyhow::Result<Self::Raw>;
}
