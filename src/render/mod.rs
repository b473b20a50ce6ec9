mod frame;
mod frame_ring;
mod present;
mod stages;
mod swapchain;
mod thread;

pub use frame::Frame;
pub use frame_ring::FrameRing;
pub use thread::render_thread;
