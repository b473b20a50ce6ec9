mod pool;
mod staging;

pub use pool::{JobHandle, WorkerPool};
pub use staging::UploadStage;
