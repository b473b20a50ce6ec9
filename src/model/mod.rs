mod manager;
mod mesh;

pub use manager::{ArenaTarget, GeometryArena, ModelEntry, ModelKey, ModelManager};
pub use mesh::{IndirectArgs, MeshBundle, Meshlet, SubmissionMode, Vertex};
