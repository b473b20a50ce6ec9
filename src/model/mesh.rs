use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// One meshlet's window into the shared vertex/triangle data, consumed by
/// the mesh-shading submission path.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Meshlet {
    pub vertex_offset: u32,
    pub triangle_offset: u32,
    pub vertex_count: u32,
    pub triangle_count: u32,
}

/// Per-model draw arguments, laid out for indexed indirect draws. The CPU
/// seeds them; the culling pass rewrites `instance_count` on the GPU path.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct IndirectArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// CPU-recorded draw per model.
    Direct,
    /// GPU-indirect draw with compute-side frustum culling.
    Indirect,
    /// Meshlet pipeline.
    MeshShading,
}

/// Decomposed model data as produced by the asset pipeline.
pub struct MeshBundle {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub meshlets: Vec<Meshlet>,
    pub mode: SubmissionMode,
}
