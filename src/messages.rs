use std::sync::atomic::{AtomicU8, Ordering};

use crate::model::MeshBundle;

/// Requests the app side hands to the render thread.
pub enum ModelCommand {
    Add(MeshBundle),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    StopRender,
}

pub struct EngineControl {
    phase: AtomicU8,
}

impl EngineControl {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(ShutdownPhase::Running as u8),
        }
    }

    pub fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn phase(&self) -> ShutdownPhase {
        match self.phase.load(Ordering::Acquire) {
            0 => ShutdownPhase::Running,
            _ => ShutdownPhase::StopRender,
        }
    }
}

impl Default for EngineControl {
    fn default() -> Self {
        Self::new()
    }
}
