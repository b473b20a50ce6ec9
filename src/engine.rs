use std::sync::{Arc, mpsc};
use std::thread;

use anyhow::Context;
use crossbeam_channel::{Sender, unbounded};
use winit::window::Window;

use crate::messages::{EngineControl, ModelCommand, ShutdownPhase};
use crate::model::MeshBundle;
use crate::render::render_thread;
use crate::vulkan::VulkanContext;

pub struct Engine {
    _vk: VulkanContext,
    control: Arc<EngineControl>,
    model_tx: Sender<ModelCommand>,
    render: Option<thread::JoinHandle<()>>,
}

impl Engine {
    pub fn new(window: &Window) -> anyhow::Result<Self> {
        let vk_context = VulkanContext::new(window).context("failed to create Vulkan context")?;

        let (model_tx, model_rx) = unbounded();
        let control = Arc::new(EngineControl::new());

        let render_caps = vk_context.render_caps();
        let swapchain_caps = vk_context.swapchain_caps();

        let (error_tx, error_rx) = mpsc::channel::<(String, anyhow::Error)>();

        let render_handle = {
            let control = control.clone();
            let error_tx = error_tx.clone();
            thread::Builder::new()
                .name("render".to_string())
                .spawn(move || {
                    if let Err(e) = render_thread(render_caps, control, swapchain_caps, model_rx) {
                        let _ = error_tx.send(("render".to_string(), e));
                    }
                })?
        };

        let _watchdog = {
            thread::Builder::new()
                .name("thread_watchdog".to_string())
                .spawn(move || {
                    for (name, e) in error_rx {
                        log::error!("Thread {} failed: {:?}", name, e);
                    }
                })?
        };

        Ok(Self {
            _vk: vk_context,
            control,
            model_tx,
            render: Some(render_handle),
        })
    }

    /// Hands a decomposed model to the render thread; its data is packed
    /// into the shared geometry buffers on the next frame.
    pub fn submit_model(&self, bundle: MeshBundle) {
        if self.model_tx.send(ModelCommand::Add(bundle)).is_err() {
            log::warn!("render thread gone; dropping model submission");
        }
    }

    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        self.control.set_phase(ShutdownPhase::StopRender);
        if let Some(handle) = self.render.take() {
            handle.join().ok();
        }
        Ok(())
    }
}
