// Bootstrap orchestration
//
// Creation order: capability gate -> session (instance, physical device,
// surface, logical device + queues) -> presentation chain -> pipeline state.
// Teardown is the exact reverse and lives in one place, `Drop`.

use crate::backend::device::Session;
use crate::backend::driver::Driver;
use crate::backend::pipeline::{assemble_pipeline_state, PipelineOptions, PipelineState};
use crate::backend::shader::ShaderSource;
use crate::backend::swapchain::{PresentationChain, PresentationParameters};
use crate::error::{BootstrapError, Result};
use crate::window::WindowProvider;
use std::ffi::CString;
use std::path::PathBuf;

/// Inputs to the bootstrap that are not collaborators.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub app_name: String,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub entry_point: String,
    pub create_pipeline_object: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            app_name: "vulkanproj".to_string(),
            vertex_shader: PathBuf::from("shaders/shader.vert.spv"),
            fragment_shader: PathBuf::from("shaders/shader.frag.spv"),
            entry_point: "main".to_string(),
            create_pipeline_object: true,
        }
    }
}

/// A fully bootstrapped rendering context, ready to record draw commands.
///
/// Owns every object created during bootstrap. Either all of them exist or
/// construction failed and none do.
pub struct RenderContext<D: Driver> {
    // Destroyed by Drop in reverse of this order
    session: Session,
    chain: PresentationChain,
    pipeline: PipelineState,
    driver: D,
}

impl<D: Driver> RenderContext<D> {
    pub fn new<W>(
        mut driver: D,
        window: &W,
        shaders: &dyn ShaderSource,
        options: &BootstrapOptions,
    ) -> Result<Self>
    where
        W: WindowProvider + ?Sized,
    {
        log::info!("Initializing Vulkan...");

        if !driver.is_supported() {
            return Err(BootstrapError::UnsupportedPlatform);
        }

        let display = window.display_handle()?.as_raw();
        let raw_window = window.window_handle()?.as_raw();

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance, GPU, surface, logical device
        // ─────────────────────────────────────────────────────────────────────
        let (session, support) = Session::create(&mut driver, &options.app_name, display, raw_window)?;
        let device = session.device.handle;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Swapchain + image views
        // ─────────────────────────────────────────────────────────────────────
        let chain = PresentationParameters::choose(&support, window.framebuffer_size()).and_then(
            |params| {
                PresentationChain::create(
                    &mut driver,
                    device,
                    session.surface,
                    &support,
                    &params,
                    &session.queue_families,
                )
            },
        );
        let chain = match chain {
            Ok(chain) => chain,
            Err(e) => {
                session.destroy(&mut driver);
                return Err(e);
            }
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Shaders, layout, pipeline
        // ─────────────────────────────────────────────────────────────────────
        let pipeline = Self::create_pipeline(&mut driver, device, shaders, options, &chain);
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                chain.destroy(&mut driver, device);
                session.destroy(&mut driver);
                return Err(e);
            }
        };

        log::info!("Vulkan initialized successfully!");
        Ok(Self {
            session,
            chain,
            pipeline,
            driver,
        })
    }

    fn create_pipeline(
        driver: &mut D,
        device: ash::vk::Device,
        shaders: &dyn ShaderSource,
        options: &BootstrapOptions,
        chain: &PresentationChain,
    ) -> Result<PipelineState> {
        let vertex = shaders.read(&options.vertex_shader)?;
        let fragment = shaders.read(&options.fragment_shader)?;
        let entry_point = CString::new(options.entry_point.replace('\0', "")).unwrap_or_default();

        assemble_pipeline_state(
            driver,
            device,
            &vertex,
            &fragment,
            chain.format,
            &PipelineOptions {
                entry_point: &entry_point,
                create_pipeline_object: options.create_pipeline_object,
            },
        )
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn chain(&self) -> &PresentationChain {
        &self.chain
    }

    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: Driver> Drop for RenderContext<D> {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        let device = self.session.device.handle;

        // Destroy in reverse order of creation!
        self.pipeline.destroy(&mut self.driver, device);
        self.chain.destroy(&mut self.driver, device);
        self.session.destroy(&mut self.driver);

        log::info!("Cleanup complete");
    }
}
