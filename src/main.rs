// =============================================================================
// RENDER BOOTSTRAP - open a window, bring Vulkan up, idle until closed
// =============================================================================
//
// FLOW:
// 1. Load config.toml and initialise logging
// 2. Create the window once the event loop resumes
// 3. Bootstrap instance -> device -> swapchain -> pipeline
// 4. Idle until the window is closed, then tear everything down in reverse
//
// =============================================================================

use anyhow::Result;
use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle};
use render_bootstrap::backend::{AshDriver, FsShaderSource};
use render_bootstrap::{Config, FramebufferSize, RenderContext, WindowProvider};
use std::fs::OpenOptions;
use std::io::Write;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting {}", config.window.title);
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(error) = app.error.take() {
        return Err(error.into());
    }
    Ok(())
}

/// Initialize logging, `RUST_LOG` overrides the configured level
fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            let _ = writeln!(file, "=== {} Log ===", config.window.title);
            let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
            let _ = writeln!(file);
        }
    }
}

// =============================================================================
// WINDOW
// =============================================================================

/// winit window plus the close flag the bootstrap polls.
struct AppWindow {
    window: Window,
    close_requested: bool,
}

impl HasWindowHandle for AppWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for AppWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl WindowProvider for AppWindow {
    fn framebuffer_size(&self) -> FramebufferSize {
        let size = self.window.inner_size();
        FramebufferSize {
            width: size.width,
            height: size.height,
        }
    }

    fn close_requested(&self) -> bool {
        self.close_requested
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: the context must go before the window it presents to.
struct App {
    config: Config,
    context: Option<RenderContext<AshDriver>>,
    window: Option<AppWindow>,
    error: Option<render_bootstrap::BootstrapError>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            context: None,
            window: None,
            error: None,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        // Drop runs the reverse-order teardown
        self.context = None;
        self.window = None;
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(false)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => AppWindow {
                window,
                close_requested: false,
            },
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        let options = self.config.bootstrap_options();
        match RenderContext::new(AshDriver::load(), &window, &FsShaderSource, &options) {
            Ok(context) => {
                log::info!("Running on {}", context.session().device_name);
                self.context = Some(context);
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {}", e);
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(window) = self.window.as_mut() {
                    window.close_requested = true;
                }
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
            }
            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.as_ref().is_some_and(|w| w.close_requested()) {
            self.shutdown(event_loop);
        }
    }
}
