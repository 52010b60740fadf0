// Vulkan bootstrap: from a window to a ready-to-record rendering context.
//
// Creation order:
// 1. Capability gate (loader + VK_KHR_surface)
// 2. Instance, GPU, surface, logical device + queues
// 3. Swapchain + image views
// 4. Shader modules, pipeline layout, optional render pass + pipeline
//
// Teardown runs the same list backwards.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod window;

pub use bootstrap::{BootstrapOptions, RenderContext};
pub use config::Config;
pub use error::{BootstrapError, Result};
pub use window::{FramebufferSize, WindowProvider};
