// Backend module - Vulkan bootstrap stages
//
// Each stage is a plain bundle of handles with an explicit `destroy`; the
// orchestrator in `crate::bootstrap` owns the order.

pub mod device;
pub mod driver;
pub mod pipeline;
pub mod probe;
pub mod select;
pub mod shader;
pub mod swapchain;

#[cfg(test)]
pub(crate) mod fake;

pub use device::Session;
pub use driver::{AshDriver, Driver};
pub use pipeline::PipelineState;
pub use shader::{FsShaderSource, ShaderSource};
pub use swapchain::PresentationChain;
