// Bootstrap errors
//
// Every failure of the bootstrap sequence is fatal and surfaces as exactly one
// of these variants. Nothing is retried internally.

use crate::backend::shader::ShaderModuleError;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Vulkan is not supported on this host (loader or VK_KHR_surface missing)")]
    UnsupportedPlatform,

    #[error("Failed to create Vulkan instance: {0}")]
    InstanceCreation(#[source] vk::Result),

    #[error("Failed to get a raw handle from the window: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("Failed to create window surface: {0}")]
    SurfaceCreation(#[source] vk::Result),

    #[error("Failed to enumerate physical devices: {0}")]
    DeviceEnumeration(#[source] vk::Result),

    #[error("No discrete GPU with geometry shader support found")]
    NoSuitableDevice,

    #[error("Device {device} has no queue family for {missing}")]
    IncompleteQueueFamily {
        device: String,
        missing: &'static str,
    },

    #[error("Failed to query surface support: {0}")]
    SurfaceQuery(#[source] vk::Result),

    #[error("Device is missing required extensions: {0:?}")]
    MissingDeviceExtension(Vec<String>),

    #[error("Surface reports {formats} formats and {present_modes} present modes, swapchain cannot be created")]
    InadequateSwapChainSupport {
        formats: usize,
        present_modes: usize,
    },

    #[error("Failed to create logical device: {0}")]
    DeviceCreation(#[source] vk::Result),

    #[error("Failed to create swapchain: {0}")]
    SwapChainCreation(#[source] vk::Result),

    #[error("Failed to create view for swapchain image {index}: {result}")]
    ImageViewCreation {
        index: usize,
        #[source]
        result: vk::Result,
    },

    #[error("Failed to create shader module: {0}")]
    ShaderModuleCreation(#[from] ShaderModuleError),

    #[error("Failed to create pipeline layout: {0}")]
    PipelineLayoutCreation(#[source] vk::Result),

    #[error("Failed to create render pass: {0}")]
    RenderPassCreation(#[source] vk::Result),

    #[error("Failed to create graphics pipeline: {0}")]
    PipelineCreation(#[source] vk::Result),

    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
