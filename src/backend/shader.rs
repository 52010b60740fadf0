// Shader module loading and management
//
// Vulkan uses SPIR-V bytecode for shaders. This module reads compiled
// shaders from disk and wraps them into shader modules. Compiling GLSL is
// build.rs's job, not ours.

use super::driver::Driver;
use crate::error::{BootstrapError, Result};
use ash::vk;
use std::path::Path;
use thiserror::Error;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Error)]
pub enum ShaderModuleError {
    #[error("SPIR-V bytecode is empty")]
    Empty,

    #[error("SPIR-V byte length ({0}) is not a multiple of 4")]
    InvalidLength(usize),

    #[error("not SPIR-V (magic number 0x{0:08x})")]
    InvalidMagic(u32),

    #[error("Vulkan error creating shader module: {0}")]
    Vulkan(#[source] vk::Result),
}

/// Supplies raw compiled shader bytecode by path.
pub trait ShaderSource {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Reads shader bytecode from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsShaderSource;

impl ShaderSource for FsShaderSource {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let bytes = std::fs::read(path).map_err(|source| BootstrapError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Read {} bytes of shader bytecode from {:?}", bytes.len(), path);
        Ok(bytes)
    }
}

/// Reinterpret little-endian SPIR-V bytes as words, rejecting anything that
/// cannot be a module before the driver ever sees it.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, ShaderModuleError> {
    if bytes.is_empty() {
        return Err(ShaderModuleError::Empty);
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderModuleError::InvalidLength(bytes.len()));
    }

    // Copy rather than cast: the byte buffer has no alignment guarantee
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(ShaderModuleError::InvalidMagic(other)),
        None => Err(ShaderModuleError::Empty),
    }
}

/// Load SPIR-V shader from bytes and create a shader module
pub fn compile_shader_module<D: Driver>(
    driver: &mut D,
    device: vk::Device,
    bytecode: &[u8],
) -> Result<vk::ShaderModule> {
    let code = spirv_words(bytecode)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    let module = driver
        .create_shader_module(device, &create_info)
        .map_err(ShaderModuleError::Vulkan)?;
    Ok(module)
}
