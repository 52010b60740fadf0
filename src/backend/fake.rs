// Recording driver for tests
//
// Hands out unique handles, keeps a ledger of every create/destroy, and can be
// told to fail at any step. The shared state stays inspectable after the
// driver itself has been moved into a context or dropped.

use super::driver::{Driver, VkResult};
use super::shader::{ShaderSource, SPIRV_MAGIC};
use crate::error::{BootstrapError, Result};
use crate::window::{FramebufferSize, WindowProvider};
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
    WebDisplayHandle, WebWindowHandle, WindowHandle,
};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::sync::Arc;

pub type SharedState = Arc<Mutex<FakeState>>;

const PHYSICAL_DEVICE_BASE: u64 = 0x1000;
const DEVICE_HANDLE: u64 = 0xD000;
const QUEUE_BASE: u64 = 0x9000;
const IMAGE_BASE: u64 = 0xA000;

/// Kinds of objects the bootstrap creates and must destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Instance,
    Surface,
    Device,
    Swapchain,
    ImageView,
    ShaderModule,
    PipelineLayout,
    RenderPass,
    Pipeline,
}

/// Driver calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    Instance,
    Surface,
    Enumerate,
    SurfaceQuery,
    Device,
    Swapchain,
    SwapchainImages,
    ShaderModule,
    PipelineLayout,
    RenderPass,
    Pipeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeQueueFamily {
    pub graphics: bool,
    pub present: bool,
}

#[derive(Debug, Clone)]
pub struct FakeGpu {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub geometry_shader: bool,
    pub queue_families: Vec<FakeQueueFamily>,
    pub extensions: Vec<CString>,
}

impl FakeGpu {
    /// Discrete, geometry shaders, one family that does everything, swapchain
    /// extension available.
    pub fn discrete(name: &str) -> Self {
        Self {
            name: name.to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            geometry_shader: true,
            queue_families: vec![FakeQueueFamily {
                graphics: true,
                present: true,
            }],
            extensions: vec![ash::khr::swapchain::NAME.to_owned()],
        }
    }

    pub fn integrated(name: &str) -> Self {
        Self {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Self::discrete(name)
        }
    }
}

/// Parameters the last swapchain was requested with.
#[derive(Debug, Clone)]
pub struct SwapchainRequest {
    pub min_image_count: u32,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
    pub present_mode: vk::PresentModeKHR,
}

#[derive(Debug)]
pub struct FakeState {
    // Configuration
    pub supported: bool,
    pub gpus: Vec<FakeGpu>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub fail: HashSet<Failure>,
    /// Zero-based view attempt within one swapchain that fails.
    pub fail_image_view_at: Option<usize>,
    /// Images handed back regardless of the requested count.
    pub swapchain_image_count: Option<u32>,
    /// Queue families whose present-support query returns an error.
    pub fail_present_query_for: HashSet<u32>,

    // Recorded requests
    pub instance_extensions: Vec<CString>,
    pub present_queries: Vec<u32>,
    pub device_queue_families: Vec<u32>,
    pub device_extensions: Vec<CString>,
    pub queue_requests: Vec<(vk::Device, u32)>,
    pub swapchain_request: Option<SwapchainRequest>,
    pub layout_request: Option<(u32, u32)>,
    pub pipeline_dynamic_states: Vec<vk::DynamicState>,
    pub pipeline_stage_count: u32,

    // Ledger
    pub next_handle: u64,
    pub image_view_attempts: usize,
    pub created_log: Vec<(Kind, u64)>,
    pub destroyed_log: Vec<(Kind, u64)>,
    pub live: Vec<(Kind, u64)>,
    pub unknown_destroys: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            supported: true,
            gpus: vec![FakeGpu::discrete("Fake Discrete GPU")],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D { width: 1280, height: 720 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            fail: HashSet::new(),
            fail_image_view_at: None,
            swapchain_image_count: None,
            fail_present_query_for: HashSet::new(),
            instance_extensions: Vec::new(),
            present_queries: Vec::new(),
            device_queue_families: Vec::new(),
            device_extensions: Vec::new(),
            queue_requests: Vec::new(),
            swapchain_request: None,
            layout_request: None,
            pipeline_dynamic_states: Vec::new(),
            pipeline_stage_count: 0,
            next_handle: 0x10_0000,
            image_view_attempts: 0,
            created_log: Vec::new(),
            destroyed_log: Vec::new(),
            live: Vec::new(),
            unknown_destroys: 0,
        }
    }
}

impl FakeState {
    pub fn with_gpus(gpus: Vec<FakeGpu>) -> Self {
        Self {
            gpus,
            ..Self::default()
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_of(&self, kind: Kind) -> usize {
        self.live.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn created(&self) -> Vec<(Kind, u64)> {
        self.created_log.clone()
    }

    pub fn destroyed(&self) -> Vec<(Kind, u64)> {
        self.destroyed_log.clone()
    }

    pub fn created_kinds(&self) -> Vec<Kind> {
        self.created_log.iter().map(|&(kind, _)| kind).collect()
    }

    pub fn destroyed_kinds(&self) -> Vec<Kind> {
        self.destroyed_log.iter().map(|&(kind, _)| kind).collect()
    }

    fn gpu(&self, physical_device: vk::PhysicalDevice) -> Option<&FakeGpu> {
        let index = physical_device.as_raw().checked_sub(PHYSICAL_DEVICE_BASE)?;
        self.gpus.get(index as usize)
    }

    fn check(&self, failure: Failure, result: vk::Result) -> VkResult<()> {
        if self.fail.contains(&failure) {
            Err(result)
        } else {
            Ok(())
        }
    }

    fn create<T: Handle>(&mut self, kind: Kind) -> T {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.track(kind, raw);
        T::from_raw(raw)
    }

    fn track(&mut self, kind: Kind, raw: u64) {
        self.created_log.push((kind, raw));
        self.live.push((kind, raw));
    }

    fn release<T: Handle>(&mut self, kind: Kind, handle: T) {
        let entry = (kind, handle.as_raw());
        match self.live.iter().position(|&live| live == entry) {
            Some(index) => {
                self.live.remove(index);
                self.destroyed_log.push(entry);
            }
            None => self.unknown_destroys += 1,
        }
    }
}

/// Read a Vulkan `(pointer, count)` pair back into a slice.
unsafe fn raw_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, count as usize)
    }
}

unsafe fn raw_names(ptr: *const *const c_char, count: u32) -> Vec<CString> {
    raw_slice(ptr, count)
        .iter()
        .map(|&name| CStr::from_ptr(name).to_owned())
        .collect()
}

pub struct FakeDriver {
    state: SharedState,
}

impl FakeDriver {
    pub fn new(state: FakeState) -> (Self, SharedState) {
        Self::attach(Arc::new(Mutex::new(state)))
    }

    /// A second driver over existing state, for destroying objects created
    /// by a driver that is gone.
    pub fn attach(state: SharedState) -> (Self, SharedState) {
        (Self { state: state.clone() }, state)
    }

    pub fn physical_device(index: usize) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(PHYSICAL_DEVICE_BASE + index as u64)
    }

    pub fn device_handle() -> vk::Device {
        vk::Device::from_raw(DEVICE_HANDLE)
    }
}

impl Driver for FakeDriver {
    fn is_supported(&self) -> bool {
        self.state.lock().supported
    }

    fn required_instance_extensions(&self, _display: RawDisplayHandle) -> VkResult<Vec<CString>> {
        Ok(vec![ash::khr::surface::NAME.to_owned()])
    }

    fn create_instance(&mut self, info: &vk::InstanceCreateInfo<'_>) -> VkResult<vk::Instance> {
        let mut state = self.state.lock();
        state.check(Failure::Instance, vk::Result::ERROR_INCOMPATIBLE_DRIVER)?;
        state.instance_extensions =
            unsafe { raw_names(info.pp_enabled_extension_names, info.enabled_extension_count) };
        Ok(state.create(Kind::Instance))
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        self.state.lock().release(Kind::Instance, instance);
    }

    fn create_surface(
        &mut self,
        _instance: vk::Instance,
        _display: RawDisplayHandle,
        _window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        let mut state = self.state.lock();
        state.check(Failure::Surface, vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR)?;
        Ok(state.create(Kind::Surface))
    }

    fn destroy_surface(&mut self, _instance: vk::Instance, surface: vk::SurfaceKHR) {
        self.state.lock().release(Kind::Surface, surface);
    }

    fn enumerate_physical_devices(&self, _instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>> {
        let state = self.state.lock();
        state.check(Failure::Enumerate, vk::Result::ERROR_INITIALIZATION_FAILED)?;
        Ok((0..state.gpus.len()).map(Self::physical_device).collect())
    }

    fn physical_device_properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        let state = self.state.lock();
        let mut properties = vk::PhysicalDeviceProperties::default();
        if let Some(gpu) = state.gpu(physical_device) {
            properties.vendor_id = 0x10de;
            properties.device_type = gpu.device_type;
            let capacity = properties.device_name.len() - 1;
            for (dst, &src) in properties
                .device_name
                .iter_mut()
                .zip(gpu.name.as_bytes().iter().take(capacity))
            {
                *dst = src as c_char;
            }
        }
        properties
    }

    fn physical_device_features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        let state = self.state.lock();
        vk::PhysicalDeviceFeatures {
            geometry_shader: state
                .gpu(physical_device)
                .map_or(vk::FALSE, |gpu| gpu.geometry_shader as vk::Bool32),
            ..Default::default()
        }
    }

    fn queue_family_properties(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        let state = self.state.lock();
        let Some(gpu) = state.gpu(physical_device) else {
            return Vec::new();
        };
        gpu.queue_families
            .iter()
            .map(|family| vk::QueueFamilyProperties {
                queue_flags: if family.graphics {
                    vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER
                } else {
                    vk::QueueFlags::TRANSFER
                },
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    fn device_extension_names(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let state = self.state.lock();
        state
            .gpu(physical_device)
            .map(|gpu| gpu.extensions.clone())
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.present_queries.push(queue_family_index);
        if state.fail_present_query_for.contains(&queue_family_index) {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        Ok(state
            .gpu(physical_device)
            .and_then(|gpu| gpu.queue_families.get(queue_family_index as usize))
            .is_some_and(|family| family.present))
    }

    fn surface_capabilities(
        &self,
        _physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let state = self.state.lock();
        state.check(Failure::SurfaceQuery, vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok(state.capabilities)
    }

    fn surface_formats(
        &self,
        _physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        let state = self.state.lock();
        state.check(Failure::SurfaceQuery, vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok(state.formats.clone())
    }

    fn surface_present_modes(
        &self,
        _physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        let state = self.state.lock();
        state.check(Failure::SurfaceQuery, vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok(state.present_modes.clone())
    }

    fn create_device(
        &mut self,
        _physical_device: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<vk::Device> {
        let mut state = self.state.lock();
        state.check(Failure::Device, vk::Result::ERROR_FEATURE_NOT_PRESENT)?;

        let queue_infos = unsafe { raw_slice(info.p_queue_create_infos, info.queue_create_info_count) };
        state.device_queue_families = queue_infos.iter().map(|q| q.queue_family_index).collect();
        state.device_extensions =
            unsafe { raw_names(info.pp_enabled_extension_names, info.enabled_extension_count) };

        state.track(Kind::Device, DEVICE_HANDLE);
        Ok(Self::device_handle())
    }

    fn device_queue(&self, device: vk::Device, queue_family_index: u32, _queue_index: u32) -> vk::Queue {
        self.state.lock().queue_requests.push((device, queue_family_index));
        vk::Queue::from_raw(QUEUE_BASE + queue_family_index as u64)
    }

    fn destroy_device(&mut self, device: vk::Device) {
        self.state.lock().release(Kind::Device, device);
    }

    fn create_swapchain(
        &mut self,
        _device: vk::Device,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        state.check(Failure::Swapchain, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;

        let queue_family_indices =
            unsafe { raw_slice(info.p_queue_family_indices, info.queue_family_index_count) }.to_vec();
        state.swapchain_request = Some(SwapchainRequest {
            min_image_count: info.min_image_count,
            format: info.image_format,
            extent: info.image_extent,
            sharing_mode: info.image_sharing_mode,
            queue_family_indices,
            present_mode: info.present_mode,
        });
        state.image_view_attempts = 0;
        Ok(state.create(Kind::Swapchain))
    }

    fn swapchain_images(&self, _device: vk::Device, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let state = self.state.lock();
        state.check(Failure::SwapchainImages, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;

        let requested = state
            .swapchain_request
            .as_ref()
            .map_or(0, |request| request.min_image_count);
        let count = state.swapchain_image_count.unwrap_or(requested);
        Ok((0..count as u64).map(|i| vk::Image::from_raw(IMAGE_BASE + i)).collect())
    }

    fn destroy_swapchain(&mut self, _device: vk::Device, swapchain: vk::SwapchainKHR) {
        self.state.lock().release(Kind::Swapchain, swapchain);
    }

    fn create_image_view(
        &mut self,
        _device: vk::Device,
        _info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        let mut state = self.state.lock();
        let attempt = state.image_view_attempts;
        state.image_view_attempts += 1;
        if state.fail_image_view_at == Some(attempt) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        Ok(state.create(Kind::ImageView))
    }

    fn destroy_image_view(&mut self, _device: vk::Device, view: vk::ImageView) {
        self.state.lock().release(Kind::ImageView, view);
    }

    fn create_shader_module(
        &mut self,
        _device: vk::Device,
        _info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        let mut state = self.state.lock();
        state.check(Failure::ShaderModule, vk::Result::ERROR_INVALID_SHADER_NV)?;
        Ok(state.create(Kind::ShaderModule))
    }

    fn destroy_shader_module(&mut self, _device: vk::Device, module: vk::ShaderModule) {
        self.state.lock().release(Kind::ShaderModule, module);
    }

    fn create_pipeline_layout(
        &mut self,
        _device: vk::Device,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        let mut state = self.state.lock();
        state.check(Failure::PipelineLayout, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        state.layout_request = Some((info.set_layout_count, info.push_constant_range_count));
        Ok(state.create(Kind::PipelineLayout))
    }

    fn destroy_pipeline_layout(&mut self, _device: vk::Device, layout: vk::PipelineLayout) {
        self.state.lock().release(Kind::PipelineLayout, layout);
    }

    fn create_render_pass(
        &mut self,
        _device: vk::Device,
        _info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        let mut state = self.state.lock();
        state.check(Failure::RenderPass, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        Ok(state.create(Kind::RenderPass))
    }

    fn destroy_render_pass(&mut self, _device: vk::Device, render_pass: vk::RenderPass) {
        self.state.lock().release(Kind::RenderPass, render_pass);
    }

    fn create_graphics_pipeline(
        &mut self,
        _device: vk::Device,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let mut state = self.state.lock();
        state.check(Failure::Pipeline, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;

        state.pipeline_stage_count = info.stage_count;
        state.pipeline_dynamic_states = match unsafe { info.p_dynamic_state.as_ref() } {
            Some(dynamic) => {
                unsafe { raw_slice(dynamic.p_dynamic_states, dynamic.dynamic_state_count) }.to_vec()
            }
            None => Vec::new(),
        };
        Ok(state.create(Kind::Pipeline))
    }

    fn destroy_pipeline(&mut self, _device: vk::Device, pipeline: vk::Pipeline) {
        self.state.lock().release(Kind::Pipeline, pipeline);
    }
}

/// Smallest byte string that passes SPIR-V validation: magic, version,
/// generator, bound, schema.
pub fn spirv_stub() -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}

pub fn raw_handles() -> (RawDisplayHandle, RawWindowHandle) {
    (
        RawDisplayHandle::Web(WebDisplayHandle::new()),
        RawWindowHandle::Web(WebWindowHandle::new(1)),
    )
}

/// Window stand-in with web handles, which no real surface is made from.
pub struct FakeWindow {
    size: FramebufferSize,
}

impl FakeWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: FramebufferSize { width, height },
        }
    }
}

impl HasWindowHandle for FakeWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        Ok(unsafe { WindowHandle::borrow_raw(raw_handles().1) })
    }
}

impl HasDisplayHandle for FakeWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        Ok(unsafe { DisplayHandle::borrow_raw(raw_handles().0) })
    }
}

impl WindowProvider for FakeWindow {
    fn framebuffer_size(&self) -> FramebufferSize {
        self.size
    }

    fn close_requested(&self) -> bool {
        false
    }
}

/// In-memory shader source: every path yields the same bytecode, or nothing.
pub struct FakeShaders {
    bytecode: Option<Vec<u8>>,
}

impl FakeShaders {
    pub fn valid() -> Self {
        Self {
            bytecode: Some(spirv_stub()),
        }
    }

    pub fn missing() -> Self {
        Self { bytecode: None }
    }
}

impl ShaderSource for FakeShaders {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.bytecode.clone().ok_or_else(|| BootstrapError::FileRead {
            path: path.to_path_buf(),
            source: std::io::ErrorKind::NotFound.into(),
        })
    }
}
