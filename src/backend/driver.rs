// Driver - the single seam between bootstrap policy and the Vulkan loader
//
// Everything above this file decides *what* to create; everything in here
// only forwards to the driver. Keeping the seam narrow lets the selection and
// teardown logic run against a recording fake in tests.

use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CString;

pub type VkResult<T> = Result<T, vk::Result>;

/// Raw graphics API operations used during bootstrap.
///
/// Creation and destruction take `&mut self`, queries take `&self`. Handles
/// passed back in must have been produced by the same driver.
pub trait Driver {
    /// Capability gate: can this host run Vulkan with window surfaces at all?
    fn is_supported(&self) -> bool;

    /// Instance extensions the windowing system needs for presentation.
    fn required_instance_extensions(&self, display: RawDisplayHandle) -> VkResult<Vec<CString>>;

    fn create_instance(&mut self, info: &vk::InstanceCreateInfo<'_>) -> VkResult<vk::Instance>;
    fn destroy_instance(&mut self, instance: vk::Instance);

    fn create_surface(
        &mut self,
        instance: vk::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR>;
    fn destroy_surface(&mut self, instance: vk::Instance, surface: vk::SurfaceKHR);

    fn enumerate_physical_devices(&self, instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>>;
    fn physical_device_properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;
    fn physical_device_features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;
    fn queue_family_properties(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn device_extension_names(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<CString>>;

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;
    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<vk::Device>;
    fn device_queue(&self, device: vk::Device, queue_family_index: u32, queue_index: u32) -> vk::Queue;
    fn destroy_device(&mut self, device: vk::Device);

    fn create_swapchain(
        &mut self,
        device: vk::Device,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, device: vk::Device, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&mut self, device: vk::Device, swapchain: vk::SwapchainKHR);

    fn create_image_view(
        &mut self,
        device: vk::Device,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&mut self, device: vk::Device, view: vk::ImageView);

    fn create_shader_module(
        &mut self,
        device: vk::Device,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule>;
    fn destroy_shader_module(&mut self, device: vk::Device, module: vk::ShaderModule);

    fn create_pipeline_layout(
        &mut self,
        device: vk::Device,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&mut self, device: vk::Device, layout: vk::PipelineLayout);

    fn create_render_pass(
        &mut self,
        device: vk::Device,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&mut self, device: vk::Device, render_pass: vk::RenderPass);

    fn create_graphics_pipeline(
        &mut self,
        device: vk::Device,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline>;
    fn destroy_pipeline(&mut self, device: vk::Device, pipeline: vk::Pipeline);
}

/// Production driver backed by the system Vulkan loader.
///
/// Function tables are cached as their owning objects are created and
/// released again when those objects are destroyed, so only one instance and
/// one device are live per driver.
pub struct AshDriver {
    // Order matters for drop: loaders before the entry they came from
    swapchain_loader: Option<ash::khr::swapchain::Device>,
    device: Option<ash::Device>,
    surface_loader: Option<ash::khr::surface::Instance>,
    instance: Option<ash::Instance>,
    entry: Option<Entry>,
}

impl AshDriver {
    /// Load the Vulkan library. Never fails: a missing loader shows up later
    /// through [`Driver::is_supported`].
    pub fn load() -> Self {
        let entry = match unsafe { Entry::load() } {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Failed to load Vulkan library: {}", e);
                None
            }
        };

        Self {
            swapchain_loader: None,
            device: None,
            surface_loader: None,
            instance: None,
            entry,
        }
    }

    fn entry(&self) -> VkResult<&Entry> {
        self.entry.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn instance(&self) -> VkResult<&ash::Instance> {
        self.instance.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn surface_loader(&self) -> VkResult<&ash::khr::surface::Instance> {
        self.surface_loader.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn device(&self, handle: vk::Device) -> VkResult<&ash::Device> {
        match &self.device {
            Some(device) if device.handle() == handle => Ok(device),
            _ => Err(vk::Result::ERROR_DEVICE_LOST),
        }
    }

    fn swapchain_loader(&self) -> VkResult<&ash::khr::swapchain::Device> {
        self.swapchain_loader.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }
}

impl Driver for AshDriver {
    fn is_supported(&self) -> bool {
        let Ok(entry) = self.entry() else {
            return false;
        };

        let extensions = match unsafe { entry.enumerate_instance_extension_properties(None) } {
            Ok(extensions) => extensions,
            Err(e) => {
                log::warn!("Failed to enumerate instance extensions: {}", e);
                return false;
            }
        };

        log::debug!("{} instance extensions available", extensions.len());
        extensions
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .any(|name| name == ash::khr::surface::NAME)
    }

    fn required_instance_extensions(&self, display: RawDisplayHandle) -> VkResult<Vec<CString>> {
        let names = ash_window::enumerate_required_extensions(display)?;
        Ok(names
            .iter()
            .map(|&ptr| unsafe { std::ffi::CStr::from_ptr(ptr) }.to_owned())
            .collect())
    }

    fn create_instance(&mut self, info: &vk::InstanceCreateInfo<'_>) -> VkResult<vk::Instance> {
        let entry = self.entry()?;
        let instance = unsafe { entry.create_instance(info, None) }?;
        let surface_loader = ash::khr::surface::Instance::new(entry, &instance);
        let handle = instance.handle();

        self.surface_loader = Some(surface_loader);
        self.instance = Some(instance);
        Ok(handle)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        if self.instance.as_ref().map(|loaded| loaded.handle()) != Some(instance) {
            log::warn!("destroy_instance called for unknown instance {:?}", instance);
            return;
        }
        self.surface_loader = None;
        if let Some(loaded) = self.instance.take() {
            unsafe { loaded.destroy_instance(None) };
        }
    }

    fn create_surface(
        &mut self,
        _instance: vk::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        let entry = self.entry()?;
        let instance = self.instance()?;
        unsafe { ash_window::create_surface(entry, instance, display, window, None) }
    }

    fn destroy_surface(&mut self, _instance: vk::Instance, surface: vk::SurfaceKHR) {
        if let Ok(loader) = self.surface_loader() {
            unsafe { loader.destroy_surface(surface, None) };
        }
    }

    fn enumerate_physical_devices(&self, _instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance()?.enumerate_physical_devices() }
    }

    fn physical_device_properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        self.instance()
            .map(|instance| unsafe { instance.get_physical_device_properties(physical_device) })
            .unwrap_or_default()
    }

    fn physical_device_features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        self.instance()
            .map(|instance| unsafe { instance.get_physical_device_features(physical_device) })
            .unwrap_or_default()
    }

    fn queue_family_properties(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        self.instance()
            .map(|instance| unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            })
            .unwrap_or_default()
    }

    fn device_extension_names(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let extensions =
            unsafe { self.instance()?.enumerate_device_extension_properties(physical_device) }?;
        Ok(extensions
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(|name| name.to_owned())
            .collect())
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        unsafe {
            self.surface_loader()?.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                surface,
            )
        }
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_formats(physical_device, surface)
        }
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_present_modes(physical_device, surface)
        }
    }

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<vk::Device> {
        let instance = self.instance()?;
        let device = unsafe { instance.create_device(physical_device, info, None) }?;
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);
        let handle = device.handle();

        self.swapchain_loader = Some(swapchain_loader);
        self.device = Some(device);
        Ok(handle)
    }

    fn device_queue(&self, device: vk::Device, queue_family_index: u32, queue_index: u32) -> vk::Queue {
        self.device(device)
            .map(|device| unsafe { device.get_device_queue(queue_family_index, queue_index) })
            .unwrap_or_default()
    }

    fn destroy_device(&mut self, device: vk::Device) {
        if self.device(device).is_err() {
            log::warn!("destroy_device called for unknown device {:?}", device);
            return;
        }
        self.swapchain_loader = None;
        if let Some(loaded) = self.device.take() {
            unsafe {
                // Nothing has been submitted yet, but never tear down a busy device
                if let Err(e) = loaded.device_wait_idle() {
                    log::warn!("device_wait_idle failed before teardown: {}", e);
                }
                loaded.destroy_device(None);
            }
        }
    }

    fn create_swapchain(
        &mut self,
        _device: vk::Device,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader()?.create_swapchain(info, None) }
    }

    fn swapchain_images(&self, _device: vk::Device, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader()?.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&mut self, _device: vk::Device, swapchain: vk::SwapchainKHR) {
        if let Ok(loader) = self.swapchain_loader() {
            unsafe { loader.destroy_swapchain(swapchain, None) };
        }
    }

    fn create_image_view(
        &mut self,
        device: vk::Device,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        unsafe { self.device(device)?.create_image_view(info, None) }
    }

    fn destroy_image_view(&mut self, device: vk::Device, view: vk::ImageView) {
        if let Ok(device) = self.device(device) {
            unsafe { device.destroy_image_view(view, None) };
        }
    }

    fn create_shader_module(
        &mut self,
        device: vk::Device,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        unsafe { self.device(device)?.create_shader_module(info, None) }
    }

    fn destroy_shader_module(&mut self, device: vk::Device, module: vk::ShaderModule) {
        if let Ok(device) = self.device(device) {
            unsafe { device.destroy_shader_module(module, None) };
        }
    }

    fn create_pipeline_layout(
        &mut self,
        device: vk::Device,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device(device)?.create_pipeline_layout(info, None) }
    }

    fn destroy_pipeline_layout(&mut self, device: vk::Device, layout: vk::PipelineLayout) {
        if let Ok(device) = self.device(device) {
            unsafe { device.destroy_pipeline_layout(layout, None) };
        }
    }

    fn create_render_pass(
        &mut self,
        device: vk::Device,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        unsafe { self.device(device)?.create_render_pass(info, None) }
    }

    fn destroy_render_pass(&mut self, device: vk::Device, render_pass: vk::RenderPass) {
        if let Ok(device) = self.device(device) {
            unsafe { device.destroy_render_pass(render_pass, None) };
        }
    }

    fn create_graphics_pipeline(
        &mut self,
        device: vk::Device,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device(device)?
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
                .map_err(|(_, e)| e)?
        };
        pipelines.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn destroy_pipeline(&mut self, device: vk::Device, pipeline: vk::Pipeline) {
        if let Ok(device) = self.device(device) {
            unsafe { device.destroy_pipeline(pipeline, None) };
        }
    }
}
