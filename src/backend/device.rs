// Vulkan session - instance, surface, physical + logical device
//
// Responsibilities:
// - Instance creation with the extensions the window system asks for
// - Physical device selection (first discrete GPU with geometry shaders)
// - Surface creation
// - Logical device + graphics/present queue creation

use super::driver::Driver;
use super::probe::{missing_device_extensions, probe_candidates, query_surface_support, DeviceCandidate, SurfaceSupport};
use super::select::{find_queue_families, select_physical_device, QueueFamilies};
use crate::error::{BootstrapError, Result};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};

/// Device extensions the bootstrap cannot do without.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

const ENGINE_NAME: &CStr = c"render-bootstrap";

/// Logical device plus the two queues retrieved from it.
///
/// The queues belong to the device and are never destroyed on their own.
#[derive(Debug, Clone, Copy)]
pub struct LogicalDevice {
    pub handle: vk::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

/// Everything created before the swapchain, in creation order.
#[derive(Debug)]
pub struct Session {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device_name: String,
    pub surface: vk::SurfaceKHR,
    pub queue_families: QueueFamilies,
    pub device: LogicalDevice,
}

impl Session {
    /// Create instance, pick a GPU, create the surface and the logical device.
    ///
    /// Also returns the surface support snapshot taken while validating the
    /// device, so the swapchain is negotiated against the same answer. On
    /// failure everything created so far is destroyed before returning.
    pub fn create<D: Driver>(
        driver: &mut D,
        app_name: &str,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<(Self, SurfaceSupport)> {
        let extensions = driver
            .required_instance_extensions(display)
            .map_err(BootstrapError::InstanceCreation)?;
        let instance = create_instance(driver, app_name, &extensions)?;

        let chosen = match probe_candidates(driver, instance).and_then(select_physical_device) {
            Ok(chosen) => chosen,
            Err(e) => {
                driver.destroy_instance(instance);
                return Err(e);
            }
        };
        log::info!("Selected GPU: {} (vendor 0x{:04x})", chosen.name, chosen.vendor_id);

        let surface = match driver.create_surface(instance, display, window) {
            Ok(surface) => surface,
            Err(e) => {
                driver.destroy_instance(instance);
                return Err(BootstrapError::SurfaceCreation(e));
            }
        };

        let device = find_queue_families(driver, &chosen, surface).and_then(|families| {
            let support = query_surface_support(driver, chosen.handle, surface)?;
            let device =
                create_logical_device(driver, &chosen, &families, REQUIRED_DEVICE_EXTENSIONS, &support)?;
            Ok((families, support, device))
        });
        let (queue_families, support, device) = match device {
            Ok(created) => created,
            Err(e) => {
                driver.destroy_surface(instance, surface);
                driver.destroy_instance(instance);
                return Err(e);
            }
        };

        let session = Self {
            instance,
            physical_device: chosen.handle,
            device_name: chosen.name,
            surface,
            queue_families,
            device,
        };
        Ok((session, support))
    }

    /// Destroy in reverse order of creation: device, surface, instance.
    pub fn destroy<D: Driver>(&self, driver: &mut D) {
        log::info!("Destroying Vulkan session...");
        driver.destroy_device(self.device.handle);
        driver.destroy_surface(self.instance, self.surface);
        driver.destroy_instance(self.instance);
    }
}

pub fn create_instance<D: Driver>(
    driver: &mut D,
    app_name: &str,
    extensions: &[CString],
) -> Result<vk::Instance> {
    // Interior NULs can only come from a hand-edited config
    let app_name = CString::new(app_name.replace('\0', "")).unwrap_or_default();

    for ext in extensions {
        log::debug!("Instance extension: {}", ext.to_string_lossy());
    }

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let extension_ptrs: Vec<_> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    // No validation layers: diagnostics are out of scope for the bootstrap
    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_ptrs);

    driver
        .create_instance(&create_info)
        .map_err(BootstrapError::InstanceCreation)
}

/// One request per distinct family, one queue each at full priority.
pub fn queue_create_infos<'a>(
    families: &QueueFamilies,
    priorities: &'a [f32; 1],
) -> Vec<vk::DeviceQueueCreateInfo<'a>> {
    families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect()
}

/// Validate the device against the required extensions and the surface, then
/// open it and fetch its queues.
///
/// Both checks run before any device is created.
pub fn create_logical_device<D: Driver>(
    driver: &mut D,
    physical_device: &DeviceCandidate,
    families: &QueueFamilies,
    required_extensions: &[&CStr],
    support: &SurfaceSupport,
) -> Result<LogicalDevice> {
    let missing = missing_device_extensions(driver, physical_device.handle, required_extensions);
    if !missing.is_empty() {
        return Err(BootstrapError::MissingDeviceExtension(missing));
    }

    if !support.is_adequate() {
        return Err(BootstrapError::InadequateSwapChainSupport {
            formats: support.formats.len(),
            present_modes: support.present_modes.len(),
        });
    }

    let priorities = [1.0];
    let queue_infos = queue_create_infos(families, &priorities);
    let extension_ptrs: Vec<_> = required_extensions.iter().map(|ext| ext.as_ptr()).collect();
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&features);

    let device = driver
        .create_device(physical_device.handle, &create_info)
        .map_err(BootstrapError::DeviceCreation)?;

    let graphics_queue = driver.device_queue(device, families.graphics, 0);
    let present_queue = driver.device_queue(device, families.present, 0);

    log::info!(
        "Created logical device with {} queue families",
        queue_infos.len()
    );

    Ok(LogicalDevice {
        handle: device,
        graphics_queue,
        present_queue,
    })
}
