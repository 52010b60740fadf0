// Capability probing
//
// Pure queries against a physical device and a surface. Nothing in here
// creates or mutates anything; calling any of these twice for the same
// device/surface pair yields the same answer.

use super::driver::Driver;
use crate::error::{BootstrapError, Result};
use ash::vk;
use std::ffi::CStr;

/// A physical device plus the properties and features selection looks at.
///
/// Only lives while a device is being chosen.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub vendor_id: u32,
    pub device_type: vk::PhysicalDeviceType,
    pub features: vk::PhysicalDeviceFeatures,
}

/// What a surface supports on a given physical device.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain can only be created with at least one format and one
    /// present mode to pick from.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// Enumerate physical devices in driver order and cache what selection needs.
pub fn probe_candidates<D: Driver>(driver: &D, instance: vk::Instance) -> Result<Vec<DeviceCandidate>> {
    let devices = driver
        .enumerate_physical_devices(instance)
        .map_err(BootstrapError::DeviceEnumeration)?;
    log::debug!("{} physical devices found", devices.len());

    Ok(devices
        .into_iter()
        .map(|handle| {
            let properties = driver.physical_device_properties(handle);
            let features = driver.physical_device_features(handle);
            let name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| String::from("<unnamed>"));

            log::debug!(
                "Candidate {:?}: {} (vendor 0x{:04x}, {:?})",
                handle,
                name,
                properties.vendor_id,
                properties.device_type
            );

            DeviceCandidate {
                handle,
                name,
                vendor_id: properties.vendor_id,
                device_type: properties.device_type,
                features,
            }
        })
        .collect())
}

pub fn query_surface_support<D: Driver>(
    driver: &D,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SurfaceSupport> {
    let capabilities = driver
        .surface_capabilities(physical_device, surface)
        .map_err(BootstrapError::SurfaceQuery)?;
    let formats = driver
        .surface_formats(physical_device, surface)
        .map_err(BootstrapError::SurfaceQuery)?;
    let present_modes = driver
        .surface_present_modes(physical_device, surface)
        .map_err(BootstrapError::SurfaceQuery)?;

    log::debug!(
        "Surface image count: min {}, max {} ({} formats, {} present modes)",
        capabilities.min_image_count,
        capabilities.max_image_count,
        formats.len(),
        present_modes.len()
    );

    Ok(SurfaceSupport {
        capabilities,
        formats,
        present_modes,
    })
}

/// Per-family graphics and present support, in family index order.
///
/// The iterator is lazy: present support for a family is only asked for when
/// that family is reached, so a caller that stops early never queries the
/// rest. A failed present query counts as "cannot present".
pub fn query_queue_families<'a, D: Driver>(
    driver: &'a D,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> impl Iterator<Item = QueueFamilySupport> + 'a {
    driver
        .queue_family_properties(physical_device)
        .into_iter()
        .enumerate()
        .map(move |(index, family)| {
            let index = index as u32;
            let present = driver
                .surface_support(physical_device, index, surface)
                .unwrap_or_else(|e| {
                    log::warn!("Present support query failed for family {}: {}", index, e);
                    false
                });

            let support = QueueFamilySupport {
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            };
            log::debug!("Queue family {}: {:?} ({} queues)", index, support, family.queue_count);
            support
        })
}

/// Required extensions the device does not report, in the order requested.
pub fn missing_device_extensions<D: Driver>(
    driver: &D,
    physical_device: vk::PhysicalDevice,
    required: &[&CStr],
) -> Vec<String> {
    let available = driver
        .device_extension_names(physical_device)
        .unwrap_or_else(|e| {
            log::warn!("Failed to enumerate device extensions: {}", e);
            Vec::new()
        });

    for name in &available {
        log::debug!("Device extension: {}", name.to_string_lossy());
    }

    required
        .iter()
        .filter(|&&name| !available.iter().any(|ext| ext.as_c_str() == name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// True iff every required extension name appears in the device's list.
pub fn query_extension_support<D: Driver>(
    driver: &D,
    physical_device: vk::PhysicalDevice,
    required: &[&CStr],
) -> bool {
    missing_device_extensions(driver, physical_device, required).is_empty()
}
