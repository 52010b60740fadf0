// Physical device and queue family selection
//
// Policy is deliberately minimal: the first adequate device wins, and the
// first family offering each capability wins. Nothing is scored.

use super::driver::Driver;
use super::probe::{query_queue_families, DeviceCandidate, QueueFamilySupport};
use crate::error::{BootstrapError, Result};
use ash::vk;
use std::collections::BTreeSet;

/// Only discrete GPUs that can run geometry shaders qualify.
pub fn is_device_suitable(candidate: &DeviceCandidate) -> bool {
    candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
        && candidate.features.geometry_shader == vk::TRUE
}

/// Pick the first suitable candidate in enumeration order.
pub fn select_physical_device(candidates: Vec<DeviceCandidate>) -> Result<DeviceCandidate> {
    candidates
        .into_iter()
        .find(is_device_suitable)
        .ok_or(BootstrapError::NoSuitableDevice)
}

/// Queue family indices found so far. Either index may still be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyAssignment {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyAssignment {
    /// Record the first family index offering each capability, stopping as
    /// soon as both are known. Later families are never looked at again.
    pub fn scan<I>(families: I) -> Self
    where
        I: IntoIterator<Item = QueueFamilySupport>,
    {
        let mut assignment = Self::default();
        for (index, family) in families.into_iter().enumerate() {
            let index = index as u32;
            if assignment.graphics.is_none() && family.graphics {
                assignment.graphics = Some(index);
            }
            if assignment.present.is_none() && family.present {
                assignment.present = Some(index);
            }
            if assignment.is_complete() {
                break;
            }
        }
        assignment
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Only a complete assignment can become [`QueueFamilies`].
    pub fn complete(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }

    fn missing(&self) -> &'static str {
        match (self.graphics, self.present) {
            (None, None) => "graphics and present",
            (None, Some(_)) => "graphics",
            (Some(_), None) => "present",
            (Some(_), Some(_)) => "nothing",
        }
    }
}

/// A complete queue family assignment. Graphics and present may share a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, ascending.
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

pub fn find_queue_families<D: Driver>(
    driver: &D,
    candidate: &DeviceCandidate,
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilies> {
    let assignment =
        QueueFamilyAssignment::scan(query_queue_families(driver, candidate.handle, surface));

    match assignment.complete() {
        Some(families) => {
            log::info!(
                "Queue families: graphics {}, present {}",
                families.graphics,
                families.present
            );
            Ok(families)
        }
        None => Err(BootstrapError::IncompleteQueueFamily {
            device: candidate.name.clone(),
            missing: assignment.missing(),
        }),
    }
}
