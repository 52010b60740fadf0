// Swapchain - Window presentation
//
// Negotiates format, present mode, extent and image count with the surface,
// then creates the chain of images we render to and one view per image.

use super::driver::Driver;
use super::probe::SurfaceSupport;
use super::select::QueueFamilies;
use crate::error::{BootstrapError, Result};
use crate::window::FramebufferSize;
use ash::vk;

/// Preferred surface format, used whenever the surface offers it.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Prefer [`PREFERRED_SURFACE_FORMAT`], otherwise take whatever comes first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX: No vsync, no tearing, triple buffered
/// FIFO: Vsync enabled, guaranteed available
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO) // FIFO is always supported
}

/// Clamp the framebuffer size to the surface limits, each axis on its own.
///
/// A surface reporting min above max gets min rather than a panic.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, size: FramebufferSize) -> vk::Extent2D {
    let clamp = |value: u32, min: u32, max: u32| value.min(max).max(min);
    vk::Extent2D {
        width: clamp(
            size.width,
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: clamp(
            size.height,
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image more than the minimum, unless that exceeds a non-zero maximum.
/// A maximum of zero means unlimited.
pub fn resolve_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.min_image_count
    } else {
        image_count
    }
}

/// Concurrent sharing across both families when they differ, so no explicit
/// ownership transfers are needed; exclusive otherwise.
pub fn sharing_mode(families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

/// Format, present mode, extent and image count picked for the swapchain.
#[derive(Debug, Clone, Copy)]
pub struct PresentationParameters {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl PresentationParameters {
    pub fn choose(support: &SurfaceSupport, size: FramebufferSize) -> Result<Self> {
        let inadequate = || BootstrapError::InadequateSwapChainSupport {
            formats: support.formats.len(),
            present_modes: support.present_modes.len(),
        };
        if !support.is_adequate() {
            return Err(inadequate());
        }
        let surface_format = choose_surface_format(&support.formats).ok_or_else(inadequate)?;

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, size),
            image_count: resolve_image_count(&support.capabilities),
        })
    }
}

/// Swapchain, its images and one view per image.
///
/// The images belong to the swapchain; only the views are ours to destroy.
#[derive(Debug)]
pub struct PresentationChain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
}

impl PresentationChain {
    pub fn create<D: Driver>(
        driver: &mut D,
        device: vk::Device,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
        params: &PresentationParameters,
        families: &QueueFamilies,
    ) -> Result<Self> {
        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}",
            params.extent.width,
            params.extent.height,
            params.image_count,
            params.present_mode
        );

        let (sharing, family_indices) = sharing_mode(families);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(params.image_count)
            .image_format(params.surface_format.format)
            .image_color_space(params.surface_format.color_space)
            .image_extent(params.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(params.present_mode)
            .clipped(true);

        let swapchain = driver
            .create_swapchain(device, &create_info)
            .map_err(BootstrapError::SwapChainCreation)?;

        // The driver may hand back more images than we asked for
        let images = match driver.swapchain_images(device, swapchain) {
            Ok(images) => images,
            Err(e) => {
                driver.destroy_swapchain(device, swapchain);
                return Err(BootstrapError::SwapChainCreation(e));
            }
        };
        log::info!("Created swapchain with {} images", images.len());

        let image_views =
            match create_image_views(driver, device, &images, params.surface_format.format) {
                Ok(views) => views,
                Err(e) => {
                    driver.destroy_swapchain(device, swapchain);
                    return Err(e);
                }
            };

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: params.surface_format.format,
            extent: params.extent,
            present_mode: params.present_mode,
        })
    }

    /// Views in reverse order of creation, then the swapchain.
    pub fn destroy<D: Driver>(&self, driver: &mut D, device: vk::Device) {
        for &view in self.image_views.iter().rev() {
            driver.destroy_image_view(device, view);
        }
        driver.destroy_swapchain(device, self.swapchain);
    }
}

/// 2D colour view with identity swizzle, one mip level, one layer.
pub fn image_view_create_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
}

/// Create one view per image. If any view fails, the ones already created in
/// this pass are destroyed before the error is returned.
fn create_image_views<D: Driver>(
    driver: &mut D,
    device: vk::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for (index, &image) in images.iter().enumerate() {
        match driver.create_image_view(device, &image_view_create_info(image, format)) {
            Ok(view) => views.push(view),
            Err(result) => {
                for view in views.drain(..).rev() {
                    driver.destroy_image_view(device, view);
                }
                return Err(BootstrapError::ImageViewCreation { index, result });
            }
        }
    }
    Ok(views)
}
