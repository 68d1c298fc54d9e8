//! Swapchain creation and wholesale recreation on resize.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;

use crate::device::context::{PhysicalDeviceInfo, VulkanError, VulkanResult};
use crate::util;

/// The presentable image chain and its per-image views.
///
/// The image count is fixed at construction: the requested size is clamped
/// between the surface's min/max capabilities, and the driver may still
/// allocate more images than the minimum it was asked for.
pub struct Swapchain {
    device: ash::Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub(crate) fn new(
        instance: &ash::Instance,
        device: ash::Device,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        physical_device_info: &PhysicalDeviceInfo,
        window_extent: vk::Extent2D,
        requested_size: u32,
    ) -> VulkanResult<Self> {
        let loader = SwapchainLoader::new(instance, &device);
        Self::create(
            device,
            loader,
            surface,
            surface_loader,
            physical_device_info,
            window_extent,
            requested_size,
            vk::SwapchainKHR::null(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        device: ash::Device,
        loader: SwapchainLoader,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        physical_device_info: &PhysicalDeviceInfo,
        window_extent: vk::Extent2D,
        requested_size: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device_info.device, surface)
                .map_err(VulkanError::Api)?
        };

        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device_info.device, surface)
                .map_err(VulkanError::Api)?
        };
        let format = surface_formats
            .iter()
            .find(|sf| {
                sf.format == vk::Format::B8G8R8A8_SRGB
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .copied()
            .unwrap_or(surface_formats[0]);

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device_info.device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            vk::Extent2D {
                width: window_extent.width.clamp(
                    surface_caps.min_image_extent.width,
                    surface_caps.max_image_extent.width,
                ),
                height: window_extent.height.clamp(
                    surface_caps.min_image_extent.height,
                    surface_caps.max_image_extent.height,
                ),
            }
        };

        // Clamp the requested chain length to what the platform allows.
        let mut image_count = requested_size.max(surface_caps.min_image_count);
        if surface_caps.max_image_count > 0 {
            image_count = image_count.min(surface_caps.max_image_count);
        }

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(|_| {
                    VulkanError::InitializationFailed("failed to create swap chain".to_string())
                })?
        };

        let images = unsafe {
            loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            image_views.push(util::create_image_view(
                &device,
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
            )?);
        }

        Ok(Self {
            device,
            loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Tears the chain down and rebuilds it against the current surface
    /// extent, chaining through `old_swapchain` so in-flight presents retire
    /// cleanly.
    pub(crate) fn recreate(
        &mut self,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        physical_device_info: &PhysicalDeviceInfo,
        window_extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        let requested = self.images.len() as u32;
        let replacement = Self::create(
            self.device.clone(),
            self.loader.clone(),
            surface,
            surface_loader,
            physical_device_info,
            window_extent,
            requested,
            self.swapchain,
        )?;
        *self = replacement;
        Ok(())
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Number of presentable images in the chain.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
