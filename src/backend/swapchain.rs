// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Format, present mode, extent and image count selection are plain
// functions over the queried surface data so they stay testable.

use ash::vk;
use glam::UVec2;
use std::sync::Arc;

use super::error::{RenderError, RenderResult};
use super::VulkanDevice;

/// Surface capabilities, formats and present modes of one device
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface_loader: &ash::extensions::khr::Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
        }?;
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)
        }?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Prefer 8-bit BGRA with sRGB encoding in the sRGB-nonlinear color space,
/// fall back to whatever the surface reports first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Fixed policy: strict vsynced FIFO. No tearing, bounded latency, and the
/// only mode Vulkan guarantees to be supported everywhere.
pub fn choose_present_mode(_present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    vk::PresentModeKHR::FIFO
}

/// Use the surface's current extent when it is defined; otherwise clamp the
/// requested window size into the reported min/max bounds component-wise.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: UVec2) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    let min = UVec2::new(caps.min_image_extent.width, caps.min_image_extent.height);
    let max = UVec2::new(caps.max_image_extent.width, caps.max_image_extent.height);
    let clamped = requested.clamp(min, max);

    vk::Extent2D {
        width: clamped.x,
        height: clamped.y,
    }
}

/// One more than the minimum so the driver rarely makes us wait for an
/// image, clamped down when the surface reports an upper bound (0 = none).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(device: Arc<VulkanDevice>, requested_size: UVec2) -> RenderResult<Self> {
        log::info!(
            "Creating swapchain: {}x{} requested",
            requested_size.x,
            requested_size.y
        );

        let support = SwapchainSupport::query(
            &device.surface_loader,
            device.physical_device,
            device.surface,
        )?;

        let surface_format =
            choose_surface_format(&support.formats).ok_or(RenderError::NoSuitableDevice)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, requested_size);
        let image_count = choose_image_count(&support.capabilities);

        log::info!("Present mode: {:?}", present_mode);

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        // Concurrent sharing only when graphics and present live in
        // different families; exclusive otherwise
        let families = device.queue_families;
        let family_indices = [families.graphics, families.present];
        create_info = if families.graphics != families.present {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(RenderError::SwapchainCreationFailed)?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;

        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
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
                    });

                unsafe { device.device.create_image_view(&create_info, None) }
                    .map_err(RenderError::from)
            })
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format: surface_format.format,
            extent,
            device,
        })
    }

    /// Acquire next image for rendering.
    ///
    /// Returns the image index and the suboptimal flag from the driver.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Present a rendered image to the screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        current: (u32, u32),
        min_extent: (u32, u32),
        max_extent: (u32, u32),
        min_images: u32,
        max_images: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min_extent.0,
                height: min_extent.1,
            },
            max_image_extent: vk::Extent2D {
                width: max_extent.0,
                height: max_extent.1,
            },
            min_image_count: min_images,
            max_image_count: max_images,
            ..Default::default()
        }
    }

    #[test]
    fn extent_uses_requested_size_when_current_is_undefined() {
        let caps = caps((u32::MAX, u32::MAX), (1, 1), (4096, 4096), 2, 0);
        let extent = choose_extent(&caps, UVec2::new(1280, 720));
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn extent_clamps_requested_size_into_surface_bounds() {
        let caps = caps((u32::MAX, u32::MAX), (1, 1), (800, 600), 2, 0);
        let extent = choose_extent(&caps, UVec2::new(1280, 720));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_uses_current_extent_when_defined() {
        let caps = caps((1920, 1080), (1, 1), (4096, 4096), 2, 0);
        let extent = choose_extent(&caps, UVec2::new(1280, 720));
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn image_count_is_min_plus_one_when_unbounded() {
        let caps = caps((0, 0), (1, 1), (1, 1), 2, 0);
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_is_clamped_to_max() {
        let caps = caps((0, 0), (1, 1), (1, 1), 2, 2);
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn format_prefers_bgra_srgb_nonlinear() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_falls_back_to_first_reported() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn format_selection_on_empty_list_is_none() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_is_always_fifo() {
        let reported = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&reported), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }
}
