//! Swapchain management.

use crate::device::QueueFamilyAssignment;
use crate::error::{GpuError, Result};
use crate::surface::SurfaceSupport;
use ash::vk;

/// How long one image acquisition may block.
const ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Swapchain wrapper.
///
/// Owns the handle, the presentable images, and exactly one view per
/// image at the same index. Views are destroyed before the handle.
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    suboptimal: bool,
}

impl Swapchain {
    /// Create a new swapchain.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
        desired_extent: vk::Extent2D,
        queue_families: QueueFamilyAssignment,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let surface_format = select_surface_format(&support.formats);
        let present_mode = select_present_mode(&support.present_modes);
        let extent = clamp_extent(&support.capabilities, desired_extent);
        let image_count = select_image_count(&support.capabilities);

        // No ownership transfers needed when one family both renders and
        // presents; otherwise the images are shared across exactly the two
        // families involved.
        let shared_families = [queue_families.graphics, queue_families.present];
        let (sharing_mode, shared_families) =
            if queue_families.graphics == queue_families.present {
                (vk::SharingMode::EXCLUSIVE, &[][..])
            } else {
                (vk::SharingMode::CONCURRENT, &shared_families[..])
            };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        let swapchain = swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = match swapchain_loader.get_swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                swapchain_loader.destroy_swapchain(swapchain, None);
                return Err(e.into());
            }
        };

        // One 2D color view per image; a failure partway through unwinds
        // the views already created in this call
        let image_views = match create_all(
            images.len(),
            |i| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(images[i])
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                device.create_image_view(&view_info, None)
            },
            |&view| device.destroy_image_view(view, None),
        ) {
            Ok(views) => views,
            Err(e) => {
                swapchain_loader.destroy_swapchain(swapchain, None);
                return Err(e.into());
            }
        };

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent,
            present_mode,
            suboptimal: false,
        })
    }

    /// Get the raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Whether the swapchain should be recreated at the next opportunity.
    pub fn needs_recreate(&self) -> bool {
        self.suboptimal
    }

    /// Mark the swapchain for recreation.
    pub fn mark_suboptimal(&mut self) {
        self.suboptimal = true;
    }

    /// Acquire the next presentable image, blocking up to one second.
    ///
    /// A suboptimal result marks the swapchain for recreation but still
    /// returns a usable image for this frame.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire(
        &mut self,
        swapchain_loader: &ash::khr::swapchain::Device,
        signal_semaphore: vk::Semaphore,
    ) -> Result<(u32, vk::Image)> {
        let result = swapchain_loader.acquire_next_image(
            self.swapchain,
            ACQUIRE_TIMEOUT_NS,
            signal_semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((index, suboptimal)) => {
                self.suboptimal |= suboptimal;
                Ok((index, self.images[index as usize]))
            }
            Err(vk::Result::TIMEOUT) => Err(GpuError::SwapchainTimeout),
            Err(vk::Result::NOT_READY) => Err(GpuError::SwapchainNotReady),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::SwapchainOutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Present an acquired image, waiting on `wait_semaphore`.
    ///
    /// # Safety
    /// All handles must be valid and `image_index` must come from
    /// [`Self::acquire`] on this swapchain.
    pub unsafe fn present(
        &mut self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match swapchain_loader.queue_present(queue, &present_info) {
            Ok(suboptimal) => {
                self.suboptimal |= suboptimal;
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.suboptimal = true;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Destroy the swapchain, views first.
    ///
    /// # Safety
    /// All handles must be valid and the swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

/// Prefer 8-bit BGRA with the non-linear sRGB color space; fall back to
/// the first supported format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    available
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(available[0])
}

/// Prefer low-latency mailbox; FIFO is always available as the fallback.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    available
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// One more image than the driver minimum, bounded by the maximum when
/// the driver reports one (zero means unbounded).
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// Clamp the requested window extent into the supported range.
pub fn clamp_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    // u32::MAX width means the surface size is defined by the swapchain
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Create `count` resources, unwinding the ones already created when one
/// fails partway through.
fn create_all<T, E>(
    count: usize,
    mut create: impl FnMut(usize) -> std::result::Result<T, E>,
    mut destroy: impl FnMut(&T),
) -> std::result::Result<Vec<T>, E> {
    let mut created = Vec::with_capacity(count);
    for index in 0..count {
        match create(index) {
            Ok(resource) => created.push(resource),
            Err(e) => {
                for resource in created.iter().rev() {
                    destroy(resource);
                }
                return Err(e);
            }
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_is_bgra_nonlinear_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = select_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_falls_back_to_first_supported() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];

        assert_eq!(select_surface_format(&formats), formats[0]);
    }

    #[test]
    fn mailbox_preferred_over_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_is_the_fallback() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_is_min_plus_one() {
        assert_eq!(select_image_count(&caps(2, 0)), 3);
        assert_eq!(select_image_count(&caps(3, 8)), 4);
    }

    #[test]
    fn image_count_clamps_to_reported_max() {
        assert_eq!(select_image_count(&caps(2, 2)), 2);
        assert_eq!(select_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn extent_clamps_into_supported_range() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 1000,
            },
            ..Default::default()
        };

        let clamped = clamp_extent(
            &capabilities,
            vk::Extent2D {
                width: 4096,
                height: 50,
            },
        );
        assert_eq!(clamped.width, 2000);
        assert_eq!(clamped.height, 100);
    }

    #[test]
    fn fixed_current_extent_wins() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };

        let clamped = clamp_extent(
            &capabilities,
            vk::Extent2D {
                width: 1,
                height: 1,
            },
        );
        assert_eq!(clamped.width, 800);
        assert_eq!(clamped.height, 600);
    }

    #[test]
    fn create_all_returns_every_resource_on_success() {
        let result: std::result::Result<Vec<usize>, ()> =
            create_all(4, |i| Ok(i * 10), |_| panic!("nothing to destroy"));
        assert_eq!(result.unwrap(), vec![0, 10, 20, 30]);
    }

    #[test]
    fn partial_failure_unwinds_created_resources() {
        let destroyed = RefCell::new(Vec::new());

        let result = create_all(
            5,
            |i| if i < 2 { Ok(i) } else { Err("view creation failed") },
            |&i| destroyed.borrow_mut().push(i),
        );

        assert!(result.is_err());
        // exactly the two created views, destroyed in reverse order
        assert_eq!(*destroyed.borrow(), vec![1, 0]);
    }
}
