//! Offscreen render target for the compute pass.

use ash::vk;
use gpu_allocator::MemoryLocation;
use voxen_gpu::error::Result;
use voxen_gpu::memory::{GpuAllocator, GpuImage};

/// Storage image the ray marching pass writes, blitted to the swapchain
/// each frame.
pub struct RenderTarget {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

impl RenderTarget {
    /// Pixel format of the target.
    pub const FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

    /// Create a target of the given size.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(Self::FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = allocator.create_image(&create_info, MemoryLocation::GpuOnly, "render_target")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(Self::FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = match device.create_image_view(&view_info, None) {
            Ok(view) => view,
            Err(e) => {
                // unwind the image before propagating
                let _ = allocator.free_image(&mut image);
                return Err(e.into());
            }
        };

        Ok(Self {
            image,
            view,
            extent,
        })
    }

    /// Destroy the view and free the image.
    ///
    /// # Safety
    /// The device must be valid and the target must not be in use.
    pub unsafe fn destroy(mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        device.destroy_image_view(self.view, None);
        allocator.free_image(&mut self.image)
    }
}
