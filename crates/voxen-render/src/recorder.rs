//! Per-frame command recording.
//!
//! Layout transitions are full pipeline barriers (all-commands to
//! all-commands, write to read+write). Conservative rather than tuned;
//! with a single compute pass per frame there is nothing to overlap.

use crate::camera::RayMarchPushConstants;
use crate::pipeline::RayMarchPipeline;
use crate::target::RenderTarget;
use ash::vk;

/// Record a layout transition for `image`.
///
/// # Safety
/// The command buffer must be in the recording state.
pub unsafe fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(from)
        .new_layout(to)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(vk::REMAINING_MIP_LEVELS)
                .base_array_layer(0)
                .layer_count(vk::REMAINING_ARRAY_LAYERS),
        );

    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));

    device.cmd_pipeline_barrier2(cmd, &dependency_info);
}

/// Record a full-image blit from `src` to `dst`, scaling if needed.
///
/// # Safety
/// The command buffer must be in the recording state; `src` must be in
/// TRANSFER_SRC_OPTIMAL and `dst` in TRANSFER_DST_OPTIMAL layout.
pub unsafe fn blit_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_extent: vk::Extent2D,
    dst: vk::Image,
    dst_extent: vk::Extent2D,
) {
    let subresource = vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1);

    let blit_region = vk::ImageBlit2::default()
        .src_offsets([
            vk::Offset3D::default(),
            vk::Offset3D {
                x: src_extent.width as i32,
                y: src_extent.height as i32,
                z: 1,
            },
        ])
        .src_subresource(subresource)
        .dst_offsets([
            vk::Offset3D::default(),
            vk::Offset3D {
                x: dst_extent.width as i32,
                y: dst_extent.height as i32,
                z: 1,
            },
        ])
        .dst_subresource(subresource);

    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(std::slice::from_ref(&blit_region));

    device.cmd_blit_image2(cmd, &blit_info);
}

/// Record one frame: ray march into the render target, then blit it to
/// the swapchain image and leave that image ready for presentation.
///
/// # Safety
/// The command buffer must be in the recording state and `swapchain_image`
/// must be the image acquired for this frame.
pub unsafe fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipeline: &RayMarchPipeline,
    target: &RenderTarget,
    push_constants: &RayMarchPushConstants,
    swapchain_image: vk::Image,
    swapchain_extent: vk::Extent2D,
) {
    // make the render target writable by the compute pass
    transition_image(
        device,
        cmd,
        target.image.image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
    );

    pipeline.record(device, cmd, push_constants, target.extent);

    // hand the result over to the blit
    transition_image(
        device,
        cmd,
        target.image.image,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );
    transition_image(
        device,
        cmd,
        swapchain_image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    blit_image(
        device,
        cmd,
        target.image.image,
        target.extent,
        swapchain_image,
        swapchain_extent,
    );

    // make the swapchain image presentable
    transition_image(
        device,
        cmd,
        swapchain_image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    );
}
