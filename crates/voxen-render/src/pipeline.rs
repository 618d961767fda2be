//! Ray marching compute pipeline.

use crate::camera::RayMarchPushConstants;
use crate::scene::VoxelScene;
use crate::target::RenderTarget;
use ash::vk;
use voxen_gpu::descriptors::{
    write_storage_buffer, write_storage_image, DescriptorPool, DescriptorSetLayoutBuilder,
};
use voxen_gpu::error::Result;
use voxen_gpu::pipeline::ComputePipeline;

/// Compute shader local workgroup size per axis.
pub const WORKGROUP_SIZE: u32 = 16;

/// Workgroup counts covering the target extent.
pub fn dispatch_counts(extent: vk::Extent2D) -> (u32, u32) {
    (
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
    )
}

/// The ray marching compute pipeline with its descriptor state.
///
/// Binding 0 is the output storage image, binding 1 the octree buffer.
pub struct RayMarchPipeline {
    pipeline: ComputePipeline,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
}

impl RayMarchPipeline {
    /// Create the pipeline and bind the target and scene.
    ///
    /// # Safety
    /// The device must be valid and support compute.
    pub unsafe fn new(
        device: &ash::Device,
        target: &RenderTarget,
        scene: &VoxelScene,
    ) -> Result<Self> {
        let descriptor_set_layout = DescriptorSetLayoutBuilder::new()
            .storage_image(0, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .build(device)?;

        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(RayMarchPushConstants::SIZE);

        let pipeline = match ComputePipeline::new(
            device,
            voxen_shaders::ray_march_shader(),
            &[descriptor_set_layout],
            &[push_constant_range],
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_descriptor_set_layout(descriptor_set_layout, None);
                return Err(e);
            }
        };

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1),
        ];

        let descriptor_pool = match DescriptorPool::new(device, 1, &pool_sizes) {
            Ok(pool) => pool,
            Err(e) => {
                pipeline.destroy(device);
                device.destroy_descriptor_set_layout(descriptor_set_layout, None);
                return Err(e);
            }
        };

        let descriptor_set = match descriptor_pool.allocate(device, &[descriptor_set_layout]) {
            Ok(sets) => sets[0],
            Err(e) => {
                descriptor_pool.destroy(device);
                pipeline.destroy(device);
                device.destroy_descriptor_set_layout(descriptor_set_layout, None);
                return Err(e);
            }
        };

        write_storage_image(
            device,
            descriptor_set,
            0,
            target.view,
            vk::ImageLayout::GENERAL,
        );
        write_storage_buffer(device, descriptor_set, 1, scene.buffer.buffer, 0, scene.buffer.size);

        Ok(Self {
            pipeline,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_set,
        })
    }

    /// Point binding 0 at a different render target, e.g. after a resize.
    ///
    /// # Safety
    /// No in-flight frame may still reference the previous target.
    pub unsafe fn rebind_target(&self, device: &ash::Device, target: &RenderTarget) {
        write_storage_image(
            device,
            self.descriptor_set,
            0,
            target.view,
            vk::ImageLayout::GENERAL,
        );
    }

    /// Record the dispatch covering `extent`.
    ///
    /// # Safety
    /// The command buffer must be in the recording state and the bound
    /// target must be in GENERAL layout at execution time.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        push_constants: &RayMarchPushConstants,
        extent: vk::Extent2D,
    ) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            self.pipeline.layout,
            0,
            &[self.descriptor_set],
            &[],
        );
        device.cmd_push_constants(
            cmd,
            self.pipeline.layout,
            vk::ShaderStageFlags::COMPUTE,
            0,
            bytemuck::bytes_of(push_constants),
        );

        let (group_x, group_y) = dispatch_counts(extent);
        device.cmd_dispatch(cmd, group_x, group_y, 1);
    }

    /// Destroy all pipeline resources.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.descriptor_pool.destroy(device);
        device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        self.pipeline.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_the_extent() {
        let (x, y) = dispatch_counts(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!((x, y), (80, 45));
    }

    #[test]
    fn partial_workgroups_round_up() {
        let (x, y) = dispatch_counts(vk::Extent2D {
            width: 1281,
            height: 721,
        });
        assert_eq!((x, y), (81, 46));

        let (x, y) = dispatch_counts(vk::Extent2D {
            width: 1,
            height: 1,
        });
        assert_eq!((x, y), (1, 1));
    }
}
