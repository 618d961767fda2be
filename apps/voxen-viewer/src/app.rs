//! The viewer application: scene setup and per-frame recording.

use std::time::Instant;

use voxen_app::{AppContext, FrameContext, VoxenApp};
use voxen_gpu::command::ImmediateSubmit;
use voxen_gpu::GpuContext;
use voxen_render::{demo_scene, record_frame, OrbitCamera, RayMarchPipeline, RenderTarget, VoxelScene};

/// Camera orbit speed in radians per second.
const ORBIT_SPEED: f32 = 0.4;

pub struct Viewer {
    immediate: ImmediateSubmit,
    scene: Option<VoxelScene>,
    target: Option<RenderTarget>,
    pipeline: RayMarchPipeline,
    camera: OrbitCamera,
    start: Instant,
}

impl VoxenApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let device = ctx.gpu.device();
        let mut allocator = ctx.gpu.allocator().lock();

        // SAFETY: Device, queues, and allocator are valid for the whole
        // init scope; nothing submitted here outlives it unobserved.
        unsafe {
            let immediate = ImmediateSubmit::new(
                device,
                ctx.gpu.queues().graphics,
                ctx.gpu.queue_families().graphics,
            )?;

            let octree = demo_scene();
            let scene = VoxelScene::upload(device, &mut allocator, &immediate, &octree)?;
            let target = RenderTarget::new(device, &mut allocator, ctx.extent())?;
            let pipeline = RayMarchPipeline::new(device, &target, &scene)?;

            Ok(Self {
                immediate,
                scene: Some(scene),
                target: Some(target),
                pipeline,
                camera: OrbitCamera::default(),
                start: Instant::now(),
            })
        }
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.camera.yaw += dt * ORBIT_SPEED;
    }

    fn render(&mut self, gpu: &GpuContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let Some(target) = &self.target else {
            anyhow::bail!("render target missing");
        };

        let push_constants = self
            .camera
            .push_constants(target.extent, self.start.elapsed().as_secs_f32());

        // SAFETY: The scheduler put the command buffer in the recording
        // state and hands us this frame's acquired image.
        unsafe {
            record_frame(
                gpu.device(),
                frame.command_buffer,
                &self.pipeline,
                target,
                &push_constants,
                frame.swapchain_image,
                frame.swapchain_extent,
            );
        }

        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        let device = ctx.gpu.device();
        let mut allocator = ctx.gpu.allocator().lock();

        // SAFETY: The runner drained the GPU before recreating the
        // swapchain, so the old target is no longer referenced.
        unsafe {
            if let Some(target) = self.target.take() {
                target.destroy(device, &mut allocator)?;
            }

            let target = RenderTarget::new(
                device,
                &mut allocator,
                ash::vk::Extent2D { width, height },
            )?;
            self.pipeline.rebind_target(device, &target);
            self.target = Some(target);
        }

        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        let device = ctx.gpu.device();
        let mut allocator = ctx.gpu.allocator().lock();

        // SAFETY: The runner waited for device idle before cleanup.
        unsafe {
            self.pipeline.destroy(device);

            if let Some(target) = self.target.take() {
                if let Err(e) = target.destroy(device, &mut allocator) {
                    tracing::error!("Failed to free render target: {e}");
                }
            }

            if let Some(scene) = self.scene.take() {
                if let Err(e) = scene.destroy(&mut allocator) {
                    tracing::error!("Failed to free voxel scene: {e}");
                }
            }

            self.immediate.destroy(device);
        }
    }
}
