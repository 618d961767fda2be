//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use voxen_gpu::frame::FrameScheduler;
use voxen_gpu::swapchain::Swapchain;
use voxen_gpu::{GpuContext, GpuContextBuilder, SurfaceContext};
use winit::window::Window;

/// Application context shared across all app methods.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device and queues.
    pub gpu: GpuContext,
    /// Surface context for windowed rendering.
    pub surface: SurfaceContext,
    /// Current swapchain.
    pub swapchain: Swapchain,
    /// Frame scheduler driving the per-frame protocol.
    pub scheduler: FrameScheduler,
    /// Time of the last frame, for delta time calculation.
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Create the full rendering context for a window.
    pub(crate) fn new(
        window: Arc<Window>,
        app_name: &str,
        validation: bool,
    ) -> anyhow::Result<Self> {
        let (gpu, surface) = GpuContextBuilder::new()
            .app_name(app_name)
            .validation(validation)
            .build(window.as_ref())?;

        tracing::info!("GPU: {}", gpu.candidate().name());

        let size = window.inner_size();
        let desired_extent = vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        // SAFETY: GPU context and surface were just created together
        let swapchain = match unsafe { surface.create_swapchain(&gpu, desired_extent, None) } {
            Ok(swapchain) => swapchain,
            Err(e) => {
                // SAFETY: Nothing references the surface yet
                unsafe { surface.destroy() };
                return Err(e.into());
            }
        };

        tracing::info!(
            "Swapchain created: {}x{} ({} images, {:?})",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len(),
            swapchain.present_mode,
        );

        // SAFETY: Device is valid and the graphics family exists
        let scheduler = match unsafe {
            FrameScheduler::new(gpu.device(), gpu.queue_families().graphics)
        } {
            Ok(scheduler) => scheduler,
            Err(e) => {
                // SAFETY: Nothing has been submitted yet
                unsafe {
                    swapchain.destroy(gpu.device(), &surface.swapchain_loader);
                    surface.destroy();
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            scheduler,
            last_frame_time: Instant::now(),
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height.max(1) as f32
    }

    /// Total frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.scheduler.frame_counter()
    }

    /// Recreate the swapchain for a new framebuffer size.
    ///
    /// Drains all in-flight work first, so it is safe to call between
    /// frames.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.gpu.wait_idle()?;
        unsafe {
            self.surface.recreate_swapchain(
                &self.gpu,
                &mut self.swapchain,
                vk::Extent2D { width, height },
            )?;
        }
        Ok(())
    }

    /// Cleanup all resources.
    ///
    /// Waits for the device to go idle, then destroys children in
    /// reverse creation order; the GPU context itself is torn down by its
    /// `Drop` when the context is dropped afterwards.
    pub(crate) fn cleanup(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            tracing::error!("Failed to wait for device idle: {e}");
        }

        // SAFETY: Device is idle; nothing references these objects anymore
        unsafe {
            self.scheduler.destroy(self.gpu.device());
            self.swapchain
                .destroy(self.gpu.device(), &self.surface.swapchain_loader);
            self.surface.destroy();
        }
    }
}
