//! `VoxenApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use voxen_gpu::GpuContext;
use winit::event::WindowEvent;

/// Trait for Voxen applications.
///
/// The framework handles window creation, GPU initialization, swapchain
/// management, frame synchronization, and the event loop; implementors
/// record their rendering commands in [`Self::render`].
pub trait VoxenApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the GPU context, swapchain, and frame scheduler
    /// have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering with the delta time in
    /// seconds.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record rendering commands for one frame.
    ///
    /// The frame scheduler has already acquired the swapchain image and
    /// begun the command buffer; it submits and presents afterwards. The
    /// recorded commands must leave the swapchain image in the
    /// present-source layout.
    fn render(&mut self, gpu: &GpuContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// The framework has already recreated the swapchain; recreate any
    /// size-dependent resources here.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events. Return `true` when the event was consumed.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown. The GPU is idle when called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
