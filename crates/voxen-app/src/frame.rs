//! Per-frame context for rendering.

use ash::vk;

/// Context for the frame currently being recorded.
pub struct FrameContext {
    /// Command buffer in the recording state.
    pub command_buffer: vk::CommandBuffer,
    /// The acquired swapchain image.
    pub swapchain_image: vk::Image,
    /// Current swapchain extent.
    pub swapchain_extent: vk::Extent2D,
    /// Delta time since the last frame in seconds.
    pub dt: f32,
    /// Current frame number.
    pub frame_number: u64,
}
