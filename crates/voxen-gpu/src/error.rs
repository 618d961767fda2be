//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No physical device passed the mandatory suitability checks.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Logical device creation failed.
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// Image acquisition did not complete within the timeout.
    #[error("Timed out waiting for a swapchain image")]
    SwapchainTimeout,

    /// No swapchain image was ready.
    #[error("No swapchain image ready")]
    SwapchainNotReady,

    /// A frame fence did not signal within the timeout.
    #[error("Timed out waiting for a frame to complete")]
    DrawTimeout,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Shader compilation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
