//! Vulkan bootstrap and frame execution core for the Voxen renderer.
//!
//! This crate provides:
//! - Instance and logical device management
//! - Physical device selection and queue-family partitioning
//! - Memory allocation via gpu-allocator
//! - Swapchain handling with recreation on resize
//! - Double-buffered frame scheduling

pub mod command;
pub mod context;
pub mod debug;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use context::{GpuContext, GpuContextBuilder, QueueSet};
pub use device::{DeviceCandidate, QueueFamilyAssignment};
pub use error::{GpuError, Result};
pub use frame::{FrameScheduler, FRAMES_IN_FLIGHT};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::ComputePipeline;
pub use surface::{SurfaceContext, SurfaceSupport};
pub use swapchain::Swapchain;
