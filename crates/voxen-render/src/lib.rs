//! Compute ray marching pipeline for the Voxen renderer.
//!
//! This crate provides:
//! - Sparse voxel octree construction and GPU upload
//! - The ray marching compute pipeline and its descriptor state
//! - Per-frame command recording (transitions, dispatch, blit)

pub mod camera;
pub mod pipeline;
pub mod recorder;
pub mod scene;
pub mod target;

pub use camera::{OrbitCamera, RayMarchPushConstants};
pub use pipeline::{dispatch_counts, RayMarchPipeline, WORKGROUP_SIZE};
pub use recorder::record_frame;
pub use scene::{demo_scene, Voxel, VoxelOctree, VoxelScene, GRID_SIZE, OCTREE_DEPTH};
pub use target::RenderTarget;
