//! Application framework for the Voxen renderer.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate:
//! - Window creation and the winit event loop
//! - GPU context initialization
//! - Swapchain creation and recreation
//! - Frame scheduling and synchronization
//!
//! # Example
//!
//! ```no_run
//! use voxen_app::{run_app, AppConfig, AppContext, FrameContext, VoxenApp};
//! use voxen_gpu::GpuContext;
//!
//! struct MyApp;
//!
//! impl VoxenApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//!
//!     fn render(&mut self, gpu: &GpuContext, frame: &mut FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::VoxenApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use voxen_gpu::{GpuContext, GpuContextBuilder};
pub use winit::event::WindowEvent;
