//! Voxen Demo Viewer
//!
//! Renders a procedural voxel scene with compute ray marching and an
//! orbiting camera.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p voxen-viewer
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g. info, debug, trace)

mod app;

use voxen_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_app::<Viewer>(AppConfig::new("Voxen Viewer").with_size(WIDTH, HEIGHT))
}
