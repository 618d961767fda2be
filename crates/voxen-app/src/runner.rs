//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voxen_gpu::error::GpuError;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::VoxenApp;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Voxen".to_string(),
            width: 1280,
            height: 720,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run a [`VoxenApp`] with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and runs the
/// event loop until the application exits.
pub fn run_app<A: VoxenApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    event_loop.run_app(&mut runner)?;

    Ok(())
}

/// Internal application runner implementing winit's `ApplicationHandler`.
struct AppRunner<A: VoxenApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: VoxenApp> {
    ctx: AppContext,
    app: A,
}

impl<A: VoxenApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app consume the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let result = self.state.as_mut().map(AppState::render_frame);
                match result {
                    Some(Err(e)) => {
                        // Frame-path errors mean a hung GPU or an unusable
                        // surface; report the failed stage and stop the loop.
                        error!("Render error: {e}");
                        if let Some(mut state) = self.state.take() {
                            state.cleanup();
                        }
                        event_loop.exit();
                    }
                    Some(Ok(())) => {
                        if let Some(state) = &self.state {
                            state.ctx.window.request_redraw();
                        }
                    }
                    None => {}
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: VoxenApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut ctx = AppContext::new(window, &self.config.title, self.config.validation)?;

        match A::init(&mut ctx) {
            Ok(app) => Ok(AppState { ctx, app }),
            Err(e) => {
                // tear down swapchain and surface before the GPU context
                // drops the instance
                ctx.cleanup();
                Err(e)
            }
        }
    }
}

impl<A: VoxenApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;

        self.app.update(&self.ctx, dt);

        // A zero-sized framebuffer (minimized window) cannot be rendered to
        let size = self.ctx.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        let desired_extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        let frame_number = self.ctx.scheduler.frame_counter();
        let AppContext {
            gpu,
            surface,
            swapchain,
            scheduler,
            ..
        } = &mut self.ctx;
        let app = &mut self.app;

        // SAFETY: single-threaded frame loop; all handles are valid
        unsafe {
            scheduler.draw_frame(gpu, surface, swapchain, desired_extent, |cmd, image, extent| {
                let mut frame = FrameContext {
                    command_buffer: cmd,
                    swapchain_image: image,
                    swapchain_extent: extent,
                    dt,
                    frame_number,
                };
                app.render(gpu, &mut frame)
                    .map_err(|e| GpuError::Other(format!("app render failed: {e}")))
            })?;
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.recreate_swapchain(width, height)?;
        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {width}x{height}");
        Ok(())
    }

    fn cleanup(&mut self) {
        info!(
            "Shutting down after {} frames",
            self.ctx.scheduler.frame_counter()
        );

        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // App resources first, then the context's own children
        self.app.cleanup(&mut self.ctx);
        self.ctx.cleanup();

        info!("Cleanup complete");
    }
}
