//! Surface management for windowed rendering.

use crate::context::GpuContext;
use crate::error::Result;
use crate::swapchain::Swapchain;
use ash::vk;

/// Surface context for windowed rendering.
///
/// Owns the Vulkan surface plus the surface/swapchain extension loaders.
/// Created together with the [`GpuContext`] (the surface must exist before
/// device selection) and destroyed before it.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Query what the surface supports on the selected device.
    pub fn support(&self, gpu: &GpuContext) -> Result<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(gpu.physical_device(), self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Create a swapchain for this surface.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        desired_extent: vk::Extent2D,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Swapchain> {
        let support = self.support(gpu)?;

        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            self.surface,
            &support,
            desired_extent,
            gpu.queue_families(),
            old_swapchain,
        )
    }

    /// Replace the swapchain in place, retiring the old one.
    ///
    /// The old handle is passed as `old_swapchain` so the driver can carry
    /// over resources; its views and handle are destroyed here.
    ///
    /// # Safety
    /// The GPU must be idle; no in-flight frame may reference the old
    /// swapchain images.
    pub unsafe fn recreate_swapchain(
        &self,
        gpu: &GpuContext,
        swapchain: &mut Swapchain,
        desired_extent: vk::Extent2D,
    ) -> Result<()> {
        let replacement =
            self.create_swapchain(gpu, desired_extent, Some(swapchain.handle()))?;

        swapchain.destroy(gpu.device(), &self.swapchain_loader);
        *swapchain = replacement;

        tracing::info!(
            "Swapchain recreated: {}x{}",
            swapchain.extent.width,
            swapchain.extent.height
        );

        Ok(())
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// Every swapchain created for this surface must be destroyed first.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}

/// Surface support query result.
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
