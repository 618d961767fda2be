//! GPU context management.

use crate::debug::DebugMessenger;
use crate::device::{select_device, DeviceCandidate, QueueFamilyAssignment, REQUIRED_DEVICE_EXTENSIONS};
use crate::error::{GpuError, Result};
use crate::instance::create_instance;
use crate::memory::GpuAllocator;
use crate::surface::SurfaceContext;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// The four logical queues retrieved at device-creation time.
///
/// Owned by the context; the handles live as long as the device.
#[derive(Clone, Copy)]
pub struct QueueSet {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
    pub transfer: vk::Queue,
    pub compute: vk::Queue,
}

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug: DebugMessenger,
    pub(crate) candidate: DeviceCandidate,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) queues: QueueSet,
    pub(crate) allocator: Mutex<GpuAllocator>,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the selected physical device candidate.
    pub fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.candidate.physical_device
    }

    /// Get the queue family assignment.
    pub fn queue_families(&self) -> QueueFamilyAssignment {
        self.candidate.queue_families
    }

    /// Get the four logical queues.
    pub fn queues(&self) -> QueueSet {
        self.queues
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for the device to go idle.
    ///
    /// Required before destroying any GPU object that in-flight work may
    /// still reference.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Allocator frees its VkDeviceMemory before the device goes away
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.debug.destroy();
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Voxen".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context and the surface for the given window.
    ///
    /// The surface is created before device selection because the present
    /// queue role and the surface-support checks both need it. The
    /// returned [`SurfaceContext`] must be destroyed before the context is
    /// dropped.
    pub fn build<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display_handle = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("no display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("no window handle: {e}")))?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let instance = unsafe {
            create_instance(&entry, &self.app_name, self.enable_validation, display_handle)
        }?;

        // From here on every failure unwinds what was created so far, in
        // reverse creation order
        let mut debug = match unsafe { DebugMessenger::new(&entry, &instance) } {
            Ok(debug) => debug,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe {
                    debug.destroy();
                    instance.destroy_instance(None);
                }
                return Err(GpuError::SurfaceCreation(e.to_string()));
            }
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let startup_failed = |mut debug: DebugMessenger, err: GpuError| {
            unsafe {
                surface_loader.destroy_surface(surface, None);
                debug.destroy();
                instance.destroy_instance(None);
            }
            Err(err)
        };

        let candidate = match unsafe { select_device(&instance, &surface_loader, surface) } {
            Ok(candidate) => candidate,
            Err(e) => return startup_failed(debug, e),
        };

        let (device, queues) = match unsafe { create_device(&instance, &candidate) } {
            Ok(built) => built,
            Err(e) => return startup_failed(debug, e),
        };
        let device = Arc::new(device);

        let allocator = match unsafe {
            GpuAllocator::new(&instance, device.clone(), candidate.physical_device)
        } {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return startup_failed(debug, e);
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let context = GpuContext {
            entry,
            instance,
            debug,
            candidate,
            device,
            queues,
            allocator: Mutex::new(allocator),
        };

        let surface = SurfaceContext {
            surface,
            surface_loader,
            swapchain_loader,
        };

        Ok((context, surface))
    }
}

/// Create the logical device and retrieve the four role queues.
///
/// Duplicate family indices across roles collapse into a single
/// queue-creation entry; the list is sorted by family index.
///
/// # Safety
/// The instance and candidate must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    candidate: &DeviceCandidate,
) -> Result<(ash::Device, QueueSet)> {
    let families = candidate.queue_families;

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const i8> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let mut vulkan_1_3_features =
        vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut vulkan_1_3_features);

    let device = instance
        .create_device(candidate.physical_device, &device_create_info, None)
        .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

    let queues = QueueSet {
        graphics: device.get_device_queue(families.graphics, 0),
        present: device.get_device_queue(families.present, 0),
        transfer: device.get_device_queue(families.transfer, 0),
        compute: device.get_device_queue(families.compute, 0),
    };

    Ok((device, queues))
}
