//! Vulkan instance creation.

use crate::error::Result;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

/// Validation layer enabled in debug builds.
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a Vulkan instance.
///
/// The windowing layer supplies the platform surface extensions through
/// `display_handle`; the debug-utils extension is requested on top so
/// validation messages can be routed into `tracing`.
///
/// # Safety
/// The entry must be a valid Vulkan entry point and the display handle
/// must belong to a live display connection.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    display_handle: RawDisplayHandle,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name).unwrap_or_default();

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"voxen")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extension_names = ash_window::enumerate_required_extensions(display_handle)?.to_vec();
    extension_names.push(ash::ext::debug_utils::NAME.as_ptr());

    // Only enable the validation layer when it is actually installed
    let available_layers = entry.enumerate_instance_layer_properties()?;
    let validation_available = available_layers.iter().any(|props| {
        CStr::from_ptr(props.layer_name.as_ptr()) == VALIDATION_LAYER
    });

    let mut layer_names: Vec<*const i8> = Vec::new();
    if enable_validation {
        if validation_available {
            layer_names.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!(
                "Validation layer {} not available",
                VALIDATION_LAYER.to_string_lossy()
            );
        }
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}
