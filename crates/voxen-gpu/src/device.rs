//! Physical device selection and queue-family partitioning.
//!
//! Every enumerated device is checked against the mandatory requirements
//! (swapchain extension, surface format/present-mode availability, a queue
//! family for each of the four roles). Devices that pass are scored by
//! device type and the best one wins.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::CStr;

/// Device extensions every candidate must support.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices for the four queue roles.
///
/// The indices are not necessarily distinct; on hardware exposing a single
/// omni-capable family all four collapse onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyAssignment {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
    pub compute: u32,
}

impl QueueFamilyAssignment {
    /// The distinct family indices, ascending.
    ///
    /// Duplicate roles collapse into a single entry, so this is the list
    /// of `DeviceQueueCreateInfo` entries device creation must request.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = vec![self.graphics, self.present, self.transfer, self.compute];
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// A physical device that passed the mandatory checks.
///
/// Produced once during startup; immutable after selection and owned by
/// the [`GpuContext`](crate::context::GpuContext) for its whole lifetime.
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub score: u32,
    pub queue_families: QueueFamilyAssignment,
}

impl DeviceCandidate {
    /// Device name as reported by the driver.
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Select the best physical device for presenting to `surface`.
///
/// Fails with [`GpuError::NoSuitableDevice`] when no device passes the
/// mandatory checks.
///
/// # Safety
/// The instance, surface loader, and surface must be valid.
pub unsafe fn select_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<DeviceCandidate> {
    let devices = instance.enumerate_physical_devices()?;

    let mut candidates = Vec::new();
    for device in devices {
        if let Some(candidate) = evaluate_device(instance, surface_loader, device, surface) {
            tracing::info!(
                "GPU candidate: {} (score {})",
                candidate.name(),
                candidate.score
            );
            candidates.push(candidate);
        }
    }

    let best = best_candidate(candidates)?;
    tracing::info!("Selected GPU: {}", best.name());
    tracing::debug!("Queue families: {:?}", best.queue_families);
    Ok(best)
}

/// Pick the highest-scored candidate; the first one found wins ties.
fn best_candidate(candidates: Vec<DeviceCandidate>) -> Result<DeviceCandidate> {
    let mut best: Option<DeviceCandidate> = None;
    for candidate in candidates {
        // strict comparison keeps the first-found candidate on equal scores
        if best.as_ref().map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }
    best.ok_or(GpuError::NoSuitableDevice)
}

/// Run the mandatory checks against one device.
///
/// A device lacking any requirement is rejected outright rather than
/// low-scored.
unsafe fn evaluate_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Option<DeviceCandidate> {
    let properties = instance.get_physical_device_properties(device);

    // Synchronization2 is used unconditionally on the frame path
    if properties.api_version < vk::API_VERSION_1_3 {
        return None;
    }

    if !has_required_extensions(instance, device) {
        return None;
    }

    if !has_surface_support(surface_loader, device, surface) {
        return None;
    }

    let families = query_family_capabilities(instance, surface_loader, device, surface);
    let queue_families = assign_queue_families(&families)?;

    Some(DeviceCandidate {
        physical_device: device,
        properties,
        memory_properties: instance.get_physical_device_memory_properties(device),
        score: device_type_score(properties.device_type),
        queue_families,
    })
}

/// Score a device by its type; higher is better.
fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 5,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::CPU => 2,
        vk::PhysicalDeviceType::OTHER => 1,
        _ => 0,
    }
}

unsafe fn has_required_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(available) = instance.enumerate_device_extension_properties(device) else {
        return false;
    };

    REQUIRED_DEVICE_EXTENSIONS.iter().all(|&required| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(required))
    })
}

/// Both the format and present-mode lists must be non-empty for the
/// surface to be usable at all.
unsafe fn has_surface_support(
    surface_loader: &ash::khr::surface::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> bool {
    let formats = surface_loader.get_physical_device_surface_formats(device, surface);
    let present_modes =
        surface_loader.get_physical_device_surface_present_modes(device, surface);

    matches!(formats, Ok(f) if !f.is_empty()) && matches!(present_modes, Ok(m) if !m.is_empty())
}

/// What one queue family can do.
#[derive(Debug, Clone, Copy)]
struct FamilyCapabilities {
    flags: vk::QueueFlags,
    present: bool,
}

unsafe fn query_family_capabilities(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Vec<FamilyCapabilities> {
    instance
        .get_physical_device_queue_family_properties(device)
        .iter()
        .enumerate()
        .map(|(index, props)| FamilyCapabilities {
            flags: props.queue_flags,
            present: surface_loader
                .get_physical_device_surface_support(device, index as u32, surface)
                .unwrap_or(false),
        })
        .collect()
}

/// How general-purpose a family is: the count of role bits it carries plus
/// one when it can present. More specialized families usually map to
/// dedicated hardware queues, which are faster for their one purpose, so
/// role assignment prefers the lowest generality.
fn generality(family: &FamilyCapabilities) -> u32 {
    let role_bits = family.flags
        & (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER);
    role_bits.as_raw().count_ones() + u32::from(family.present)
}

/// Pick the family for one role: lowest generality among the families
/// carrying `required` (or presentation support when `needs_present`).
///
/// The scan replaces on `<=`, so of several families at the minimum
/// generality the last one wins.
fn pick_family(
    families: &[FamilyCapabilities],
    required: vk::QueueFlags,
    needs_present: bool,
) -> Option<u32> {
    let mut best: Option<(u32, u32)> = None;

    for (index, family) in families.iter().enumerate() {
        let qualifies = if needs_present {
            family.present
        } else {
            family.flags.contains(required)
        };
        if !qualifies {
            continue;
        }

        let generality = generality(family);
        if best.map_or(true, |(_, best_generality)| generality <= best_generality) {
            best = Some((index as u32, generality));
        }
    }

    best.map(|(index, _)| index)
}

/// Assign all four roles, or `None` when any role has no qualifying family.
fn assign_queue_families(families: &[FamilyCapabilities]) -> Option<QueueFamilyAssignment> {
    Some(QueueFamilyAssignment {
        present: pick_family(families, vk::QueueFlags::empty(), true)?,
        graphics: pick_family(families, vk::QueueFlags::GRAPHICS, false)?,
        transfer: pick_family(families, vk::QueueFlags::TRANSFER, false)?,
        compute: pick_family(families, vk::QueueFlags::COMPUTE, false)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, present: bool) -> FamilyCapabilities {
        FamilyCapabilities { flags, present }
    }

    fn candidate(score: u32) -> DeviceCandidate {
        DeviceCandidate {
            physical_device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            score,
            queue_families: QueueFamilyAssignment {
                graphics: 0,
                present: 0,
                transfer: 0,
                compute: 0,
            },
        }
    }

    #[test]
    fn device_type_scoring_order() {
        assert_eq!(device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU), 5);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::VIRTUAL_GPU), 4);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU), 3);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::CPU), 2);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::OTHER), 1);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::from_raw(99)), 0);
    }

    #[test]
    fn highest_score_wins() {
        let best = best_candidate(vec![candidate(3), candidate(5), candidate(4)]).unwrap();
        assert_eq!(best.score, 5);
    }

    #[test]
    fn tie_keeps_first_candidate() {
        let mut a = candidate(5);
        a.queue_families.graphics = 7;
        let b = candidate(5);

        let best = best_candidate(vec![a, b]).unwrap();
        assert_eq!(best.queue_families.graphics, 7);
    }

    #[test]
    fn empty_candidate_list_is_an_error() {
        assert!(matches!(
            best_candidate(Vec::new()),
            Err(GpuError::NoSuitableDevice)
        ));
    }

    #[test]
    fn single_omni_family_collapses_all_roles() {
        let families = [family(
            vk::QueueFlags::GRAPHICS
                | vk::QueueFlags::COMPUTE
                | vk::QueueFlags::TRANSFER,
            true,
        )];

        let assignment = assign_queue_families(&families).unwrap();
        assert_eq!(
            assignment,
            QueueFamilyAssignment {
                graphics: 0,
                present: 0,
                transfer: 0,
                compute: 0,
            }
        );
        assert_eq!(assignment.unique_families(), vec![0]);
    }

    #[test]
    fn specialized_family_beats_general_one() {
        // family 0 does everything, family 1 is transfer-only
        let families = [
            family(
                vk::QueueFlags::GRAPHICS
                    | vk::QueueFlags::COMPUTE
                    | vk::QueueFlags::TRANSFER,
                true,
            ),
            family(vk::QueueFlags::TRANSFER, false),
        ];

        let assignment = assign_queue_families(&families).unwrap();
        assert_eq!(assignment.transfer, 1);
        assert_eq!(assignment.graphics, 0);
    }

    #[test]
    fn last_family_at_minimum_generality_wins() {
        // two equally specialized compute families
        let families = [
            family(
                vk::QueueFlags::GRAPHICS
                    | vk::QueueFlags::COMPUTE
                    | vk::QueueFlags::TRANSFER,
                true,
            ),
            family(vk::QueueFlags::COMPUTE, false),
            family(vk::QueueFlags::COMPUTE, false),
        ];

        let assignment = assign_queue_families(&families).unwrap();
        assert_eq!(assignment.compute, 2);
        assert_eq!(assignment.graphics, 0);
    }

    #[test]
    fn present_role_requires_presentation_support() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, true),
        ];

        let assignment = assign_queue_families(&families).unwrap();
        assert_eq!(assignment.present, 1);
    }

    #[test]
    fn missing_role_rejects_the_device() {
        // presentable but no graphics bit anywhere
        let families = [family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, true)];
        assert!(assign_queue_families(&families).is_none());
    }

    #[test]
    fn assigned_roles_always_satisfy_their_capability_bit() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, false),
        ];

        let assignment = assign_queue_families(&families).unwrap();
        assert!(families[assignment.graphics as usize]
            .flags
            .contains(vk::QueueFlags::GRAPHICS));
        assert!(families[assignment.compute as usize]
            .flags
            .contains(vk::QueueFlags::COMPUTE));
        assert!(families[assignment.transfer as usize]
            .flags
            .contains(vk::QueueFlags::TRANSFER));
        assert!(families[assignment.present as usize].present);
    }

    #[test]
    fn unique_families_are_deduplicated_and_sorted() {
        let assignment = QueueFamilyAssignment {
            graphics: 2,
            present: 0,
            transfer: 2,
            compute: 1,
        };
        assert_eq!(assignment.unique_families(), vec![0, 1, 2]);
    }
}
