//! Camera and push-constant generation for the ray marching pass.

use ash::vk;
use glam::Vec3;

/// Push constants for the ray marching compute shader.
///
/// This structure must match the `Camera` push-constant block in
/// `ray_march.comp`: four `vec3 + float` rows, 64 bytes total.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RayMarchPushConstants {
    /// Ray origin in voxel-grid space.
    pub origin: [f32; 3],
    /// Seconds since startup.
    pub time: f32,
    /// View direction.
    pub forward: [f32; 3],
    /// Width over height of the render target.
    pub aspect: f32,
    /// Camera right vector.
    pub right: [f32; 3],
    /// Tangent of half the vertical field of view.
    pub fov_tan: f32,
    /// Camera up vector.
    pub up: [f32; 3],
    /// Output brightness multiplier.
    pub exposure: f32,
}

impl RayMarchPushConstants {
    /// Size in bytes (must match the shader block).
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
}

/// Camera orbiting a fixed target point.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// Point the camera looks at.
    pub target: Vec3,
    /// Distance from the target.
    pub distance: f32,
    /// Rotation around the vertical axis, radians.
    pub yaw: f32,
    /// Elevation angle, radians.
    pub pitch: f32,
    /// Vertical field of view, radians.
    pub fov_y: f32,
    /// Output brightness multiplier.
    pub exposure: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::splat(16.0),
            distance: 48.0,
            yaw: 0.0,
            pitch: 0.5,
            fov_y: std::f32::consts::FRAC_PI_3,
            exposure: 1.0,
        }
    }
}

impl OrbitCamera {
    /// Camera position in world space.
    pub fn eye(&self) -> Vec3 {
        let offset = Vec3::new(
            self.pitch.cos() * self.yaw.cos(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.sin(),
        ) * self.distance;
        self.target + offset
    }

    /// Build the push constants for the given output extent.
    pub fn push_constants(&self, extent: vk::Extent2D, time: f32) -> RayMarchPushConstants {
        let eye = self.eye();
        let forward = (self.target - eye).normalize();
        let right = forward.cross(Vec3::Y).normalize();
        let up = right.cross(forward);

        RayMarchPushConstants {
            origin: eye.to_array(),
            time,
            forward: forward.to_array(),
            aspect: extent.width as f32 / extent.height.max(1) as f32,
            right: right.to_array(),
            fov_tan: (self.fov_y * 0.5).tan(),
            up: up.to_array(),
            exposure: self.exposure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    #[test]
    fn push_constants_size() {
        // Four vec3+float rows in the shader block
        assert_eq!(RayMarchPushConstants::SIZE, 64);
    }

    #[test]
    fn push_constants_layout() {
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, origin), 0);
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, time), 12);
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, forward), 16);
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, aspect), 28);
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, right), 32);
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, fov_tan), 44);
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, up), 48);
        assert_eq!(std::mem::offset_of!(RayMarchPushConstants, exposure), 60);
    }

    #[test]
    fn camera_basis_is_orthonormal() {
        let camera = OrbitCamera {
            yaw: 1.2,
            pitch: 0.4,
            ..Default::default()
        };
        let pc = camera.push_constants(EXTENT, 0.0);

        let forward = Vec3::from_array(pc.forward);
        let right = Vec3::from_array(pc.right);
        let up = Vec3::from_array(pc.up);

        assert!((forward.length() - 1.0).abs() < 1e-5);
        assert!((right.length() - 1.0).abs() < 1e-5);
        assert!((up.length() - 1.0).abs() < 1e-5);
        assert!(forward.dot(right).abs() < 1e-5);
        assert!(forward.dot(up).abs() < 1e-5);
        assert!(right.dot(up).abs() < 1e-5);
    }

    #[test]
    fn camera_looks_at_target() {
        let camera = OrbitCamera::default();
        let pc = camera.push_constants(EXTENT, 0.0);

        let eye = Vec3::from_array(pc.origin);
        let forward = Vec3::from_array(pc.forward);
        let to_target = (camera.target - eye).normalize();

        assert!((forward - to_target).length() < 1e-5);
        assert!((eye.distance(camera.target) - camera.distance).abs() < 1e-3);
    }
}
