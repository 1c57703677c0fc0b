//! Orbit camera around the world origin.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use isoflow_engine::render::Viewport;

/// GPU layout of the camera block shared by the surface and edge shaders.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    /// xyz = eye position in world space.
    pub eye: [f32; 4],
}

/// Circles the origin at a fixed distance and elevation.
///
/// Advances with elapsed time only; there is no input handling.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub distance: f32,
    /// Elevation above the xz-plane, in radians.
    pub elevation: f32,
    /// Angle around +y, in radians.
    pub azimuth: f32,
    /// Radians per second.
    pub orbit_speed: f32,
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
    aspect: f32,
}

impl OrbitCamera {
    pub fn new(distance: f32, orbit_speed: f32) -> Self {
        Self {
            distance,
            elevation: 0.45,
            azimuth: 0.0,
            orbit_speed,
            fov_y: 45f32.to_radians(),
            z_near: 0.05,
            z_far: distance * 4.0 + 10.0,
            aspect: 4.0 / 3.0,
        }
    }

    /// Frames a bounding sphere of `radius` so it fills most of the view.
    pub fn framing(radius: f32, orbit_speed: f32) -> Self {
        let fov_y = 45f32.to_radians();
        let distance = (radius / (fov_y * 0.5).sin()) * 1.1;
        Self::new(distance.max(0.1), orbit_speed)
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Adopts the viewport's aspect ratio. Invalid viewports are ignored.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport.is_valid() {
            self.aspect = viewport.aspect();
        }
    }

    /// Sets the orbit angle from the time since start.
    pub fn update(&mut self, elapsed_secs: f32) {
        self.azimuth = (elapsed_secs * self.orbit_speed).rem_euclid(std::f32::consts::TAU);
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_e, cos_e) = self.elevation.sin_cos();
        let (sin_a, cos_a) = self.azimuth.sin_cos();
        Vec3::new(cos_e * sin_a, sin_e, cos_e * cos_a) * self.distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_proj().to_cols_array_2d(),
            eye: self.eye().extend(1.0).to_array(),
        }
    }
}
