//! Orbiting and tracking cameras.
//!
//! A [`Camera`] is plain transform state: a position, an azimuth (rotation
//! about Y) and an elevation (rotation about X), both in degrees. The view
//! matrix is derived from that state on every call, never cached.
//!
//! The two kinds differ only in the order the view transform is composed:
//!
//! - **Tracking**: rotate about the origin, then translate by `-position`. The
//!   camera turns in place, like walking with a flashlight.
//! - **Orbiting**: translate by `-position`, then rotate. The world spins in
//!   front of a camera that stays at a fixed distance.
//!
//! ```
//! use orrery::{Camera, CameraKind, Matrix4, Projection, Vec3};
//!
//! let mut camera = Camera::new(CameraKind::Orbiting, Projection::Perspective);
//! camera.set_position(Vec3::new(0.0, 0.0, 10.0));
//! camera.set_azimuth(90.0);
//!
//! let expected = Matrix4::identity()
//!     .translate(Vec3::new(0.0, 0.0, -10.0))
//!     .rotate_vec_deg(Vec3::new(0.0, 90.0, 0.0));
//! assert!(camera.view_matrix().approx_eq(&expected, 1e-5));
//! ```

use glam::Vec3;

use crate::config::CameraConfig;
use crate::math::{Matrix4, wrap_degrees};

/// How the view matrix composes position and rotation.
///
/// An orbiting camera translates first and then rotates, so the world turns
/// in front of it. A tracking camera rotates first and then translates, so it
/// moves through the world like a first-person viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraKind {
    #[default]
    Orbiting,
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Projection {
    #[default]
    Perspective,
    Orthographic,
}

/// Camera transform state.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    kind: CameraKind,
    initial_kind: CameraKind,
    projection: Projection,
    position: Vec3,
    initial_position: Vec3,
    /// Rotation about Y in degrees, always in `[0, 360)`.
    azimuth: f32,
    /// Rotation about X in degrees, always in `[0, 360)`.
    elevation: f32,
    /// Dolly steps applied so far.
    steps: f32,
    config: CameraConfig,
    /// Vertical field of view in degrees.
    fov: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraKind::default(), Projection::default())
    }
}

impl Camera {
    pub fn new(kind: CameraKind, projection: Projection) -> Self {
        Self::with_config(kind, projection, CameraConfig::default())
    }

    pub fn with_config(kind: CameraKind, projection: Projection, config: CameraConfig) -> Self {
        Self {
            kind,
            initial_kind: kind,
            projection,
            position: Vec3::ZERO,
            initial_position: Vec3::ZERO,
            azimuth: 0.0,
            elevation: 0.0,
            steps: 0.0,
            fov: config.fov,
            config,
        }
    }

    /// Builder form of [`Camera::set_position`] that also records the
    /// position `reset` returns to.
    pub fn at(mut self, position: Vec3) -> Self {
        self.initial_position = position;
        self.position = position;
        self
    }

    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: CameraKind) {
        self.kind = kind;
    }

    pub fn is_orbiting(&self) -> bool {
        self.kind == CameraKind::Orbiting
    }

    pub fn is_tracking(&self) -> bool {
        self.kind == CameraKind::Tracking
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_initial_position(&mut self, position: Vec3) {
        self.initial_position = position;
    }

    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    /// Sets the absolute azimuth, wrapped into `[0, 360)`.
    pub fn set_azimuth(&mut self, degrees: f32) {
        let delta = degrees - self.azimuth;
        self.azimuth = wrap_degrees(self.azimuth + delta);
    }

    pub fn elevation(&self) -> f32 {
        self.elevation
    }

    /// Sets the absolute elevation, wrapped into `[0, 360)`.
    pub fn set_elevation(&mut self, degrees: f32) {
        let delta = degrees - self.elevation;
        self.elevation = wrap_degrees(self.elevation + delta);
    }

    /// `(elevation, azimuth, 0)` in degrees.
    pub fn rotation(&self) -> Vec3 {
        Vec3::new(self.elevation, self.azimuth, 0.0)
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn set_fov(&mut self, degrees: f32) {
        self.fov = degrees;
    }

    pub fn near(&self) -> f32 {
        self.config.near
    }

    pub fn far(&self) -> f32 {
        self.config.far
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.config.near = near;
        self.config.far = far;
    }

    pub fn steps(&self) -> f32 {
        self.steps
    }

    /// Moves to an absolute dolly position of `steps`, applying the difference
    /// from the current one.
    ///
    /// Tracking cameras advance along their viewing axis. Orbiting cameras
    /// only change their distance, the Z coordinate of the position.
    pub fn dolly(&mut self, steps: f32) {
        let step = steps - self.steps;
        self.position = match self.kind {
            CameraKind::Tracking => {
                let normal = self.normal().normalize_or_zero();
                self.position - normal * step
            }
            CameraKind::Orbiting => {
                Vec3::new(self.position.x, self.position.y, self.position.z - step)
            }
        };
        self.steps = steps;
    }

    /// Back to the construction-time kind and initial position, with no
    /// rotation or dolly.
    pub fn reset(&mut self) {
        self.azimuth = 0.0;
        self.elevation = 0.0;
        self.steps = 0.0;
        self.fov = self.config.fov;
        self.kind = self.initial_kind;
        self.position = self.initial_position;
    }

    /// World-to-view transform for the current state.
    pub fn view_matrix(&self) -> Matrix4 {
        let identity = Matrix4::identity();
        let negated = -self.position;
        match self.kind {
            CameraKind::Tracking => identity.rotate_vec_deg(self.rotation()).translate(negated),
            CameraKind::Orbiting => identity.translate(negated).rotate_vec_deg(self.rotation()),
        }
    }

    /// Projection for a drawing buffer of `width × height` pixels. A zero
    /// height is treated as one pixel.
    pub fn projection_matrix(&self, width: u32, height: u32) -> Matrix4 {
        let (w, h) = (width as f32, height.max(1) as f32);
        match self.projection {
            Projection::Perspective => {
                Matrix4::perspective(self.fov, w / h, self.config.near, self.config.far)
            }
            Projection::Orthographic => {
                let fov = if self.fov == 0.0 { 1.0 } else { self.fov };
                Matrix4::orthographic(
                    -w / fov,
                    w / fov,
                    -h / fov,
                    h / fov,
                    -self.config.far,
                    self.config.far,
                )
            }
        }
    }

    /// The camera's X axis, read from the view matrix.
    pub fn right(&self) -> Vec3 {
        self.view_matrix().right_vector()
    }

    pub fn up(&self) -> Vec3 {
        self.view_matrix().up_vector()
    }

    /// The camera's Z axis, read from the view matrix.
    pub fn normal(&self) -> Vec3 {
        self.view_matrix().normal_vector()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angles_wrap_into_range() {
        let mut camera = Camera::default();
        camera.set_azimuth(370.0);
        assert!((camera.azimuth() - 10.0).abs() < 1e-4);
        camera.set_azimuth(-90.0);
        assert!((camera.azimuth() - 270.0).abs() < 1e-4);
        camera.set_elevation(720.0);
        assert_eq!(camera.elevation(), 0.0);
    }

    #[test]
    fn kinds_compose_differently() {
        let mut orbiting = Camera::new(CameraKind::Orbiting, Projection::Perspective);
        let mut tracking = Camera::new(CameraKind::Tracking, Projection::Perspective);
        for camera in [&mut orbiting, &mut tracking] {
            camera.set_position(Vec3::new(1.0, 2.0, 10.0));
            camera.set_azimuth(30.0);
            camera.set_elevation(15.0);
        }
        assert!(!orbiting.view_matrix().approx_eq(&tracking.view_matrix(), 1e-3));
    }

    #[test]
    fn tracking_view_rotates_then_translates() {
        let mut camera = Camera::new(CameraKind::Tracking, Projection::Perspective);
        camera.set_position(Vec3::new(0.0, 0.0, 5.0));
        camera.set_azimuth(45.0);
        let expected = Matrix4::identity()
            .rotate_vec_deg(Vec3::new(0.0, 45.0, 0.0))
            .translate(Vec3::new(0.0, 0.0, -5.0));
        assert!(camera.view_matrix().approx_eq(&expected, 1e-5));
    }

    #[test]
    fn orbiting_dolly_moves_along_z() {
        let mut camera = Camera::new(CameraKind::Orbiting, Projection::Perspective)
            .at(Vec3::new(0.0, 0.0, 10.0));
        camera.set_azimuth(90.0);
        camera.dolly(3.0);
        assert_eq!(camera.position(), Vec3::new(0.0, 0.0, 7.0));
        camera.dolly(1.0);
        assert_eq!(camera.position(), Vec3::new(0.0, 0.0, 9.0));
    }

    #[test]
    fn tracking_dolly_follows_the_view_axis() {
        let mut camera = Camera::new(CameraKind::Tracking, Projection::Perspective)
            .at(Vec3::new(0.0, 0.0, 10.0));
        camera.dolly(2.0);
        // Facing -Z with no rotation: advancing reduces z.
        assert!((camera.position() - Vec3::new(0.0, 0.0, 8.0)).length() < 1e-5);
    }

    #[test]
    fn reset_restores_initial_kind_and_position() {
        let mut camera = Camera::new(CameraKind::Orbiting, Projection::Perspective)
            .at(Vec3::new(0.0, 1.0, 4.0));
        camera.set_kind(CameraKind::Tracking);
        camera.set_azimuth(45.0);
        camera.dolly(2.0);
        camera.set_fov(60.0);
        camera.reset();
        assert_eq!(camera.kind(), CameraKind::Orbiting);
        assert_eq!(camera.position(), Vec3::new(0.0, 1.0, 4.0));
        assert_eq!(camera.azimuth(), 0.0);
        assert_eq!(camera.steps(), 0.0);
        assert_eq!(camera.fov(), 45.0);
    }

    #[test]
    fn projection_survives_zero_height() {
        let camera = Camera::default();
        let m = camera.projection_matrix(640, 0);
        assert!(m.to_cols_array().iter().all(|v| v.is_finite()));
        let ortho = Camera::new(CameraKind::Orbiting, Projection::Orthographic);
        assert!(!ortho.projection_matrix(640, 480).approx_eq(&m, 1e-3));
    }
}
