//! Runtime configuration.
//!
//! ```
//! use orrery::RuntimeConfig;
//!
//! let config = RuntimeConfig::new()
//!     .clear_color([0.0, 0.0, 0.0, 1.0])
//!     .fov(60.0)
//!     .motion_factor(0.2);
//! assert_eq!(config.camera.fov, 60.0);
//! assert_eq!(config.picking.color_uniform, "uPickingColor");
//! ```

use crate::logging::LoggingConfig;

/// Default background: light grey, opaque.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.9, 0.9, 0.9, 1.0];

/// Perspective parameters. `fov` is the vertical field of view in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraConfig {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 45.0,
            near: 0.1,
            far: 5000.0,
        }
    }
}

/// How the picking pass talks to shaders and matches colours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickingConfig {
    /// `vec4` uniform receiving each instance's picking colour.
    pub color_uniform: String,
    /// Flag uniform set to 1 while drawing off-screen.
    pub offscreen_uniform: String,
    /// Largest per-channel difference, in 0-255 units, still counted as a hit.
    pub tolerance: u8,
}

impl PickingConfig {
    /// Largest usable tolerance. Above it the spacing between codes no longer
    /// fits in one channel.
    pub const MAX_TOLERANCE: u8 = 127;

    /// `tolerance`, clamped to [`PickingConfig::MAX_TOLERANCE`].
    pub fn effective_tolerance(&self) -> u8 {
        self.tolerance.min(Self::MAX_TOLERANCE)
    }
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            color_uniform: "uPickingColor".to_string(),
            offscreen_uniform: "uOffscreen".to_string(),
            tolerance: 1,
        }
    }
}

/// Everything a runtime needs that is not scene content, built with chained
/// setters from [`RuntimeConfig::new`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub clear_color: [f32; 4],
    pub camera: CameraConfig,
    /// Scales pointer and wheel deltas into camera changes.
    pub motion_factor: f32,
    pub picking: PickingConfig,
    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            clear_color: DEFAULT_CLEAR_COLOR,
            camera: CameraConfig::default(),
            motion_factor: 0.1,
            picking: PickingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn fov(mut self, degrees: f32) -> Self {
        self.camera.fov = degrees;
        self
    }

    pub fn clip_planes(mut self, near: f32, far: f32) -> Self {
        self.camera.near = near;
        self.camera.far = far;
        self
    }

    pub fn motion_factor(mut self, factor: f32) -> Self {
        self.motion_factor = factor;
        self
    }

    pub fn picking(mut self, picking: PickingConfig) -> Self {
        self.picking = picking;
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.logging.filter = Some(filter.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.clear_color, [0.9, 0.9, 0.9, 1.0]);
        assert_eq!(config.camera, CameraConfig { fov: 45.0, near: 0.1, far: 5000.0 });
        assert_eq!(config.motion_factor, 0.1);
        assert_eq!(config.picking.offscreen_uniform, "uOffscreen");
        assert_eq!(config.picking.tolerance, 1);
        assert!(config.logging.filter.is_none());
    }

    #[test]
    fn builder_overrides() {
        let config = RuntimeConfig::new()
            .clip_planes(1.0, 100.0)
            .log_filter("orrery=debug");
        assert_eq!(config.camera.near, 1.0);
        assert_eq!(config.camera.far, 100.0);
        assert_eq!(config.logging.filter.as_deref(), Some("orrery=debug"));
    }
}
