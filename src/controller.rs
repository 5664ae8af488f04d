//! Input events to camera changes.
//!
//! [`Controller`] is a reducer: it folds a stream of [`InputEvent`]s into
//! [`CameraUpdate`]s without touching the camera itself. The caller decides
//! when to [`CameraUpdate::apply`] them, usually right away, so the next frame
//! sees the new state.
//!
//! ```
//! use orrery::controller::{Controller, InputEvent};
//! use orrery::{Camera, CameraKind, Projection};
//!
//! let mut camera = Camera::new(CameraKind::Orbiting, Projection::Perspective);
//! let mut controller = Controller::new(0.1);
//!
//! for event in [
//!     InputEvent::PointerDown { x: 100.0, y: 100.0 },
//!     InputEvent::PointerMove { x: 150.0, y: 100.0 },
//!     InputEvent::PointerUp,
//! ] {
//!     controller.handle(&event, &camera).apply(&mut camera);
//! }
//! assert!((camera.azimuth() - 5.0).abs() < 1e-4);
//! ```

use crate::camera::Camera;

/// Keys the controller reacts to. Everything else arrives as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    W,
    A,
    S,
    D,
    Other,
}

/// Source-independent input. Coordinates are window pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    /// Positive `delta_y` scrolls away from the user.
    Wheel { delta_y: f32 },
    PinchStart,
    /// Current distance between the two touch points.
    PinchMove { distance: f32 },
    PinchEnd,
    Key(Key),
    /// Canvas size, used to centre follow-mouse look.
    Resized { width: u32, height: u32 },
}

/// Absolute camera targets produced by one event. `None` leaves the
/// corresponding parameter alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraUpdate {
    pub azimuth: Option<f32>,
    pub elevation: Option<f32>,
    pub dolly: Option<f32>,
}

impl CameraUpdate {
    pub fn is_empty(&self) -> bool {
        self.azimuth.is_none() && self.elevation.is_none() && self.dolly.is_none()
    }

    pub fn apply(&self, camera: &mut Camera) {
        if let Some(dolly) = self.dolly {
            camera.dolly(dolly);
        }
        if let Some(elevation) = self.elevation {
            camera.set_elevation(elevation);
        }
        if let Some(azimuth) = self.azimuth {
            camera.set_azimuth(azimuth);
        }
    }
}

/// Turns [`InputEvent`]s into [`CameraUpdate`]s.
///
/// The controller only remembers the interaction in progress: where a drag
/// started, the last pinch distance and the accumulated dolly. It never
/// touches a scene.
#[derive(Debug, Clone)]
pub struct Controller {
    motion_factor: f32,
    follow_mouse: bool,
    /// Set while something else, such as a picking drag, owns the pointer.
    drag_locked: bool,
    dragging: bool,
    pinching: bool,
    pointer: (f32, f32),
    /// Last pinch distance, `None` until the first move of a pinch.
    pinch_distance: Option<f32>,
    dolly: f32,
    viewport: (u32, u32),
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Controller {
    pub fn new(motion_factor: f32) -> Self {
        Self {
            motion_factor,
            follow_mouse: false,
            drag_locked: false,
            dragging: false,
            pinching: false,
            pointer: (0.0, 0.0),
            pinch_distance: None,
            dolly: 0.0,
            viewport: (0, 0),
        }
    }

    pub fn motion_factor(&self) -> f32 {
        self.motion_factor
    }

    pub fn set_motion_factor(&mut self, factor: f32) {
        self.motion_factor = factor;
    }

    /// With follow-mouse on, a tracking camera looks towards the pointer
    /// whenever no button is held.
    pub fn set_follow_mouse(&mut self, follow: bool) {
        self.follow_mouse = follow;
    }

    pub fn set_drag_locked(&mut self, locked: bool) {
        self.drag_locked = locked;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Accumulated dolly target.
    pub fn dolly(&self) -> f32 {
        self.dolly
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    /// Folds one event into the controller state and returns the camera
    /// change it implies. `camera` is only read.
    pub fn handle(&mut self, event: &InputEvent, camera: &Camera) -> CameraUpdate {
        match *event {
            InputEvent::PointerDown { x, y } => {
                self.dragging = true;
                self.pointer = (x, y);
                CameraUpdate::default()
            }
            InputEvent::PointerMove { x, y } if self.dragging => self.drag(x, y, camera),
            InputEvent::PointerMove { x, y } if self.follow_mouse && camera.is_tracking() => {
                self.look(x, y, camera)
            }
            InputEvent::PointerMove { x, y } => {
                self.pointer = (x, y);
                CameraUpdate::default()
            }
            InputEvent::PointerUp => {
                self.dragging = false;
                CameraUpdate::default()
            }
            InputEvent::Wheel { delta_y } => self.set_dolly(self.dolly - delta_y * self.motion_factor),
            InputEvent::PinchStart => {
                self.pinching = true;
                self.dragging = false;
                self.pinch_distance = None;
                CameraUpdate::default()
            }
            InputEvent::PinchMove { distance } if self.pinching => self.pinch(distance),
            InputEvent::PinchMove { .. } => CameraUpdate::default(),
            InputEvent::PinchEnd => {
                self.pinching = false;
                self.pinch_distance = None;
                CameraUpdate::default()
            }
            InputEvent::Key(key) => self.key(key, camera),
            InputEvent::Resized { width, height } => {
                self.set_viewport(width, height);
                CameraUpdate::default()
            }
        }
    }

    fn drag(&mut self, x: f32, y: f32, camera: &Camera) -> CameraUpdate {
        let (last_x, last_y) = std::mem::replace(&mut self.pointer, (x, y));
        if self.drag_locked {
            return CameraUpdate::default();
        }
        let (dx, dy) = (x - last_x, y - last_y);
        self.rotation(
            camera,
            camera.elevation() - dy * self.motion_factor,
            camera.azimuth() + dx * self.motion_factor,
        )
    }

    fn look(&mut self, x: f32, y: f32, camera: &Camera) -> CameraUpdate {
        self.pointer = (x, y);
        let (width, height) = (self.viewport.0 as f32, self.viewport.1 as f32);
        let azimuth = (x - width / 2.0) * self.motion_factor;
        let elevation = -(y - height / 2.0) * self.motion_factor;
        self.rotation(camera, elevation, azimuth)
    }

    fn pinch(&mut self, distance: f32) -> CameraUpdate {
        let step = distance * self.motion_factor * 0.5;
        // Fingers moving apart zoom out.
        let spreading = self.pinch_distance.is_none_or(|previous| distance > previous);
        self.pinch_distance = Some(distance);
        if spreading {
            self.set_dolly(self.dolly - step)
        } else {
            self.set_dolly(self.dolly + step)
        }
    }

    fn key(&mut self, key: Key, camera: &Camera) -> CameraUpdate {
        if !camera.is_tracking() {
            return CameraUpdate::default();
        }
        let (azimuth, dolly) = match key {
            Key::ArrowRight | Key::D => (camera.azimuth() + 1.0, self.dolly),
            Key::ArrowLeft | Key::A => (camera.azimuth() - 1.0, self.dolly),
            Key::ArrowUp | Key::W => (camera.azimuth(), self.dolly + 1.0),
            Key::ArrowDown | Key::S => (camera.azimuth(), self.dolly - 1.0),
            Key::Other => return CameraUpdate::default(),
        };
        let mut update = self.set_dolly(dolly);
        let rotation = self.rotation(camera, camera.elevation(), azimuth);
        update.azimuth = rotation.azimuth;
        update.elevation = rotation.elevation;
        update
    }

    fn set_dolly(&mut self, dolly: f32) -> CameraUpdate {
        if dolly == self.dolly {
            return CameraUpdate::default();
        }
        self.dolly = dolly;
        CameraUpdate {
            dolly: Some(dolly),
            ..CameraUpdate::default()
        }
    }

    fn rotation(&self, camera: &Camera, elevation: f32, azimuth: f32) -> CameraUpdate {
        if elevation == camera.elevation() && azimuth == camera.azimuth() {
            return CameraUpdate::default();
        }
        CameraUpdate {
            azimuth: Some(azimuth),
            elevation: Some(elevation),
            dolly: None,
        }
    }
}
