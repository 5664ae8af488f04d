//! winit front end for the [`Controller`](crate::controller::Controller).
//!
//! Window events carry more than the controller needs and spread one gesture
//! over several events (a click is a cursor move followed by a button press).
//! [`InputAdapter`] keeps the little state needed to turn them into
//! [`InputEvent`]s.

use std::collections::BTreeMap;

use winit::event::{ElementState, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::controller::{InputEvent, Key};

/// Pixels per scrolled line, for devices reporting whole lines.
const LINE_HEIGHT: f32 = 100.0;

/// Translates winit window events into [`InputEvent`]s, tracking the cursor,
/// the ctrl modifier and active touches between events.
#[derive(Debug, Default)]
pub struct InputAdapter {
    cursor: (f32, f32),
    ctrl: bool,
    /// Active touch points by finger id.
    touches: BTreeMap<u64, (f32, f32)>,
}

impl InputAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last cursor position in window pixels.
    pub fn cursor(&self) -> (f32, f32) {
        self.cursor
    }

    /// Whether a control key is held. Picking drags selected instances only
    /// while it is.
    pub fn ctrl_pressed(&self) -> bool {
        self.ctrl
    }

    /// Converts one window event. Most events produce nothing; a finger
    /// joining a touch can end a drag and start a pinch at once.
    pub fn translate(&mut self, event: &WindowEvent) -> Vec<InputEvent> {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as f32, position.y as f32);
                self.cursor = (x, y);
                vec![InputEvent::PointerMove { x, y }]
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let (x, y) = self.cursor;
                match state {
                    ElementState::Pressed => vec![InputEvent::PointerDown { x, y }],
                    ElementState::Released => vec![InputEvent::PointerUp],
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * LINE_HEIGHT,
                    MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
                };
                vec![InputEvent::Wheel { delta_y }]
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.ctrl = modifiers.state().control_key();
                Vec::new()
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(code) => vec![InputEvent::Key(map_key(code))],
                    PhysicalKey::Unidentified(_) => Vec::new(),
                }
            }
            WindowEvent::Touch(touch) => {
                let at = (touch.location.x as f32, touch.location.y as f32);
                self.touch(touch.id, touch.phase, at)
            }
            WindowEvent::Resized(size) => vec![InputEvent::Resized {
                width: size.width,
                height: size.height,
            }],
            _ => Vec::new(),
        }
    }

    fn touch(&mut self, id: u64, phase: TouchPhase, (x, y): (f32, f32)) -> Vec<InputEvent> {
        let before = self.touches.len();
        match phase {
            TouchPhase::Started => {
                self.touches.insert(id, (x, y));
            }
            TouchPhase::Moved => {
                self.touches.insert(id, (x, y));
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.touches.remove(&id);
            }
        }
        let after = self.touches.len();

        let mut events = Vec::new();
        if before == 2 && after != 2 {
            events.push(InputEvent::PinchEnd);
        }
        if before == 1 && after != 1 {
            events.push(InputEvent::PointerUp);
        }
        match (phase, after) {
            (TouchPhase::Started, 1) => events.push(InputEvent::PointerDown { x, y }),
            (TouchPhase::Started, 2) => events.push(InputEvent::PinchStart),
            (TouchPhase::Moved, 1) => events.push(InputEvent::PointerMove { x, y }),
            (TouchPhase::Moved, 2) => {
                if let Some(distance) = self.pinch_distance() {
                    events.push(InputEvent::PinchMove { distance });
                }
            }
            _ => {}
        }
        events
    }

    fn pinch_distance(&self) -> Option<f32> {
        let mut points = self.touches.values();
        let (ax, ay) = points.next()?;
        let (bx, by) = points.next()?;
        Some(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
    }
}

pub fn map_key(code: KeyCode) -> Key {
    match code {
        KeyCode::ArrowUp => Key::ArrowUp,
        KeyCode::ArrowDown => Key::ArrowDown,
        KeyCode::ArrowLeft => Key::ArrowLeft,
        KeyCode::ArrowRight => Key::ArrowRight,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        _ => Key::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::{PhysicalPosition, PhysicalSize};
    use winit::event::{DeviceId, Touch};

    fn device() -> DeviceId {
        // SAFETY: only used to build synthetic events.
        unsafe { DeviceId::dummy() }
    }

    fn moved(x: f64, y: f64) -> WindowEvent {
        WindowEvent::CursorMoved {
            device_id: device(),
            position: PhysicalPosition::new(x, y),
        }
    }

    fn touch(id: u64, phase: TouchPhase, x: f64, y: f64) -> WindowEvent {
        WindowEvent::Touch(Touch {
            device_id: device(),
            phase,
            location: PhysicalPosition::new(x, y),
            force: None,
            id,
        })
    }

    #[test]
    fn clicks_use_the_last_cursor_position() {
        let mut adapter = InputAdapter::new();
        assert_eq!(
            adapter.translate(&moved(12.0, 34.0)),
            [InputEvent::PointerMove { x: 12.0, y: 34.0 }]
        );
        let press = WindowEvent::MouseInput {
            device_id: device(),
            state: ElementState::Pressed,
            button: MouseButton::Left,
        };
        assert_eq!(
            adapter.translate(&press),
            [InputEvent::PointerDown { x: 12.0, y: 34.0 }]
        );
        let right = WindowEvent::MouseInput {
            device_id: device(),
            state: ElementState::Pressed,
            button: MouseButton::Right,
        };
        assert!(adapter.translate(&right).is_empty());
    }

    #[test]
    fn wheel_lines_become_pixels() {
        let mut adapter = InputAdapter::new();
        let wheel = WindowEvent::MouseWheel {
            device_id: device(),
            delta: MouseScrollDelta::LineDelta(0.0, 1.0),
            phase: TouchPhase::Moved,
        };
        assert_eq!(
            adapter.translate(&wheel),
            [InputEvent::Wheel { delta_y: -100.0 }]
        );
    }

    #[test]
    fn two_fingers_pinch() {
        let mut adapter = InputAdapter::new();
        assert_eq!(
            adapter.translate(&touch(1, TouchPhase::Started, 0.0, 0.0)),
            [InputEvent::PointerDown { x: 0.0, y: 0.0 }]
        );
        assert_eq!(
            adapter.translate(&touch(2, TouchPhase::Started, 30.0, 0.0)),
            [InputEvent::PointerUp, InputEvent::PinchStart]
        );
        assert_eq!(
            adapter.translate(&touch(2, TouchPhase::Moved, 30.0, 40.0)),
            [InputEvent::PinchMove { distance: 50.0 }]
        );
        assert_eq!(
            adapter.translate(&touch(2, TouchPhase::Ended, 30.0, 40.0)),
            [InputEvent::PinchEnd]
        );
    }

    #[test]
    fn resize_and_keys() {
        let mut adapter = InputAdapter::new();
        assert_eq!(
            adapter.translate(&WindowEvent::Resized(PhysicalSize::new(640, 480))),
            [InputEvent::Resized { width: 640, height: 480 }]
        );
        assert_eq!(map_key(KeyCode::KeyW), Key::W);
        assert_eq!(map_key(KeyCode::ArrowLeft), Key::ArrowLeft);
        assert_eq!(map_key(KeyCode::Space), Key::Other);
        assert!(!adapter.ctrl_pressed());
    }
}
