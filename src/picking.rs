//! Colour-coded picking.
//!
//! The picking pass draws the scene a second time into an off-screen target.
//! Every pickable instance is drawn flat in a colour derived from its id: the
//! pass sets the off-screen flag uniform (so shaders skip lighting) and the
//! picking colour uniform right before each draw. Reading the pixel under the
//! pointer and looking the colour up again gives the instance there. A pixel
//! that matches nobody, such as the transparent background, picks nothing.
//!
//! Shaders opt in by declaring the two uniforms named in [`PickingConfig`],
//! `uOffscreen` and `uPickingColor` by default.

use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec3;
use thiserror::Error;

use crate::camera::Camera;
use crate::config::PickingConfig;
use crate::context::{Capability, ClearMask, GraphicsContext};
use crate::controller::InputEvent;
use crate::framebuffer::Framebuffer;
use crate::instance::Instance;
use crate::scene::{Scene, SceneError};
use crate::texture::TextureError;
use crate::uniform::{Uniform, UniformError, UniformValue};

/// Errors from the picking pass.
#[derive(Debug, Error)]
pub enum PickingError {
    #[error("failed to create the picking target")]
    Target(#[from] TextureError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
}

/// What happened to the selection in response to pointer input.
#[derive(Debug, Clone, PartialEq)]
pub enum PickEvent {
    Selected(String),
    /// The selected instance is being dragged with the drag modifier held.
    /// Deltas are in pixels since the press, `dy` positive upwards.
    Dragged {
        id: String,
        dx: f32,
        dy: f32,
        /// Camera rotation at the time, to map deltas into world space.
        rotation: Vec3,
    },
    Released(String),
}

/// Colour-coded picking over a [`Scene`].
///
/// Each pickable instance gets a flat colour derived from its id and is drawn
/// into an off-screen [`Framebuffer`]. Reading the pixel under the pointer and
/// mapping its colour back gives the instance, or `None` on background.
///
/// Holding the drag modifier while a selected instance is dragged reports
/// [`PickEvent::Dragged`] moves instead of rotating the camera.
pub struct PickingController<C: GraphicsContext> {
    ctx: Rc<C>,
    framebuffer: Framebuffer<C>,
    config: PickingConfig,
    codes: HashMap<String, [u8; 4]>,
    next_code: u32,
    selected: Option<String>,
    drag_modifier: bool,
    press: (f32, f32),
}

impl<C: GraphicsContext> PickingController<C> {
    /// Creates the off-screen target, sized to the drawing buffer. Its colour
    /// texture is given `unit`, which it never activates itself.
    pub fn new(ctx: Rc<C>, unit: u32, config: PickingConfig) -> Result<Self, PickingError> {
        let framebuffer = Framebuffer::for_canvas(ctx.clone(), unit)?;
        if config.tolerance > PickingConfig::MAX_TOLERANCE {
            log::warn!(
                "picking tolerance {} clamped to {}",
                config.tolerance,
                PickingConfig::MAX_TOLERANCE
            );
        }
        Ok(Self {
            ctx,
            framebuffer,
            config,
            codes: HashMap::new(),
            next_code: 1,
            selected: None,
            drag_modifier: false,
            press: (0.0, 0.0),
        })
    }

    pub fn config(&self) -> &PickingConfig {
        &self.config
    }

    pub fn framebuffer(&self) -> &Framebuffer<C> {
        &self.framebuffer
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Dragging moves the selection instead of the camera while this is set.
    /// Usually mirrors the control key.
    pub fn set_drag_modifier(&mut self, held: bool) {
        self.drag_modifier = held;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_modifier
    }

    /// The picking colour of `id`, assigning one on first use. Codes never
    /// change for the lifetime of the controller.
    pub fn code(&mut self, id: &str) -> [u8; 4] {
        if let Some(code) = self.codes.get(id) {
            return *code;
        }
        let code = encode(self.next_code, self.step());
        self.next_code += 1;
        self.codes.insert(id.to_string(), code);
        code
    }

    /// Codes are spaced so that two never fall within tolerance of each
    /// other.
    fn step(&self) -> u32 {
        self.config.effective_tolerance() as u32 * 2 + 1
    }

    /// Draws the pickable instances of `scene` into the off-screen target.
    pub fn render(&mut self, scene: &mut Scene<C>) -> Result<(), PickingError> {
        let ids: Vec<String> = scene.render_order().to_vec();
        for id in &ids {
            self.code(id);
        }

        let blending = self.ctx.is_enabled(Capability::Blend);
        self.ctx.disable(Capability::Blend);
        self.framebuffer.ensure_canvas_size();
        self.framebuffer.bind();
        let (width, height) = self.framebuffer.size();
        self.ctx.viewport(0, 0, width as i32, height as i32);
        self.ctx.clear_color(0.0, 0.0, 0.0, 0.0);
        self.ctx.clear(ClearMask::ALL);

        let mut failure = None;
        let result = scene.render_where(false, Instance::is_pickable, |instance| {
            let Some(code) = instance.id().and_then(|id| self.codes.get(id)) else {
                return;
            };
            if let Err(e) = self.override_uniforms(instance, *code) {
                failure.get_or_insert(e);
            }
        });

        let reset = self.reset_flags(scene);
        self.framebuffer.unbind();
        if blending {
            self.ctx.enable(Capability::Blend);
        }
        result?;
        reset?;
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn location(&self, instance: &Instance<C>, name: &str) -> Option<C::UniformLocation> {
        let program = instance.program();
        program
            .uniform_location(name)
            .cloned()
            .or_else(|| self.ctx.get_uniform_location(program.handle(), name))
    }

    fn override_uniforms(&self, instance: &Instance<C>, code: [u8; 4]) -> Result<(), UniformError> {
        if let Some(flag) = self.location(instance, &self.config.offscreen_uniform) {
            Uniform::<C>::new(self.config.offscreen_uniform.as_str(), true)
                .with_location(flag)
                .bind(&self.ctx)?;
        }
        if let Some(color) = self.location(instance, &self.config.color_uniform) {
            Uniform::<C>::new(self.config.color_uniform.as_str(), normalize(code))
                .with_location(color)
                .bind(&self.ctx)?;
        }
        Ok(())
    }

    /// Turns the off-screen flag back off so the next on-screen pass shades
    /// normally.
    fn reset_flags(&self, scene: &Scene<C>) -> Result<(), UniformError> {
        for instance in scene.instances().filter(|i| i.is_pickable()) {
            if let Some(flag) = self.location(instance, &self.config.offscreen_uniform) {
                instance.program().use_program();
                Uniform::<C>::new(self.config.offscreen_uniform.as_str(), UniformValue::Int(0))
                    .with_location(flag)
                    .bind(&self.ctx)?;
            }
        }
        Ok(())
    }

    /// The instance drawn at window position `(x, y)`, origin top-left, in the
    /// last picking pass.
    pub fn pick(&self, scene: &Scene<C>, x: f32, y: f32) -> Option<String> {
        let (_, height) = self.framebuffer.size();
        let (px, py) = (x.floor() as i32, height as i32 - 1 - y.floor() as i32);

        self.framebuffer.bind();
        let pixel = scene.pixel_color(px, py);
        self.framebuffer.unbind();

        let tolerance = self.config.effective_tolerance();
        let hit = scene
            .find_last(|instance| {
                instance
                    .id()
                    .and_then(|id| self.codes.get(id))
                    .is_some_and(|code| matches(code, &pixel, tolerance))
            })
            .and_then(|instance| instance.id())
            .map(str::to_string);
        log::debug!("pick at ({x}, {y}) read {pixel:?}: {hit:?}");
        hit
    }

    /// Picks under the pointer and remembers the result as the selection.
    pub fn pointer_down(&mut self, scene: &Scene<C>, x: f32, y: f32) -> Option<PickEvent> {
        self.press = (x, y);
        self.selected = self.pick(scene, x, y);
        self.selected.clone().map(PickEvent::Selected)
    }

    pub fn pointer_move(&mut self, x: f32, y: f32, rotation: Vec3) -> Option<PickEvent> {
        if !self.drag_modifier {
            return None;
        }
        let id = self.selected.clone()?;
        Some(PickEvent::Dragged {
            id,
            dx: x - self.press.0,
            dy: self.press.1 - y,
            rotation,
        })
    }

    pub fn pointer_up(&mut self) -> Option<PickEvent> {
        if !self.drag_modifier {
            return None;
        }
        self.selected.clone().map(PickEvent::Released)
    }

    /// Routes controller input to the pointer methods. Only a pressed button
    /// makes moves count as drags.
    pub fn handle(
        &mut self,
        scene: &Scene<C>,
        event: &InputEvent,
        camera: &Camera,
        button_down: bool,
    ) -> Option<PickEvent> {
        match *event {
            InputEvent::PointerDown { x, y } => self.pointer_down(scene, x, y),
            InputEvent::PointerMove { x, y } if button_down => {
                self.pointer_move(x, y, camera.rotation())
            }
            InputEvent::PointerUp => self.pointer_up(),
            _ => None,
        }
    }
}

/// Spreads `n` over the RGB channels in base `256 / step`, each digit scaled
/// by `step`. Alpha is always opaque so a code never equals the cleared
/// background.
fn encode(n: u32, step: u32) -> [u8; 4] {
    let base = 255 / step + 1;
    let digit = |i: u32| ((n / base.pow(i)) % base * step).min(255) as u8;
    [digit(2), digit(1), digit(0), 255]
}

fn normalize(code: [u8; 4]) -> [f32; 4] {
    code.map(|c| c as f32 / 255.0)
}

fn matches(code: &[u8; 4], pixel: &[u8; 4], tolerance: u8) -> bool {
    code.iter()
        .zip(pixel)
        .all(|(a, b)| a.abs_diff(*b) <= tolerance)
}
