//! The scene container.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::camera::Camera;
use crate::config::DEFAULT_CLEAR_COLOR;
use crate::context::{Capability, ClearMask, DepthFunc, GraphicsContext};
use crate::instance::{Instance, InstanceError};
use crate::math::{AlgebraError, Matrix4, compute_normal_matrix};
use crate::program::{MODEL_VIEW_MATRIX, NORMAL_MATRIX, PROJECTION_MATRIX};
use crate::texture::{ImageSource, TextureError};
use crate::uniform::{Uniform, UniformError, UniformOptions, UniformValue};

use super::order::RenderOrder;

/// Errors from scene bookkeeping and rendering.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("an instance with id `{0}` is already in the scene")]
    DuplicateId(String),
    #[error(transparent)]
    Algebra(#[from] AlgebraError),
    #[error(transparent)]
    Instance(#[from] InstanceError),
}

impl From<UniformError> for SceneError {
    fn from(e: UniformError) -> Self {
        SceneError::Instance(e.into())
    }
}

/// An ordered set of instances plus the view and projection they are drawn
/// with.
///
/// Instances are drawn in insertion order unless reordered. Every frame the
/// scene pushes `view * model`, its normal matrix and the projection into each
/// instance that declares the matching uniforms.
pub struct Scene<C: GraphicsContext> {
    ctx: Rc<C>,
    instances: HashMap<String, Instance<C>>,
    order: RenderOrder,
    next_id: u64,
    view: Matrix4,
    normal: Matrix4,
    projection: Matrix4,
    clear_color: [f32; 4],
}

impl<C: GraphicsContext> std::fmt::Debug for Scene<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("order", &self.order)
            .field("view", &self.view)
            .field("projection", &self.projection)
            .finish()
    }
}

impl<C: GraphicsContext> Scene<C> {
    /// Creates an empty scene and applies the default state: light grey
    /// background, depth testing with `LEQUAL`.
    pub fn new(ctx: Rc<C>) -> Self {
        Self::with_clear_color(ctx, DEFAULT_CLEAR_COLOR)
    }

    pub fn with_clear_color(ctx: Rc<C>, clear_color: [f32; 4]) -> Self {
        let [r, g, b, a] = clear_color;
        ctx.clear_color(r, g, b, a);
        ctx.clear_depth(1.0);
        ctx.enable(Capability::DepthTest);
        ctx.depth_func(DepthFunc::LessEqual);
        Self {
            ctx,
            instances: HashMap::new(),
            order: RenderOrder::new(),
            next_id: 0,
            view: Matrix4::identity(),
            normal: Matrix4::identity(),
            projection: Matrix4::identity(),
            clear_color,
        }
    }

    pub fn context(&self) -> &Rc<C> {
        &self.ctx
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn generate_id(&mut self) -> String {
        loop {
            let id = format!("instance-{}", self.next_id);
            self.next_id += 1;
            if !self.instances.contains_key(&id) {
                return id;
            }
        }
    }

    /// Adds an instance at the end of the draw order and returns its id,
    /// generating one when the instance has none.
    pub fn add(&mut self, mut instance: Instance<C>) -> Result<String, SceneError> {
        let id = match instance.id() {
            Some(id) if self.instances.contains_key(id) => {
                return Err(SceneError::DuplicateId(id.to_string()));
            }
            Some(id) => id.to_string(),
            None => self.generate_id(),
        };
        instance.set_id(id.clone());
        self.instances.insert(id.clone(), instance);
        self.order.push(id.clone());
        log::debug!("added instance `{id}`");
        Ok(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Instance<C>> {
        self.order.remove(id);
        self.instances.remove(id)
    }

    /// Drops every instance, releasing their GPU resources.
    pub fn clear_instances(&mut self) {
        self.order.clear();
        self.instances.clear();
    }

    pub fn get(&self, id: &str) -> Option<&Instance<C>> {
        self.instances.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Instance<C>> {
        self.instances.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn render_order(&self) -> &[String] {
        self.order.as_slice()
    }

    /// Instances in draw order.
    pub fn instances(&self) -> impl DoubleEndedIterator<Item = &Instance<C>> {
        self.order.iter().filter_map(|id| self.instances.get(id))
    }

    /// The last instance in draw order matching `predicate`, i.e. the one
    /// drawn on top.
    pub fn find_last(&self, mut predicate: impl FnMut(&Instance<C>) -> bool) -> Option<&Instance<C>> {
        self.instances().rev().find(|i| predicate(i))
    }

    pub fn render_first(&mut self, id: &str) -> bool {
        self.order.first(id)
    }

    /// Moves `id` to the end of the draw order, e.g. to draw a translucent
    /// object after the opaque ones.
    pub fn render_last(&mut self, id: &str) -> bool {
        self.order.last(id)
    }

    pub fn render_sooner(&mut self, id: &str) -> bool {
        self.order.sooner(id)
    }

    pub fn render_later(&mut self, id: &str) -> bool {
        self.order.later(id)
    }

    fn targets(&mut self, id: Option<&str>) -> Vec<&mut Instance<C>> {
        match id {
            Some(id) => self.instances.get_mut(id).into_iter().collect(),
            None => self.instances.values_mut().collect(),
        }
    }

    /// Sets a uniform on one instance, or on all of them when `id` is `None`.
    /// Unknown ids and instances without the uniform are skipped.
    pub fn update_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
        id: Option<&str>,
    ) -> Result<(), UniformError> {
        self.update_uniform_with(name, value, UniformOptions::default(), id)
    }

    /// Like [`Scene::update_uniform`], also applying `options`.
    ///
    /// A targeted update returns the instance's error. A broadcast visits
    /// every instance in draw order; one that declares `name` with another
    /// kind is logged and left as it was.
    pub fn update_uniform_with(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
        options: UniformOptions,
        id: Option<&str>,
    ) -> Result<(), UniformError> {
        let value = value.into();
        if let Some(id) = id {
            return match self.instances.get_mut(id) {
                Some(instance) => instance.update_uniform_with(name, value, options),
                None => Ok(()),
            };
        }
        for id in self.order.iter() {
            let Some(instance) = self.instances.get_mut(id) else {
                continue;
            };
            if let Err(e) = instance.update_uniform_with(name, value.clone(), options) {
                log::warn!("`{id}` skipped in uniform broadcast: {e}");
            }
        }
        Ok(())
    }

    pub fn get_uniform(&self, id: &str, name: &str) -> Option<&Uniform<C>> {
        self.instances.get(id)?.uniform(name)
    }

    pub fn set_visible(&mut self, visible: bool, id: Option<&str>) {
        for instance in self.targets(id) {
            instance.set_visible(visible);
        }
    }

    pub fn set_pickable(&mut self, pickable: bool, id: Option<&str>) {
        for instance in self.targets(id) {
            instance.set_pickable(pickable);
        }
    }

    /// Swaps texture `index` on one instance or on all of them.
    pub fn update_texture(
        &mut self,
        index: usize,
        source: ImageSource,
        id: Option<&str>,
    ) -> Result<(), TextureError> {
        for instance in self.targets(id) {
            instance.update_texture(index, source.clone())?;
        }
        Ok(())
    }

    pub fn view_matrix(&self) -> Matrix4 {
        self.view
    }

    /// Normal matrix of the view alone, for instances without a model transform.
    pub fn normal_matrix(&self) -> Matrix4 {
        self.normal
    }

    pub fn projection_matrix(&self) -> Matrix4 {
        self.projection
    }

    /// Fails for a singular view, which has no normal matrix.
    pub fn set_view_matrix(&mut self, view: Matrix4) -> Result<(), SceneError> {
        self.normal = compute_normal_matrix(&view)?;
        self.view = view;
        Ok(())
    }

    pub fn set_projection_matrix(&mut self, projection: Matrix4) {
        self.projection = projection;
    }

    /// Takes the camera's view and a projection sized to the drawing buffer.
    pub fn apply_camera(&mut self, camera: &Camera) -> Result<(), SceneError> {
        let (width, height) = self.ctx.drawing_buffer_size();
        self.set_view_matrix(camera.view_matrix())?;
        self.set_projection_matrix(camera.projection_matrix(width, height));
        Ok(())
    }

    /// Sets the viewport to the whole drawing buffer and clears colour and
    /// depth.
    pub fn clear(&self) {
        let (width, height) = self.ctx.drawing_buffer_size();
        let [r, g, b, a] = self.clear_color;
        self.ctx.viewport(0, 0, width as i32, height as i32);
        self.ctx.clear_color(r, g, b, a);
        self.ctx.clear(ClearMask::ALL);
    }

    pub fn render(&mut self) -> Result<(), SceneError> {
        self.render_with(true, |_| {})
    }

    /// Draws every instance in order. `hook` runs for each instance after its
    /// uniforms are bound and before its draw call.
    pub fn render_with(
        &mut self,
        clear: bool,
        hook: impl FnMut(&Instance<C>),
    ) -> Result<(), SceneError> {
        self.render_where(clear, |_| true, hook)
    }

    /// Like [`Scene::render_with`], drawing only instances accepted by `keep`.
    pub fn render_where(
        &mut self,
        clear: bool,
        mut keep: impl FnMut(&Instance<C>) -> bool,
        mut hook: impl FnMut(&Instance<C>),
    ) -> Result<(), SceneError> {
        if clear {
            self.clear();
        }
        let (view, projection) = (self.view, self.projection);
        for id in self.order.iter() {
            let Some(instance) = self.instances.get_mut(id) else {
                log::warn!("instance `{id}` missing while rendering");
                continue;
            };
            if !keep(instance) {
                continue;
            }
            let model_view = view.multiply(&instance.transform());
            instance.update_uniform(MODEL_VIEW_MATRIX, model_view)?;
            if instance.has_uniform(NORMAL_MATRIX) {
                instance.update_uniform(NORMAL_MATRIX, compute_normal_matrix(&model_view)?)?;
            }
            instance.update_uniform(PROJECTION_MATRIX, projection)?;
            instance.render_with(&mut hook)?;
        }
        Ok(())
    }

    /// RGBA of one pixel of the bound framebuffer, origin bottom-left.
    pub fn pixel_color(&self, x: i32, y: i32) -> [u8; 4] {
        let mut pixel = [0u8; 4];
        self.ctx.read_pixels(x, y, 1, 1, &mut pixel);
        pixel
    }
}
