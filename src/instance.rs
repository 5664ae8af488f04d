//! Drawable instances: geometry, program, uniforms and textures in one owner.
//!
//! An [`Instance`] uploads its vertex and index data once at construction and
//! owns every GPU object it created. Build one with [`Instance::builder`]:
//!
//! ```
//! use std::rc::Rc;
//! use orrery::context::SoftwareContext;
//! use orrery::{Attribute, Instance};
//!
//! const VS: &str = "in vec3 aVertexPosition;\nuniform mat4 uModelViewMatrix;\nuniform mat4 uProjectionMatrix;\nvoid main() {}";
//! const FS: &str = "uniform vec4 uMaterialDiffuse;\nvoid main() {}";
//!
//! let ctx = Rc::new(SoftwareContext::new(32, 32));
//! let triangle = Instance::builder(ctx)
//!     .shaders(VS, FS)
//!     .attribute("aVertexPosition", Attribute::float(vec![0.0, 1.0, 0.0, -1.0, -1.0, 0.0, 1.0, -1.0, 0.0], 3))
//!     .indices(vec![0, 1, 2])
//!     .uniform("uMaterialDiffuse", [1.0, 0.0, 0.0, 1.0])
//!     .build()?;
//!
//! assert_eq!(triangle.element_count(), 3);
//! triangle.render()?;
//! # Ok::<(), orrery::InstanceError>(())
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;

use thiserror::Error;

use crate::context::{
    AttributeKind, BufferTarget, BufferUsage, Capability, ContextError, GraphicsContext,
    RenderingMode,
};
use crate::math::Matrix4;
use crate::program::{Program, ProgramError, TRANSFORM_UNIFORMS};
use crate::texture::{ImageSource, Texture, TextureError};
use crate::uniform::{Uniform, UniformError, UniformOptions, UniformValue};

/// Errors from building or drawing an [`Instance`].
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("instance has no program or shader sources")]
    NoProgram,
    #[error("non-indexed instance needs an explicit element count")]
    MissingCount,
    #[error("instance has no attribute `{0}`")]
    UnknownAttribute(String),
}

/// Per-vertex data for one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Float(Vec<f32>),
    Int(Vec<i32>),
    UnsignedByte(Vec<u8>),
}

impl AttributeData {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeData::Float(_) => AttributeKind::Float,
            AttributeData::Int(_) => AttributeKind::Int,
            AttributeData::UnsignedByte(_) => AttributeKind::UnsignedByte,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AttributeData::Float(v) => v.len(),
            AttributeData::Int(v) => v.len(),
            AttributeData::UnsignedByte(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeData::Float(v) => bytemuck::cast_slice(v),
            AttributeData::Int(v) => bytemuck::cast_slice(v),
            AttributeData::UnsignedByte(v) => v,
        }
    }
}

/// An attribute's data plus how the vertex shader reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub data: AttributeData,
    /// Components per vertex, 1 to 4.
    pub size: i32,
    pub normalized: bool,
}

impl Attribute {
    pub fn float(data: Vec<f32>, size: i32) -> Self {
        Self {
            data: AttributeData::Float(data),
            size,
            normalized: false,
        }
    }

    pub fn int(data: Vec<i32>, size: i32) -> Self {
        Self {
            data: AttributeData::Int(data),
            size,
            normalized: false,
        }
    }

    /// Byte components, mapped to `[0, 1]` when `normalized`.
    pub fn unsigned_byte(data: Vec<u8>, size: i32, normalized: bool) -> Self {
        Self {
            data: AttributeData::UnsignedByte(data),
            size,
            normalized,
        }
    }

    /// Number of whole vertices in the data.
    pub fn vertex_count(&self) -> usize {
        if self.size <= 0 {
            return 0;
        }
        self.data.len() / self.size as usize
    }
}

/// Per-instance draw switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceConfig {
    /// Hidden instances are skipped by `render`.
    pub visible: bool,
    /// Excluded from the picking pass when false.
    pub pickable: bool,
    /// Depth testing while this instance draws; the previous state is restored
    /// afterwards.
    pub depth_test: bool,
    pub mode: RenderingMode,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            visible: true,
            pickable: true,
            depth_test: true,
            mode: RenderingMode::Triangles,
        }
    }
}

struct VertexBuffer<C: GraphicsContext> {
    buffer: C::Buffer,
    location: u32,
    size: i32,
    normalized: bool,
}

/// Builder returned by [`Instance::builder`].
pub struct InstanceBuilder<C: GraphicsContext> {
    ctx: Rc<C>,
    id: Option<String>,
    shaders: Option<(String, String)>,
    program: Option<Rc<Program<C>>>,
    attributes: Vec<(String, Attribute)>,
    indices: Option<Vec<u16>>,
    count: Option<usize>,
    uniforms: Vec<(String, UniformValue, UniformOptions)>,
    textures: Vec<Texture<C>>,
    config: InstanceConfig,
    transform: Matrix4,
}

impl<C: GraphicsContext> InstanceBuilder<C> {
    /// Compiles a program from these sources, resolving exactly the attribute
    /// and uniform names given to this builder.
    pub fn shaders(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.shaders = Some((vertex.into(), fragment.into()));
        self
    }

    /// Draws with an existing program, shared with other instances.
    pub fn program(mut self, program: Rc<Program<C>>) -> Self {
        self.program = Some(program);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.push((name.into(), attribute));
        self
    }

    pub fn indices(mut self, indices: Vec<u16>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Vertex count for non-indexed draws such as point clouds.
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Adds a uniform, replacing any earlier value given for `name`.
    pub fn uniform(self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.uniform_with(name, value, UniformOptions::default())
    }

    /// Adds a uniform with an explicit element count or transpose flag, for
    /// arrays like `uniform vec3 uLights[4]` and transposed matrices.
    pub fn uniform_with(
        mut self,
        name: impl Into<String>,
        value: impl Into<UniformValue>,
        options: UniformOptions,
    ) -> Self {
        let name = name.into();
        self.uniforms.retain(|(n, ..)| *n != name);
        self.uniforms.push((name, value.into(), options));
        self
    }

    pub fn uniforms<I, K, V>(mut self, uniforms: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UniformValue>,
    {
        for (name, value) in uniforms {
            self = self.uniform(name, value);
        }
        self
    }

    pub fn texture(mut self, texture: Texture<C>) -> Self {
        self.textures.push(texture);
        self
    }

    /// Adds a texture together with the sampler uniform that reads it, set to
    /// the texture's unit.
    pub fn sampled_texture(self, texture: Texture<C>, sampler: impl Into<String>) -> Self {
        let unit = texture.unit() as i32;
        self.texture(texture).uniform(sampler, unit)
    }

    pub fn mode(mut self, mode: RenderingMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn config(mut self, config: InstanceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transform(mut self, transform: Matrix4) -> Self {
        self.transform = transform;
        self
    }

    pub fn build(self) -> Result<Instance<C>, InstanceError> {
        if self.indices.is_none() && self.count.is_none() {
            return Err(InstanceError::MissingCount);
        }

        let program = match (self.program, self.shaders) {
            (Some(program), _) => program,
            (None, Some((vertex, fragment))) => {
                let attributes: Vec<&str> = self.attributes.iter().map(|(n, _)| n.as_str()).collect();
                let uniforms: Vec<&str> = self.uniforms.iter().map(|(n, ..)| n.as_str()).collect();
                Rc::new(Program::new(
                    Rc::clone(&self.ctx),
                    &vertex,
                    &fragment,
                    &attributes,
                    &uniforms,
                )?)
            }
            (None, None) => return Err(InstanceError::NoProgram),
        };

        let ctx = self.ctx;
        let vao = ctx.create_vertex_array()?;
        // Dropping `instance` from here on releases whatever was created.
        let mut instance = Instance {
            ctx: Rc::clone(&ctx),
            id: self.id,
            program,
            vao,
            buffers: HashMap::new(),
            index_buffer: None,
            index_count: 0,
            count: self.count,
            uniforms: BTreeMap::new(),
            textures: self.textures,
            config: self.config,
            transform: self.transform,
        };

        ctx.bind_vertex_array(Some(vao));
        let uploaded = instance.upload(self.attributes, self.indices);
        ctx.bind_vertex_array(None);
        ctx.bind_buffer(BufferTarget::Array, None);
        uploaded?;

        for (name, value, options) in self.uniforms {
            instance.add_uniform(name, value, options)?;
        }
        for name in TRANSFORM_UNIFORMS {
            if !instance.uniforms.contains_key(name) && instance.program.has_uniform(name) {
                instance.add_uniform(
                    name.to_string(),
                    Matrix4::identity().into(),
                    UniformOptions::default(),
                )?;
            }
        }
        Ok(instance)
    }
}

/// One drawable object.
///
/// Owns its vertex array, vertex buffers, index buffer and textures; all are
/// released on drop. The program is shared and released with its last user.
pub struct Instance<C: GraphicsContext> {
    ctx: Rc<C>,
    id: Option<String>,
    program: Rc<Program<C>>,
    vao: C::VertexArray,
    buffers: HashMap<String, VertexBuffer<C>>,
    index_buffer: Option<C::Buffer>,
    index_count: usize,
    count: Option<usize>,
    uniforms: BTreeMap<String, Uniform<C>>,
    textures: Vec<Texture<C>>,
    config: InstanceConfig,
    transform: Matrix4,
}

impl<C: GraphicsContext> std::fmt::Debug for Instance<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("program", &self.program.handle())
            .field("attributes", &self.buffers.keys().collect::<Vec<_>>())
            .field("uniforms", &self.uniforms.keys().collect::<Vec<_>>())
            .field("textures", &self.textures.len())
            .field("elements", &self.element_count())
            .field("config", &self.config)
            .finish()
    }
}

impl<C: GraphicsContext> Instance<C> {
    pub fn builder(ctx: Rc<C>) -> InstanceBuilder<C> {
        InstanceBuilder {
            ctx,
            id: None,
            shaders: None,
            program: None,
            attributes: Vec::new(),
            indices: None,
            count: None,
            uniforms: Vec::new(),
            textures: Vec::new(),
            config: InstanceConfig::default(),
            transform: Matrix4::identity(),
        }
    }

    /// Expects this instance's vertex array to be bound.
    fn upload(
        &mut self,
        attributes: Vec<(String, Attribute)>,
        indices: Option<Vec<u16>>,
    ) -> Result<(), InstanceError> {
        for (name, attribute) in attributes {
            let location = self
                .program
                .attribute(&name)
                .ok_or_else(|| ProgramError::MissingAttribute(name.clone()))?;
            let buffer = self.ctx.create_buffer()?;
            self.buffers.insert(
                name,
                VertexBuffer {
                    buffer,
                    location,
                    size: attribute.size,
                    normalized: attribute.normalized,
                },
            );
            self.ctx.bind_buffer(BufferTarget::Array, Some(buffer));
            self.ctx
                .buffer_data(BufferTarget::Array, attribute.data.as_bytes(), BufferUsage::StaticDraw);
            self.ctx.vertex_attrib_pointer(
                location,
                attribute.size,
                attribute.data.kind(),
                attribute.normalized,
                0,
                0,
            );
            self.ctx.enable_vertex_attrib_array(location);
        }

        if let Some(indices) = indices {
            let buffer = self.ctx.create_buffer()?;
            self.index_buffer = Some(buffer);
            self.index_count = indices.len();
            self.ctx.bind_buffer(BufferTarget::ElementArray, Some(buffer));
            self.ctx.buffer_data(
                BufferTarget::ElementArray,
                bytemuck::cast_slice(&indices),
                BufferUsage::StaticDraw,
            );
        }
        Ok(())
    }

    fn add_uniform(
        &mut self,
        name: String,
        value: UniformValue,
        options: UniformOptions,
    ) -> Result<(), InstanceError> {
        let location = self
            .program
            .uniform_location(&name)
            .cloned()
            .ok_or_else(|| ProgramError::MissingUniform(name.clone()))?;
        let uniform = Uniform::new(name.clone(), value)
            .with_location(location)
            .with_options(options);
        self.uniforms.insert(name, uniform);
        Ok(())
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    pub fn program(&self) -> &Rc<Program<C>> {
        &self.program
    }

    pub fn context(&self) -> &Rc<C> {
        &self.ctx
    }

    pub fn config(&self) -> InstanceConfig {
        self.config
    }

    pub fn set_config(&mut self, config: InstanceConfig) {
        self.config = config;
    }

    pub fn is_visible(&self) -> bool {
        self.config.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.config.visible = visible;
    }

    pub fn is_pickable(&self) -> bool {
        self.config.pickable
    }

    pub fn set_pickable(&mut self, pickable: bool) {
        self.config.pickable = pickable;
    }

    pub fn mode(&self) -> RenderingMode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: RenderingMode) {
        self.config.mode = mode;
    }

    /// Model transform, composed by the scene as `view * model`.
    pub fn transform(&self) -> Matrix4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Matrix4) {
        self.transform = transform;
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Elements drawn per call: the index count, or the explicit vertex count.
    pub fn element_count(&self) -> usize {
        match self.index_buffer {
            Some(_) => self.index_count,
            None => self.count.unwrap_or(0),
        }
    }

    /// Overrides the vertex count of a non-indexed instance.
    pub fn set_count(&mut self, count: usize) {
        self.count = Some(count);
    }

    pub fn uniform(&self, name: &str) -> Option<&Uniform<C>> {
        self.uniforms.get(name)
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn uniforms(&self) -> impl Iterator<Item = &Uniform<C>> {
        self.uniforms.values()
    }

    /// Replaces a uniform's value. Unknown names are ignored, since instances
    /// sharing a scene declare overlapping but different uniform sets.
    pub fn update_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), UniformError> {
        self.update_uniform_with(name, value, UniformOptions::default())
    }

    /// Like [`Instance::update_uniform`], also taking whatever count or
    /// transpose flag `options` sets. A value of the wrong kind changes
    /// nothing.
    pub fn update_uniform_with(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
        options: UniformOptions,
    ) -> Result<(), UniformError> {
        let Some(uniform) = self.uniforms.get_mut(name) else {
            return Ok(());
        };
        uniform.set_data(value)?;
        uniform.apply_options(options);
        Ok(())
    }

    /// Re-uploads one attribute's data, for geometry that changes over time.
    pub fn update_attribute(&mut self, name: &str, data: AttributeData) -> Result<(), InstanceError> {
        let vb = self
            .buffers
            .get(name)
            .ok_or_else(|| InstanceError::UnknownAttribute(name.to_string()))?;
        self.ctx.bind_vertex_array(Some(self.vao));
        self.ctx.bind_buffer(BufferTarget::Array, Some(vb.buffer));
        self.ctx
            .buffer_data(BufferTarget::Array, data.as_bytes(), BufferUsage::DynamicDraw);
        self.ctx
            .vertex_attrib_pointer(vb.location, vb.size, data.kind(), vb.normalized, 0, 0);
        self.ctx.bind_vertex_array(None);
        self.ctx.bind_buffer(BufferTarget::Array, None);
        Ok(())
    }

    pub fn textures(&self) -> &[Texture<C>] {
        &self.textures
    }

    pub fn texture(&self, index: usize) -> Option<&Texture<C>> {
        self.textures.get(index)
    }

    pub fn add_texture(&mut self, texture: Texture<C>) {
        self.textures.push(texture);
    }

    /// Swaps the image behind texture `index`. It stops binding until the new
    /// image loads.
    pub fn update_texture(&self, index: usize, source: ImageSource) -> Result<(), TextureError> {
        match self.textures.get(index) {
            Some(texture) => texture.update_image(source),
            None => {
                log::warn!("instance {:?} has no texture {index}", self.id);
                Ok(())
            }
        }
    }

    /// Loads every texture, resolving with the first failure. Failures are
    /// logged and leave only the failing textures unready.
    pub fn load_textures(&self) -> impl Future<Output = Result<(), TextureError>> + 'static {
        let loads: Vec<_> = self.textures.iter().map(Texture::load_image_data).collect();
        async move {
            let mut first = None;
            for load in loads {
                if let Err(e) = load.await {
                    first.get_or_insert(e);
                }
            }
            first.map_or(Ok(()), Err)
        }
    }

    pub fn render(&self) -> Result<(), InstanceError> {
        self.render_with(|_| {})
    }

    /// Binds everything and draws. `hook` runs after uniforms are bound and
    /// before the draw call, so it can override state for this one draw.
    pub fn render_with(&self, hook: impl FnOnce(&Self)) -> Result<(), InstanceError> {
        if !self.config.visible {
            return Ok(());
        }
        let ctx = &*self.ctx;
        self.program.use_program();
        ctx.bind_vertex_array(Some(self.vao));
        if let Some(ibo) = self.index_buffer {
            ctx.bind_buffer(BufferTarget::ElementArray, Some(ibo));
        }

        let drawn = self.bind_and_draw(hook);

        ctx.bind_vertex_array(None);
        if self.index_buffer.is_some() {
            ctx.bind_buffer(BufferTarget::ElementArray, None);
        }
        drawn
    }

    fn bind_and_draw(&self, hook: impl FnOnce(&Self)) -> Result<(), InstanceError> {
        let ctx = &*self.ctx;
        for texture in &self.textures {
            texture.activate();
        }
        for uniform in self.uniforms.values() {
            uniform.bind(ctx)?;
        }
        hook(self);

        let depth_was = ctx.is_enabled(Capability::DepthTest);
        set_capability(ctx, Capability::DepthTest, self.config.depth_test);
        let count = self.element_count() as i32;
        if self.is_indexed() {
            ctx.draw_elements(self.config.mode, count, 0);
        } else {
            ctx.draw_arrays(self.config.mode, 0, count);
        }
        set_capability(ctx, Capability::DepthTest, depth_was);
        Ok(())
    }
}

fn set_capability<C: GraphicsContext>(ctx: &C, capability: Capability, on: bool) {
    if ctx.is_enabled(capability) == on {
        return;
    }
    if on {
        ctx.enable(capability);
    } else {
        ctx.disable(capability);
    }
}

impl<C: GraphicsContext> Drop for Instance<C> {
    fn drop(&mut self) {
        for vb in self.buffers.values() {
            self.ctx.delete_buffer(vb.buffer);
        }
        if let Some(ibo) = self.index_buffer {
            self.ctx.delete_buffer(ibo);
        }
        self.ctx.delete_vertex_array(self.vao);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::software::{Call, UniformData};
    use crate::context::SoftwareContext;
    use crate::texture::TextureConfig;
    use crate::program::MODEL_VIEW_MATRIX;

    const VS: &str = "in vec3 aVertexPosition;\nuniform mat4 uModelViewMatrix;\nuniform mat4 uProjectionMatrix;\nvoid main() {}";
    const FS: &str = "uniform vec4 uMaterialDiffuse;\nuniform float uShininess;\nvoid main() {}";

    fn ctx() -> Rc<SoftwareContext> {
        Rc::new(SoftwareContext::new(16, 16))
    }

    fn triangle(ctx: &Rc<SoftwareContext>) -> InstanceBuilder<SoftwareContext> {
        Instance::builder(Rc::clone(ctx))
            .shaders(VS, FS)
            .attribute(
                "aVertexPosition",
                Attribute::float(vec![0.0, 1.0, 0.0, -1.0, -1.0, 0.0, 1.0, -1.0, 0.0], 3),
            )
            .indices(vec![0, 1, 2])
            .uniform("uMaterialDiffuse", [1.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn indexed_draw_uses_index_count() {
        let ctx = ctx();
        let instance = triangle(&ctx).build().unwrap();
        ctx.clear_calls();
        instance.render().unwrap();
        let draws = ctx.draw_calls();
        assert_eq!(draws.len(), 1);
        assert!(matches!(
            draws[0],
            Call::Draw {
                mode: RenderingMode::Triangles,
                count: 3,
                indexed: true,
                ..
            }
        ));
    }

    #[test]
    fn transform_uniforms_are_added_automatically() {
        let instance = triangle(&ctx()).build().unwrap();
        assert!(instance.has_uniform(MODEL_VIEW_MATRIX));
        assert!(instance.has_uniform("uProjectionMatrix"));
        assert!(!instance.has_uniform("uNormalMatrix"));
    }

    #[test]
    fn non_indexed_needs_count() {
        let ctx = ctx();
        let err = Instance::builder(Rc::clone(&ctx))
            .shaders(VS, FS)
            .attribute("aVertexPosition", Attribute::float(vec![0.0; 6], 3))
            .build()
            .unwrap_err();
        assert!(matches!(err, InstanceError::MissingCount));

        let points = Instance::builder(Rc::clone(&ctx))
            .shaders(VS, FS)
            .attribute("aVertexPosition", Attribute::float(vec![0.0; 6], 3))
            .count(2)
            .mode(RenderingMode::Points)
            .build()
            .unwrap();
        ctx.clear_calls();
        points.render().unwrap();
        assert!(matches!(
            ctx.draw_calls()[0],
            Call::Draw {
                mode: RenderingMode::Points,
                count: 2,
                indexed: false,
                ..
            }
        ));
    }

    #[test]
    fn unknown_uniform_updates_are_ignored() {
        let ctx = ctx();
        let mut instance = triangle(&ctx).build().unwrap();
        instance.update_uniform("uLightPosition", [1.0, 2.0, 3.0]).unwrap();
        instance
            .update_uniform("uMaterialDiffuse", [0.0, 1.0, 0.0, 1.0])
            .unwrap();
        instance.render().unwrap();
        assert_eq!(
            ctx.uniform_value(instance.program().handle(), "uMaterialDiffuse"),
            Some(UniformData::Floats(vec![0.0, 1.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn hook_runs_before_the_draw() {
        let ctx = ctx();
        let instance = triangle(&ctx).build().unwrap();
        ctx.clear_calls();
        let mut seen_draws = None;
        instance
            .render_with(|i| seen_draws = Some(i.context().draw_calls().len()))
            .unwrap();
        assert_eq!(seen_draws, Some(0));
        assert_eq!(ctx.draw_calls().len(), 1);
    }

    #[test]
    fn hidden_instances_do_not_draw() {
        let ctx = ctx();
        let mut instance = triangle(&ctx).build().unwrap();
        instance.set_visible(false);
        ctx.clear_calls();
        instance.render().unwrap();
        assert!(ctx.draw_calls().is_empty());
    }

    #[test]
    fn depth_test_is_restored_after_draw() {
        let ctx = ctx();
        ctx.enable(Capability::DepthTest);
        let instance = triangle(&ctx)
            .config(InstanceConfig {
                depth_test: false,
                ..InstanceConfig::default()
            })
            .build()
            .unwrap();
        ctx.clear_calls();
        instance.render().unwrap();
        let calls = ctx.calls();
        assert!(calls.contains(&Call::Disable(Capability::DepthTest)));
        assert_eq!(calls.last(), Some(&Call::Enable(Capability::DepthTest)));
        assert!(ctx.is_enabled(Capability::DepthTest));
    }

    #[test]
    fn attributes_must_exist() {
        let err = triangle(&ctx())
            .attribute("aVertexColor", Attribute::float(vec![1.0; 12], 4))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Program(ProgramError::MissingAttribute(ref name)) if name == "aVertexColor"
        ));
    }

    #[test]
    fn update_attribute_rejects_unknown_names() {
        let mut instance = triangle(&ctx()).build().unwrap();
        instance
            .update_attribute("aVertexPosition", AttributeData::Float(vec![0.0; 9]))
            .unwrap();
        let err = instance
            .update_attribute("aVertexNormal", AttributeData::Float(vec![0.0; 9]))
            .unwrap_err();
        assert!(matches!(err, InstanceError::UnknownAttribute(_)));
    }

    #[test]
    fn shared_program_with_unresolved_uniform_fails() {
        let ctx = ctx();
        let program = Rc::new(Program::new(Rc::clone(&ctx), VS, FS, &["aVertexPosition"], &[]).unwrap());
        let err = Instance::builder(Rc::clone(&ctx))
            .program(program)
            .attribute("aVertexPosition", Attribute::float(vec![0.0; 9], 3))
            .indices(vec![0, 1, 2])
            .uniform("uMissing", 1.0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Program(ProgramError::MissingUniform(_))
        ));
        assert_eq!(ctx.live_buffers(), 0);
        assert_eq!(ctx.live_vertex_arrays(), 0);
    }

    const FS_LIGHTS: &str = "uniform vec3 uLightPositions[4];\nuniform mat4 uTextureMatrix;\nvoid main() {}";

    fn lit(ctx: &Rc<SoftwareContext>) -> Instance<SoftwareContext> {
        Instance::builder(Rc::clone(ctx))
            .shaders(VS, FS_LIGHTS)
            .attribute("aVertexPosition", Attribute::float(vec![0.0; 9], 3))
            .indices(vec![0, 1, 2])
            .uniform_with(
                "uLightPositions",
                UniformValue::FloatVector(vec![0.0; 12]),
                UniformOptions::new().count(3),
            )
            .uniform_with(
                "uTextureMatrix",
                Matrix4::identity().translate(glam::Vec3::new(1.0, 2.0, 3.0)),
                UniformOptions::new().transpose(true),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn array_uniforms_bind_with_their_element_count() {
        let ctx = ctx();
        let mut instance = lit(&ctx);
        let lights: Vec<f32> = (0..12).map(|i| i as f32).collect();
        instance
            .update_uniform("uLightPositions", UniformValue::FloatVector(lights.clone()))
            .unwrap();
        instance.render().unwrap();
        assert_eq!(instance.uniform("uLightPositions").unwrap().count(), 3);
        assert_eq!(
            ctx.uniform_value(instance.program().handle(), "uLightPositions"),
            Some(UniformData::Floats(lights))
        );
    }

    #[test]
    fn transposed_matrices_reach_the_context_transposed() {
        let ctx = ctx();
        let mut instance = lit(&ctx);
        instance.render().unwrap();
        let program = instance.program().handle();
        let uploaded = ctx.uniform_value(program, "uTextureMatrix").unwrap().as_floats();
        // Transposed, the translation moves from the last column to the last row.
        assert_eq!([uploaded[3], uploaded[7], uploaded[11]], [1.0, 2.0, 3.0]);
        assert_eq!(uploaded[12..15], [0.0, 0.0, 0.0]);

        instance
            .update_uniform_with(
                "uTextureMatrix",
                Matrix4::identity(),
                UniformOptions::new().transpose(false),
            )
            .unwrap();
        assert!(!instance.uniform("uTextureMatrix").unwrap().is_transposed());
    }

    #[test]
    fn mismatched_update_leaves_options_alone() {
        let mut instance = lit(&ctx());
        let err = instance
            .update_uniform_with("uLightPositions", 1.0, UniformOptions::new().count(1))
            .unwrap_err();
        assert!(matches!(err, UniformError::KindMismatch { .. }));
        assert_eq!(instance.uniform("uLightPositions").unwrap().count(), 3);
    }

    #[test]
    fn sampled_textures_get_a_sampler_on_their_unit() {
        let ctx = ctx();
        let texture = Texture::new_2d(
            Rc::clone(&ctx),
            3,
            ImageSource::rgba(1, 1, vec![255, 255, 255, 255]),
            TextureConfig::default(),
        )
        .unwrap();
        let instance = Instance::builder(Rc::clone(&ctx))
            .shaders(VS, "uniform sampler2D uSampler;\nvoid main() {}")
            .attribute("aVertexPosition", Attribute::float(vec![0.0; 9], 3))
            .indices(vec![0, 1, 2])
            .sampled_texture(texture, "uSampler")
            .build()
            .unwrap();
        assert_eq!(
            instance.uniform("uSampler").map(|u| u.value().clone()),
            Some(UniformValue::Int(3))
        );
        instance.render().unwrap();
        assert_eq!(
            ctx.uniform_value(instance.program().handle(), "uSampler"),
            Some(UniformData::Ints(vec![3]))
        );
    }

    #[test]
    fn render_releases_the_index_binding() {
        let ctx = ctx();
        let instance = triangle(&ctx).build().unwrap();
        let stray = ctx.create_buffer().unwrap();
        ctx.bind_buffer(BufferTarget::ElementArray, Some(stray));
        instance.render().unwrap();
        assert_eq!(ctx.bound_element_buffer(), None);
    }

    #[test]
    fn unready_textures_are_skipped_and_drop_releases_everything() {
        let ctx = ctx();
        let texture = Texture::new_2d(
            Rc::clone(&ctx),
            0,
            ImageSource::from("no/such/image.png"),
            TextureConfig::default(),
        )
        .unwrap();
        let instance = triangle(&ctx).texture(texture).build().unwrap();
        assert!(pollster::block_on(instance.load_textures()).is_err());

        ctx.clear_calls();
        instance.render().unwrap();
        assert!(!ctx
            .calls()
            .iter()
            .any(|c| matches!(c, Call::BindTexture { .. })));

        drop(instance);
        assert_eq!(ctx.live_buffers(), 0);
        assert_eq!(ctx.live_vertex_arrays(), 0);
        assert_eq!(ctx.live_textures(), 0);
        assert_eq!(ctx.live_programs(), 0);
    }
}
