//! OpenGL / WebGL2 backend built on `glow`.

use std::cell::Cell;

use glow::HasContext;

use super::{
    AttributeKind, BlendFactor, BufferTarget, BufferUsage, Capability, ClearMask, ContextError,
    CubeFace, DepthFunc, GraphicsContext, RenderingMode, ShaderStage, TextureFilter,
    TextureImageTarget, TextureParam, TextureTarget, TextureWrap,
};

type Gl = glow::Context;

/// [`GraphicsContext`] over a live `glow::Context`.
///
/// The bootstrap owns the window and reports its drawing-buffer size through
/// [`GlowContext::set_drawing_buffer_size`] whenever it changes.
pub struct GlowContext {
    gl: Gl,
    size: Cell<(u32, u32)>,
}

impl GlowContext {
    pub fn new(gl: Gl, width: u32, height: u32) -> Self {
        Self {
            gl,
            size: Cell::new((width, height)),
        }
    }

    pub fn set_drawing_buffer_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }

    /// The wrapped context, for calls the runtime does not cover.
    pub fn gl(&self) -> &Gl {
        &self.gl
    }
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::CubeMap => glow::TEXTURE_CUBE_MAP,
    }
}

fn image_target(target: TextureImageTarget) -> u32 {
    match target {
        TextureImageTarget::Texture2D => glow::TEXTURE_2D,
        TextureImageTarget::CubeFace(face) => match face {
            CubeFace::PositiveX => glow::TEXTURE_CUBE_MAP_POSITIVE_X,
            CubeFace::NegativeX => glow::TEXTURE_CUBE_MAP_NEGATIVE_X,
            CubeFace::PositiveY => glow::TEXTURE_CUBE_MAP_POSITIVE_Y,
            CubeFace::NegativeY => glow::TEXTURE_CUBE_MAP_NEGATIVE_Y,
            CubeFace::PositiveZ => glow::TEXTURE_CUBE_MAP_POSITIVE_Z,
            CubeFace::NegativeZ => glow::TEXTURE_CUBE_MAP_NEGATIVE_Z,
        },
    }
}

fn filter(f: TextureFilter) -> i32 {
    (match f {
        TextureFilter::Nearest => glow::NEAREST,
        TextureFilter::Linear => glow::LINEAR,
        TextureFilter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        TextureFilter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        TextureFilter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        TextureFilter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn wrap(w: TextureWrap) -> i32 {
    (match w {
        TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        TextureWrap::Repeat => glow::REPEAT,
        TextureWrap::MirroredRepeat => glow::MIRRORED_REPEAT,
    }) as i32
}

fn capability(c: Capability) -> u32 {
    match c {
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::Blend => glow::BLEND,
        Capability::CullFace => glow::CULL_FACE,
    }
}

fn blend_factor(f: BlendFactor) -> u32 {
    match f {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

fn rendering_mode(mode: RenderingMode) -> u32 {
    match mode {
        RenderingMode::Points => glow::POINTS,
        RenderingMode::Lines => glow::LINES,
        RenderingMode::LineLoop => glow::LINE_LOOP,
        RenderingMode::LineStrip => glow::LINE_STRIP,
        RenderingMode::Triangles => glow::TRIANGLES,
        RenderingMode::TriangleStrip => glow::TRIANGLE_STRIP,
        RenderingMode::TriangleFan => glow::TRIANGLE_FAN,
    }
}

impl GraphicsContext for GlowContext {
    type Shader = <Gl as HasContext>::Shader;
    type Program = <Gl as HasContext>::Program;
    type Buffer = <Gl as HasContext>::Buffer;
    type VertexArray = <Gl as HasContext>::VertexArray;
    type Texture = <Gl as HasContext>::Texture;
    type Framebuffer = <Gl as HasContext>::Framebuffer;
    type Renderbuffer = <Gl as HasContext>::Renderbuffer;
    type UniformLocation = <Gl as HasContext>::UniformLocation;

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.size.get()
    }

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, ContextError> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(kind) }.map_err(|e| ContextError::new("shader", e))
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { self.gl.shader_source(shader, source) }
    }

    fn compile_shader(&self, shader: Self::Shader) -> Result<(), String> {
        unsafe {
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(())
            } else {
                Err(self.gl.get_shader_info_log(shader))
            }
        }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&self) -> Result<Self::Program, ContextError> {
        unsafe { self.gl.create_program() }.map_err(|e| ContextError::new("program", e))
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.detach_shader(program, shader) }
    }

    fn link_program(&self, program: Self::Program) -> Result<(), String> {
        unsafe {
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                Ok(())
            } else {
                Err(self.gl.get_program_info_log(program))
            }
        }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn get_attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, ContextError> {
        unsafe { self.gl.create_buffer() }.map_err(|e| ContextError::new("buffer", e))
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer(buffer_target(target), buffer) }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let usage = match usage {
            BufferUsage::StaticDraw => glow::STATIC_DRAW,
            BufferUsage::DynamicDraw => glow::DYNAMIC_DRAW,
        };
        unsafe {
            self.gl
                .buffer_data_u8_slice(buffer_target(target), data, usage)
        }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, ContextError> {
        unsafe { self.gl.create_vertex_array() }.map_err(|e| ContextError::new("vertex array", e))
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        kind: AttributeKind,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            match kind {
                AttributeKind::Float => self.gl.vertex_attrib_pointer_f32(
                    index, size, glow::FLOAT, normalized, stride, offset,
                ),
                AttributeKind::Int => {
                    self.gl
                        .vertex_attrib_pointer_i32(index, size, glow::INT, stride, offset)
                }
                AttributeKind::UnsignedByte => self.gl.vertex_attrib_pointer_f32(
                    index,
                    size,
                    glow::UNSIGNED_BYTE,
                    normalized,
                    stride,
                    offset,
                ),
            }
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn uniform_1_i32(&self, location: &Self::UniformLocation, x: i32) {
        unsafe { self.gl.uniform_1_i32(Some(location), x) }
    }

    fn uniform_2_i32(&self, location: &Self::UniformLocation, x: i32, y: i32) {
        unsafe { self.gl.uniform_2_i32(Some(location), x, y) }
    }

    fn uniform_3_i32(&self, location: &Self::UniformLocation, x: i32, y: i32, z: i32) {
        unsafe { self.gl.uniform_3_i32(Some(location), x, y, z) }
    }

    fn uniform_4_i32(&self, location: &Self::UniformLocation, x: i32, y: i32, z: i32, w: i32) {
        unsafe { self.gl.uniform_4_i32(Some(location), x, y, z, w) }
    }

    fn uniform_1_f32(&self, location: &Self::UniformLocation, x: f32) {
        unsafe { self.gl.uniform_1_f32(Some(location), x) }
    }

    fn uniform_2_f32(&self, location: &Self::UniformLocation, x: f32, y: f32) {
        unsafe { self.gl.uniform_2_f32(Some(location), x, y) }
    }

    fn uniform_3_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32) {
        unsafe { self.gl.uniform_3_f32(Some(location), x, y, z) }
    }

    fn uniform_4_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32, w: f32) {
        unsafe { self.gl.uniform_4_f32(Some(location), x, y, z, w) }
    }

    fn uniform_1_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]) {
        unsafe { self.gl.uniform_1_i32_slice(Some(location), v) }
    }

    fn uniform_2_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]) {
        unsafe { self.gl.uniform_2_i32_slice(Some(location), v) }
    }

    fn uniform_3_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]) {
        unsafe { self.gl.uniform_3_i32_slice(Some(location), v) }
    }

    fn uniform_4_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]) {
        unsafe { self.gl.uniform_4_i32_slice(Some(location), v) }
    }

    fn uniform_1_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]) {
        unsafe { self.gl.uniform_1_f32_slice(Some(location), v) }
    }

    fn uniform_2_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]) {
        unsafe { self.gl.uniform_2_f32_slice(Some(location), v) }
    }

    fn uniform_3_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]) {
        unsafe { self.gl.uniform_3_f32_slice(Some(location), v) }
    }

    fn uniform_4_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]) {
        unsafe { self.gl.uniform_4_f32_slice(Some(location), v) }
    }

    fn uniform_matrix_2_f32_slice(&self, location: &Self::UniformLocation, transpose: bool, v: &[f32]) {
        unsafe { self.gl.uniform_matrix_2_f32_slice(Some(location), transpose, v) }
    }

    fn uniform_matrix_3_f32_slice(&self, location: &Self::UniformLocation, transpose: bool, v: &[f32]) {
        unsafe { self.gl.uniform_matrix_3_f32_slice(Some(location), transpose, v) }
    }

    fn uniform_matrix_4_f32_slice(&self, location: &Self::UniformLocation, transpose: bool, v: &[f32]) {
        unsafe { self.gl.uniform_matrix_4_f32_slice(Some(location), transpose, v) }
    }

    fn create_texture(&self) -> Result<Self::Texture, ContextError> {
        unsafe { self.gl.create_texture() }.map_err(|e| ContextError::new("texture", e))
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<Self::Texture>) {
        unsafe { self.gl.bind_texture(texture_target(target), texture) }
    }

    fn tex_image_2d(
        &self,
        target: TextureImageTarget,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) {
        unsafe {
            self.gl.tex_image_2d(
                image_target(target),
                0,
                glow::RGBA8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                pixels,
            )
        }
    }

    fn tex_parameter(&self, target: TextureTarget, param: TextureParam) {
        let (name, value) = match param {
            TextureParam::MinFilter(f) => (glow::TEXTURE_MIN_FILTER, filter(f)),
            TextureParam::MagFilter(f) => (glow::TEXTURE_MAG_FILTER, filter(f)),
            TextureParam::WrapS(w) => (glow::TEXTURE_WRAP_S, wrap(w)),
            TextureParam::WrapT(w) => (glow::TEXTURE_WRAP_T, wrap(w)),
        };
        unsafe {
            self.gl
                .tex_parameter_i32(texture_target(target), name, value)
        }
    }

    fn generate_mipmap(&self, target: TextureTarget) {
        unsafe { self.gl.generate_mipmap(texture_target(target)) }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, ContextError> {
        unsafe { self.gl.create_framebuffer() }.map_err(|e| ContextError::new("framebuffer", e))
    }

    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) }
    }

    fn framebuffer_texture_2d(&self, texture: Option<Self::Texture>) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture,
                0,
            )
        }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, ContextError> {
        unsafe { self.gl.create_renderbuffer() }.map_err(|e| ContextError::new("renderbuffer", e))
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<Self::Renderbuffer>) {
        unsafe { self.gl.bind_renderbuffer(glow::RENDERBUFFER, renderbuffer) }
    }

    fn renderbuffer_depth_storage(&self, width: u32, height: u32) {
        unsafe {
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH_COMPONENT16,
                width as i32,
                height as i32,
            )
        }
    }

    fn framebuffer_renderbuffer_depth(&self, renderbuffer: Option<Self::Renderbuffer>) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                renderbuffer,
            )
        }
    }

    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer) {
        unsafe { self.gl.delete_renderbuffer(renderbuffer) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear_depth(&self, depth: f32) {
        unsafe { self.gl.clear_depth_f32(depth) }
    }

    fn clear(&self, mask: ClearMask) {
        let mut bits = 0;
        if mask.color {
            bits |= glow::COLOR_BUFFER_BIT;
        }
        if mask.depth {
            bits |= glow::DEPTH_BUFFER_BIT;
        }
        unsafe { self.gl.clear(bits) }
    }

    fn enable(&self, cap: Capability) {
        unsafe { self.gl.enable(capability(cap)) }
    }

    fn disable(&self, cap: Capability) {
        unsafe { self.gl.disable(capability(cap)) }
    }

    fn is_enabled(&self, cap: Capability) -> bool {
        unsafe { self.gl.is_enabled(capability(cap)) }
    }

    fn depth_func(&self, func: DepthFunc) {
        let func = match func {
            DepthFunc::Never => glow::NEVER,
            DepthFunc::Less => glow::LESS,
            DepthFunc::Equal => glow::EQUAL,
            DepthFunc::LessEqual => glow::LEQUAL,
            DepthFunc::Greater => glow::GREATER,
            DepthFunc::NotEqual => glow::NOTEQUAL,
            DepthFunc::GreaterEqual => glow::GEQUAL,
            DepthFunc::Always => glow::ALWAYS,
        };
        unsafe { self.gl.depth_func(func) }
    }

    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) {
        unsafe { self.gl.blend_func(blend_factor(src), blend_factor(dst)) }
    }

    fn draw_elements(&self, mode: RenderingMode, count: i32, offset: i32) {
        unsafe {
            self.gl
                .draw_elements(rendering_mode(mode), count, glow::UNSIGNED_SHORT, offset)
        }
    }

    fn draw_arrays(&self, mode: RenderingMode, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(rendering_mode(mode), first, count) }
    }

    fn read_pixels(&self, x: i32, y: i32, width: u32, height: u32, out: &mut [u8]) {
        unsafe {
            self.gl.read_pixels(
                x,
                y,
                width as i32,
                height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(out),
            )
        }
    }
}
