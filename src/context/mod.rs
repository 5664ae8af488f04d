//! The graphics-context boundary.
//!
//! Everything above this module talks to the GPU through [`GraphicsContext`], a
//! GL-style trait with associated handle types. The bootstrap (window, canvas,
//! GL loader) creates the context and hands it to the runtime wrapped in an
//! [`Rc`](std::rc::Rc); the runtime never creates or resizes it.
//!
//! Two backends ship with the crate:
//!
//! - [`GlowContext`] drives a real OpenGL / WebGL2 context through `glow`.
//! - [`SoftwareContext`] is headless. It records every call, reflects attribute
//!   and uniform names out of shader text and rasterizes flat-shaded or
//!   textured primitives, so scenes, picking and post-processing can be
//!   exercised without a display.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use orrery::context::{GraphicsContext, SoftwareContext};
//!
//! let ctx = Rc::new(SoftwareContext::new(64, 48));
//! assert_eq!(ctx.drawing_buffer_size(), (64, 48));
//! ```

mod gl;
mod raster;
pub mod software;

pub use gl::GlowContext;
pub use software::SoftwareContext;

use std::fmt::Debug;

use thiserror::Error;

/// A backend failed to allocate a GPU object.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("failed to create {object}: {reason}")]
pub struct ContextError {
    pub object: &'static str,
    pub reason: String,
}

impl ContextError {
    pub fn new(object: &'static str, reason: impl Into<String>) -> Self {
        Self {
            object,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Per-vertex attribute data.
    Array,
    /// `u16` indices, recorded in the bound vertex array.
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    StaticDraw,
    DynamicDraw,
}

/// Numeric kind of a vertex attribute's components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Float,
    Int,
    UnsignedByte,
}

impl AttributeKind {
    pub fn byte_size(self) -> usize {
        match self {
            AttributeKind::Float | AttributeKind::Int => 4,
            AttributeKind::UnsignedByte => 1,
        }
    }
}

/// Primitive assembly mode for a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderingMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    CubeMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// Faces in GL enumeration order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Destination of a pixel upload: the 2D image or one cube face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureImageTarget {
    Texture2D,
    CubeFace(CubeFace),
}

impl TextureImageTarget {
    pub fn texture_target(self) -> TextureTarget {
        match self {
            TextureImageTarget::Texture2D => TextureTarget::Texture2D,
            TextureImageTarget::CubeFace(_) => TextureTarget::CubeMap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureParam {
    MinFilter(TextureFilter),
    MagFilter(TextureFilter),
    WrapS(TextureWrap),
    WrapT(TextureWrap),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    Blend,
    CullFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Which buffers a `clear` touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
}

impl ClearMask {
    pub const COLOR: ClearMask = ClearMask {
        color: true,
        depth: false,
    };
    pub const DEPTH: ClearMask = ClearMask {
        color: false,
        depth: true,
    };
    pub const ALL: ClearMask = ClearMask {
        color: true,
        depth: true,
    };
}

/// GL-style graphics API used by the runtime.
///
/// Calls mirror their OpenGL ES 3 / WebGL2 counterparts. Every method takes
/// `&self`: a context is one logical thread of control shared by programs,
/// instances, textures and scenes, and backends manage their own interior
/// state.
///
/// Fallible calls return `Result`; the rest follow GL semantics and silently
/// ignore invalid handles.
pub trait GraphicsContext {
    type Shader: Copy + Debug;
    type Program: Copy + Debug + PartialEq;
    type Buffer: Copy + Debug;
    type VertexArray: Copy + Debug;
    type Texture: Copy + Debug + PartialEq;
    type Framebuffer: Copy + Debug;
    type Renderbuffer: Copy + Debug;
    type UniformLocation: Clone + Debug;

    /// Size of the default framebuffer in pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);

    // Shaders and programs.
    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, ContextError>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    /// Compiles a shader, returning the info log on failure.
    fn compile_shader(&self, shader: Self::Shader) -> Result<(), String>;
    fn delete_shader(&self, shader: Self::Shader);
    fn create_program(&self) -> Result<Self::Program, ContextError>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&self, program: Self::Program, shader: Self::Shader);
    /// Links a program, returning the info log on failure.
    fn link_program(&self, program: Self::Program) -> Result<(), String>;
    fn use_program(&self, program: Option<Self::Program>);
    fn delete_program(&self, program: Self::Program);
    fn get_attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;

    // Buffers and vertex arrays.
    fn create_buffer(&self) -> Result<Self::Buffer, ContextError>;
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<Self::Buffer>);
    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn create_vertex_array(&self) -> Result<Self::VertexArray, ContextError>;
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    /// Describes attribute `index` as `size` components of `kind` in the bound
    /// array buffer.
    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        kind: AttributeKind,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn enable_vertex_attrib_array(&self, index: u32);

    // Uniforms, for the current program.
    fn uniform_1_i32(&self, location: &Self::UniformLocation, x: i32);
    fn uniform_2_i32(&self, location: &Self::UniformLocation, x: i32, y: i32);
    fn uniform_3_i32(&self, location: &Self::UniformLocation, x: i32, y: i32, z: i32);
    fn uniform_4_i32(&self, location: &Self::UniformLocation, x: i32, y: i32, z: i32, w: i32);
    fn uniform_1_f32(&self, location: &Self::UniformLocation, x: f32);
    fn uniform_2_f32(&self, location: &Self::UniformLocation, x: f32, y: f32);
    fn uniform_3_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32);
    fn uniform_4_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32, w: f32);
    fn uniform_1_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]);
    fn uniform_2_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]);
    fn uniform_3_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]);
    fn uniform_4_i32_slice(&self, location: &Self::UniformLocation, v: &[i32]);
    fn uniform_1_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]);
    fn uniform_2_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]);
    fn uniform_3_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]);
    fn uniform_4_f32_slice(&self, location: &Self::UniformLocation, v: &[f32]);
    fn uniform_matrix_2_f32_slice(&self, location: &Self::UniformLocation, transpose: bool, v: &[f32]);
    fn uniform_matrix_3_f32_slice(&self, location: &Self::UniformLocation, transpose: bool, v: &[f32]);
    fn uniform_matrix_4_f32_slice(&self, location: &Self::UniformLocation, transpose: bool, v: &[f32]);

    // Textures.
    fn create_texture(&self) -> Result<Self::Texture, ContextError>;
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: TextureTarget, texture: Option<Self::Texture>);
    /// Uploads RGBA8 pixels, or allocates zeroed storage when `pixels` is `None`.
    /// Rows run bottom to top.
    fn tex_image_2d(
        &self,
        target: TextureImageTarget,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    );
    fn tex_parameter(&self, target: TextureTarget, param: TextureParam);
    fn generate_mipmap(&self, target: TextureTarget);
    fn delete_texture(&self, texture: Self::Texture);

    // Framebuffers.
    fn create_framebuffer(&self) -> Result<Self::Framebuffer, ContextError>;
    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>);
    /// Attaches a 2D texture as colour attachment 0 of the bound framebuffer.
    fn framebuffer_texture_2d(&self, texture: Option<Self::Texture>);
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, ContextError>;
    fn bind_renderbuffer(&self, renderbuffer: Option<Self::Renderbuffer>);
    /// Allocates 16-bit depth storage for the bound renderbuffer.
    fn renderbuffer_depth_storage(&self, width: u32, height: u32);
    /// Attaches a renderbuffer as the depth attachment of the bound framebuffer.
    fn framebuffer_renderbuffer_depth(&self, renderbuffer: Option<Self::Renderbuffer>);
    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer);

    // Fixed-function state.
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&self, depth: f32);
    fn clear(&self, mask: ClearMask);
    fn enable(&self, capability: Capability);
    fn disable(&self, capability: Capability);
    fn is_enabled(&self, capability: Capability) -> bool;
    fn depth_func(&self, func: DepthFunc);
    fn blend_func(&self, src: BlendFactor, dst: BlendFactor);

    // Draws and readback.
    /// Draws `count` `u16` indices from the bound element buffer, starting at
    /// byte `offset`.
    fn draw_elements(&self, mode: RenderingMode, count: i32, offset: i32);
    fn draw_arrays(&self, mode: RenderingMode, first: i32, count: i32);
    /// Reads RGBA8 pixels from the bound framebuffer into `out`, with the
    /// origin at the bottom-left corner.
    fn read_pixels(&self, x: i32, y: i32, width: u32, height: u32, out: &mut [u8]);
}
