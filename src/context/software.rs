//! Headless [`GraphicsContext`] for tests, tooling and offline rendering.
//!
//! The software context keeps GL-like object tables behind a `RefCell`, logs
//! every state-changing call as a [`Call`], and rasterizes draws with a fixed
//! convention instead of running shaders:
//!
//! - Attribute and uniform names are reflected from the shader text
//!   (`in`/`attribute` declarations of the vertex stage, `uniform`
//!   declarations of both stages). Attribute locations follow declaration
//!   order.
//! - The position attribute (`aPosition` or `aVertexPosition`) is transformed
//!   by `uProjectionMatrix * uModelViewMatrix`; missing matrices read as
//!   identity.
//! - Fragments are coloured with `uPickingColor` while `uOffscreen` is
//!   non-zero, otherwise by sampling the 2D texture on the unit named by
//!   `uSampler` when the program also declares a texture-coordinate attribute,
//!   otherwise with `uMaterialDiffuse` or `uColor`, otherwise white.
//! - Compilation fails when the source has no `main` or contains `#error`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use glam::{Mat4, Vec2, Vec4};

use super::raster::{self, Image, Pipeline, Shading, Target, Vertex};
use super::{
    AttributeKind, BlendFactor, BufferTarget, BufferUsage, Capability, ClearMask, ContextError,
    DepthFunc, GraphicsContext, RenderingMode, ShaderStage, TextureImageTarget, TextureParam,
    TextureTarget, TextureWrap,
};

const POSITION_ATTRIBUTES: [&str; 2] = ["aPosition", "aVertexPosition"];
const TEXCOORD_ATTRIBUTES: [&str; 3] = ["aTextureCoords", "aTexCoord", "aVertexTextureCoords"];
const QUALIFIERS: [&str; 7] = ["lowp", "mediump", "highp", "flat", "smooth", "centroid", "invariant"];

macro_rules! handles {
    ($($name:ident),* $(,)?) => {$(
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn id(self) -> u32 {
                self.0
            }
        }
    )*};
}

handles!(
    SoftShader,
    SoftProgram,
    SoftBuffer,
    SoftVertexArray,
    SoftTexture,
    SoftFramebuffer,
    SoftRenderbuffer,
);

/// Uniform location: the owning program plus the uniform's base name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoftUniformLocation {
    program: SoftProgram,
    name: String,
}

impl SoftUniformLocation {
    pub fn program(&self) -> SoftProgram {
        self.program
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A uniform value as last uploaded. Matrices are stored column-major.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    Ints(Vec<i32>),
    Floats(Vec<f32>),
}

impl UniformData {
    pub fn as_floats(&self) -> Vec<f32> {
        match self {
            UniformData::Ints(v) => v.iter().map(|&i| i as f32).collect(),
            UniformData::Floats(v) => v.clone(),
        }
    }

    fn first(&self) -> f32 {
        self.as_floats().first().copied().unwrap_or(0.0)
    }
}

/// One recorded context call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    UseProgram(Option<SoftProgram>),
    Uniform {
        program: SoftProgram,
        name: String,
        data: UniformData,
    },
    BindFramebuffer(Option<SoftFramebuffer>),
    ActiveTexture(u32),
    BindTexture {
        target: TextureTarget,
        texture: Option<SoftTexture>,
    },
    TexImage {
        target: TextureImageTarget,
        width: u32,
        height: u32,
    },
    Viewport([i32; 4]),
    Clear(ClearMask),
    Enable(Capability),
    Disable(Capability),
    Draw {
        mode: RenderingMode,
        count: usize,
        indexed: bool,
        program: Option<SoftProgram>,
        framebuffer: Option<SoftFramebuffer>,
    },
    DeleteProgram(SoftProgram),
    DeleteBuffer(SoftBuffer),
    DeleteVertexArray(SoftVertexArray),
    DeleteTexture(SoftTexture),
    DeleteFramebuffer(SoftFramebuffer),
    DeleteRenderbuffer(SoftRenderbuffer),
}

struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
}

#[derive(Default)]
struct ProgramObject {
    shaders: Vec<u32>,
    linked: bool,
    attributes: Vec<String>,
    uniforms: Vec<String>,
    values: HashMap<String, UniformData>,
}

impl ProgramObject {
    fn color(&self, name: &str) -> Option<Vec4> {
        match self.values.get(name)? {
            UniformData::Floats(v) if v.len() >= 4 => Some(Vec4::new(v[0], v[1], v[2], v[3])),
            UniformData::Floats(v) if v.len() == 3 => Some(Vec4::new(v[0], v[1], v[2], 1.0)),
            _ => None,
        }
    }

    fn matrix(&self, name: &str) -> Mat4 {
        match self.values.get(name) {
            Some(UniformData::Floats(v)) if v.len() == 16 => Mat4::from_cols_slice(v),
            _ => Mat4::IDENTITY,
        }
    }

    fn attribute_location(&self, names: &[&str]) -> Option<u32> {
        self.attributes
            .iter()
            .position(|a| names.contains(&a.as_str()))
            .map(|i| i as u32)
    }
}

#[derive(Clone, Copy)]
struct AttribPointer {
    buffer: Option<u32>,
    size: i32,
    kind: AttributeKind,
    normalized: bool,
    stride: i32,
    offset: i32,
}

#[derive(Default)]
struct VertexArrayState {
    pointers: HashMap<u32, AttribPointer>,
    enabled: HashSet<u32>,
    elements: Option<u32>,
}

struct TextureObject {
    images: HashMap<TextureImageTarget, Image>,
    wrap: (TextureWrap, TextureWrap),
}

impl TextureObject {
    fn new() -> Self {
        Self {
            images: HashMap::new(),
            wrap: (TextureWrap::Repeat, TextureWrap::Repeat),
        }
    }
}

#[derive(Default)]
struct FramebufferObject {
    color: Option<u32>,
    depth: Option<u32>,
}

#[derive(Default)]
struct RenderbufferObject {
    width: u32,
    height: u32,
    depth: Vec<f32>,
}

/// Colour source resolved for one draw.
enum Paint {
    Flat(Vec4),
    Textured {
        image: Option<Image>,
        wrap: (TextureWrap, TextureWrap),
    },
}

struct State {
    next_id: u32,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    buffers: HashMap<u32, Vec<u8>>,
    vertex_arrays: HashMap<u32, VertexArrayState>,
    default_vertex_array: VertexArrayState,
    textures: HashMap<u32, TextureObject>,
    framebuffers: HashMap<u32, FramebufferObject>,
    renderbuffers: HashMap<u32, RenderbufferObject>,

    current_program: Option<u32>,
    array_buffer: Option<u32>,
    vertex_array: Option<u32>,
    active_unit: u32,
    units: HashMap<(u32, TextureTarget), u32>,
    framebuffer: Option<u32>,
    renderbuffer: Option<u32>,

    viewport: [i32; 4],
    clear_color: [f32; 4],
    clear_depth: f32,
    enabled: HashSet<Capability>,
    depth_func: DepthFunc,
    blend: (BlendFactor, BlendFactor),

    surface: Image,
    surface_depth: Vec<f32>,
    calls: Vec<Call>,
}

impl State {
    fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            default_vertex_array: VertexArrayState::default(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            current_program: None,
            array_buffer: None,
            vertex_array: None,
            active_unit: 0,
            units: HashMap::new(),
            framebuffer: None,
            renderbuffer: None,
            viewport: [0, 0, width as i32, height as i32],
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            enabled: HashSet::new(),
            depth_func: DepthFunc::Less,
            blend: (BlendFactor::One, BlendFactor::Zero),
            surface: Image::zeroed(width, height),
            surface_depth: vec![1.0; width as usize * height as usize],
            calls: Vec::new(),
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn vao(&self) -> &VertexArrayState {
        self.vertex_array
            .and_then(|id| self.vertex_arrays.get(&id))
            .unwrap_or(&self.default_vertex_array)
    }

    fn vao_mut(&mut self) -> &mut VertexArrayState {
        match self.vertex_array {
            Some(id) if self.vertex_arrays.contains_key(&id) => {
                self.vertex_arrays.entry(id).or_default()
            }
            _ => &mut self.default_vertex_array,
        }
    }

    fn bound_texture(&self, target: TextureTarget) -> Option<u32> {
        self.units.get(&(self.active_unit, target)).copied()
    }

    fn ensure_surface(&mut self, (width, height): (u32, u32)) {
        if self.surface.width != width || self.surface.height != height {
            self.surface = Image::zeroed(width, height);
            self.surface_depth = vec![1.0; width as usize * height as usize];
        }
    }

    /// Colour and depth storage of the bound framebuffer. A framebuffer
    /// without a colour image has nothing to draw into.
    fn target(&mut self, size: (u32, u32)) -> Option<Target<'_>> {
        let Some(fb) = self.framebuffer else {
            self.ensure_surface(size);
            return Some(Target {
                width: self.surface.width,
                height: self.surface.height,
                color: &mut self.surface.data,
                depth: Some(&mut self.surface_depth),
            });
        };

        let fbo = self.framebuffers.get(&fb)?;
        let (color_id, depth_id) = (fbo.color?, fbo.depth);
        let image = self
            .textures
            .get_mut(&color_id)?
            .images
            .get_mut(&TextureImageTarget::Texture2D)?;
        let (width, height) = (image.width, image.height);
        let depth = depth_id
            .and_then(|id| self.renderbuffers.get_mut(&id))
            .filter(|rb| rb.width == width && rb.height == height)
            .map(|rb| rb.depth.as_mut_slice());
        Some(Target {
            width,
            height,
            color: &mut image.data,
            depth,
        })
    }

    fn read_indices(&self, count: usize, offset: usize) -> Vec<usize> {
        let Some(bytes) = self.vao().elements.and_then(|id| self.buffers.get(&id)) else {
            return Vec::new();
        };
        (0..count)
            .map_while(|i| {
                let at = offset + i * 2;
                let pair = bytes.get(at..at + 2)?;
                Some(u16::from_ne_bytes([pair[0], pair[1]]) as usize)
            })
            .collect()
    }

    fn read_attribute(&self, location: u32, vertex: usize) -> Option<Vec4> {
        let vao = self.vao();
        if !vao.enabled.contains(&location) {
            return None;
        }
        let pointer = vao.pointers.get(&location)?;
        let bytes = self.buffers.get(&pointer.buffer?)?;
        let element = pointer.kind.byte_size();
        let stride = if pointer.stride == 0 {
            pointer.size as usize * element
        } else {
            pointer.stride as usize
        };
        let base = pointer.offset as usize + vertex * stride;

        let mut out = Vec4::new(0.0, 0.0, 0.0, 1.0);
        for c in 0..(pointer.size.clamp(0, 4) as usize) {
            let at = base + c * element;
            let raw = bytes.get(at..at + element)?;
            out[c] = match pointer.kind {
                AttributeKind::Float => f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]),
                AttributeKind::Int => i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as f32,
                AttributeKind::UnsignedByte if pointer.normalized => raw[0] as f32 / 255.0,
                AttributeKind::UnsignedByte => raw[0] as f32,
            };
        }
        Some(out)
    }

    fn assemble(&self, program: &ProgramObject, indices: &[usize]) -> Option<Vec<Vertex>> {
        let position = program.attribute_location(&POSITION_ATTRIBUTES)?;
        let texcoord = program.attribute_location(&TEXCOORD_ATTRIBUTES);
        let mvp = program.matrix("uProjectionMatrix") * program.matrix("uModelViewMatrix");

        Some(
            indices
                .iter()
                .map(|&i| {
                    let p = self
                        .read_attribute(position, i)
                        .unwrap_or(Vec4::new(0.0, 0.0, 0.0, 1.0));
                    let uv = texcoord
                        .and_then(|t| self.read_attribute(t, i))
                        .map(|t| Vec2::new(t.x, t.y))
                        .unwrap_or(Vec2::ZERO);
                    Vertex { clip: mvp * p, uv }
                })
                .collect(),
        )
    }

    fn paint(&self, program: &ProgramObject) -> Paint {
        let offscreen = program.values.get("uOffscreen").map(UniformData::first);
        if offscreen.is_some_and(|flag| flag != 0.0) {
            if let Some(color) = program.color("uPickingColor") {
                return Paint::Flat(color);
            }
        }

        let textured = program.attribute_location(&TEXCOORD_ATTRIBUTES).is_some()
            && program.uniforms.iter().any(|u| u == "uSampler");
        if textured {
            let unit = program
                .values
                .get("uSampler")
                .map(|d| d.first() as u32)
                .unwrap_or(0);
            let texture = self
                .units
                .get(&(unit, TextureTarget::Texture2D))
                .and_then(|id| self.textures.get(id));
            return Paint::Textured {
                image: texture.and_then(|t| t.images.get(&TextureImageTarget::Texture2D).cloned()),
                wrap: texture.map_or((TextureWrap::Repeat, TextureWrap::Repeat), |t| t.wrap),
            };
        }

        ["uMaterialDiffuse", "uColor"]
            .iter()
            .find_map(|name| program.color(name))
            .map_or(Paint::Flat(Vec4::ONE), Paint::Flat)
    }
}

/// Pulls declared attribute and uniform names out of GLSL source.
fn reflect(source: &str, stage: ShaderStage) -> (Vec<String>, Vec<String>) {
    let code: String = source
        .lines()
        .map(|line| line.split("//").next().unwrap_or(""))
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut attributes = Vec::new();
    let mut uniforms = Vec::new();
    for statement in code.split([';', '{', '}']) {
        let mut text = statement.trim();
        if let Some(rest) = text.strip_prefix("layout") {
            if let Some(end) = rest.find(')') {
                text = rest[end + 1..].trim();
            }
        }
        let tokens: Vec<&str> = text
            .split_whitespace()
            .filter(|t| !QUALIFIERS.contains(t))
            .collect();
        let Some((&qualifier, rest)) = tokens.split_first() else {
            continue;
        };
        let list: &mut Vec<String> = match qualifier {
            "uniform" => &mut uniforms,
            "in" | "attribute" if stage == ShaderStage::Vertex => &mut attributes,
            _ => continue,
        };
        let Some((_ty, names)) = rest.split_first() else {
            continue;
        };
        for name in names.join(" ").split(',') {
            let name = name.split('[').next().unwrap_or("").trim();
            if !name.is_empty() && !list.iter().any(|n| n == name) {
                list.push(name.to_string());
            }
        }
    }
    (attributes, uniforms)
}

fn transposed(v: &[f32], n: usize) -> Vec<f32> {
    let mut out = v.to_vec();
    for (i, chunk) in v.chunks_exact(n * n).enumerate() {
        for r in 0..n {
            for c in 0..n {
                out[i * n * n + c * n + r] = chunk[r * n + c];
            }
        }
    }
    out
}

/// Headless GL-style context. See the module docs for the rendering rules.
pub struct SoftwareContext {
    state: RefCell<State>,
    size: Cell<(u32, u32)>,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: RefCell::new(State::new(width, height)),
            size: Cell::new((width, height)),
        }
    }

    /// Simulates a canvas resize. The default framebuffer is reallocated on
    /// the next draw or clear.
    pub fn set_drawing_buffer_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Recorded `Draw` calls, in order.
    pub fn draw_calls(&self) -> Vec<Call> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Draw { .. }))
            .cloned()
            .collect()
    }

    pub fn current_program(&self) -> Option<SoftProgram> {
        self.state.borrow().current_program.map(SoftProgram)
    }

    /// Last value uploaded for `name` on `program`.
    pub fn uniform_value(&self, program: SoftProgram, name: &str) -> Option<UniformData> {
        self.state
            .borrow()
            .programs
            .get(&program.0)?
            .values
            .get(name)
            .cloned()
    }

    /// RGBA of the default framebuffer at `(x, y)`, origin bottom-left.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let state = self.state.borrow();
        let surface = &state.surface;
        if x >= surface.width || y >= surface.height {
            return None;
        }
        let i = (y as usize * surface.width as usize + x as usize) * 4;
        let px = surface.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// The default framebuffer as an image with the usual top-left origin.
    pub fn screenshot(&self) -> image::RgbaImage {
        let mut state = self.state.borrow_mut();
        state.ensure_surface(self.size.get());
        let surface = &state.surface;
        let (w, h) = (surface.width, surface.height);
        image::RgbaImage::from_fn(w, h, |x, y| {
            let i = (((h - 1 - y) * w + x) * 4) as usize;
            image::Rgba([
                surface.data[i],
                surface.data[i + 1],
                surface.data[i + 2],
                surface.data[i + 3],
            ])
        })
    }

    /// Size of the 2D image stored in `texture`, if any.
    pub fn texture_size(&self, texture: SoftTexture) -> Option<(u32, u32)> {
        let state = self.state.borrow();
        let image = state
            .textures
            .get(&texture.0)?
            .images
            .get(&TextureImageTarget::Texture2D)?;
        Some((image.width, image.height))
    }

    pub fn texture_face_count(&self, texture: SoftTexture) -> usize {
        self.state
            .borrow()
            .textures
            .get(&texture.0)
            .map_or(0, |t| t.images.len())
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// Index buffer bound to the current vertex array, or to the default one
    /// when none is bound.
    pub fn bound_element_buffer(&self) -> Option<SoftBuffer> {
        self.state.borrow().vao().elements.map(SoftBuffer)
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn set_uniform(&self, location: &SoftUniformLocation, data: UniformData) {
        let mut state = self.state.borrow_mut();
        if state.current_program != Some(location.program.0) {
            log::warn!(
                "uniform `{}` set while its program {:?} is not in use",
                location.name,
                location.program
            );
            return;
        }
        if let Some(program) = state.programs.get_mut(&location.program.0) {
            program.values.insert(location.name.clone(), data.clone());
        }
        state.calls.push(Call::Uniform {
            program: location.program,
            name: location.name.clone(),
            data,
        });
    }

    fn draw(&self, mode: RenderingMode, indices: Option<(usize, usize)>, first: usize, count: usize) {
        let size = self.size.get();
        let mut guard = self.state.borrow_mut();
        let state: &mut State = &mut guard;

        let order: Vec<usize> = match indices {
            Some((count, offset)) => state.read_indices(count, offset),
            None => (first..first + count).collect(),
        };
        state.calls.push(Call::Draw {
            mode,
            count,
            indexed: indices.is_some(),
            program: state.current_program.map(SoftProgram),
            framebuffer: state.framebuffer.map(SoftFramebuffer),
        });

        let Some(program) = state.current_program.and_then(|id| state.programs.get(&id)) else {
            log::warn!("draw issued with no program in use");
            return;
        };
        let Some(vertices) = state.assemble(program, &order) else {
            log::debug!("program has no position attribute; nothing rasterized");
            return;
        };
        let paint = state.paint(program);
        let viewport = state.viewport;
        let depth = state
            .enabled
            .contains(&Capability::DepthTest)
            .then_some(state.depth_func);
        let blend = state
            .enabled
            .contains(&Capability::Blend)
            .then_some(state.blend);

        let shading = match &paint {
            Paint::Flat(color) => Shading::Flat(*color),
            Paint::Textured { image, wrap } => Shading::Textured {
                image: image.as_ref(),
                wrap: *wrap,
            },
        };
        let pipeline = Pipeline {
            viewport,
            depth,
            blend,
            shading,
        };
        if let Some(mut target) = state.target(size) {
            raster::draw(&mut target, &pipeline, mode, &vertices);
        }
    }
}

impl GraphicsContext for SoftwareContext {
    type Shader = SoftShader;
    type Program = SoftProgram;
    type Buffer = SoftBuffer;
    type VertexArray = SoftVertexArray;
    type Texture = SoftTexture;
    type Framebuffer = SoftFramebuffer;
    type Renderbuffer = SoftRenderbuffer;
    type UniformLocation = SoftUniformLocation;

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.size.get()
    }

    fn create_shader(&self, stage: ShaderStage) -> Result<SoftShader, ContextError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.shaders.insert(
            id,
            ShaderObject {
                stage,
                source: String::new(),
                compiled: false,
            },
        );
        Ok(SoftShader(id))
    }

    fn shader_source(&self, shader: SoftShader, source: &str) {
        if let Some(s) = self.state.borrow_mut().shaders.get_mut(&shader.0) {
            s.source = source.to_string();
        }
    }

    fn compile_shader(&self, shader: SoftShader) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let s = state
            .shaders
            .get_mut(&shader.0)
            .ok_or_else(|| format!("unknown shader {}", shader.0))?;
        if s.source.contains("#error") {
            return Err(format!("ERROR: 0:1: #error directive in {} shader", s.stage));
        }
        if !s.source.contains("main") {
            return Err(format!("ERROR: 0:1: {} shader has no main function", s.stage));
        }
        s.compiled = true;
        Ok(())
    }

    fn delete_shader(&self, shader: SoftShader) {
        self.state.borrow_mut().shaders.remove(&shader.0);
    }

    fn create_program(&self) -> Result<SoftProgram, ContextError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.programs.insert(id, ProgramObject::default());
        Ok(SoftProgram(id))
    }

    fn attach_shader(&self, program: SoftProgram, shader: SoftShader) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program.0) {
            p.shaders.push(shader.0);
        }
    }

    fn detach_shader(&self, program: SoftProgram, shader: SoftShader) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program.0) {
            p.shaders.retain(|&s| s != shader.0);
        }
    }

    fn link_program(&self, program: SoftProgram) -> Result<(), String> {
        let mut guard = self.state.borrow_mut();
        let state: &mut State = &mut guard;
        let p = state
            .programs
            .get_mut(&program.0)
            .ok_or_else(|| format!("unknown program {}", program.0))?;

        let stage = |wanted: ShaderStage| {
            p.shaders
                .iter()
                .filter_map(|id| state.shaders.get(id))
                .find(|s| s.stage == wanted && s.compiled)
        };
        let (Some(vertex), Some(fragment)) = (stage(ShaderStage::Vertex), stage(ShaderStage::Fragment))
        else {
            p.linked = false;
            return Err("link failed: a compiled vertex and fragment shader are required".into());
        };

        let (attributes, mut uniforms) = reflect(&vertex.source, ShaderStage::Vertex);
        let (_, fragment_uniforms) = reflect(&fragment.source, ShaderStage::Fragment);
        for name in fragment_uniforms {
            if !uniforms.contains(&name) {
                uniforms.push(name);
            }
        }
        p.attributes = attributes;
        p.uniforms = uniforms;
        p.linked = true;
        Ok(())
    }

    fn use_program(&self, program: Option<SoftProgram>) {
        let mut state = self.state.borrow_mut();
        state.current_program = program.map(|p| p.0);
        state.calls.push(Call::UseProgram(program));
    }

    fn delete_program(&self, program: SoftProgram) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program.0);
        if state.current_program == Some(program.0) {
            state.current_program = None;
        }
        state.calls.push(Call::DeleteProgram(program));
    }

    fn get_attrib_location(&self, program: SoftProgram, name: &str) -> Option<u32> {
        let state = self.state.borrow();
        let p = state.programs.get(&program.0).filter(|p| p.linked)?;
        p.attribute_location(&[name])
    }

    fn get_uniform_location(&self, program: SoftProgram, name: &str) -> Option<SoftUniformLocation> {
        let state = self.state.borrow();
        let p = state.programs.get(&program.0).filter(|p| p.linked)?;
        let base = name.strip_suffix("[0]").unwrap_or(name);
        p.uniforms.iter().any(|u| u == base).then(|| SoftUniformLocation {
            program,
            name: base.to_string(),
        })
    }

    fn create_buffer(&self) -> Result<SoftBuffer, ContextError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.buffers.insert(id, Vec::new());
        Ok(SoftBuffer(id))
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<SoftBuffer>) {
        let mut state = self.state.borrow_mut();
        let id = buffer.map(|b| b.0);
        match target {
            BufferTarget::Array => state.array_buffer = id,
            BufferTarget::ElementArray => state.vao_mut().elements = id,
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], _usage: BufferUsage) {
        let mut state = self.state.borrow_mut();
        let bound = match target {
            BufferTarget::Array => state.array_buffer,
            BufferTarget::ElementArray => state.vao().elements,
        };
        if let Some(bytes) = bound.and_then(|id| state.buffers.get_mut(&id)) {
            *bytes = data.to_vec();
        }
    }

    fn delete_buffer(&self, buffer: SoftBuffer) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer.0);
        if state.array_buffer == Some(buffer.0) {
            state.array_buffer = None;
        }
        state.calls.push(Call::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&self) -> Result<SoftVertexArray, ContextError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.vertex_arrays.insert(id, VertexArrayState::default());
        Ok(SoftVertexArray(id))
    }

    fn bind_vertex_array(&self, vertex_array: Option<SoftVertexArray>) {
        self.state.borrow_mut().vertex_array = vertex_array.map(|v| v.0);
    }

    fn delete_vertex_array(&self, vertex_array: SoftVertexArray) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array.0);
        if state.vertex_array == Some(vertex_array.0) {
            state.vertex_array = None;
        }
        state.calls.push(Call::DeleteVertexArray(vertex_array));
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
        let mut state = self.state.borrow_mut();
        let pointer = AttribPointer {
            buffer: state.array_buffer,
            size,
            kind,
            normalized,
            stride,
            offset,
        };
        state.vao_mut().pointers.insert(index, pointer);
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.state.borrow_mut().vao_mut().enabled.insert(index);
    }

    fn uniform_1_i32(&self, location: &SoftUniformLocation, x: i32) {
        self.set_uniform(location, UniformData::Ints(vec![x]));
    }

    fn uniform_2_i32(&self, location: &SoftUniformLocation, x: i32, y: i32) {
        self.set_uniform(location, UniformData::Ints(vec![x, y]));
    }

    fn uniform_3_i32(&self, location: &SoftUniformLocation, x: i32, y: i32, z: i32) {
        self.set_uniform(location, UniformData::Ints(vec![x, y, z]));
    }

    fn uniform_4_i32(&self, location: &SoftUniformLocation, x: i32, y: i32, z: i32, w: i32) {
        self.set_uniform(location, UniformData::Ints(vec![x, y, z, w]));
    }

    fn uniform_1_f32(&self, location: &SoftUniformLocation, x: f32) {
        self.set_uniform(location, UniformData::Floats(vec![x]));
    }

    fn uniform_2_f32(&self, location: &SoftUniformLocation, x: f32, y: f32) {
        self.set_uniform(location, UniformData::Floats(vec![x, y]));
    }

    fn uniform_3_f32(&self, location: &SoftUniformLocation, x: f32, y: f32, z: f32) {
        self.set_uniform(location, UniformData::Floats(vec![x, y, z]));
    }

    fn uniform_4_f32(&self, location: &SoftUniformLocation, x: f32, y: f32, z: f32, w: f32) {
        self.set_uniform(location, UniformData::Floats(vec![x, y, z, w]));
    }

    fn uniform_1_i32_slice(&self, location: &SoftUniformLocation, v: &[i32]) {
        self.set_uniform(location, UniformData::Ints(v.to_vec()));
    }

    fn uniform_2_i32_slice(&self, location: &SoftUniformLocation, v: &[i32]) {
        self.set_uniform(location, UniformData::Ints(v.to_vec()));
    }

    fn uniform_3_i32_slice(&self, location: &SoftUniformLocation, v: &[i32]) {
        self.set_uniform(location, UniformData::Ints(v.to_vec()));
    }

    fn uniform_4_i32_slice(&self, location: &SoftUniformLocation, v: &[i32]) {
        self.set_uniform(location, UniformData::Ints(v.to_vec()));
    }

    fn uniform_1_f32_slice(&self, location: &SoftUniformLocation, v: &[f32]) {
        self.set_uniform(location, UniformData::Floats(v.to_vec()));
    }

    fn uniform_2_f32_slice(&self, location: &SoftUniformLocation, v: &[f32]) {
        self.set_uniform(location, UniformData::Floats(v.to_vec()));
    }

    fn uniform_3_f32_slice(&self, location: &SoftUniformLocation, v: &[f32]) {
        self.set_uniform(location, UniformData::Floats(v.to_vec()));
    }

    fn uniform_4_f32_slice(&self, location: &SoftUniformLocation, v: &[f32]) {
        self.set_uniform(location, UniformData::Floats(v.to_vec()));
    }

    fn uniform_matrix_2_f32_slice(&self, location: &SoftUniformLocation, transpose: bool, v: &[f32]) {
        let data = if transpose { transposed(v, 2) } else { v.to_vec() };
        self.set_uniform(location, UniformData::Floats(data));
    }

    fn uniform_matrix_3_f32_slice(&self, location: &SoftUniformLocation, transpose: bool, v: &[f32]) {
        let data = if transpose { transposed(v, 3) } else { v.to_vec() };
        self.set_uniform(location, UniformData::Floats(data));
    }

    fn uniform_matrix_4_f32_slice(&self, location: &SoftUniformLocation, transpose: bool, v: &[f32]) {
        let data = if transpose { transposed(v, 4) } else { v.to_vec() };
        self.set_uniform(location, UniformData::Floats(data));
    }

    fn create_texture(&self) -> Result<SoftTexture, ContextError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.textures.insert(id, TextureObject::new());
        Ok(SoftTexture(id))
    }

    fn active_texture(&self, unit: u32) {
        let mut state = self.state.borrow_mut();
        state.active_unit = unit;
        state.calls.push(Call::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<SoftTexture>) {
        let mut state = self.state.borrow_mut();
        let key = (state.active_unit, target);
        match texture {
            Some(t) => state.units.insert(key, t.0),
            None => state.units.remove(&key),
        };
        state.calls.push(Call::BindTexture { target, texture });
    }

    fn tex_image_2d(
        &self,
        target: TextureImageTarget,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) {
        let mut guard = self.state.borrow_mut();
        let state: &mut State = &mut guard;
        let Some(id) = state.bound_texture(target.texture_target()) else {
            log::warn!("tex_image_2d with no texture bound");
            return;
        };
        let mut image = Image::zeroed(width, height);
        if let Some(pixels) = pixels {
            let n = image.data.len().min(pixels.len());
            image.data[..n].copy_from_slice(&pixels[..n]);
        }
        if let Some(texture) = state.textures.get_mut(&id) {
            texture.images.insert(target, image);
        }
        state.calls.push(Call::TexImage {
            target,
            width,
            height,
        });
    }

    fn tex_parameter(&self, target: TextureTarget, param: TextureParam) {
        let mut guard = self.state.borrow_mut();
        let state: &mut State = &mut guard;
        let Some(texture) = state
            .bound_texture(target)
            .and_then(|id| state.textures.get_mut(&id))
        else {
            return;
        };
        match param {
            TextureParam::WrapS(w) => texture.wrap.0 = w,
            TextureParam::WrapT(w) => texture.wrap.1 = w,
            // Sampling is always nearest.
            TextureParam::MinFilter(_) | TextureParam::MagFilter(_) => {}
        }
    }

    fn generate_mipmap(&self, _target: TextureTarget) {}

    fn delete_texture(&self, texture: SoftTexture) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture.0);
        state.units.retain(|_, id| *id != texture.0);
        for fb in state.framebuffers.values_mut() {
            if fb.color == Some(texture.0) {
                fb.color = None;
            }
        }
        state.calls.push(Call::DeleteTexture(texture));
    }

    fn create_framebuffer(&self) -> Result<SoftFramebuffer, ContextError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.framebuffers.insert(id, FramebufferObject::default());
        Ok(SoftFramebuffer(id))
    }

    fn bind_framebuffer(&self, framebuffer: Option<SoftFramebuffer>) {
        let mut state = self.state.borrow_mut();
        state.framebuffer = framebuffer.map(|f| f.0);
        state.calls.push(Call::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&self, texture: Option<SoftTexture>) {
        let mut guard = self.state.borrow_mut();
        let state: &mut State = &mut guard;
        if let Some(fb) = state.framebuffer.and_then(|id| state.framebuffers.get_mut(&id)) {
            fb.color = texture.map(|t| t.0);
        }
    }

    fn delete_framebuffer(&self, framebuffer: SoftFramebuffer) {
        let mut state = self.state.borrow_mut();
        state.framebuffers.remove(&framebuffer.0);
        if state.framebuffer == Some(framebuffer.0) {
            state.framebuffer = None;
        }
        state.calls.push(Call::DeleteFramebuffer(framebuffer));
    }

    fn create_renderbuffer(&self) -> Result<SoftRenderbuffer, ContextError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.renderbuffers.insert(id, RenderbufferObject::default());
        Ok(SoftRenderbuffer(id))
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<SoftRenderbuffer>) {
        self.state.borrow_mut().renderbuffer = renderbuffer.map(|r| r.0);
    }

    fn renderbuffer_depth_storage(&self, width: u32, height: u32) {
        let mut guard = self.state.borrow_mut();
        let state: &mut State = &mut guard;
        if let Some(rb) = state.renderbuffer.and_then(|id| state.renderbuffers.get_mut(&id)) {
            rb.width = width;
            rb.height = height;
            rb.depth = vec![1.0; width as usize * height as usize];
        }
    }

    fn framebuffer_renderbuffer_depth(&self, renderbuffer: Option<SoftRenderbuffer>) {
        let mut guard = self.state.borrow_mut();
        let state: &mut State = &mut guard;
        if let Some(fb) = state.framebuffer.and_then(|id| state.framebuffers.get_mut(&id)) {
            fb.depth = renderbuffer.map(|r| r.0);
        }
    }

    fn delete_renderbuffer(&self, renderbuffer: SoftRenderbuffer) {
        let mut state = self.state.borrow_mut();
        state.renderbuffers.remove(&renderbuffer.0);
        if state.renderbuffer == Some(renderbuffer.0) {
            state.renderbuffer = None;
        }
        state.calls.push(Call::DeleteRenderbuffer(renderbuffer));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        let mut state = self.state.borrow_mut();
        state.viewport = [x, y, width, height];
        state.calls.push(Call::Viewport([x, y, width, height]));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.state.borrow_mut().clear_color = [r, g, b, a];
    }

    fn clear_depth(&self, depth: f32) {
        self.state.borrow_mut().clear_depth = depth;
    }

    fn clear(&self, mask: ClearMask) {
        let size = self.size.get();
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Clear(mask));
        let (color, depth) = (state.clear_color, state.clear_depth);
        if let Some(mut target) = state.target(size) {
            raster::clear(&mut target, mask, color, depth);
        }
    }

    fn enable(&self, capability: Capability) {
        let mut state = self.state.borrow_mut();
        state.enabled.insert(capability);
        state.calls.push(Call::Enable(capability));
    }

    fn disable(&self, capability: Capability) {
        let mut state = self.state.borrow_mut();
        state.enabled.remove(&capability);
        state.calls.push(Call::Disable(capability));
    }

    fn is_enabled(&self, capability: Capability) -> bool {
        self.state.borrow().enabled.contains(&capability)
    }

    fn depth_func(&self, func: DepthFunc) {
        self.state.borrow_mut().depth_func = func;
    }

    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) {
        self.state.borrow_mut().blend = (src, dst);
    }

    fn draw_elements(&self, mode: RenderingMode, count: i32, offset: i32) {
        let count = count.max(0) as usize;
        self.draw(mode, Some((count, offset.max(0) as usize)), 0, count);
    }

    fn draw_arrays(&self, mode: RenderingMode, first: i32, count: i32) {
        self.draw(mode, None, first.max(0) as usize, count.max(0) as usize);
    }

    fn read_pixels(&self, x: i32, y: i32, width: u32, height: u32, out: &mut [u8]) {
        let size = self.size.get();
        let mut state = self.state.borrow_mut();
        out.fill(0);
        let Some(target) = state.target(size) else {
            return;
        };
        for row in 0..height as i64 {
            for col in 0..width as i64 {
                let (sx, sy) = (x as i64 + col, y as i64 + row);
                if sx < 0 || sy < 0 || sx >= target.width as i64 || sy >= target.height as i64 {
                    continue;
                }
                let src = (sy as usize * target.width as usize + sx as usize) * 4;
                let dst = (row as usize * width as usize + col as usize) * 4;
                if let (Some(from), Some(to)) =
                    (target.color.get(src..src + 4), out.get_mut(dst..dst + 4))
                {
                    to.copy_from_slice(from);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"#version 300 es
precision mediump float;
in vec3 aVertexPosition;   // position
in vec2 aVertexTextureCoords;
layout(location = 3) in vec4 aColor;
uniform mat4 uModelViewMatrix, uProjectionMatrix;
uniform highp mat4 uNormalMatrix;
uniform vec3 uLights[4];
out vec2 vUv;
void main() {
    vUv = aVertexTextureCoords;
    gl_Position = uProjectionMatrix * uModelViewMatrix * vec4(aVertexPosition, 1.0);
}
"#;

    const FS: &str = r#"#version 300 es
precision mediump float;
in vec2 vUv;
uniform vec4 uMaterialDiffuse;
uniform sampler2D uSampler;
out vec4 fragColor;
void main() { fragColor = uMaterialDiffuse; }
"#;

    const FS_FLAT: &str = "uniform vec4 uMaterialDiffuse;\nvoid main() {}";

    #[test]
    fn reflection_finds_declarations() {
        let (attributes, uniforms) = reflect(VS, ShaderStage::Vertex);
        assert_eq!(
            attributes,
            vec!["aVertexPosition", "aVertexTextureCoords", "aColor"]
        );
        assert_eq!(
            uniforms,
            vec!["uModelViewMatrix", "uProjectionMatrix", "uNormalMatrix", "uLights"]
        );

        let (fs_inputs, fs_uniforms) = reflect(FS, ShaderStage::Fragment);
        assert!(fs_inputs.is_empty());
        assert_eq!(fs_uniforms, vec!["uMaterialDiffuse", "uSampler"]);
    }

    fn linked(ctx: &SoftwareContext, vs: &str, fs: &str) -> Result<SoftProgram, String> {
        let v = ctx.create_shader(ShaderStage::Vertex).unwrap();
        ctx.shader_source(v, vs);
        ctx.compile_shader(v)?;
        let f = ctx.create_shader(ShaderStage::Fragment).unwrap();
        ctx.shader_source(f, fs);
        ctx.compile_shader(f)?;
        let p = ctx.create_program().unwrap();
        ctx.attach_shader(p, v);
        ctx.attach_shader(p, f);
        ctx.link_program(p)?;
        Ok(p)
    }

    #[test]
    fn locations_resolve_after_link() {
        let ctx = SoftwareContext::new(4, 4);
        let p = linked(&ctx, VS, FS).unwrap();
        assert_eq!(ctx.get_attrib_location(p, "aVertexPosition"), Some(0));
        assert_eq!(ctx.get_attrib_location(p, "aColor"), Some(2));
        assert_eq!(ctx.get_attrib_location(p, "aMissing"), None);
        assert!(ctx.get_uniform_location(p, "uSampler").is_some());
        assert!(ctx.get_uniform_location(p, "uLights[0]").is_some());
        assert!(ctx.get_uniform_location(p, "uMissing").is_none());
    }

    #[test]
    fn compile_errors_are_reported() {
        let ctx = SoftwareContext::new(4, 4);
        assert!(linked(&ctx, "#error broken\nvoid main() {}", FS).is_err());
        assert!(linked(&ctx, VS, "precision mediump float;").is_err());
    }

    #[test]
    fn uniforms_require_program_in_use() {
        let ctx = SoftwareContext::new(4, 4);
        let p = linked(&ctx, VS, FS).unwrap();
        let loc = ctx.get_uniform_location(p, "uMaterialDiffuse").unwrap();
        ctx.uniform_4_f32(&loc, 1.0, 0.0, 0.0, 1.0);
        assert_eq!(ctx.uniform_value(p, "uMaterialDiffuse"), None);

        ctx.use_program(Some(p));
        ctx.uniform_4_f32(&loc, 1.0, 0.0, 0.0, 1.0);
        assert_eq!(
            ctx.uniform_value(p, "uMaterialDiffuse"),
            Some(UniformData::Floats(vec![1.0, 0.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn transposed_matrices_are_stored_column_major() {
        let rows = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(transposed(&rows, 2), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn indexed_triangle_fills_pixels() {
        let ctx = SoftwareContext::new(8, 8);
        let p = linked(&ctx, VS, FS_FLAT).unwrap();
        ctx.use_program(Some(p));
        let diffuse = ctx.get_uniform_location(p, "uMaterialDiffuse").unwrap();
        ctx.uniform_4_f32(&diffuse, 0.0, 1.0, 0.0, 1.0);

        let vao = ctx.create_vertex_array().unwrap();
        ctx.bind_vertex_array(Some(vao));
        let vbo = ctx.create_buffer().unwrap();
        ctx.bind_buffer(BufferTarget::Array, Some(vbo));
        let positions: [f32; 9] = [-1.0, -1.0, 0.0, 3.0, -1.0, 0.0, -1.0, 3.0, 0.0];
        ctx.buffer_data(
            BufferTarget::Array,
            bytemuck::cast_slice(&positions),
            BufferUsage::StaticDraw,
        );
        ctx.vertex_attrib_pointer(0, 3, AttributeKind::Float, false, 0, 0);
        ctx.enable_vertex_attrib_array(0);
        let ibo = ctx.create_buffer().unwrap();
        ctx.bind_buffer(BufferTarget::ElementArray, Some(ibo));
        let indices: [u16; 3] = [0, 1, 2];
        ctx.buffer_data(
            BufferTarget::ElementArray,
            bytemuck::cast_slice(&indices),
            BufferUsage::StaticDraw,
        );

        ctx.draw_elements(RenderingMode::Triangles, 3, 0);
        assert_eq!(ctx.pixel(3, 3), Some([0, 255, 0, 255]));
        assert!(matches!(
            ctx.draw_calls().as_slice(),
            [Call::Draw { count: 3, indexed: true, .. }]
        ));
    }

    #[test]
    fn framebuffer_draws_land_in_texture() {
        let ctx = SoftwareContext::new(4, 4);
        let tex = ctx.create_texture().unwrap();
        ctx.bind_texture(TextureTarget::Texture2D, Some(tex));
        ctx.tex_image_2d(TextureImageTarget::Texture2D, 2, 2, None);
        let fb = ctx.create_framebuffer().unwrap();
        ctx.bind_framebuffer(Some(fb));
        ctx.framebuffer_texture_2d(Some(tex));

        ctx.clear_color(1.0, 0.0, 0.0, 1.0);
        ctx.clear(ClearMask::COLOR);
        let mut out = [0u8; 4];
        ctx.read_pixels(1, 1, 1, 1, &mut out);
        assert_eq!(out, [255, 0, 0, 255]);

        // The default framebuffer is untouched.
        ctx.bind_framebuffer(None);
        assert_eq!(ctx.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn resize_reallocates_default_surface() {
        let ctx = SoftwareContext::new(4, 4);
        ctx.set_drawing_buffer_size(6, 2);
        ctx.clear(ClearMask::ALL);
        assert_eq!(ctx.screenshot().dimensions(), (6, 2));
        assert!(ctx.pixel(5, 1).is_some());
    }
}
