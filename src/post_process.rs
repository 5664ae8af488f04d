//! Full-screen filters over a captured frame.
//!
//! ```
//! use std::rc::Rc;
//! use orrery::context::SoftwareContext;
//! use orrery::post_process::{FilterKind, PostProcess};
//! use orrery::Scene;
//!
//! let ctx = Rc::new(SoftwareContext::new(16, 16));
//! let mut scene = Scene::new(ctx.clone());
//! let mut post = PostProcess::new(ctx, FilterKind::Grayscale)?;
//!
//! post.bind();
//! scene.render()?;
//! post.unbind();
//! post.draw()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Instant;

use thiserror::Error;

use crate::context::{GraphicsContext, TextureFilter, TextureTarget, TextureWrap};
use crate::framebuffer::Framebuffer;
use crate::geometry;
use crate::instance::{Instance, InstanceConfig, InstanceError};
use crate::texture::{ImageSource, Texture, TextureConfig, TextureError};
use crate::uniform::{UniformError, UniformValue};

const QUAD_VS: &str = include_str!("shaders/quad.vert.glsl");
const GRAYSCALE_FS: &str = include_str!("shaders/grayscale.frag.glsl");
const INVERT_FS: &str = include_str!("shaders/invert.frag.glsl");
const WAVY_FS: &str = include_str!("shaders/wavy.frag.glsl");
const BLUR_FS: &str = include_str!("shaders/blur.frag.glsl");
const FILMGRAIN_FS: &str = include_str!("shaders/filmgrain.frag.glsl");
const STRETCH_FS: &str = include_str!("shaders/stretch.frag.glsl");

/// Unit the captured frame is sampled from.
const FRAME_UNIT: u32 = 0;
const NOISE_UNIT: u32 = 1;
const NOISE_SIZE: u32 = 64;

/// Errors from building or drawing a post-process pass.
#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("failed to create the post-process target")]
    Target(#[from] TextureError),
    #[error("failed to build the filter quad")]
    Filter(#[from] InstanceError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
}

/// A filter name that [`FilterKind::from_str`] does not recognise.
#[derive(Debug, Error)]
#[error("unknown filter `{0}`")]
pub struct UnknownFilter(String);

/// The full-screen filters a [`PostProcess`] can apply. Names parse
/// case-insensitively, so `"FilmGrain".parse()` works as well as `"filmgrain"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Grayscale,
    Invert,
    /// Horizontal sine ripple scrolling with time.
    Wavy,
    /// 5×5 box blur.
    Blur,
    /// Scrolling noise subtracted from the frame.
    FilmGrain,
    /// Radial barrel distortion.
    Stretch,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        FilterKind::Grayscale,
        FilterKind::Invert,
        FilterKind::Wavy,
        FilterKind::Blur,
        FilterKind::FilmGrain,
        FilterKind::Stretch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Grayscale => "grayscale",
            FilterKind::Invert => "invert",
            FilterKind::Wavy => "wavy",
            FilterKind::Blur => "blur",
            FilterKind::FilmGrain => "filmgrain",
            FilterKind::Stretch => "stretch",
        }
    }

    pub fn vertex_source(self) -> &'static str {
        QUAD_VS
    }

    pub fn fragment_source(self) -> &'static str {
        match self {
            FilterKind::Grayscale => GRAYSCALE_FS,
            FilterKind::Invert => INVERT_FS,
            FilterKind::Wavy => WAVY_FS,
            FilterKind::Blur => BLUR_FS,
            FilterKind::FilmGrain => FILMGRAIN_FS,
            FilterKind::Stretch => STRETCH_FS,
        }
    }

    fn uses_noise(self) -> bool {
        self == FilterKind::FilmGrain
    }

    /// Uniforms beyond the samplers, for a frame `seconds` into the
    /// filter's life on a `width × height` canvas.
    pub fn uniforms(self, seconds: f32, width: u32, height: u32) -> Vec<(&'static str, UniformValue)> {
        let inverse_size = [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32];
        match self {
            FilterKind::Wavy => vec![("uTime", seconds.into())],
            FilterKind::Blur => vec![("uInverseTextureSize", inverse_size.into())],
            FilterKind::FilmGrain => vec![
                ("uInverseTextureSize", inverse_size.into()),
                ("uTime", seconds.into()),
            ],
            FilterKind::Grayscale | FilterKind::Invert | FilterKind::Stretch => Vec::new(),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFilter(s.to_string()))
    }
}

/// Captures a frame into an off-screen texture and redraws it through a
/// filter.
///
/// Usage per frame: [`bind`](Self::bind), render the scene,
/// [`unbind`](Self::unbind), [`draw`](Self::draw).
pub struct PostProcess<C: GraphicsContext> {
    ctx: Rc<C>,
    framebuffer: Framebuffer<C>,
    filter: FilterKind,
    quad: Instance<C>,
    started: Instant,
}

impl<C: GraphicsContext> PostProcess<C> {
    pub fn new(ctx: Rc<C>, filter: FilterKind) -> Result<Self, PostProcessError> {
        let framebuffer = Framebuffer::for_canvas(ctx.clone(), FRAME_UNIT)?;
        let quad = build_quad(&ctx, &framebuffer, filter)?;
        Ok(Self {
            ctx,
            framebuffer,
            filter,
            quad,
            started: Instant::now(),
        })
    }

    pub fn filter(&self) -> FilterKind {
        self.filter
    }

    pub fn has_filter(&self, filter: FilterKind) -> bool {
        self.filter == filter
    }

    pub fn framebuffer(&self) -> &Framebuffer<C> {
        &self.framebuffer
    }

    pub fn quad(&self) -> &Instance<C> {
        &self.quad
    }

    /// Replaces the filter quad. The capture target is kept.
    pub fn set_filter(&mut self, filter: FilterKind) -> Result<(), PostProcessError> {
        if filter == self.filter {
            return Ok(());
        }
        self.quad = build_quad(&self.ctx, &self.framebuffer, filter)?;
        self.filter = filter;
        self.started = Instant::now();
        log::debug!("post-process filter set to {filter}");
        Ok(())
    }

    /// Redirects subsequent draws into the capture texture, resizing it to
    /// the canvas first if needed.
    pub fn bind(&mut self) {
        self.framebuffer.ensure_canvas_size();
        self.framebuffer.bind();
    }

    pub fn unbind(&self) {
        self.framebuffer.unbind();
    }

    /// Draws the captured frame through the filter onto the bound target.
    pub fn draw(&mut self) -> Result<(), PostProcessError> {
        let seconds = self.started.elapsed().as_secs_f32();
        self.draw_at(seconds)
    }

    /// [`draw`](Self::draw) with an explicit filter time.
    pub fn draw_at(&mut self, seconds: f32) -> Result<(), PostProcessError> {
        let (width, height) = self.ctx.drawing_buffer_size();
        for (name, value) in self.filter.uniforms(seconds, width, height) {
            self.quad.update_uniform(name, value)?;
        }
        self.ctx.viewport(0, 0, width as i32, height as i32);
        self.quad.render()?;
        Ok(())
    }
}

fn build_quad<C: GraphicsContext>(
    ctx: &Rc<C>,
    framebuffer: &Framebuffer<C>,
    filter: FilterKind,
) -> Result<Instance<C>, PostProcessError> {
    let (width, height) = framebuffer.size();
    let frame = Texture::from_handle(
        ctx.clone(),
        FRAME_UNIT,
        TextureTarget::Texture2D,
        framebuffer.texture().handle(),
    );

    let mut builder = geometry::full_screen_quad()
        .instance(ctx.clone(), "aPosition")
        .shaders(filter.vertex_source(), filter.fragment_source())
        .sampled_texture(frame, "uSampler")
        .uniforms(filter.uniforms(0.0, width, height))
        .config(InstanceConfig {
            depth_test: false,
            pickable: false,
            ..InstanceConfig::default()
        });
    if filter.uses_noise() {
        let config = TextureConfig {
            min_filter: TextureFilter::LinearMipmapNearest,
            mag_filter: TextureFilter::Linear,
            wrap_s: TextureWrap::Repeat,
            wrap_t: TextureWrap::Repeat,
            generate_mipmap: true,
        };
        let noise = ImageSource::rgba(NOISE_SIZE, NOISE_SIZE, noise_pixels(NOISE_SIZE));
        let noise = Texture::new_2d(ctx.clone(), NOISE_UNIT, noise, config)?;
        builder = builder.sampled_texture(noise, "uNoiseSampler");
    }
    Ok(builder.build()?)
}

/// Grey value noise from a xorshift generator with a fixed seed.
fn noise_pixels(size: u32) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for _ in 0..size * size {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let v = (state >> 24) as u8;
        pixels.extend_from_slice(&[v, v, v, 255]);
    }
    pixels
}
