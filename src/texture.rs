//! 2D and cube-map textures with deferred pixel loading.
//!
//! A texture owns one GPU texture object and the pixels destined for it. Pixels
//! arrive through [`Texture::load_image_data`], a future that decodes the
//! configured sources; nothing reaches the GPU until the next
//! [`Texture::activate`] after every face has pixels. Until then `activate` is
//! a no-op, so a frame drawn before a load finishes simply renders without the
//! texture.
//!
//! ```
//! use std::rc::Rc;
//! use orrery::context::SoftwareContext;
//! use orrery::{ImageSource, Texture, TextureConfig};
//!
//! let ctx = Rc::new(SoftwareContext::new(4, 4));
//! let texture = Texture::new_2d(ctx, 0, ImageSource::from("missing.png"), TextureConfig::default())?;
//!
//! // Load failures are reported but never fatal.
//! assert!(pollster::block_on(texture.load_image_data()).is_err());
//! assert!(!texture.activate());
//! # Ok::<(), orrery::TextureError>(())
//! ```

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::context::{
    ContextError, CubeFace, GraphicsContext, TextureFilter, TextureImageTarget, TextureParam,
    TextureTarget, TextureWrap,
};

/// Texture failures. Loading errors are never fatal to a frame: the texture
/// just stays unready.
#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to read texture image {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode texture image")]
    Decode(#[from] image::ImageError),
    #[error("texture has no image source to load")]
    NoSource,
    #[error("expected {expected} bytes of RGBA pixels, got {actual}")]
    InvalidPixels { expected: usize, actual: usize },
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Sampler state applied when the texture is uploaded or reconfigured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureConfig {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    pub generate_mipmap: bool,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::Nearest,
            mag_filter: TextureFilter::Nearest,
            wrap_s: TextureWrap::ClampToEdge,
            wrap_t: TextureWrap::ClampToEdge,
            generate_mipmap: false,
        }
    }
}

impl TextureConfig {
    pub fn linear() -> Self {
        Self {
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            ..Self::default()
        }
    }

    pub fn with_wrap(mut self, wrap: TextureWrap) -> Self {
        self.wrap_s = wrap;
        self.wrap_t = wrap;
        self
    }

    pub fn with_mipmaps(mut self) -> Self {
        self.generate_mipmap = true;
        self
    }
}

/// Where a texture's pixels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// An image file, decoded with the `image` crate.
    Path(PathBuf),
    /// An encoded image (PNG, JPEG, ...) already in memory.
    Encoded(Arc<[u8]>),
    /// Raw RGBA8 pixels, first row at `t = 0`.
    Rgba {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

impl ImageSource {
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        ImageSource::Rgba {
            width,
            height,
            pixels,
        }
    }

    pub fn encoded(bytes: impl Into<Arc<[u8]>>) -> Self {
        ImageSource::Encoded(bytes.into())
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        ImageSource::Path(path.into())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq)]
struct Pixels {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Pixels {
    fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(TextureError::InvalidPixels {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

fn decode(source: &ImageSource) -> Result<Pixels, TextureError> {
    let decode_bytes = |bytes: &[u8]| -> Result<Pixels, TextureError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Pixels::new(width, height, img.into_raw())
    };
    match source {
        ImageSource::Path(path) => {
            let bytes = std::fs::read(path).map_err(|source| TextureError::Io {
                path: path.clone(),
                source,
            })?;
            decode_bytes(&bytes)
        }
        ImageSource::Encoded(bytes) => decode_bytes(bytes),
        ImageSource::Rgba {
            width,
            height,
            pixels,
        } => Pixels::new(*width, *height, pixels.clone()),
    }
}

#[derive(Debug, Default)]
struct Face {
    source: Option<ImageSource>,
    pixels: Option<Pixels>,
    uploaded: bool,
}

impl Face {
    fn with_source(source: ImageSource) -> Result<Self, TextureError> {
        let mut face = Face::default();
        face.set_source(source)?;
        Ok(face)
    }

    /// Raw pixels are available immediately; everything else waits for a load.
    fn set_source(&mut self, source: ImageSource) -> Result<(), TextureError> {
        self.pixels = match &source {
            ImageSource::Rgba { .. } => Some(decode(&source)?),
            _ => None,
        };
        self.source = Some(source);
        self.uploaded = false;
        Ok(())
    }
}

/// Pixel state shared with in-flight loads.
#[derive(Debug, Default)]
struct PixelState {
    faces: Vec<Face>,
    /// Bumped whenever a source changes, so stale loads can be discarded.
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    /// Pixels come from image sources.
    Image,
    /// Storage allocated with a fixed size and no initial pixels.
    Allocated { width: u32, height: u32 },
    /// A texture object created elsewhere; never uploaded to or deleted.
    External,
}

/// A 2D or cube-map texture bound to a fixed texture unit.
pub struct Texture<C: GraphicsContext> {
    ctx: Rc<C>,
    unit: u32,
    target: TextureTarget,
    handle: C::Texture,
    storage: Storage,
    config: TextureConfig,
    params_dirty: Cell<bool>,
    state: Rc<RefCell<PixelState>>,
}

impl<C: GraphicsContext> std::fmt::Debug for Texture<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("unit", &self.unit)
            .field("target", &self.target)
            .field("handle", &self.handle)
            .field("storage", &self.storage)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl<C: GraphicsContext> Texture<C> {
    fn with_state(
        ctx: Rc<C>,
        unit: u32,
        target: TextureTarget,
        storage: Storage,
        config: TextureConfig,
        faces: Vec<Face>,
    ) -> Result<Self, TextureError> {
        let handle = ctx.create_texture()?;
        Ok(Self {
            ctx,
            unit,
            target,
            handle,
            storage,
            config,
            params_dirty: Cell::new(true),
            state: Rc::new(RefCell::new(PixelState {
                faces,
                generation: 0,
            })),
        })
    }

    /// A 2D texture fed from `source`.
    pub fn new_2d(
        ctx: Rc<C>,
        unit: u32,
        source: ImageSource,
        config: TextureConfig,
    ) -> Result<Self, TextureError> {
        let face = Face::with_source(source)?;
        Self::with_state(
            ctx,
            unit,
            TextureTarget::Texture2D,
            Storage::Image,
            config,
            vec![face],
        )
    }

    /// A cube map with one source per face, in [`CubeFace::ALL`] order.
    pub fn cube_map(
        ctx: Rc<C>,
        unit: u32,
        faces: [ImageSource; 6],
        config: TextureConfig,
    ) -> Result<Self, TextureError> {
        let faces = faces
            .into_iter()
            .map(Face::with_source)
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_state(
            ctx,
            unit,
            TextureTarget::CubeMap,
            Storage::Image,
            config,
            faces,
        )
    }

    /// A 2D texture with `width × height` storage and no pixels, ready to be
    /// rendered into.
    pub fn with_size(
        ctx: Rc<C>,
        unit: u32,
        width: u32,
        height: u32,
        config: TextureConfig,
    ) -> Result<Self, TextureError> {
        let texture = Self::with_state(
            ctx,
            unit,
            TextureTarget::Texture2D,
            Storage::Allocated { width, height },
            config,
            Vec::new(),
        )?;
        texture.allocate(width, height);
        Ok(texture)
    }

    /// Wraps a texture object owned by someone else. It is considered ready
    /// and is not deleted on drop.
    pub fn from_handle(ctx: Rc<C>, unit: u32, target: TextureTarget, handle: C::Texture) -> Self {
        Self {
            ctx,
            unit,
            target,
            handle,
            storage: Storage::External,
            config: TextureConfig::default(),
            params_dirty: Cell::new(false),
            state: Rc::new(RefCell::new(PixelState::default())),
        }
    }

    fn allocate(&self, width: u32, height: u32) {
        self.ctx.bind_texture(self.target, Some(self.handle));
        self.ctx
            .tex_image_2d(TextureImageTarget::Texture2D, width, height, None);
        self.apply_params();
        self.ctx.bind_texture(self.target, None);
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }

    pub fn set_unit(&mut self, unit: u32) {
        self.unit = unit;
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    pub fn handle(&self) -> C::Texture {
        self.handle
    }

    pub fn config(&self) -> TextureConfig {
        self.config
    }

    /// Size of the 2D image (or first cube face), once known.
    pub fn size(&self) -> Option<(u32, u32)> {
        match self.storage {
            Storage::Allocated { width, height } => Some((width, height)),
            Storage::External => None,
            Storage::Image => self
                .state
                .borrow()
                .faces
                .first()
                .and_then(|f| f.pixels.as_ref())
                .map(|p| (p.width, p.height)),
        }
    }

    /// True once every face has pixels (always true for allocated and
    /// external textures).
    pub fn is_ready(&self) -> bool {
        match self.storage {
            Storage::Image => {
                let state = self.state.borrow();
                !state.faces.is_empty() && state.faces.iter().all(|f| f.pixels.is_some())
            }
            Storage::Allocated { .. } | Storage::External => true,
        }
    }

    /// Decodes every face that has a source but no pixels yet.
    ///
    /// The returned future does not borrow the texture. Failures are logged
    /// and returned; the texture stays not ready and keeps rendering as if it
    /// were absent. A load that finishes after the source was replaced is
    /// discarded.
    pub fn load_image_data(&self) -> impl Future<Output = Result<(), TextureError>> + 'static {
        let state = Rc::clone(&self.state);
        let (generation, pending, missing) = {
            let s = state.borrow();
            let pending: Vec<(usize, ImageSource)> = s
                .faces
                .iter()
                .enumerate()
                .filter(|(_, f)| f.pixels.is_none())
                .filter_map(|(i, f)| f.source.clone().map(|src| (i, src)))
                .collect();
            let missing = s
                .faces
                .iter()
                .any(|f| f.pixels.is_none() && f.source.is_none());
            (s.generation, pending, missing)
        };
        let is_image = self.storage == Storage::Image;

        async move {
            if is_image && missing {
                log::warn!("texture load skipped: a face has no image source");
                return Err(TextureError::NoSource);
            }

            let mut decoded = Vec::with_capacity(pending.len());
            for (index, source) in pending {
                match decode(&source) {
                    Ok(pixels) => decoded.push((index, pixels)),
                    Err(e) => {
                        log::warn!("texture load failed for {source:?}: {e}");
                        return Err(e);
                    }
                }
            }

            let mut s = state.borrow_mut();
            if s.generation != generation {
                log::debug!("discarding texture load for a replaced source");
                return Ok(());
            }
            for (index, pixels) in decoded {
                if let Some(face) = s.faces.get_mut(index) {
                    face.pixels = Some(pixels);
                    face.uploaded = false;
                }
            }
            Ok(())
        }
    }

    /// Replaces the image of a 2D texture. The texture is not ready again
    /// until the new source loads.
    pub fn update_image(&self, source: ImageSource) -> Result<(), TextureError> {
        self.replace_face(0, source)
    }

    /// Replaces one face of a cube map.
    pub fn update_face(&self, face: CubeFace, source: ImageSource) -> Result<(), TextureError> {
        self.replace_face(face.index(), source)
    }

    fn replace_face(&self, index: usize, source: ImageSource) -> Result<(), TextureError> {
        if self.storage != Storage::Image {
            log::warn!("cannot replace the image of a texture without an image source");
            return Ok(());
        }
        let mut state = self.state.borrow_mut();
        state.generation += 1;
        match state.faces.get_mut(index) {
            Some(face) => face.set_source(source),
            None => {
                log::warn!("texture has no face {index}");
                Ok(())
            }
        }
    }

    /// Changes sampler state; applied on the next activation.
    pub fn update_config(&mut self, config: TextureConfig) {
        self.config = config;
        self.params_dirty.set(true);
    }

    /// Resizes an allocated texture, discarding its contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Storage::Allocated { .. } = self.storage {
            self.storage = Storage::Allocated { width, height };
            self.allocate(width, height);
        }
    }

    /// Binds the texture to its unit, uploading pending pixels first.
    ///
    /// Returns `false` without touching the context while any face is still
    /// missing pixels.
    pub fn activate(&self) -> bool {
        if !self.is_ready() {
            log::trace!("texture {:?} not ready; skipping activation", self.handle);
            return false;
        }
        self.ctx.active_texture(self.unit);
        self.ctx.bind_texture(self.target, Some(self.handle));
        self.upload_pending();
        if self.params_dirty.get() {
            self.apply_params();
        }
        true
    }

    fn upload_pending(&self) {
        let mut state = self.state.borrow_mut();
        let mut uploaded_any = false;
        for (index, face) in state.faces.iter_mut().enumerate() {
            let Some(pixels) = face.pixels.as_ref().filter(|_| !face.uploaded) else {
                continue;
            };
            let target = match self.target {
                TextureTarget::Texture2D => TextureImageTarget::Texture2D,
                TextureTarget::CubeMap => match CubeFace::ALL.get(index) {
                    Some(&f) => TextureImageTarget::CubeFace(f),
                    None => continue,
                },
            };
            self.ctx
                .tex_image_2d(target, pixels.width, pixels.height, Some(&pixels.data));
            face.uploaded = true;
            uploaded_any = true;
        }
        if uploaded_any {
            self.params_dirty.set(true);
        }
    }

    fn apply_params(&self) {
        let c = self.config;
        for param in [
            TextureParam::MinFilter(c.min_filter),
            TextureParam::MagFilter(c.mag_filter),
            TextureParam::WrapS(c.wrap_s),
            TextureParam::WrapT(c.wrap_t),
        ] {
            self.ctx.tex_parameter(self.target, param);
        }
        if c.generate_mipmap {
            self.ctx.generate_mipmap(self.target);
        }
        self.params_dirty.set(false);
    }
}

impl<C: GraphicsContext> Drop for Texture<C> {
    fn drop(&mut self) {
        if self.storage != Storage::External {
            self.ctx.delete_texture(self.handle);
        }
    }
}
