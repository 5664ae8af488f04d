//! Off-screen render targets.

use std::rc::Rc;

use crate::context::GraphicsContext;
use crate::texture::{Texture, TextureConfig, TextureError};

/// A framebuffer with a colour texture and a depth renderbuffer of the same
/// size.
///
/// While bound, draws land in [`Framebuffer::texture`], which can then be
/// sampled like any other texture.
pub struct Framebuffer<C: GraphicsContext> {
    ctx: Rc<C>,
    handle: C::Framebuffer,
    depth: C::Renderbuffer,
    texture: Texture<C>,
    width: u32,
    height: u32,
}

impl<C: GraphicsContext> Framebuffer<C> {
    /// A target sized to the current drawing buffer, its colour texture
    /// assigned to `unit`.
    pub fn for_canvas(ctx: Rc<C>, unit: u32) -> Result<Self, TextureError> {
        let (width, height) = ctx.drawing_buffer_size();
        Self::new(ctx, unit, width, height)
    }

    pub fn new(ctx: Rc<C>, unit: u32, width: u32, height: u32) -> Result<Self, TextureError> {
        let texture = Texture::with_size(ctx.clone(), unit, width, height, TextureConfig::default())?;
        let depth = ctx.create_renderbuffer()?;
        let handle = match ctx.create_framebuffer() {
            Ok(handle) => handle,
            Err(e) => {
                ctx.delete_renderbuffer(depth);
                return Err(e.into());
            }
        };

        let framebuffer = Self {
            ctx,
            handle,
            depth,
            texture,
            width,
            height,
        };
        framebuffer.allocate_depth();
        framebuffer.ctx.bind_framebuffer(Some(handle));
        framebuffer
            .ctx
            .framebuffer_texture_2d(Some(framebuffer.texture.handle()));
        framebuffer.ctx.framebuffer_renderbuffer_depth(Some(depth));
        framebuffer.ctx.bind_framebuffer(None);
        Ok(framebuffer)
    }

    fn allocate_depth(&self) {
        self.ctx.bind_renderbuffer(Some(self.depth));
        self.ctx.renderbuffer_depth_storage(self.width, self.height);
        self.ctx.bind_renderbuffer(None);
    }

    pub fn handle(&self) -> C::Framebuffer {
        self.handle
    }

    pub fn texture(&self) -> &Texture<C> {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Redirects subsequent draws into this target.
    pub fn bind(&self) {
        self.ctx.bind_framebuffer(Some(self.handle));
    }

    /// Restores the default framebuffer.
    pub fn unbind(&self) {
        self.ctx.bind_framebuffer(None);
    }

    /// Reallocates colour and depth storage. Contents are lost.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        log::debug!(
            "framebuffer {:?}: {}x{} -> {}x{}",
            self.handle,
            self.width,
            self.height,
            width,
            height
        );
        self.width = width;
        self.height = height;
        self.texture.resize(width, height);
        self.allocate_depth();
    }

    /// Follows the drawing buffer size. Call once per frame.
    pub fn ensure_canvas_size(&mut self) {
        let (width, height) = self.ctx.drawing_buffer_size();
        self.resize(width, height);
    }
}

impl<C: GraphicsContext> Drop for Framebuffer<C> {
    fn drop(&mut self) {
        self.ctx.delete_framebuffer(self.handle);
        self.ctx.delete_renderbuffer(self.depth);
    }
}
