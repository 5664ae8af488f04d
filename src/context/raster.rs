//! Scanline-free rasterizer for the software context.
//!
//! Colour targets are RGBA8 with the first row at the bottom, matching GL
//! readback. Triangles are filled by edge functions with no face culling,
//! lines by DDA and points as single pixels.

use glam::{Vec2, Vec4};

use super::{BlendFactor, ClearMask, DepthFunc, RenderingMode, TextureWrap};

/// RGBA8 pixel storage, bottom row first.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Image {
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }
}

pub(crate) struct Target<'a> {
    pub width: u32,
    pub height: u32,
    pub color: &'a mut [u8],
    pub depth: Option<&'a mut [f32]>,
}

pub(crate) enum Shading<'a> {
    Flat(Vec4),
    Textured {
        image: Option<&'a Image>,
        wrap: (TextureWrap, TextureWrap),
    },
}

pub(crate) struct Pipeline<'a> {
    /// `[x, y, width, height]`
    pub viewport: [i32; 4],
    /// Depth comparison, when depth testing is enabled.
    pub depth: Option<DepthFunc>,
    pub blend: Option<(BlendFactor, BlendFactor)>,
    pub shading: Shading<'a>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Vertex {
    pub clip: Vec4,
    pub uv: Vec2,
}

#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
    inv_w: f32,
    /// Texture coordinates divided by w, for perspective-correct interpolation.
    uv_w: Vec2,
}

impl ScreenVertex {
    fn lerp(self, other: ScreenVertex, t: f32) -> ScreenVertex {
        ScreenVertex {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
            inv_w: self.inv_w + (other.inv_w - self.inv_w) * t,
            uv_w: self.uv_w.lerp(other.uv_w, t),
        }
    }

    fn uv(&self) -> Vec2 {
        self.uv_w / self.inv_w
    }
}

fn to_screen(v: &Vertex, viewport: [i32; 4]) -> Option<ScreenVertex> {
    if v.clip.w <= 0.0 {
        return None;
    }
    let inv_w = 1.0 / v.clip.w;
    let ndc = v.clip.truncate() * inv_w;
    let [vx, vy, vw, vh] = viewport;
    Some(ScreenVertex {
        x: vx as f32 + (ndc.x + 1.0) * 0.5 * vw as f32,
        y: vy as f32 + (ndc.y + 1.0) * 0.5 * vh as f32,
        z: (ndc.z + 1.0) * 0.5,
        inv_w,
        uv_w: v.uv * inv_w,
    })
}

pub(crate) fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Fills the whole target, ignoring the viewport.
pub(crate) fn clear(target: &mut Target<'_>, mask: ClearMask, color: [f32; 4], depth: f32) {
    if mask.color {
        let rgba = color.map(to_byte);
        for px in target.color.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }
    if mask.depth {
        if let Some(buffer) = target.depth.as_deref_mut() {
            buffer.fill(depth);
        }
    }
}

/// Rasterizes `vertices`, assembled into primitives according to `mode`.
pub(crate) fn draw(
    target: &mut Target<'_>,
    pipeline: &Pipeline<'_>,
    mode: RenderingMode,
    vertices: &[Vertex],
) {
    let screen: Vec<Option<ScreenVertex>> = vertices
        .iter()
        .map(|v| to_screen(v, pipeline.viewport))
        .collect();

    let mut raster = Rasterizer { target, pipeline };
    match mode {
        RenderingMode::Points => screen.iter().flatten().for_each(|v| raster.point(*v)),
        RenderingMode::Lines => {
            for pair in screen.chunks_exact(2) {
                raster.line(pair[0], pair[1]);
            }
        }
        RenderingMode::LineStrip | RenderingMode::LineLoop => {
            for pair in screen.windows(2) {
                raster.line(pair[0], pair[1]);
            }
            if mode == RenderingMode::LineLoop && screen.len() > 2 {
                raster.line(screen[screen.len() - 1], screen[0]);
            }
        }
        RenderingMode::Triangles => {
            for tri in screen.chunks_exact(3) {
                raster.triangle(tri[0], tri[1], tri[2]);
            }
        }
        RenderingMode::TriangleStrip => {
            for tri in screen.windows(3) {
                raster.triangle(tri[0], tri[1], tri[2]);
            }
        }
        RenderingMode::TriangleFan => {
            for i in 1..screen.len().saturating_sub(1) {
                raster.triangle(screen[0], screen[i], screen[i + 1]);
            }
        }
    }
}

struct Rasterizer<'t, 'a, 'p> {
    target: &'t mut Target<'a>,
    pipeline: &'t Pipeline<'p>,
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, x: f32, y: f32) -> f32 {
    (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x)
}

impl Rasterizer<'_, '_, '_> {
    fn point(&mut self, v: ScreenVertex) {
        self.fragment(v.x.floor() as i64, v.y.floor() as i64, v.z, v.uv());
    }

    fn line(&mut self, a: Option<ScreenVertex>, b: Option<ScreenVertex>) {
        let (Some(a), Some(b)) = (a, b) else { return };
        let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0) as u32;
        for i in 0..=steps {
            let p = a.lerp(b, i as f32 / steps as f32);
            self.fragment(p.x.floor() as i64, p.y.floor() as i64, p.z, p.uv());
        }
    }

    fn triangle(&mut self, a: Option<ScreenVertex>, b: Option<ScreenVertex>, c: Option<ScreenVertex>) {
        let (Some(a), Some(b), Some(c)) = (a, b, c) else { return };
        let area = edge(&a, &b, c.x, c.y);
        if area.abs() <= f32::EPSILON {
            return;
        }

        let [vx, vy, vw, vh] = self.pipeline.viewport;
        let min_x = a.x.min(b.x).min(c.x).floor().max(vx.max(0) as f32) as i64;
        let min_y = a.y.min(b.y).min(c.y).floor().max(vy.max(0) as f32) as i64;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as i64)
            .min((vx + vw) as i64)
            .min(self.target.width as i64);
        let max_y = (a.y.max(b.y).max(c.y).ceil() as i64)
            .min((vy + vh) as i64)
            .min(self.target.height as i64);

        for py in min_y..max_y {
            for px in min_x..max_x {
                let (x, y) = (px as f32 + 0.5, py as f32 + 0.5);
                let w0 = edge(&b, &c, x, y) / area;
                let w1 = edge(&c, &a, x, y) / area;
                let w2 = edge(&a, &b, x, y) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = w0 * a.z + w1 * b.z + w2 * c.z;
                let inv_w = w0 * a.inv_w + w1 * b.inv_w + w2 * c.inv_w;
                let uv = (a.uv_w * w0 + b.uv_w * w1 + c.uv_w * w2) / inv_w;
                self.fragment(px, py, z, uv);
            }
        }
    }

    fn fragment(&mut self, px: i64, py: i64, z: f32, uv: Vec2) {
        let [vx, vy, vw, vh] = self.pipeline.viewport;
        let inside_viewport = px >= vx as i64
            && py >= vy as i64
            && px < (vx + vw) as i64
            && py < (vy + vh) as i64;
        let inside_target =
            px >= 0 && py >= 0 && px < self.target.width as i64 && py < self.target.height as i64;
        if !inside_viewport || !inside_target || !(0.0..=1.0).contains(&z) {
            return;
        }

        let index = py as usize * self.target.width as usize + px as usize;
        if let (Some(func), Some(depth)) = (self.pipeline.depth, self.target.depth.as_deref_mut()) {
            let Some(stored) = depth.get_mut(index) else { return };
            if !depth_passes(func, z, *stored) {
                return;
            }
            *stored = z;
        }

        let src = match &self.pipeline.shading {
            Shading::Flat(color) => *color,
            Shading::Textured { image, wrap } => sample(*image, *wrap, uv),
        };
        let Some(dst) = self.target.color.get_mut(index * 4..index * 4 + 4) else {
            return;
        };
        let out = match self.pipeline.blend {
            Some((sf, df)) => {
                let d = Vec4::new(dst[0] as f32, dst[1] as f32, dst[2] as f32, dst[3] as f32) / 255.0;
                src * factor(sf, src, d) + d * factor(df, src, d)
            }
            None => src,
        };
        dst.copy_from_slice(&out.to_array().map(to_byte));
    }
}

fn depth_passes(func: DepthFunc, incoming: f32, stored: f32) -> bool {
    match func {
        DepthFunc::Never => false,
        DepthFunc::Less => incoming < stored,
        DepthFunc::Equal => incoming == stored,
        DepthFunc::LessEqual => incoming <= stored,
        DepthFunc::Greater => incoming > stored,
        DepthFunc::NotEqual => incoming != stored,
        DepthFunc::GreaterEqual => incoming >= stored,
        DepthFunc::Always => true,
    }
}

fn factor(f: BlendFactor, src: Vec4, dst: Vec4) -> Vec4 {
    match f {
        BlendFactor::Zero => Vec4::ZERO,
        BlendFactor::One => Vec4::ONE,
        BlendFactor::SrcColor => src,
        BlendFactor::OneMinusSrcColor => Vec4::ONE - src,
        BlendFactor::SrcAlpha => Vec4::splat(src.w),
        BlendFactor::OneMinusSrcAlpha => Vec4::splat(1.0 - src.w),
        BlendFactor::DstAlpha => Vec4::splat(dst.w),
        BlendFactor::OneMinusDstAlpha => Vec4::splat(1.0 - dst.w),
    }
}

fn wrap_coord(t: f32, wrap: TextureWrap) -> f32 {
    match wrap {
        TextureWrap::ClampToEdge => t.clamp(0.0, 1.0),
        TextureWrap::Repeat => t.rem_euclid(1.0),
        TextureWrap::MirroredRepeat => {
            let m = t.rem_euclid(2.0);
            if m > 1.0 { 2.0 - m } else { m }
        }
    }
}

/// Nearest-texel lookup. Missing or empty images read as opaque black.
pub(crate) fn sample(image: Option<&Image>, wrap: (TextureWrap, TextureWrap), uv: Vec2) -> Vec4 {
    let Some(image) = image.filter(|i| i.width > 0 && i.height > 0) else {
        return Vec4::new(0.0, 0.0, 0.0, 1.0);
    };
    let u = wrap_coord(uv.x, wrap.0);
    let v = wrap_coord(uv.y, wrap.1);
    let x = ((u * image.width as f32).floor() as u32).min(image.width - 1);
    let y = ((v * image.height as f32).floor() as u32).min(image.height - 1);
    let i = (y as usize * image.width as usize + x as usize) * 4;
    match image.data.get(i..i + 4) {
        Some(t) => Vec4::new(t[0] as f32, t[1] as f32, t[2] as f32, t[3] as f32) / 255.0,
        None => Vec4::new(0.0, 0.0, 0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Buffers {
        color: Vec<u8>,
        depth: Vec<f32>,
    }

    impl Buffers {
        fn new() -> Self {
            Self {
                color: vec![0; 8 * 8 * 4],
                depth: vec![1.0; 8 * 8],
            }
        }

        fn target(&mut self) -> Target<'_> {
            Target {
                width: 8,
                height: 8,
                color: &mut self.color,
                depth: Some(&mut self.depth),
            }
        }

        fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
            let i = (y * 8 + x) * 4;
            [self.color[i], self.color[i + 1], self.color[i + 2], self.color[i + 3]]
        }
    }

    fn flat(color: Vec4, depth: Option<DepthFunc>) -> Pipeline<'static> {
        Pipeline {
            viewport: [0, 0, 8, 8],
            depth,
            blend: None,
            shading: Shading::Flat(color),
        }
    }

    fn v(x: f32, y: f32, z: f32) -> Vertex {
        Vertex {
            clip: Vec4::new(x, y, z, 1.0),
            uv: Vec2::ZERO,
        }
    }

    fn full_screen(z: f32) -> Vec<Vertex> {
        vec![
            v(-1.0, -1.0, z),
            v(1.0, -1.0, z),
            v(1.0, 1.0, z),
            v(-1.0, -1.0, z),
            v(1.0, 1.0, z),
            v(-1.0, 1.0, z),
        ]
    }

    #[test]
    fn triangles_cover_the_viewport() {
        let mut b = Buffers::new();
        draw(
            &mut b.target(),
            &flat(Vec4::new(1.0, 0.0, 0.0, 1.0), None),
            RenderingMode::Triangles,
            &full_screen(0.0),
        );
        for (x, y) in [(0, 0), (7, 7), (3, 4)] {
            assert_eq!(b.pixel(x, y), [255, 0, 0, 255]);
        }
    }

    #[test]
    fn winding_does_not_matter() {
        let mut b = Buffers::new();
        let tri = [v(-1.0, -1.0, 0.0), v(-1.0, 1.0, 0.0), v(1.0, -1.0, 0.0)];
        draw(
            &mut b.target(),
            &flat(Vec4::ONE, None),
            RenderingMode::Triangles,
            &tri,
        );
        assert_eq!(b.pixel(0, 0), [255; 4]);
        assert_eq!(b.pixel(7, 7), [0; 4]);
    }

    #[test]
    fn depth_test_keeps_nearest() {
        let mut b = Buffers::new();
        let near = flat(Vec4::new(0.0, 1.0, 0.0, 1.0), Some(DepthFunc::LessEqual));
        let far = flat(Vec4::new(0.0, 0.0, 1.0, 1.0), Some(DepthFunc::LessEqual));
        draw(&mut b.target(), &near, RenderingMode::Triangles, &full_screen(-0.5));
        draw(&mut b.target(), &far, RenderingMode::Triangles, &full_screen(0.5));
        assert_eq!(b.pixel(4, 4), [0, 255, 0, 255]);
    }

    #[test]
    fn points_and_lines_touch_pixels() {
        let mut b = Buffers::new();
        let white = flat(Vec4::ONE, None);
        draw(&mut b.target(), &white, RenderingMode::Points, &[v(0.0, 0.0, 0.0)]);
        assert_eq!(b.pixel(4, 4), [255; 4]);

        draw(
            &mut b.target(),
            &white,
            RenderingMode::Lines,
            &[v(-1.0, -0.9, 0.0), v(0.99, -0.9, 0.0)],
        );
        assert!((0..8).all(|x| b.pixel(x, 0) == [255; 4]));
    }

    #[test]
    fn alpha_blending_mixes_with_destination() {
        let mut b = Buffers::new();
        let mut half = flat(Vec4::new(1.0, 1.0, 1.0, 0.5), None);
        half.blend = Some((BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha));
        draw(&mut b.target(), &half, RenderingMode::Triangles, &full_screen(0.0));
        assert_eq!(b.pixel(2, 2)[0], 128);
    }

    #[test]
    fn clear_fills_everything() {
        let mut b = Buffers::new();
        clear(&mut b.target(), ClearMask::ALL, [0.0, 0.0, 1.0, 1.0], 0.25);
        assert_eq!(b.pixel(7, 0), [0, 0, 255, 255]);
        assert!(b.depth.iter().all(|&d| d == 0.25));
    }

    #[test]
    fn sampling_is_nearest_with_bottom_row_first() {
        let image = Image {
            width: 2,
            height: 2,
            data: vec![
                255, 0, 0, 255, 0, 255, 0, 255, // bottom row
                0, 0, 255, 255, 255, 255, 255, 255, // top row
            ],
        };
        let wrap = (TextureWrap::ClampToEdge, TextureWrap::ClampToEdge);
        assert_eq!(sample(Some(&image), wrap, Vec2::new(0.1, 0.1)), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(sample(Some(&image), wrap, Vec2::new(0.9, 0.9)), Vec4::ONE);
        assert_eq!(sample(None, wrap, Vec2::ZERO), Vec4::new(0.0, 0.0, 0.0, 1.0));
    }
}
