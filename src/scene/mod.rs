//! Scenes: ordered instances drawn with a shared view and projection.
//!
//! # Overview
//!
//! A [`Scene`] owns its instances and the matrices they are drawn with. Each
//! frame:
//!
//! 1. A camera (or the caller) sets the view and projection.
//! 2. [`Scene::render`] clears the drawing buffer, then for every instance in
//!    draw order pushes `view * model`, the normal matrix and the projection
//!    into its uniforms and draws it.
//!
//! Draw order is insertion order until changed with [`Scene::render_last`] and
//! friends, which is how translucent objects are drawn after opaque ones.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use orrery::context::SoftwareContext;
//! use orrery::{geometry, Camera, CameraKind, Projection, Scene, Vec3};
//!
//! const VS: &str = "in vec3 aVertexPosition;\nuniform mat4 uModelViewMatrix;\nuniform mat4 uProjectionMatrix;\nvoid main() {}";
//! const FS: &str = "uniform vec4 uMaterialDiffuse;\nvoid main() {}";
//!
//! let ctx = Rc::new(SoftwareContext::new(64, 64));
//! let mut scene = Scene::new(ctx.clone());
//! let axis = geometry::axis(10.0).instance(ctx, "aVertexPosition").shaders(VS, FS).build()?;
//! scene.add(axis)?;
//!
//! let camera = Camera::new(CameraKind::Orbiting, Projection::Perspective).at(Vec3::new(0.0, 0.0, 20.0));
//! scene.apply_camera(&camera)?;
//! scene.render()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod order;
pub mod scene;

pub use order::RenderOrder;
pub use scene::{Scene, SceneError};
