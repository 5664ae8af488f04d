//! # Orrery
//!
//! **A small real-time 3D rendering runtime over a GL-style context.**
//!
//! Describe what to draw as [`Instance`]s (geometry buffers, typed uniforms,
//! textures), put them in a [`Scene`], point a [`Camera`] at it, and render a
//! frame. Picking and full-screen filters are second passes over the same
//! scene.
//!
//! ## Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use orrery::context::SoftwareContext;
//! use orrery::{Attribute, Camera, CameraKind, Instance, Projection, Scene, Vec3};
//!
//! let ctx = Rc::new(SoftwareContext::new(64, 64));
//! let mut scene = Scene::new(ctx.clone());
//!
//! let triangle = Instance::builder(ctx.clone())
//!     .shaders(
//!         "in vec3 aVertexPosition;\nuniform mat4 uModelViewMatrix;\nuniform mat4 uProjectionMatrix;\nvoid main() {}",
//!         "uniform vec4 uMaterialDiffuse;\nvoid main() {}",
//!     )
//!     .attribute(
//!         "aVertexPosition",
//!         Attribute::float(vec![-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0], 3),
//!     )
//!     .indices(vec![0, 1, 2])
//!     .uniform("uMaterialDiffuse", [0.2, 0.5, 0.8, 1.0])
//!     .build()?;
//! scene.add(triangle)?;
//!
//! let camera = Camera::new(CameraKind::Orbiting, Projection::Perspective)
//!     .at(Vec3::new(0.0, 0.0, 4.0));
//! scene.apply_camera(&camera)?;
//! scene.render()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Layout
//!
//! - [`context`]: the [`GraphicsContext`](context::GraphicsContext) boundary,
//!   with a `glow` backend and a headless software one.
//! - [`math`]: vectors and matrices with the composition order shaders expect.
//! - [`Program`], [`Uniform`], [`Texture`], [`Instance`]: GPU resources, each
//!   owned by exactly one value and released on drop.
//! - [`Scene`]: draw order and the per-frame transform uniforms.
//! - [`Camera`] and [`controller`]: view state and the input reducer that
//!   drives it.
//! - [`picking`], [`post_process`]: off-screen passes.
//! - [`app`]: frame scheduling.

pub mod app;
mod camera;
pub mod config;
pub mod context;
pub mod controller;
mod framebuffer;
pub mod geometry;
pub mod input;
mod instance;
pub mod logging;
pub mod math;
pub mod picking;
pub mod post_process;
mod program;
pub mod scene;
mod texture;
mod uniform;

pub use camera::{Camera, CameraKind, Projection};
pub use config::{CameraConfig, PickingConfig, RuntimeConfig};
pub use framebuffer::Framebuffer;
pub use instance::{
    Attribute, AttributeData, Instance, InstanceBuilder, InstanceConfig, InstanceError,
};
pub use logging::{LoggingConfig, init_logging};
pub use math::{AlgebraError, Matrix2, Matrix3, Matrix4, Vector};
pub use picking::{PickEvent, PickingController, PickingError};
pub use post_process::{FilterKind, PostProcess, PostProcessError};
pub use program::{
    MODEL_VIEW_MATRIX, NORMAL_MATRIX, PROJECTION_MATRIX, Program, ProgramError,
    TRANSFORM_UNIFORMS,
};
pub use scene::{RenderOrder, Scene, SceneError};
pub use texture::{ImageSource, Texture, TextureConfig, TextureError};
pub use uniform::{Uniform, UniformError, UniformKind, UniformOptions, UniformValue};

pub use context::{ContextError, RenderingMode};

// Re-export glam types used across the public API
pub use glam::{Vec2, Vec3, Vec4};
