//! Headless demo: renders a small scene on the software context, spins the
//! camera with synthetic drag input, runs the result through a filter and
//! writes the last frame to a PNG.
//!
//! ```text
//! orrery-demo [filter] [output.png]
//! ```

use std::error::Error;
use std::rc::Rc;

use orrery::app::{FixedFrames, run_loop};
use orrery::context::SoftwareContext;
use orrery::controller::{Controller, InputEvent};
use orrery::{
    Camera, CameraKind, FilterKind, Matrix4, PickingController, PostProcess, Projection,
    RuntimeConfig, Scene, Vec3, geometry, init_logging,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FRAMES: u64 = 30;

const VS: &str = r#"#version 300 es
precision mediump float;

in vec3 aVertexPosition;

uniform mat4 uModelViewMatrix;
uniform mat4 uProjectionMatrix;

void main(void) {
  gl_Position = uProjectionMatrix * uModelViewMatrix * vec4(aVertexPosition, 1.0);
}
"#;

const FS: &str = r#"#version 300 es
precision mediump float;

uniform vec4 uMaterialDiffuse;
uniform bool uOffscreen;
uniform vec4 uPickingColor;

out vec4 fragColor;

void main(void) {
  fragColor = uOffscreen ? uPickingColor : uMaterialDiffuse;
}
"#;

fn main() -> Result<(), Box<dyn Error>> {
    let config = RuntimeConfig::new().log_filter("info,orrery=debug");
    init_logging(config.logging.clone());

    let mut args = std::env::args().skip(1);
    let filter: FilterKind = args.next().as_deref().unwrap_or("grayscale").parse()?;
    let output = args.next().unwrap_or_else(|| "orrery-demo.png".to_string());

    let ctx = Rc::new(SoftwareContext::new(WIDTH, HEIGHT));
    let mut scene = Scene::with_clear_color(ctx.clone(), config.clear_color);

    let floor = geometry::floor(10.0, 1)
        .instance(ctx.clone(), "aVertexPosition")
        .shaders(VS, FS)
        .id("floor")
        .build()?;
    scene.add(floor)?;
    scene.set_pickable(false, Some("floor"));

    let cone = geometry::cone(1.5, 3.0, 24)
        .instance(ctx.clone(), "aVertexPosition")
        .shaders(VS, FS)
        .id("cone")
        .transform(Matrix4::identity().translate(Vec3::new(-2.5, 0.0, 0.0)))
        .build()?;
    scene.add(cone)?;

    let arrow = geometry::arrow(4.0, 0.8, 16)
        .instance(ctx.clone(), "aVertexPosition")
        .shaders(VS, FS)
        .id("arrow")
        .uniform("uMaterialDiffuse", [0.1, 0.4, 0.9, 1.0])
        .transform(Matrix4::identity().translate(Vec3::new(2.5, 0.0, 0.0)))
        .build()?;
    scene.add(arrow)?;

    let mut camera = Camera::with_config(CameraKind::Orbiting, Projection::Perspective, config.camera)
        .at(Vec3::new(0.0, -1.5, 14.0));
    camera.set_elevation(-20.0);
    let mut controller = Controller::new(config.motion_factor);
    let mut picking = PickingController::new(ctx.clone(), 2, config.picking.clone())?;
    let mut post = PostProcess::new(ctx.clone(), filter)?;

    controller
        .handle(&InputEvent::PointerDown { x: 0.0, y: 0.0 }, &camera)
        .apply(&mut camera);

    let frames = run_loop(&mut FixedFrames::new(FRAMES, 1.0 / 30.0), |frame| {
        let drag = InputEvent::PointerMove {
            x: (frame.index + 1) as f32 * 10.0,
            y: 0.0,
        };
        controller.handle(&drag, &camera).apply(&mut camera);
        scene.apply_camera(&camera)?;

        picking.render(&mut scene)?;

        post.bind();
        scene.render()?;
        post.unbind();
        post.draw_at(frame.time)?;
        Ok::<_, Box<dyn Error>>(())
    })?;

    let centre = (WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0);
    match picking.pick(&scene, centre.0, centre.1) {
        Some(id) => log::info!("`{id}` is under the centre of the frame"),
        None => log::info!("nothing under the centre of the frame"),
    }

    ctx.screenshot().save(&output)?;
    log::info!(
        "rendered {frames} frames through the {filter} filter to {output} (azimuth {:.1})",
        camera.azimuth()
    );
    Ok(())
}
