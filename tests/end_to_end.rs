use std::rc::Rc;

use orrery::context::software::Call;
use orrery::context::{RenderingMode, SoftwareContext};
use orrery::{
    Attribute, Camera, CameraKind, ImageSource, Instance, Matrix4, PickingConfig,
    PickingController, Projection, Scene, Texture, TextureConfig, TextureError, UniformOptions,
    UniformValue, Vec3,
};

const VS: &str = "in vec3 aVertexPosition;\nuniform mat4 uModelViewMatrix;\nuniform mat4 uProjectionMatrix;\nvoid main() {}";
const FS: &str = "uniform vec4 uMaterialDiffuse;\nuniform bool uOffscreen;\nuniform vec4 uPickingColor;\nvoid main() {}";

fn ctx() -> Rc<SoftwareContext> {
    Rc::new(SoftwareContext::new(16, 16))
}

#[test]
fn triangle_draws_with_identity_model_view() {
    let ctx = ctx();
    let mut scene = Scene::new(Rc::clone(&ctx));
    let triangle = Instance::builder(Rc::clone(&ctx))
        .shaders(VS, FS)
        .attribute(
            "aVertexPosition",
            Attribute::float(vec![-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0], 3),
        )
        .indices(vec![0, 1, 2])
        .uniform("uMaterialDiffuse", [1.0, 0.0, 0.0, 1.0])
        .build()
        .unwrap();
    let id = scene.add(triangle).unwrap();

    scene.render().unwrap();

    let draws = ctx.draw_calls();
    assert_eq!(draws.len(), 1);
    let Call::Draw { mode, count, indexed, program: Some(program), .. } = draws[0].clone() else {
        panic!("expected a draw with a program in use");
    };
    assert_eq!((mode, count, indexed), (RenderingMode::Triangles, 3, true));

    let model_view = ctx
        .uniform_value(program, "uModelViewMatrix")
        .unwrap()
        .as_floats();
    assert_eq!(model_view, Matrix4::identity().to_cols_array().to_vec());
    let stored = scene.get_uniform(&id, "uModelViewMatrix").unwrap();
    assert_eq!(stored.value().to_floats(), model_view);

    // The triangle covers the middle of the canvas in its diffuse colour.
    assert_eq!(ctx.pixel(8, 6), Some([255, 0, 0, 255]));
}

#[test]
fn orbiting_camera_matches_reference_composition() {
    let mut camera = Camera::new(CameraKind::Orbiting, Projection::Perspective);
    camera.set_position(Vec3::new(0.0, 0.0, 10.0));
    camera.set_azimuth(90.0);

    let reference = Matrix4::identity()
        .translate(Vec3::new(0.0, 0.0, -10.0))
        .rotate_vec_deg(Vec3::new(0.0, 90.0, 0.0));
    assert!(camera.view_matrix().approx_eq(&reference, 1e-5));

    let mut tracking = camera.clone();
    tracking.set_kind(CameraKind::Tracking);
    assert!(!tracking.view_matrix().approx_eq(&reference, 1e-3));
}

fn quad(ctx: &Rc<SoftwareContext>, id: &str, x0: f32, x1: f32) -> Instance<SoftwareContext> {
    Instance::builder(Rc::clone(ctx))
        .shaders(VS, FS)
        .id(id)
        .attribute(
            "aVertexPosition",
            Attribute::float(
                vec![x0, -0.5, 0.0, x1, -0.5, 0.0, x1, 0.5, 0.0, x0, 0.5, 0.0],
                3,
            ),
        )
        .indices(vec![0, 1, 2, 0, 2, 3])
        .uniform("uMaterialDiffuse", [0.5, 0.5, 0.5, 1.0])
        .build()
        .unwrap()
}

#[test]
fn picking_resolves_instances_and_background() {
    let ctx = ctx();
    let mut scene = Scene::new(Rc::clone(&ctx));
    scene.add(quad(&ctx, "west", -0.9, -0.1)).unwrap();
    scene.add(quad(&ctx, "east", 0.1, 0.9)).unwrap();

    let mut picking = PickingController::new(Rc::clone(&ctx), 1, PickingConfig::default()).unwrap();
    picking.render(&mut scene).unwrap();

    // Window coordinates, origin top-left; both quads span the middle rows.
    assert_eq!(picking.pick(&scene, 4.0, 8.0).as_deref(), Some("west"));
    assert_eq!(picking.pick(&scene, 11.0, 8.0).as_deref(), Some("east"));
    assert_eq!(picking.pick(&scene, 8.0, 1.0), None);
    assert_eq!(picking.pick(&scene, 0.0, 15.0), None);
}

#[test]
fn invalid_texture_rejects_and_never_binds() {
    let ctx = ctx();
    let texture = Texture::new_2d(
        Rc::clone(&ctx),
        0,
        ImageSource::from("does/not/exist.png"),
        TextureConfig::default(),
    )
    .unwrap();

    let result = pollster::block_on(texture.load_image_data());
    assert!(matches!(result, Err(TextureError::Io { .. })));

    ctx.clear_calls();
    assert!(!texture.activate());
    assert!(!texture.is_ready());
    assert!(ctx.calls().is_empty());

    let garbage = Texture::new_2d(
        Rc::clone(&ctx),
        0,
        ImageSource::encoded(vec![0u8, 1, 2, 3]),
        TextureConfig::default(),
    )
    .unwrap();
    assert!(matches!(
        pollster::block_on(garbage.load_image_data()),
        Err(TextureError::Decode(_))
    ));
    assert!(!garbage.activate());
}

#[test]
fn array_and_transposed_uniforms_survive_a_mixed_broadcast() {
    const LIT_FS: &str = "uniform vec3 uLightPositions[4];\nuniform mat4 uTextureMatrix;\nuniform vec4 uMaterialDiffuse;\nvoid main() {}";
    const DIM_FS: &str = "uniform float uMaterialDiffuse;\nvoid main() {}";

    let ctx = ctx();
    let mut scene = Scene::new(Rc::clone(&ctx));
    let positions = || Attribute::float(vec![-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0], 3);
    let dim = Instance::builder(Rc::clone(&ctx))
        .shaders(VS, DIM_FS)
        .id("dim")
        .attribute("aVertexPosition", positions())
        .indices(vec![0, 1, 2])
        .uniform("uMaterialDiffuse", 0.25)
        .build()
        .unwrap();
    let lit = Instance::builder(Rc::clone(&ctx))
        .shaders(VS, LIT_FS)
        .id("lit")
        .attribute("aVertexPosition", positions())
        .indices(vec![0, 1, 2])
        .uniform("uMaterialDiffuse", [1.0, 1.0, 1.0, 1.0])
        .uniform_with(
            "uLightPositions",
            UniformValue::FloatVector(vec![0.0; 12]),
            UniformOptions::new().count(3),
        )
        .uniform_with(
            "uTextureMatrix",
            Matrix4::identity().translate(Vec3::new(4.0, 5.0, 6.0)),
            UniformOptions::new().transpose(true),
        )
        .build()
        .unwrap();
    scene.add(dim).unwrap();
    scene.add(lit).unwrap();

    scene
        .update_uniform("uMaterialDiffuse", [0.0, 0.0, 1.0, 1.0], None)
        .unwrap();
    let lights: Vec<f32> = (0..12).map(|i| i as f32 * 0.5).collect();
    scene
        .update_uniform("uLightPositions", UniformValue::FloatVector(lights.clone()), None)
        .unwrap();
    scene.render().unwrap();

    let program = scene.get("lit").unwrap().program().handle();
    let read = |name| ctx.uniform_value(program, name).unwrap().as_floats();
    assert_eq!(read("uMaterialDiffuse"), vec![0.0, 0.0, 1.0, 1.0]);
    assert_eq!(read("uLightPositions"), lights);
    let texture_matrix = read("uTextureMatrix");
    assert_eq!(
        [texture_matrix[3], texture_matrix[7], texture_matrix[11]],
        [4.0, 5.0, 6.0]
    );
    assert_eq!(
        scene.get_uniform("dim", "uMaterialDiffuse").unwrap().value(),
        &UniformValue::Float(0.25)
    );
}
