//! Linked shader programs with cached attribute and uniform locations.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::context::{ContextError, GraphicsContext, ShaderStage};

/// Model-view matrix pushed by the scene every frame.
pub const MODEL_VIEW_MATRIX: &str = "uModelViewMatrix";
/// Normal matrix, `transpose(inverse(model_view))`.
pub const NORMAL_MATRIX: &str = "uNormalMatrix";
pub const PROJECTION_MATRIX: &str = "uProjectionMatrix";

/// Uniforms the scene manages on behalf of every instance.
pub const TRANSFORM_UNIFORMS: [&str; 3] = [MODEL_VIEW_MATRIX, NORMAL_MATRIX, PROJECTION_MATRIX];

/// Construction-time program failures. None of these are retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProgramError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link: {log}")]
    Link { log: String },
    #[error("attribute `{0}` is not active in the linked program")]
    MissingAttribute(String),
    #[error("uniform `{0}` is not active in the linked program")]
    MissingUniform(String),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// One linked vertex + fragment program.
///
/// Every attribute and uniform name passed to [`Program::new`] must be active
/// in the linked program; locations are resolved once and never change. The
/// GPU program is deleted when the `Program` is dropped, so share it through an
/// `Rc<Program<C>>` when several instances draw with it.
pub struct Program<C: GraphicsContext> {
    ctx: Rc<C>,
    handle: C::Program,
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, C::UniformLocation>,
}

impl<C: GraphicsContext> std::fmt::Debug for Program<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("handle", &self.handle)
            .field("attributes", &self.attributes)
            .field("uniforms", &self.uniforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn compile<C: GraphicsContext>(
    ctx: &C,
    stage: ShaderStage,
    source: &str,
) -> Result<C::Shader, ProgramError> {
    let shader = ctx.create_shader(stage)?;
    ctx.shader_source(shader, source);
    if let Err(log) = ctx.compile_shader(shader) {
        ctx.delete_shader(shader);
        log::error!("{stage} shader failed to compile:\n{log}");
        return Err(ProgramError::Compile { stage, log });
    }
    Ok(shader)
}

fn link<C: GraphicsContext>(
    ctx: &C,
    vertex: C::Shader,
    fragment: C::Shader,
) -> Result<C::Program, ProgramError> {
    let program = ctx.create_program()?;
    ctx.attach_shader(program, vertex);
    ctx.attach_shader(program, fragment);
    let linked = ctx.link_program(program);
    ctx.detach_shader(program, vertex);
    ctx.detach_shader(program, fragment);

    if let Err(log) = linked {
        ctx.delete_program(program);
        log::error!("program failed to link:\n{log}");
        return Err(ProgramError::Link { log });
    }
    Ok(program)
}

impl<C: GraphicsContext> Program<C> {
    /// Compiles, links and resolves every listed name.
    ///
    /// The transform uniforms ([`TRANSFORM_UNIFORMS`]) are resolved as well
    /// when the program declares them, without being required.
    pub fn new(
        ctx: Rc<C>,
        vertex_source: &str,
        fragment_source: &str,
        attributes: &[&str],
        uniforms: &[&str],
    ) -> Result<Self, ProgramError> {
        let vertex = compile(&*ctx, ShaderStage::Vertex, vertex_source)?;
        let fragment = match compile(&*ctx, ShaderStage::Fragment, fragment_source) {
            Ok(shader) => shader,
            Err(e) => {
                ctx.delete_shader(vertex);
                return Err(e);
            }
        };
        let linked = link(&*ctx, vertex, fragment);
        ctx.delete_shader(vertex);
        ctx.delete_shader(fragment);
        let handle = linked?;

        // From here on, dropping `program` releases the handle.
        let mut program = Self {
            ctx,
            handle,
            attributes: HashMap::new(),
            uniforms: HashMap::new(),
        };

        for &name in attributes {
            let location = program
                .ctx
                .get_attrib_location(handle, name)
                .ok_or_else(|| ProgramError::MissingAttribute(name.to_string()))?;
            program.attributes.insert(name.to_string(), location);
        }
        for &name in uniforms {
            let location = program
                .ctx
                .get_uniform_location(handle, name)
                .ok_or_else(|| ProgramError::MissingUniform(name.to_string()))?;
            program.uniforms.insert(name.to_string(), location);
        }
        for name in TRANSFORM_UNIFORMS {
            if program.uniforms.contains_key(name) {
                continue;
            }
            if let Some(location) = program.ctx.get_uniform_location(handle, name) {
                program.uniforms.insert(name.to_string(), location);
            }
        }

        log::debug!(
            "linked program {:?}: {} attributes, {} uniforms",
            handle,
            program.attributes.len(),
            program.uniforms.len()
        );
        Ok(program)
    }

    /// Makes this the active program.
    pub fn use_program(&self) {
        self.ctx.use_program(Some(self.handle));
    }

    pub fn handle(&self) -> C::Program {
        self.handle
    }

    pub fn context(&self) -> &Rc<C> {
        &self.ctx
    }

    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn uniform_location(&self, name: &str) -> Option<&C::UniformLocation> {
        self.uniforms.get(name)
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }
}

impl<C: GraphicsContext> Drop for Program<C> {
    fn drop(&mut self) {
        self.ctx.delete_program(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SoftwareContext;

    const VS: &str = "in vec3 aVertexPosition;\nin vec3 aVertexNormal;\nuniform mat4 uModelViewMatrix;\nuniform mat4 uProjectionMatrix;\nvoid main() {}";
    const FS: &str = "uniform vec4 uMaterialDiffuse;\nvoid main() {}";

    fn ctx() -> Rc<SoftwareContext> {
        Rc::new(SoftwareContext::new(4, 4))
    }

    #[test]
    fn resolves_listed_names() {
        let ctx = ctx();
        let program = Program::new(
            ctx.clone(),
            VS,
            FS,
            &["aVertexPosition", "aVertexNormal"],
            &["uMaterialDiffuse"],
        )
        .unwrap();
        assert_eq!(program.attribute("aVertexPosition"), Some(0));
        assert_eq!(program.attribute("aVertexNormal"), Some(1));
        assert!(program.uniform_location("uMaterialDiffuse").is_some());
    }

    #[test]
    fn transform_uniforms_are_optional() {
        let program = Program::new(ctx(), VS, FS, &[], &[]).unwrap();
        assert!(program.has_uniform(MODEL_VIEW_MATRIX));
        assert!(program.has_uniform(PROJECTION_MATRIX));
        assert!(!program.has_uniform(NORMAL_MATRIX));
    }

    #[test]
    fn missing_names_are_fatal() {
        let err = Program::new(ctx(), VS, FS, &["aColor"], &[]).unwrap_err();
        assert_eq!(err, ProgramError::MissingAttribute("aColor".into()));

        let err = Program::new(ctx(), VS, FS, &[], &["uShininess"]).unwrap_err();
        assert_eq!(err, ProgramError::MissingUniform("uShininess".into()));
    }

    #[test]
    fn failed_resolution_releases_the_program() {
        let ctx = ctx();
        let _ = Program::new(ctx.clone(), VS, FS, &["aColor"], &[]);
        assert_eq!(ctx.live_programs(), 0);
    }

    #[test]
    fn compile_and_link_failures() {
        let err = Program::new(ctx(), "#error nope\nvoid main() {}", FS, &[], &[]).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Compile {
                stage: ShaderStage::Vertex,
                ..
            }
        ));

        let err = Program::new(ctx(), VS, "uniform float x;", &[], &[]).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn drop_deletes_the_program() {
        let ctx = ctx();
        let program = Program::new(ctx.clone(), VS, FS, &[], &[]).unwrap();
        program.use_program();
        assert_eq!(ctx.current_program(), Some(program.handle()));
        drop(program);
        assert_eq!(ctx.live_programs(), 0);
    }
}
