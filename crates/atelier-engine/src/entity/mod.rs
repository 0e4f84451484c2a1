//! Drawable entities.
//!
//! An entity is one model name plus one program name. Creating it uploads the
//! shape's vertices, compiles the program and binds the two into a render
//! object, in that order. Uniform, texture and hot-reload operations all go
//! through the shared [`RenderContext`].

mod shapes;
mod warnings;

use std::path::{Path, PathBuf};

use crate::gpu::{ProgramId, TextureId, VertexArrayId};
use crate::resources::{DecodeMode, PixelSurface, RenderContext, ResourceError, ResourceKind, VertexLayout};
use crate::shader::{ProgramReflection, ShaderStage, UniformInfo, UniformValue};

pub use shapes::{
    cube_normals,
    Shape,
    VertexData,
    CUBE_FACE_NORMALS,
    CUBE_POSITION_INDICES,
    CUBE_UV_INDICES,
    SKYBOX_DEPTH,
    SURFACE_INDICES,
};
pub use warnings::UniformWarnings;

/// Construction parameters for an [`Entity`].
#[derive(Debug, Clone)]
pub struct EntityDesc {
    pub model: String,
    pub program: String,
    pub shape: Shape,
    /// Layout override: format string plus attribute names.
    pub layout: Option<(String, Vec<String>)>,
    /// Vertex source identifier; defaults to the program name.
    pub vertex: Option<String>,
    /// Fragment source identifier; defaults to the program name.
    pub fragment: Option<String>,
    pub dynamic: bool,
}

impl EntityDesc {
    fn new(model: &str, program: &str, shape: Shape) -> Self {
        Self {
            model: model.to_string(),
            program: program.to_string(),
            shape,
            layout: None,
            vertex: None,
            fragment: None,
            dynamic: false,
        }
    }

    /// A textured full-screen quad.
    pub fn surface(model: &str, program: &str) -> Self {
        Self::new(model, program, Shape::Surface { textures: true })
    }

    /// A cube with texture coordinates and no normals.
    pub fn cube(model: &str, program: &str) -> Self {
        Self::new(model, program, Shape::Cube { normals: false, texcoords: true })
    }

    pub fn skybox(model: &str, program: &str) -> Self {
        Self::new(model, program, Shape::Skybox)
    }

    /// Surface only: whether vertices carry texture coordinates.
    pub fn with_textures(mut self, on: bool) -> Self {
        if let Shape::Surface { textures } = &mut self.shape {
            *textures = on;
        }
        self
    }

    /// Cube only: whether vertices carry face normals.
    pub fn with_normals(mut self, on: bool) -> Self {
        if let Shape::Cube { normals, .. } = &mut self.shape {
            *normals = on;
        }
        self
    }

    /// Cube only: whether vertices carry texture coordinates.
    pub fn with_texcoords(mut self, on: bool) -> Self {
        if let Shape::Cube { texcoords, .. } = &mut self.shape {
            *texcoords = on;
        }
        self
    }

    pub fn layout(mut self, format: &str, attributes: &[&str]) -> Self {
        self.layout = Some((format.to_string(), attributes.iter().map(|a| a.to_string()).collect()));
        self
    }

    pub fn shaders(mut self, vertex: &str, fragment: &str) -> Self {
        self.vertex = Some(vertex.to_string());
        self.fragment = Some(fragment.to_string());
        self
    }

    pub fn dynamic(mut self, on: bool) -> Self {
        self.dynamic = on;
        self
    }

    fn vertex_layout(&self) -> Result<VertexLayout, ResourceError> {
        match &self.layout {
            Some((format, names)) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                VertexLayout::parse(format, &names)
            }
            None => {
                let (format, names) = self.shape.default_layout();
                VertexLayout::parse(format, &names)
            }
        }
    }
}

/// A shape registered in a [`RenderContext`].
///
/// The entity holds names only; every GPU handle stays in the registries.
#[derive(Debug)]
pub struct Entity {
    model: String,
    program: String,
    shape: Shape,
    layout: VertexLayout,
    vertex: Option<String>,
    fragment: Option<String>,
    dynamic: bool,
    /// Textures attached through this entity, in attach order.
    textures: Vec<String>,
    warnings: UniformWarnings,
}

impl Entity {
    /// Uploads vertices, compiles the program and binds the render object.
    ///
    /// A program already registered under the same name is shared instead of
    /// being recompiled.
    pub fn create(ctx: &mut RenderContext, desc: EntityDesc) -> Result<Self, ResourceError> {
        let layout = desc.vertex_layout()?;
        let entity = Self {
            model: desc.model,
            program: desc.program,
            shape: desc.shape,
            layout,
            vertex: desc.vertex,
            fragment: desc.fragment,
            dynamic: desc.dynamic,
            textures: Vec::new(),
            warnings: UniformWarnings::new(),
        };

        entity.upload(ctx)?;
        if ctx.programs.contains(&entity.program) {
            log::debug!("entity `{}` shares program `{}`", entity.model, entity.program);
        } else {
            entity.compile(ctx)?;
        }
        ctx.bind(&entity.model, &entity.program)?;

        log::debug!("entity `{}` ready ({:?}, layout {})", entity.model, entity.shape, entity.layout.format());
        Ok(entity)
    }

    fn upload(&self, ctx: &mut RenderContext) -> Result<(), ResourceError> {
        let data = self.shape.prepare_vertex_data();
        ctx.buffers.upload_indexed(
            ctx.gpu.as_mut(),
            &self.model,
            &data.vertices,
            data.indices.as_deref(),
            self.layout.clone(),
            self.dynamic,
        )?;
        Ok(())
    }

    fn compile(&self, ctx: &mut RenderContext) -> Result<(), ResourceError> {
        ctx.programs
            .compile(ctx.gpu.as_mut(), &self.program, self.vertex.as_deref(), self.fragment.as_deref())?;
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Current source identifiers (`None` means the program name).
    pub fn sources(&self) -> (Option<&str>, Option<&str>) {
        (self.vertex.as_deref(), self.fragment.as_deref())
    }

    pub fn textures(&self) -> &[String] {
        &self.textures
    }

    pub fn warnings(&self) -> &UniformWarnings {
        &self.warnings
    }

    /// The live program handle and its reflection.
    fn active_program<'c>(&self, ctx: &'c RenderContext) -> Result<(ProgramId, &'c ProgramReflection), ResourceError> {
        let object = ctx
            .objects
            .get(&self.model)
            .ok_or_else(|| ResourceError::unknown(ResourceKind::RenderObject, &self.model))?;
        let entry = ctx
            .programs
            .get(&object.program)
            .ok_or_else(|| ResourceError::unknown(ResourceKind::Program, &object.program))?;
        Ok((entry.id, &entry.reflection))
    }

    fn lookup_uniform(&self, ctx: &RenderContext, name: &str) -> Result<(ProgramId, UniformInfo), ResourceError> {
        let (id, reflection) = self.active_program(ctx)?;
        let info = reflection.uniform(name).cloned().ok_or_else(|| ResourceError::UniformNotFound {
            program: self.program.clone(),
            name: name.to_string(),
        })?;
        Ok((id, info))
    }

    /// Writes a scalar, vector or matrix uniform, reporting failures.
    pub fn try_set_uniform(
        &self,
        ctx: &mut RenderContext,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), ResourceError> {
        let value = value.into();
        let (id, info) = self.lookup_uniform(ctx, name)?;
        let bytes = value.encode(info.ty).ok_or_else(|| ResourceError::UniformMismatch {
            program: self.program.clone(),
            name: name.to_string(),
            reason: format!("a {} value ({:?} expected)", value.type_name(), info.ty),
        })?;
        ctx.gpu.write_uniform(id, &info, &bytes);
        Ok(())
    }

    /// Writes a uniform. Missing or incompatible uniforms are rate-limited
    /// warnings, never errors.
    pub fn set_uniform(&mut self, ctx: &mut RenderContext, name: &str, value: impl Into<UniformValue>) {
        if let Err(err) = self.try_set_uniform(ctx, name, value) {
            self.warnings.report(&self.program, &err);
        }
    }

    /// Writes a column-major matrix (9 or 16 floats), with the same warning
    /// policy as [`set_uniform`](Self::set_uniform).
    pub fn set_matrix_uniform(&mut self, ctx: &mut RenderContext, name: &str, cols: &[f32]) {
        let result = match UniformValue::matrix(cols) {
            Some(value) => self.try_set_uniform(ctx, name, value),
            None => Err(ResourceError::UniformMismatch {
                program: self.program.clone(),
                name: name.to_string(),
                reason: format!("{} matrix floats", cols.len()),
            }),
        };
        if let Err(err) = result {
            self.warnings.report(&self.program, &err);
        }
    }

    /// Writes raw std140 bytes at the uniform's offset.
    pub fn set_uniform_bytes(&mut self, ctx: &mut RenderContext, name: &str, bytes: &[u8]) {
        let result = self.lookup_uniform(ctx, name).and_then(|(id, info)| {
            if bytes.len() > info.size as usize {
                return Err(ResourceError::UniformMismatch {
                    program: self.program.clone(),
                    name: name.to_string(),
                    reason: format!("{} bytes (member is {})", bytes.len(), info.size),
                });
            }
            ctx.gpu.write_uniform(id, &info, bytes);
            Ok(())
        });
        if let Err(err) = result {
            self.warnings.report(&self.program, &err);
        }
    }

    /// Loads a texture file (reusing one already registered under `name`) and
    /// binds it to the program texture named `name`.
    pub fn attach_texture(
        &mut self,
        ctx: &mut RenderContext,
        name: &str,
        path: impl AsRef<Path>,
        mode: DecodeMode,
        flip: bool,
    ) -> Result<(), ResourceError> {
        if !ctx.textures.contains(name) {
            ctx.textures.load(ctx.gpu.as_mut(), name, path, mode, flip)?;
        }
        self.attach(ctx, name)
    }

    /// Loads a six-face cubemap from `dir` (reusing one already registered)
    /// and binds it.
    pub fn attach_cube_texture(
        &mut self,
        ctx: &mut RenderContext,
        name: &str,
        dir: impl AsRef<Path>,
        ext: &str,
    ) -> Result<(), ResourceError> {
        if !ctx.textures.contains(name) {
            ctx.textures.load_cube(ctx.gpu.as_mut(), name, dir, ext)?;
        }
        self.attach(ctx, name)
    }

    /// Uploads an in-memory surface under `name` and binds it. Meant to be
    /// called every frame for dynamic content.
    pub fn attach_surface_texture(
        &mut self,
        ctx: &mut RenderContext,
        name: &str,
        surface: &PixelSurface<'_>,
    ) -> Result<(), ResourceError> {
        ctx.textures.convert_surface(ctx.gpu.as_mut(), name, surface)?;
        self.attach(ctx, name)
    }

    fn attach(&mut self, ctx: &mut RenderContext, name: &str) -> Result<(), ResourceError> {
        self.bind_texture_uniform(ctx, name)?;
        if !self.textures.iter().any(|t| t == name) {
            self.textures.push(name.to_string());
        }
        Ok(())
    }

    /// Binds the registered texture `name` to the program texture of the same
    /// name, resolving its unit against the current program.
    pub fn bind_texture_uniform(&self, ctx: &mut RenderContext, name: &str) -> Result<(), ResourceError> {
        let (id, reflection) = self.active_program(ctx)?;
        let unit = reflection.texture(name).map(|slot| slot.unit).ok_or_else(|| ResourceError::UniformNotFound {
            program: self.program.clone(),
            name: name.to_string(),
        })?;
        let texture = ctx
            .textures
            .id(name)
            .ok_or_else(|| ResourceError::unknown(ResourceKind::Texture, name))?;
        ctx.gpu.bind_texture(id, unit, texture);
        Ok(())
    }

    /// Releases the texture `name` from the registry.
    pub fn remove_texture(&mut self, ctx: &mut RenderContext, name: &str) -> Result<(), ResourceError> {
        ctx.textures.release(ctx.gpu.as_mut(), name)?;
        self.textures.retain(|t| t != name);
        Ok(())
    }

    /// Tears down and rebuilds this entity's render object with new sources.
    ///
    /// The render object, buffer and program are released first, then the
    /// buffer is re-uploaded, the program recompiled from `vertex`/`fragment`
    /// (`None` = program name) and the render object rebound. Textures in
    /// `rebind` get their units re-resolved against the new program; their
    /// pixel data is not reloaded.
    ///
    /// When other render objects use the same program it is recompiled in
    /// place instead of released, and every one of them is rebound to the new
    /// handle along with the registered textures the program samples.
    ///
    /// A failing step leaves this entity torn down. Parts already missing are
    /// skipped, so a later reload with fixed sources recovers it.
    pub fn reload_shader(
        &mut self,
        ctx: &mut RenderContext,
        vertex: Option<&str>,
        fragment: Option<&str>,
        rebind: &[&str],
    ) -> Result<VertexArrayId, ResourceError> {
        log::info!("reloading `{}` with program `{}`", self.model, self.program);

        let siblings: Vec<String> = ctx.objects.users(&self.program).into_iter().filter(|m| *m != self.model).collect();
        self.teardown(ctx, siblings.is_empty())?;

        self.vertex = vertex.map(str::to_string);
        self.fragment = fragment.map(str::to_string);
        self.upload(ctx)?;
        self.compile(ctx)?;
        let id = ctx.bind(&self.model, &self.program)?;

        if !siblings.is_empty() {
            log::debug!("program `{}` shared with {siblings:?}; rebinding", self.program);
            for model in &siblings {
                ctx.bind(model, &self.program)?;
            }
            self.rebind_registered_textures(ctx)?;
        }
        for name in rebind {
            self.bind_texture_uniform(ctx, name)?;
        }
        self.warnings.reset();
        Ok(id)
    }

    /// Releases whichever of this entity's render object and buffer still
    /// exist, and the program when `release_program` is set.
    fn teardown(&self, ctx: &mut RenderContext, release_program: bool) -> Result<(), ResourceError> {
        if ctx.objects.contains(&self.model) {
            ctx.objects.unbind(ctx.gpu.as_mut(), &self.model)?;
        }
        if ctx.buffers.contains(&self.model) {
            ctx.buffers.release(ctx.gpu.as_mut(), &self.model)?;
        }
        if release_program && ctx.programs.contains(&self.program) {
            ctx.programs.release(ctx.gpu.as_mut(), &self.program)?;
        }
        Ok(())
    }

    /// Binds every registered texture whose name matches a texture slot of
    /// the current program.
    fn rebind_registered_textures(&self, ctx: &mut RenderContext) -> Result<(), ResourceError> {
        let (id, reflection) = self.active_program(ctx)?;
        let bindings: Vec<(u32, TextureId)> = reflection
            .textures()
            .iter()
            .filter_map(|slot| ctx.textures.id(&slot.name).map(|texture| (slot.unit, texture)))
            .collect();
        for (unit, texture) in bindings {
            ctx.gpu.bind_texture(id, unit, texture);
        }
        Ok(())
    }

    /// Re-uploads the shape's vertices into its (dynamic) buffer.
    pub fn refresh_vertices(&self, ctx: &mut RenderContext) -> Result<(), ResourceError> {
        let data = self.shape.prepare_vertex_data();
        ctx.buffers.update(ctx.gpu.as_mut(), &self.model, &data.vertices)
    }

    pub fn render(&self, ctx: &mut RenderContext) -> Result<(), ResourceError> {
        ctx.draw(&self.model)
    }

    /// Releases the render object and buffer, and the program when no other
    /// render object still uses it. Attached textures stay registered.
    ///
    /// Parts already released (for instance by a failed reload) are skipped.
    pub fn destroy(self, ctx: &mut RenderContext) -> Result<(), ResourceError> {
        let shared = ctx.objects.users(&self.program).iter().any(|m| *m != self.model);
        self.teardown(ctx, !shared)
    }

    /// Resolved source paths for the current identifiers.
    pub fn source_paths(&self, ctx: &RenderContext) -> (PathBuf, PathBuf) {
        (
            ctx.programs.resolve(self.vertex.as_deref().unwrap_or(&self.program), ShaderStage::Vertex),
            ctx.programs.resolve(self.fragment.as_deref().unwrap_or(&self.program), ShaderStage::Fragment),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, HeadlessProbe};
    use crate::resources::{write_test_image, PixelOrder, ResourceSettings, CUBE_FACES};
    use crate::shader::test_sources::{BASIC_FRAG, BASIC_VERT};

    const FLAT_VERT: &str = r#"#version 450
layout(location = 0) in vec2 a_VertexPosition;
void main() { gl_Position = vec4(a_VertexPosition, 0.0, 1.0); }
"#;

    const FLAT_FRAG: &str = r#"#version 450
layout(location = 0) out vec4 f_color;
layout(set = 0, binding = 0) uniform Params { float u_time; vec2 u_resolution; };
void main() { f_color = vec4(u_resolution / 1000.0, sin(u_time), 1.0); }
"#;

    const CUBE_VERT: &str = r#"#version 450
layout(location = 0) in vec3 a_VertexPosition;
layout(location = 1) in vec2 a_TexturePosition;
layout(location = 0) out vec2 v_uv;
layout(set = 0, binding = 0) uniform Transform { mat4 u_mvp; };
void main() {
    v_uv = a_TexturePosition;
    gl_Position = u_mvp * vec4(a_VertexPosition, 1.0);
}
"#;

    const CUBE_FRAG: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 f_color;
layout(set = 0, binding = 1) uniform texture2D u_texture;
layout(set = 0, binding = 2) uniform sampler u_sampler;
void main() { f_color = texture(sampler2D(u_texture, u_sampler), v_uv); }
"#;

    const SKY_VERT: &str = r#"#version 450
layout(location = 0) in vec3 a_VertexPosition;
layout(location = 0) out vec4 v_clip;
void main() {
    gl_Position = vec4(a_VertexPosition, 1.0);
    v_clip = gl_Position;
}
"#;

    const SKY_FRAG: &str = r#"#version 450
layout(location = 0) in vec4 v_clip;
layout(location = 0) out vec4 f_color;
layout(set = 0, binding = 0) uniform Camera { mat4 u_invProjView; };
layout(set = 0, binding = 1) uniform textureCube u_skybox;
layout(set = 0, binding = 2) uniform sampler u_sampler;
void main() {
    vec4 world = u_invProjView * v_clip;
    f_color = texture(samplerCube(u_skybox, u_sampler), normalize(world.xyz / world.w));
}
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        ctx: RenderContext,
        probe: HeadlessProbe,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sources = [
            ("Basic", BASIC_VERT, BASIC_FRAG),
            ("Flat", FLAT_VERT, FLAT_FRAG),
            ("Cube", CUBE_VERT, CUBE_FRAG),
            ("Sky", SKY_VERT, SKY_FRAG),
        ];
        for (name, vert, frag) in sources {
            std::fs::write(dir.path().join(format!("{name}.vert")), vert).unwrap();
            std::fs::write(dir.path().join(format!("{name}.frag")), frag).unwrap();
        }
        let settings = ResourceSettings { shader_dir: dir.path().to_path_buf(), ..Default::default() };
        let (ctx, probe) = RenderContext::headless(320, 240, settings);
        Fixture { dir, ctx, probe }
    }

    fn quad(f: &mut Fixture) -> Entity {
        Entity::create(&mut f.ctx, EntityDesc::surface("Quad", "Basic")).unwrap()
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn surface_registers_in_all_three_registries_then_destroys() {
        let mut f = fixture();
        quad(&mut f);
        assert!(f.ctx.objects.contains("Quad"));
        assert!(f.ctx.programs.contains("Basic"));
        assert!(f.ctx.buffers.contains("Quad"));

        f.ctx.destroy("Quad", "Basic").unwrap();
        assert!(!f.ctx.objects.contains("Quad"));
        assert!(!f.ctx.programs.contains("Basic"));
        assert!(!f.ctx.buffers.contains("Quad"));
        assert!(f.probe.stats().is_empty());
    }

    #[test]
    fn construction_order_is_buffer_program_render_object() {
        let mut f = fixture();
        quad(&mut f);
        let calls = f.probe.calls();
        assert!(matches!(calls[0], GpuCall::CreateBuffer { len: 16, indices: Some(6), .. }));
        assert!(matches!(calls[1], GpuCall::CreateProgram { .. }));
        assert!(matches!(calls[2], GpuCall::CreateVertexArray { .. }));
    }

    #[test]
    fn untextured_surface_uploads_eight_floats() {
        let mut f = fixture();
        let desc = EntityDesc::surface("Plain", "Flat").with_textures(false);
        let entity = Entity::create(&mut f.ctx, desc).unwrap();
        assert_eq!(entity.layout().format(), "2f");
        let id = f.ctx.buffers.get("Plain").unwrap().id;
        assert_eq!(f.probe.buffer_data(id).map(|d| d.len()), Some(8));
    }

    #[test]
    fn layout_mismatch_with_shader_inputs_fails_bind() {
        let mut f = fixture();
        // Cube vertices are 3f 2f; the Basic program expects 2f 2f.
        let err = Entity::create(&mut f.ctx, EntityDesc::cube("Box", "Basic")).unwrap_err();
        assert!(matches!(err, ResourceError::Backend(_)), "{err}");
        assert!(!f.ctx.objects.contains("Box"));
    }

    #[test]
    fn entities_share_an_existing_program() {
        let mut f = fixture();
        quad(&mut f);
        let first = f.ctx.programs.id("Basic");
        let other = Entity::create(&mut f.ctx, EntityDesc::surface("Quad2", "Basic")).unwrap();
        assert_eq!(f.ctx.programs.id("Basic"), first);

        other.destroy(&mut f.ctx).unwrap();
        assert!(f.ctx.programs.contains("Basic"), "still used by Quad");
        assert!(!f.ctx.buffers.contains("Quad2"));
    }

    #[test]
    fn destroy_releases_unshared_program() {
        let mut f = fixture();
        let entity = quad(&mut f);
        entity.destroy(&mut f.ctx).unwrap();
        assert_eq!(f.ctx.counts(), Default::default());
        assert!(f.probe.stats().is_empty());
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    #[test]
    fn set_uniform_writes_encoded_bytes() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        entity.set_uniform(&mut f.ctx, "u_time", 1.5f32);
        entity.set_uniform(&mut f.ctx, "u_resolution", (640.0f32, 480.0f32));

        let id = f.ctx.programs.id("Basic").unwrap();
        assert_eq!(f.probe.uniform_f32s(id, "u_time"), Some(vec![1.5]));
        assert_eq!(f.probe.uniform_f32s(id, "u_resolution"), Some(vec![640.0, 480.0]));
        assert_eq!(entity.warnings().seen(), 0);
    }

    #[test]
    fn missing_uniform_is_rate_limited_not_raised() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        for _ in 0..50 {
            entity.set_uniform(&mut f.ctx, "u_missing", 1.0f32);
        }
        assert_eq!(entity.warnings().seen(), 50);
        assert_eq!(entity.warnings().logged(), 2);

        let err = entity.try_set_uniform(&mut f.ctx, "u_missing", 1.0f32).unwrap_err();
        assert!(matches!(err, ResourceError::UniformNotFound { .. }));
    }

    #[test]
    fn incompatible_uniform_value_is_a_warning() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        entity.set_uniform(&mut f.ctx, "u_time", glam::Vec3::ONE);
        assert_eq!(entity.warnings().seen(), 1);
        let id = f.ctx.programs.id("Basic").unwrap();
        assert_eq!(f.probe.uniform(id, "u_time"), None);
    }

    #[test]
    fn matrix_and_raw_uniform_writes() {
        let mut f = fixture();
        let mut cube = Entity::create(&mut f.ctx, EntityDesc::cube("Box", "Cube")).unwrap();
        let mvp = glam::Mat4::from_scale(glam::Vec3::splat(2.0));
        cube.set_matrix_uniform(&mut f.ctx, "u_mvp", &mvp.to_cols_array());

        let id = f.ctx.programs.id("Cube").unwrap();
        assert_eq!(f.probe.uniform_f32s(id, "u_mvp"), Some(mvp.to_cols_array().to_vec()));

        cube.set_matrix_uniform(&mut f.ctx, "u_mvp", &[1.0; 5]);
        assert_eq!(cube.warnings().seen(), 1);

        cube.set_uniform_bytes(&mut f.ctx, "u_mvp", bytemuck::cast_slice(&[0.0f32; 16]));
        assert_eq!(f.probe.uniform_f32s(id, "u_mvp"), Some(vec![0.0; 16]));
        cube.set_uniform_bytes(&mut f.ctx, "u_mvp", &[0u8; 128]);
        assert_eq!(cube.warnings().seen(), 2);
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[test]
    fn attach_texture_is_idempotent() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        let path = f.dir.path().join("grid.png");
        write_test_image(&path, 8, 8, true);

        entity.attach_texture(&mut f.ctx, "u_texture", &path, DecodeMode::Fast, true).unwrap();
        let texture = f.ctx.textures.id("u_texture").unwrap();
        entity.attach_texture(&mut f.ctx, "u_texture", &path, DecodeMode::Fast, true).unwrap();

        assert_eq!(f.ctx.textures.id("u_texture"), Some(texture));
        assert_eq!(f.ctx.textures.len(), 1);
        assert_eq!(entity.textures(), ["u_texture".to_string()]);
        let program = f.ctx.programs.id("Basic").unwrap();
        assert_eq!(f.probe.texture_binding(program, 2), Some(texture));
    }

    #[test]
    fn attach_unknown_texture_uniform_fails() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        let path = f.dir.path().join("grid.png");
        write_test_image(&path, 4, 4, false);
        let err = entity.attach_texture(&mut f.ctx, "u_nothing", &path, DecodeMode::Fast, true).unwrap_err();
        assert!(matches!(err, ResourceError::UniformNotFound { .. }));
    }

    #[test]
    fn surface_texture_replaces_each_frame() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        let pixels = vec![0u8; 4 * 4 * 4];
        let surface = PixelSurface { width: 4, height: 4, pixels: &pixels, order: PixelOrder::Bgra };

        entity.attach_surface_texture(&mut f.ctx, "u_texture", &surface).unwrap();
        let first = f.ctx.textures.id("u_texture").unwrap();
        entity.attach_surface_texture(&mut f.ctx, "u_texture", &surface).unwrap();
        let second = f.ctx.textures.id("u_texture").unwrap();

        assert_ne!(first, second);
        assert_eq!(f.probe.stats().textures, 1);
        let program = f.ctx.programs.id("Basic").unwrap();
        assert_eq!(f.probe.texture_binding(program, 2), Some(second));
    }

    #[test]
    fn skybox_binds_cubemap() {
        let mut f = fixture();
        let faces = f.dir.path().join("sky");
        std::fs::create_dir(&faces).unwrap();
        for face in CUBE_FACES {
            write_test_image(&faces.join(format!("{face}.png")), 4, 4, false);
        }

        let mut sky = Entity::create(&mut f.ctx, EntityDesc::skybox("Sky", "Sky")).unwrap();
        sky.attach_cube_texture(&mut f.ctx, "u_skybox", &faces, "png").unwrap();
        sky.set_matrix_uniform(&mut f.ctx, "u_invProjView", &glam::Mat4::IDENTITY.to_cols_array());

        let program = f.ctx.programs.id("Sky").unwrap();
        let texture = f.ctx.textures.id("u_skybox").unwrap();
        assert_eq!(f.probe.texture_binding(program, 1), Some(texture));
        assert_eq!(f.probe.texture_is_cube(texture), Some(true));
        assert_eq!(sky.warnings().seen(), 0);
    }

    #[test]
    fn remove_texture_releases_it() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        let path = f.dir.path().join("grid.png");
        write_test_image(&path, 4, 4, true);
        entity.attach_texture(&mut f.ctx, "u_texture", &path, DecodeMode::Fallback, false).unwrap();

        entity.remove_texture(&mut f.ctx, "u_texture").unwrap();
        assert!(entity.textures().is_empty());
        assert!(f.ctx.textures.is_empty());
        assert!(matches!(
            entity.remove_texture(&mut f.ctx, "u_texture"),
            Err(ResourceError::UnknownResource { kind: ResourceKind::Texture, .. })
        ));
    }

    // ── hot reload ────────────────────────────────────────────────────────

    #[test]
    fn reload_releases_before_recreating() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        let old_program = f.ctx.programs.id("Basic").unwrap();
        let old_buffer = f.ctx.buffers.get("Quad").unwrap().id;
        f.probe.clear_calls();

        entity.reload_shader(&mut f.ctx, Some("Basic"), Some("Basic"), &[]).unwrap();

        let calls = f.probe.calls();
        let position = |pred: &dyn Fn(&GpuCall) -> bool| calls.iter().position(|c| pred(c)).unwrap();
        let delete_program = position(&|c| *c == GpuCall::DeleteProgram(old_program));
        let create_program = position(&|c| matches!(c, GpuCall::CreateProgram { .. }));
        let delete_buffer = position(&|c| *c == GpuCall::DeleteBuffer(old_buffer));
        let create_buffer = position(&|c| matches!(c, GpuCall::CreateBuffer { .. }));
        assert!(delete_program < create_program);
        assert!(delete_buffer < create_buffer);

        assert_eq!(f.probe.stats().programs, 1);
        assert_eq!(f.probe.stats().buffers, 1);
        assert_eq!(f.probe.stats().vertex_arrays, 1);
        assert_eq!(f.probe.invalid_deletes(), 0);
    }

    #[test]
    fn reload_uses_new_sources_and_rebinds_textures() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        let path = f.dir.path().join("grid.png");
        write_test_image(&path, 4, 4, true);
        entity.attach_texture(&mut f.ctx, "u_texture", &path, DecodeMode::Fast, true).unwrap();
        let texture = f.ctx.textures.id("u_texture").unwrap();

        std::fs::write(f.dir.path().join("Tinted.vert"), BASIC_VERT).unwrap();
        std::fs::write(f.dir.path().join("Tinted.frag"), BASIC_FRAG).unwrap();
        entity.reload_shader(&mut f.ctx, Some("Tinted"), Some("Tinted"), &["u_texture"]).unwrap();

        let entry = f.ctx.programs.get("Basic").unwrap();
        assert_eq!(entry.vertex_path.as_deref(), Some(f.dir.path().join("Tinted.vert").as_path()));
        assert_eq!(entry.fragment_path.as_deref(), Some(f.dir.path().join("Tinted.frag").as_path()));
        assert_eq!(f.probe.texture_binding(entry.id, 2), Some(texture));
        assert_eq!(entity.sources(), (Some("Tinted"), Some("Tinted")));

        assert_eq!(f.ctx.objects.get("Quad").map(|o| o.program_id), Some(entry.id));
        assert!(f.probe.program_alive(entry.id));
    }

    #[test]
    fn failed_reload_leaves_entity_torn_down() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        std::fs::write(f.dir.path().join("Broken.frag"), "#version 450\nvoid main( {").unwrap();

        let err = entity.reload_shader(&mut f.ctx, Some("Basic"), Some("Broken"), &[]).unwrap_err();
        assert!(matches!(err, ResourceError::ShaderCompile(_)));
        assert!(!f.ctx.objects.contains("Quad"));
        assert!(!f.ctx.programs.contains("Basic"));
        assert!(f.ctx.buffers.contains("Quad"));
        assert!(matches!(entity.render(&mut f.ctx), Err(ResourceError::UnknownResource { .. })));
    }

    #[test]
    fn reload_of_shared_program_rebinds_every_user() {
        let mut f = fixture();
        let mut a = Entity::create(&mut f.ctx, EntityDesc::surface("A", "Basic")).unwrap();
        let b = Entity::create(&mut f.ctx, EntityDesc::surface("B", "Basic")).unwrap();
        let path = f.dir.path().join("grid.png");
        write_test_image(&path, 4, 4, true);
        let texture = f.ctx.textures.load(f.ctx.gpu.as_mut(), "u_texture", &path, DecodeMode::Fast, true).unwrap();

        a.reload_shader(&mut f.ctx, None, None, &[]).unwrap();

        let program = f.ctx.programs.id("Basic").unwrap();
        assert!(f.probe.program_alive(program));
        for model in ["A", "B"] {
            assert_eq!(f.ctx.objects.get(model).map(|o| o.program_id), Some(program), "{model}");
        }
        assert_eq!(f.probe.texture_binding(program, 2), Some(texture));
        assert_eq!(f.probe.stats().programs, 1);
        assert_eq!(f.probe.stats().vertex_arrays, 2);

        f.ctx.begin_frame([0.0, 0.0, 0.0, 1.0]).unwrap();
        a.render(&mut f.ctx).unwrap();
        b.render(&mut f.ctx).unwrap();
        f.ctx.end_frame().unwrap();
        assert_eq!(f.probe.draws(), 2);
        assert_eq!(f.probe.stale_draws(), 0);
        assert_eq!(f.probe.invalid_deletes(), 0);
    }

    #[test]
    fn failed_shared_reload_keeps_the_other_user_drawing() {
        let mut f = fixture();
        let mut a = Entity::create(&mut f.ctx, EntityDesc::surface("A", "Basic")).unwrap();
        let b = Entity::create(&mut f.ctx, EntityDesc::surface("B", "Basic")).unwrap();
        std::fs::write(f.dir.path().join("Broken.frag"), "#version 450\nvoid main( {").unwrap();

        assert!(a.reload_shader(&mut f.ctx, Some("Basic"), Some("Broken"), &[]).is_err());
        assert!(!f.ctx.objects.contains("A"));

        f.ctx.begin_frame([0.0, 0.0, 0.0, 1.0]).unwrap();
        b.render(&mut f.ctx).unwrap();
        f.ctx.end_frame().unwrap();
        assert_eq!(f.probe.stale_draws(), 0);
    }

    #[test]
    fn reload_recovers_after_a_failed_one() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        let frag = f.dir.path().join("Basic.frag");
        std::fs::write(&frag, "#version 450\nvoid main( {").unwrap();
        assert!(entity.reload_shader(&mut f.ctx, None, None, &[]).is_err());

        std::fs::write(&frag, BASIC_FRAG).unwrap();
        entity.reload_shader(&mut f.ctx, None, None, &[]).unwrap();
        assert!(f.ctx.objects.contains("Quad"));
        assert_eq!(f.ctx.counts().programs, 1);
        assert_eq!(f.ctx.counts().buffers, 1);

        f.ctx.begin_frame([0.0, 0.0, 0.0, 1.0]).unwrap();
        entity.render(&mut f.ctx).unwrap();
        f.ctx.end_frame().unwrap();
        assert_eq!(f.probe.stale_draws(), 0);
        assert_eq!(f.probe.invalid_deletes(), 0);
    }

    #[test]
    fn destroy_after_failed_reload_releases_what_is_left() {
        let mut f = fixture();
        let mut entity = quad(&mut f);
        std::fs::write(f.dir.path().join("Broken.frag"), "#version 450\nvoid main( {").unwrap();
        assert!(entity.reload_shader(&mut f.ctx, Some("Basic"), Some("Broken"), &[]).is_err());
        assert_eq!(f.ctx.counts().buffers, 1);

        entity.destroy(&mut f.ctx).unwrap();
        assert_eq!(f.ctx.counts(), Default::default());
        assert!(f.probe.stats().is_empty());
        assert_eq!(f.probe.invalid_deletes(), 0);
    }

    #[test]
    fn render_inside_frame_draws() {
        let mut f = fixture();
        let entity = quad(&mut f);
        f.ctx.begin_frame([0.0, 0.0, 0.0, 1.0]).unwrap();
        entity.render(&mut f.ctx).unwrap();
        f.ctx.end_frame().unwrap();
        assert_eq!(f.probe.draws(), 1);
        assert_eq!(f.probe.stale_draws(), 0);
    }

    #[test]
    fn refresh_vertices_updates_dynamic_buffer() {
        let mut f = fixture();
        let entity = Entity::create(&mut f.ctx, EntityDesc::surface("Quad", "Basic").dynamic(true)).unwrap();
        entity.refresh_vertices(&mut f.ctx).unwrap();
        assert!(f.probe.calls().iter().any(|c| matches!(c, GpuCall::UpdateBuffer { len: 16, .. })));
    }
}
