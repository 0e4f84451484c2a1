use std::collections::BTreeMap;

use crate::gpu::{BufferId, GpuBackend, ProgramId, VertexArrayId};

use super::{ResourceError, ResourceKind, ShaderProgramRegistry, VertexBufferRegistry};

/// A drawable: one program bound to one model's vertex buffer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RenderObject {
    pub id: VertexArrayId,
    pub program: String,
    pub program_id: ProgramId,
    pub buffer_id: BufferId,
    /// Vertices (or indices, for indexed buffers) per draw.
    pub draw_count: u32,
}

/// Render objects keyed by model name.
#[derive(Debug, Default)]
pub struct RenderObjectRegistry {
    entries: BTreeMap<String, RenderObject>,
}

impl RenderObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds program `program` to the vertex buffer registered as `model`.
    ///
    /// Both must already exist. Rebinding a model replaces its render object.
    pub fn bind(
        &mut self,
        gpu: &mut dyn GpuBackend,
        programs: &ShaderProgramRegistry,
        buffers: &VertexBufferRegistry,
        model: &str,
        program: &str,
    ) -> Result<VertexArrayId, ResourceError> {
        let unresolved = |kind, name: &str| ResourceError::UnresolvedDependency {
            model: model.to_string(),
            kind,
            name: name.to_string(),
        };

        let program_id = programs.id(program).ok_or_else(|| unresolved(ResourceKind::Program, program))?;
        let buffer = buffers.get(model).ok_or_else(|| unresolved(ResourceKind::Buffer, model))?;

        let id = gpu.create_vertex_array(model, program_id, buffer.id, &buffer.layout)?;
        let object = RenderObject {
            id,
            program: program.to_string(),
            program_id,
            buffer_id: buffer.id,
            draw_count: buffer.index_count.unwrap_or(buffer.vertex_count),
        };

        if let Some(previous) = self.entries.insert(model.to_string(), object) {
            log::debug!("model `{model}` rebound; dropping {}", previous.id);
            gpu.delete_vertex_array(previous.id);
        }
        Ok(id)
    }

    /// Destroys render objects and optionally cascades.
    ///
    /// - `model` non-empty: its render object and its vertex buffer are released.
    /// - `model` empty, `program` non-empty: every render object using `program`
    ///   is released.
    /// - `program` non-empty: the program is released.
    ///
    /// Both empty is [`ResourceError::NoTargetSpecified`]. Every named target is
    /// resolved first; if one is missing nothing is released.
    pub fn destroy(
        &mut self,
        gpu: &mut dyn GpuBackend,
        programs: &mut ShaderProgramRegistry,
        buffers: &mut VertexBufferRegistry,
        model: &str,
        program: &str,
    ) -> Result<(), ResourceError> {
        if model.is_empty() && program.is_empty() {
            return Err(ResourceError::NoTargetSpecified);
        }

        if !model.is_empty() {
            if !self.entries.contains_key(model) {
                return Err(ResourceError::unknown(ResourceKind::RenderObject, model));
            }
            if !buffers.contains(model) {
                return Err(ResourceError::unknown(ResourceKind::Buffer, model));
            }
        }
        if !program.is_empty() && !programs.contains(program) {
            return Err(ResourceError::unknown(ResourceKind::Program, program));
        }

        if !model.is_empty() {
            self.unbind(gpu, model)?;
            buffers.release(gpu, model)?;
        } else {
            for m in self.users(program) {
                self.unbind(gpu, &m)?;
            }
        }

        if !program.is_empty() {
            programs.release(gpu, program)?;
        }
        Ok(())
    }

    /// Releases the render object for `model` alone; its buffer and program
    /// stay registered.
    pub fn unbind(&mut self, gpu: &mut dyn GpuBackend, model: &str) -> Result<(), ResourceError> {
        let object = self
            .entries
            .remove(model)
            .ok_or_else(|| ResourceError::unknown(ResourceKind::RenderObject, model))?;
        gpu.delete_vertex_array(object.id);
        Ok(())
    }

    /// Models whose render object uses `program`, in name order.
    pub fn users(&self, program: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, o)| o.program == program)
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Full teardown: every buffer, every program, then every render object.
    pub fn destroy_all(
        &mut self,
        gpu: &mut dyn GpuBackend,
        programs: &mut ShaderProgramRegistry,
        buffers: &mut VertexBufferRegistry,
    ) {
        buffers.release_all(gpu);
        programs.release_all(gpu);
        for (_, object) in std::mem::take(&mut self.entries) {
            gpu.delete_vertex_array(object.id);
        }
    }

    /// Issues the draw call for `model`.
    pub fn draw(&self, gpu: &mut dyn GpuBackend, model: &str) -> Result<(), ResourceError> {
        let object = self
            .entries
            .get(model)
            .ok_or_else(|| ResourceError::unknown(ResourceKind::RenderObject, model))?;
        gpu.draw(object.id);
        Ok(())
    }

    pub fn get(&self, model: &str) -> Option<&RenderObject> {
        self.entries.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, HeadlessBackend};
    use crate::resources::{ResourceSettings, VertexLayout};
    use crate::shader::test_sources::{BASIC_FRAG, BASIC_VERT};

    struct Fixture {
        gpu: HeadlessBackend,
        programs: ShaderProgramRegistry,
        buffers: VertexBufferRegistry,
        objects: RenderObjectRegistry,
    }

    fn fixture() -> Fixture {
        let mut gpu = HeadlessBackend::default();
        let mut programs = ShaderProgramRegistry::new(&ResourceSettings::default());
        let mut buffers = VertexBufferRegistry::new();
        programs.compile_source(&mut gpu, "Basic", BASIC_VERT, BASIC_FRAG).unwrap();
        let layout = VertexLayout::parse("2f 2f", &["a_VertexPosition", "a_TexturePosition"]).unwrap();
        buffers
            .upload_indexed(&mut gpu, "Quad", &[0.0; 16], Some(&[0, 1, 2, 0, 2, 3]), layout, false)
            .unwrap();
        Fixture { gpu, programs, buffers, objects: RenderObjectRegistry::new() }
    }

    impl Fixture {
        fn bind(&mut self) -> Result<VertexArrayId, ResourceError> {
            self.objects.bind(&mut self.gpu, &self.programs, &self.buffers, "Quad", "Basic")
        }

        fn destroy(&mut self, model: &str, program: &str) -> Result<(), ResourceError> {
            self.objects.destroy(&mut self.gpu, &mut self.programs, &mut self.buffers, model, program)
        }
    }

    #[test]
    fn bind_requires_program_and_buffer() {
        let mut f = fixture();
        let err = f
            .objects
            .bind(&mut f.gpu, &f.programs, &f.buffers, "Quad", "Missing")
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnresolvedDependency { kind: ResourceKind::Program, .. }));

        let err = f
            .objects
            .bind(&mut f.gpu, &f.programs, &f.buffers, "Nothing", "Basic")
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnresolvedDependency { kind: ResourceKind::Buffer, .. }));
        assert!(f.objects.is_empty());
    }

    #[test]
    fn bind_then_destroy_with_both_names_empties_registries() {
        let mut f = fixture();
        let probe = f.gpu.probe();
        f.bind().unwrap();
        assert_eq!(f.objects.get("Quad").map(|o| o.draw_count), Some(6));

        f.destroy("Quad", "Basic").unwrap();
        assert!(f.objects.is_empty());
        assert!(!f.buffers.contains("Quad"));
        assert!(!f.programs.contains("Basic"));
        assert!(probe.stats().is_empty());
        assert_eq!(probe.invalid_deletes(), 0);
    }

    #[test]
    fn destroy_with_both_names_empty_is_rejected() {
        let mut f = fixture();
        f.bind().unwrap();
        assert!(matches!(f.destroy("", ""), Err(ResourceError::NoTargetSpecified)));
        assert!(f.objects.contains("Quad"));
        assert!(f.buffers.contains("Quad"));
        assert!(f.programs.contains("Basic"));
    }

    #[test]
    fn destroy_model_only_keeps_program() {
        let mut f = fixture();
        f.bind().unwrap();
        f.destroy("Quad", "").unwrap();
        assert!(!f.buffers.contains("Quad"));
        assert!(f.programs.contains("Basic"));
    }

    #[test]
    fn destroy_program_only_drops_its_render_objects() {
        let mut f = fixture();
        f.bind().unwrap();
        f.destroy("", "Basic").unwrap();
        assert!(f.objects.is_empty());
        assert!(f.buffers.contains("Quad"));
        assert!(!f.programs.contains("Basic"));
    }

    #[test]
    fn destroy_with_missing_buffer_releases_nothing() {
        let mut f = fixture();
        let probe = f.gpu.probe();
        f.bind().unwrap();
        f.buffers.release(&mut f.gpu, "Quad").unwrap();
        probe.clear_calls();

        assert!(matches!(
            f.destroy("Quad", "Basic"),
            Err(ResourceError::UnknownResource { kind: ResourceKind::Buffer, .. })
        ));
        assert!(f.objects.contains("Quad"));
        assert!(f.programs.contains("Basic"));
        assert!(probe.calls().is_empty());

        assert!(matches!(
            f.destroy("", "Ghost"),
            Err(ResourceError::UnknownResource { kind: ResourceKind::Program, .. })
        ));
        assert!(f.objects.contains("Quad"));

        f.objects.unbind(&mut f.gpu, "Quad").unwrap();
        f.programs.release(&mut f.gpu, "Basic").unwrap();
        assert!(probe.stats().is_empty());
        assert_eq!(probe.invalid_deletes(), 0);
    }

    #[test]
    fn users_lists_models_sharing_a_program() {
        let mut f = fixture();
        f.bind().unwrap();
        let layout = VertexLayout::parse("2f 2f", &["a_VertexPosition", "a_TexturePosition"]).unwrap();
        f.buffers.upload(&mut f.gpu, "Other", &[0.0; 16], layout, false).unwrap();
        f.objects.bind(&mut f.gpu, &f.programs, &f.buffers, "Other", "Basic").unwrap();

        assert_eq!(f.objects.users("Basic"), ["Other".to_string(), "Quad".to_string()]);
        f.objects.unbind(&mut f.gpu, "Other").unwrap();
        assert_eq!(f.objects.users("Basic"), ["Quad".to_string()]);
        assert!(f.buffers.contains("Other"));
    }

    #[test]
    fn destroy_all_releases_buffers_then_programs_then_objects() {
        let mut f = fixture();
        let probe = f.gpu.probe();
        f.bind().unwrap();
        probe.clear_calls();

        f.objects.destroy_all(&mut f.gpu, &mut f.programs, &mut f.buffers);
        let calls = probe.calls();
        assert!(matches!(calls[0], GpuCall::DeleteBuffer(_)));
        assert!(matches!(calls[1], GpuCall::DeleteProgram(_)));
        assert!(matches!(calls[2], GpuCall::DeleteVertexArray(_)));
        assert!(probe.stats().is_empty());
    }

    #[test]
    fn draw_unknown_model_fails() {
        let mut f = fixture();
        assert!(matches!(
            f.objects.draw(&mut f.gpu, "Quad"),
            Err(ResourceError::UnknownResource { kind: ResourceKind::RenderObject, .. })
        ));
        f.bind().unwrap();
        f.objects.draw(&mut f.gpu, "Quad").unwrap();
        assert_eq!(f.gpu.probe().draws(), 1);
    }
}
