use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::gpu::{GpuBackend, ProgramId};
use crate::shader::{compile_stage, link, ProgramReflection, ShaderStage};

use super::{ResourceError, ResourceKind, ResourceSettings};

/// A live program and where its sources came from.
#[derive(Debug, Clone)]
pub struct ProgramEntry {
    pub id: ProgramId,
    /// `None` for programs compiled from in-memory sources.
    pub vertex_path: Option<PathBuf>,
    pub fragment_path: Option<PathBuf>,
    pub reflection: ProgramReflection,
}

/// Named shader programs compiled from `<dir>/<ident>.vert` + `<dir>/<ident>.frag`.
#[derive(Debug)]
pub struct ShaderProgramRegistry {
    dir: PathBuf,
    vertex_ext: String,
    fragment_ext: String,
    entries: BTreeMap<String, ProgramEntry>,
}

impl ShaderProgramRegistry {
    pub fn new(settings: &ResourceSettings) -> Self {
        Self {
            dir: settings.shader_dir.clone(),
            vertex_ext: settings.vertex_extension.clone(),
            fragment_ext: settings.fragment_extension.clone(),
            entries: BTreeMap::new(),
        }
    }

    pub fn shader_dir(&self) -> &Path {
        &self.dir
    }

    /// Resolves a source identifier against the shader directory.
    ///
    /// The stage extension is appended when `ident` has none.
    pub fn resolve(&self, ident: &str, stage: ShaderStage) -> PathBuf {
        let mut path = self.dir.join(ident);
        if path.extension().is_none() {
            let ext = match stage {
                ShaderStage::Fragment => &self.fragment_ext,
                _ => &self.vertex_ext,
            };
            path.set_extension(ext);
        }
        path
    }

    /// Compiles and links `name` from source files.
    ///
    /// `vertex` / `fragment` default to `name`. An existing program under the
    /// same name is released only after the new one linked successfully.
    pub fn compile(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        vertex: Option<&str>,
        fragment: Option<&str>,
    ) -> Result<ProgramId, ResourceError> {
        let vertex_path = self.resolve(vertex.unwrap_or(name), ShaderStage::Vertex);
        let fragment_path = self.resolve(fragment.unwrap_or(name), ShaderStage::Fragment);

        let vertex_src = read_source(&vertex_path)?;
        let fragment_src = read_source(&fragment_path)?;

        log::debug!(
            "compiling program `{name}` from {} + {}",
            vertex_path.display(),
            fragment_path.display()
        );
        self.install(gpu, name, &vertex_src, &fragment_src, Some(vertex_path), Some(fragment_path))
    }

    /// Compiles and links `name` from in-memory sources.
    pub fn compile_source(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, ResourceError> {
        self.install(gpu, name, vertex_src, fragment_src, None, None)
    }

    fn install(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        vertex_src: &str,
        fragment_src: &str,
        vertex_path: Option<PathBuf>,
        fragment_path: Option<PathBuf>,
    ) -> Result<ProgramId, ResourceError> {
        let vs = compile_stage(ShaderStage::Vertex, name, vertex_src)?;
        let fs = compile_stage(ShaderStage::Fragment, name, fragment_src)?;
        let linked = link(name, vs, fs)?;

        let id = gpu.create_program(&linked)?;
        let entry = ProgramEntry {
            id,
            vertex_path,
            fragment_path,
            reflection: linked.reflection,
        };

        if let Some(previous) = self.entries.insert(name.to_string(), entry) {
            log::warn!("program `{name}` recompiled without release; dropping {}", previous.id);
            gpu.delete_program(previous.id);
        }
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<&ProgramEntry> {
        self.entries.get(name)
    }

    pub fn id(&self, name: &str) -> Option<ProgramId> {
        self.entries.get(name).map(|e| e.id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
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

    pub fn release(&mut self, gpu: &mut dyn GpuBackend, name: &str) -> Result<(), ResourceError> {
        let entry = self
            .entries
            .remove(name)
            .ok_or_else(|| ResourceError::unknown(ResourceKind::Program, name))?;
        gpu.delete_program(entry.id);
        Ok(())
    }

    pub fn release_all(&mut self, gpu: &mut dyn GpuBackend) {
        for (name, entry) in std::mem::take(&mut self.entries) {
            log::debug!("releasing program `{name}`");
            gpu.delete_program(entry.id);
        }
    }
}

fn read_source(path: &Path) -> Result<String, ResourceError> {
    std::fs::read_to_string(path).map_err(|source| ResourceError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, HeadlessBackend};
    use crate::shader::test_sources::{BASIC_FRAG, BASIC_VERT};

    fn setup() -> (tempfile::TempDir, ShaderProgramRegistry) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("basic.vert"), BASIC_VERT).unwrap();
        std::fs::write(dir.path().join("basic.frag"), BASIC_FRAG).unwrap();
        let settings = ResourceSettings { shader_dir: dir.path().to_path_buf(), ..Default::default() };
        (dir, ShaderProgramRegistry::new(&settings))
    }

    #[test]
    fn resolve_appends_stage_extension_only_when_missing() {
        let (dir, reg) = setup();
        assert_eq!(reg.resolve("basic", ShaderStage::Vertex), dir.path().join("basic.vert"));
        assert_eq!(reg.resolve("basic", ShaderStage::Fragment), dir.path().join("basic.frag"));
        assert_eq!(reg.resolve("other.glsl", ShaderStage::Fragment), dir.path().join("other.glsl"));
    }

    #[test]
    fn compile_defaults_sources_to_program_name() {
        let (dir, mut reg) = setup();
        let mut gpu = HeadlessBackend::default();
        let id = reg.compile(&mut gpu, "basic", None, None).unwrap();
        let entry = reg.get("basic").unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.vertex_path.as_deref(), Some(dir.path().join("basic.vert").as_path()));
    }

    #[test]
    fn missing_source_is_io_error() {
        let (_dir, mut reg) = setup();
        let mut gpu = HeadlessBackend::default();
        let err = reg.compile(&mut gpu, "nope", None, None).unwrap_err();
        assert!(matches!(err, ResourceError::Io { .. }));
        assert!(reg.is_empty());
    }

    #[test]
    fn recompile_replaces_without_leaking() {
        let (_dir, mut reg) = setup();
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        let first = reg.compile(&mut gpu, "basic", None, None).unwrap();
        let second = reg.compile(&mut gpu, "basic", None, None).unwrap();
        assert_ne!(first, second);
        assert_eq!(probe.stats().programs, 1);
        assert!(!probe.program_alive(first));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn failed_recompile_keeps_previous_program() {
        let (dir, mut reg) = setup();
        let mut gpu = HeadlessBackend::default();
        let first = reg.compile(&mut gpu, "basic", None, None).unwrap();

        std::fs::write(dir.path().join("basic.frag"), "#version 450\nvoid main( {").unwrap();
        let err = reg.compile(&mut gpu, "basic", None, None).unwrap_err();
        match err {
            ResourceError::ShaderCompile(e) => assert_eq!(e.stage, ShaderStage::Fragment),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reg.id("basic"), Some(first));
    }

    #[test]
    fn release_unknown_name_fails() {
        let (_dir, mut reg) = setup();
        let mut gpu = HeadlessBackend::default();
        assert!(matches!(
            reg.release(&mut gpu, "ghost"),
            Err(ResourceError::UnknownResource { kind: ResourceKind::Program, .. })
        ));
    }

    #[test]
    fn release_all_deletes_every_handle() {
        let (_dir, mut reg) = setup();
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        reg.compile_source(&mut gpu, "a", BASIC_VERT, BASIC_FRAG).unwrap();
        reg.compile_source(&mut gpu, "b", BASIC_VERT, BASIC_FRAG).unwrap();
        reg.release_all(&mut gpu);
        assert!(reg.is_empty());
        assert!(probe.stats().is_empty());
        let deletes = probe.calls().iter().filter(|c| matches!(c, GpuCall::DeleteProgram(_))).count();
        assert_eq!(deletes, 2);
    }
}
