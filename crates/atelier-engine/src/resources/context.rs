use std::path::PathBuf;

use crate::gpu::{FrameStatus, GpuBackend, HeadlessBackend, HeadlessProbe, Readback, VertexArrayId};

use super::{RenderObjectRegistry, ResourceError, ShaderProgramRegistry, TextureRegistry, VertexBufferRegistry};

/// Resource loading configuration.
#[derive(Debug, Clone)]
pub struct ResourceSettings {
    /// Directory shader identifiers are resolved against.
    pub shader_dir: PathBuf,
    pub vertex_extension: String,
    pub fragment_extension: String,
    /// Anisotropy requested for file textures.
    pub anisotropy: u16,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            vertex_extension: "vert".to_string(),
            fragment_extension: "frag".to_string(),
            anisotropy: 16,
        }
    }
}

/// Registry sizes.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct RegistryCounts {
    pub programs: usize,
    pub buffers: usize,
    pub textures: usize,
    pub objects: usize,
}

/// The backend plus the four registries.
///
/// Fields are public so callers can split borrows, e.g.
/// `ctx.programs.compile(ctx.gpu.as_mut(), ..)`.
pub struct RenderContext {
    pub gpu: Box<dyn GpuBackend>,
    pub programs: ShaderProgramRegistry,
    pub buffers: VertexBufferRegistry,
    pub textures: TextureRegistry,
    pub objects: RenderObjectRegistry,
    settings: ResourceSettings,
}

impl RenderContext {
    pub fn new(gpu: Box<dyn GpuBackend>, settings: ResourceSettings) -> Self {
        log::info!("render context on `{}` backend, shaders in {}", gpu.name(), settings.shader_dir.display());
        Self {
            gpu,
            programs: ShaderProgramRegistry::new(&settings),
            buffers: VertexBufferRegistry::new(),
            textures: TextureRegistry::new(settings.anisotropy),
            objects: RenderObjectRegistry::new(),
            settings,
        }
    }

    /// A context over a [`HeadlessBackend`], with a probe onto it.
    pub fn headless(width: u32, height: u32, settings: ResourceSettings) -> (Self, HeadlessProbe) {
        let gpu = HeadlessBackend::new(width, height);
        let probe = gpu.probe();
        (Self::new(Box::new(gpu), settings), probe)
    }

    pub fn settings(&self) -> &ResourceSettings {
        &self.settings
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.gpu.surface_size()
    }

    pub fn bind(&mut self, model: &str, program: &str) -> Result<VertexArrayId, ResourceError> {
        self.objects.bind(self.gpu.as_mut(), &self.programs, &self.buffers, model, program)
    }

    pub fn destroy(&mut self, model: &str, program: &str) -> Result<(), ResourceError> {
        self.objects
            .destroy(self.gpu.as_mut(), &mut self.programs, &mut self.buffers, model, program)
    }

    pub fn destroy_all(&mut self) {
        self.objects
            .destroy_all(self.gpu.as_mut(), &mut self.programs, &mut self.buffers);
    }

    pub fn draw(&mut self, model: &str) -> Result<(), ResourceError> {
        self.objects.draw(self.gpu.as_mut(), model)
    }

    /// Process-exit teardown: every render object, buffer, program and texture.
    pub fn shutdown(&mut self) {
        self.destroy_all();
        self.textures.release_all(self.gpu.as_mut());

        let stats = self.gpu.stats();
        if stats.is_empty() {
            log::info!("render context shut down cleanly");
        } else {
            log::warn!("GPU handles still alive after shutdown: {stats:?}");
        }
    }

    pub fn begin_frame(&mut self, clear: [f64; 4]) -> Result<FrameStatus, ResourceError> {
        Ok(self.gpu.begin_frame(clear)?)
    }

    pub fn end_frame(&mut self) -> Result<(), ResourceError> {
        Ok(self.gpu.end_frame()?)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    /// Requests a readback of the current frame (3 = RGB, 4 = RGBA).
    pub fn request_readback(&mut self, components: u8) {
        self.gpu.request_readback(components);
    }

    pub fn take_readback(&mut self) -> Option<Readback> {
        self.gpu.take_readback()
    }

    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            programs: self.programs.len(),
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            objects: self.objects.len(),
        }
    }
}
