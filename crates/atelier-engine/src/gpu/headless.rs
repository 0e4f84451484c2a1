use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::resources::VertexLayout;
use crate::shader::{LinkedProgram, ProgramReflection, UniformInfo};

use super::{
    BackendError,
    BackendStats,
    BufferId,
    CubeUpload,
    FrameStatus,
    GpuBackend,
    ProgramId,
    Readback,
    TextureFilter,
    TextureId,
    TextureUpload,
    VertexArrayId,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateProgram { id: ProgramId, label: String },
    DeleteProgram(ProgramId),
    WriteUniform { program: ProgramId, name: String, bytes: Vec<u8> },
    BindTexture { program: ProgramId, unit: u32, texture: TextureId },
    CreateBuffer { id: BufferId, label: String, len: usize, indices: Option<usize>, dynamic: bool },
    UpdateBuffer { id: BufferId, len: usize },
    DeleteBuffer(BufferId),
    CreateVertexArray { id: VertexArrayId, label: String, program: ProgramId, buffer: BufferId },
    DeleteVertexArray(VertexArrayId),
    Draw(VertexArrayId),
    CreateTexture { id: TextureId, label: String, width: u32, height: u32, levels: usize, filter: TextureFilter },
    CreateCubeTexture { id: TextureId, label: String, size: u32 },
    DeleteTexture(TextureId),
    BeginFrame,
    EndFrame,
    Resize { width: u32, height: u32 },
}

struct Program {
    label: String,
    reflection: ProgramReflection,
    uniforms: HashMap<String, Vec<u8>>,
    textures: BTreeMap<u32, TextureId>,
}

struct Buffer {
    data: Vec<f32>,
    indices: Option<Vec<u32>>,
}

struct VertexArray {
    program: ProgramId,
    buffer: BufferId,
}

struct Texture {
    width: u32,
    height: u32,
    cube: bool,
    /// Base level for 2D textures, the six faces for cubemaps.
    layers: Vec<Vec<u8>>,
}

struct State {
    next_id: u64,
    size: (u32, u32),
    calls: Vec<GpuCall>,

    programs: HashMap<ProgramId, Program>,
    buffers: HashMap<BufferId, Buffer>,
    vertex_arrays: HashMap<VertexArrayId, VertexArray>,
    textures: HashMap<TextureId, Texture>,

    invalid_deletes: usize,
    stale_draws: usize,

    in_frame: bool,
    pending_readback: Option<u8>,
    readback: Option<Readback>,
}

impl State {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory backend with no device.
///
/// Every call is recorded in order. Handles are tracked so leaks, double
/// deletes and draws of dead render objects are visible through a
/// [`HeadlessProbe`].
pub struct HeadlessBackend {
    state: Rc<RefCell<State>>,
}

/// Read-only view of a [`HeadlessBackend`] that stays usable after the
/// backend has been boxed into a render context.
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<State>>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                next_id: 0,
                size: (width, height),
                calls: Vec::new(),
                programs: HashMap::new(),
                buffers: HashMap::new(),
                vertex_arrays: HashMap::new(),
                textures: HashMap::new(),
                invalid_deletes: 0,
                stale_draws: 0,
                in_frame: false,
                pending_readback: None,
                readback: None,
            })),
        }
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe { state: Rc::clone(&self.state) }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, BackendError> {
        let mut s = self.state.borrow_mut();
        let id = ProgramId(s.next());
        s.programs.insert(
            id,
            Program {
                label: program.label.clone(),
                reflection: program.reflection.clone(),
                uniforms: HashMap::new(),
                textures: BTreeMap::new(),
            },
        );
        s.calls.push(GpuCall::CreateProgram { id, label: program.label.clone() });
        Ok(id)
    }

    fn delete_program(&mut self, id: ProgramId) {
        let mut s = self.state.borrow_mut();
        if s.programs.remove(&id).is_none() {
            s.invalid_deletes += 1;
        }
        s.calls.push(GpuCall::DeleteProgram(id));
    }

    fn write_uniform(&mut self, program: ProgramId, uniform: &UniformInfo, bytes: &[u8]) {
        let mut s = self.state.borrow_mut();
        if let Some(p) = s.programs.get_mut(&program) {
            p.uniforms.insert(uniform.name.clone(), bytes.to_vec());
        }
        s.calls.push(GpuCall::WriteUniform { program, name: uniform.name.clone(), bytes: bytes.to_vec() });
    }

    fn bind_texture(&mut self, program: ProgramId, unit: u32, texture: TextureId) {
        let mut s = self.state.borrow_mut();
        if let Some(p) = s.programs.get_mut(&program) {
            p.textures.insert(unit, texture);
        }
        s.calls.push(GpuCall::BindTexture { program, unit, texture });
    }

    fn create_buffer(
        &mut self,
        label: &str,
        vertices: &[f32],
        indices: Option<&[u32]>,
        dynamic: bool,
    ) -> Result<BufferId, BackendError> {
        let mut s = self.state.borrow_mut();
        let id = BufferId(s.next());
        s.buffers.insert(id, Buffer { data: vertices.to_vec(), indices: indices.map(<[u32]>::to_vec) });
        s.calls.push(GpuCall::CreateBuffer {
            id,
            label: label.to_string(),
            len: vertices.len(),
            indices: indices.map(<[u32]>::len),
            dynamic,
        });
        Ok(id)
    }

    fn update_buffer(&mut self, id: BufferId, vertices: &[f32]) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        let Some(buffer) = s.buffers.get_mut(&id) else {
            return Err(BackendError::StaleHandle(id.to_string()));
        };
        buffer.data = vertices.to_vec();
        s.calls.push(GpuCall::UpdateBuffer { id, len: vertices.len() });
        Ok(())
    }

    fn delete_buffer(&mut self, id: BufferId) {
        let mut s = self.state.borrow_mut();
        if s.buffers.remove(&id).is_none() {
            s.invalid_deletes += 1;
        }
        s.calls.push(GpuCall::DeleteBuffer(id));
    }

    fn create_vertex_array(
        &mut self,
        label: &str,
        program: ProgramId,
        buffer: BufferId,
        layout: &VertexLayout,
    ) -> Result<VertexArrayId, BackendError> {
        let mut s = self.state.borrow_mut();
        let Some(p) = s.programs.get(&program) else {
            return Err(BackendError::StaleHandle(program.to_string()));
        };
        if !s.buffers.contains_key(&buffer) {
            return Err(BackendError::StaleHandle(buffer.to_string()));
        }
        layout
            .bind_locations(&p.reflection)
            .map_err(|reason| BackendError::VertexArray { label: label.to_string(), reason })?;

        let id = VertexArrayId(s.next());
        s.vertex_arrays.insert(id, VertexArray { program, buffer });
        s.calls.push(GpuCall::CreateVertexArray { id, label: label.to_string(), program, buffer });
        Ok(id)
    }

    fn delete_vertex_array(&mut self, id: VertexArrayId) {
        let mut s = self.state.borrow_mut();
        if s.vertex_arrays.remove(&id).is_none() {
            s.invalid_deletes += 1;
        }
        s.calls.push(GpuCall::DeleteVertexArray(id));
    }

    fn draw(&mut self, id: VertexArrayId) {
        let mut s = self.state.borrow_mut();
        let alive = match s.vertex_arrays.get(&id) {
            Some(vao) => s.programs.contains_key(&vao.program) && s.buffers.contains_key(&vao.buffer),
            None => false,
        };
        if !alive {
            s.stale_draws += 1;
        }
        s.calls.push(GpuCall::Draw(id));
    }

    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureId, BackendError> {
        let Some(base) = upload.levels.first() else {
            return Err(BackendError::Texture { label: upload.label.to_string(), reason: "no mip levels".into() });
        };
        let mut s = self.state.borrow_mut();
        let id = TextureId(s.next());
        s.textures.insert(
            id,
            Texture { width: base.width, height: base.height, cube: false, layers: vec![base.rgba.clone()] },
        );
        s.calls.push(GpuCall::CreateTexture {
            id,
            label: upload.label.to_string(),
            width: base.width,
            height: base.height,
            levels: upload.levels.len(),
            filter: upload.filter,
        });
        Ok(id)
    }

    fn create_cube_texture(&mut self, upload: &CubeUpload<'_>) -> Result<TextureId, BackendError> {
        let expected = (upload.size * upload.size * 4) as usize;
        if upload.faces.iter().any(|f| f.len() != expected) {
            return Err(BackendError::Texture {
                label: upload.label.to_string(),
                reason: "cube faces differ in size".into(),
            });
        }
        let mut s = self.state.borrow_mut();
        let id = TextureId(s.next());
        let layers = upload.faces.iter().map(|f| f.to_vec()).collect();
        s.textures.insert(id, Texture { width: upload.size, height: upload.size, cube: true, layers });
        s.calls.push(GpuCall::CreateCubeTexture { id, label: upload.label.to_string(), size: upload.size });
        Ok(id)
    }

    fn delete_texture(&mut self, id: TextureId) {
        let mut s = self.state.borrow_mut();
        if s.textures.remove(&id).is_none() {
            s.invalid_deletes += 1;
        }
        s.calls.push(GpuCall::DeleteTexture(id));
    }

    fn begin_frame(&mut self, _clear: [f64; 4]) -> Result<FrameStatus, BackendError> {
        let mut s = self.state.borrow_mut();
        s.in_frame = true;
        s.calls.push(GpuCall::BeginFrame);
        Ok(FrameStatus::Ready)
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        s.in_frame = false;
        if let Some(components) = s.pending_readback.take() {
            let (width, height) = s.size;
            s.readback = Some(Readback {
                width,
                height,
                components,
                pixels: vec![0; (width * height * u32::from(components)) as usize],
            });
        }
        s.calls.push(GpuCall::EndFrame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut s = self.state.borrow_mut();
        s.size = (width, height);
        s.calls.push(GpuCall::Resize { width, height });
    }

    fn surface_size(&self) -> (u32, u32) {
        self.state.borrow().size
    }

    fn request_readback(&mut self, components: u8) {
        self.state.borrow_mut().pending_readback = Some(components);
    }

    fn take_readback(&mut self) -> Option<Readback> {
        self.state.borrow_mut().readback.take()
    }

    fn stats(&self) -> BackendStats {
        self.probe().stats()
    }
}

impl HeadlessProbe {
    /// All calls recorded so far, oldest first.
    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn stats(&self) -> BackendStats {
        let s = self.state.borrow();
        BackendStats {
            programs: s.programs.len(),
            buffers: s.buffers.len(),
            vertex_arrays: s.vertex_arrays.len(),
            textures: s.textures.len(),
        }
    }

    /// Deletes of handles that were not alive.
    pub fn invalid_deletes(&self) -> usize {
        self.state.borrow().invalid_deletes
    }

    /// Draws of render objects whose program, buffer or self was deleted.
    pub fn stale_draws(&self) -> usize {
        self.state.borrow().stale_draws
    }

    pub fn in_frame(&self) -> bool {
        self.state.borrow().in_frame
    }

    pub fn program_alive(&self, id: ProgramId) -> bool {
        self.state.borrow().programs.contains_key(&id)
    }

    pub fn program_label(&self, id: ProgramId) -> Option<String> {
        self.state.borrow().programs.get(&id).map(|p| p.label.clone())
    }

    /// Last bytes written to a uniform of a live program.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<Vec<u8>> {
        self.state.borrow().programs.get(&program)?.uniforms.get(name).cloned()
    }

    pub fn uniform_f32s(&self, program: ProgramId, name: &str) -> Option<Vec<f32>> {
        let bytes = self.uniform(program, name)?;
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    pub fn texture_binding(&self, program: ProgramId, unit: u32) -> Option<TextureId> {
        self.state.borrow().programs.get(&program)?.textures.get(&unit).copied()
    }

    pub fn buffer_data(&self, id: BufferId) -> Option<Vec<f32>> {
        self.state.borrow().buffers.get(&id).map(|b| b.data.clone())
    }

    pub fn buffer_indices(&self, id: BufferId) -> Option<Vec<u32>> {
        self.state.borrow().buffers.get(&id)?.indices.clone()
    }

    pub fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.state.borrow().textures.get(&id).map(|t| (t.width, t.height))
    }

    pub fn texture_is_cube(&self, id: TextureId) -> Option<bool> {
        self.state.borrow().textures.get(&id).map(|t| t.cube)
    }

    /// RGBA bytes of a 2D texture's base level (`layer` 0) or a cubemap face.
    pub fn texture_pixels(&self, id: TextureId, layer: usize) -> Option<Vec<u8>> {
        self.state.borrow().textures.get(&id)?.layers.get(layer).cloned()
    }

    pub fn vertex_array_program(&self, id: VertexArrayId) -> Option<ProgramId> {
        self.state.borrow().vertex_arrays.get(&id).map(|v| v.program)
    }

    /// Number of draw calls recorded.
    pub fn draws(&self) -> usize {
        self.state.borrow().calls.iter().filter(|c| matches!(c, GpuCall::Draw(_))).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_delete_is_counted_not_fatal() {
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        let id = gpu.create_buffer("quad", &[0.0; 8], None, false).unwrap();
        gpu.delete_buffer(id);
        gpu.delete_buffer(id);
        assert_eq!(probe.invalid_deletes(), 1);
        assert!(probe.stats().is_empty());
    }

    #[test]
    fn readback_is_delivered_after_end_frame() {
        let mut gpu = HeadlessBackend::new(4, 2);
        gpu.begin_frame([0.0; 4]).unwrap();
        gpu.request_readback(3);
        assert!(gpu.take_readback().is_none());
        gpu.end_frame().unwrap();
        let rb = gpu.take_readback().unwrap();
        assert_eq!((rb.width, rb.height, rb.components), (4, 2, 3));
        assert_eq!(rb.pixels.len(), 24);
        assert!(gpu.take_readback().is_none());
    }

    #[test]
    fn update_of_deleted_buffer_fails() {
        let mut gpu = HeadlessBackend::default();
        let id = gpu.create_buffer("quad", &[0.0; 8], None, true).unwrap();
        gpu.delete_buffer(id);
        assert!(matches!(gpu.update_buffer(id, &[1.0; 8]), Err(BackendError::StaleHandle(_))));
    }

    #[test]
    fn drawing_an_unknown_vertex_array_is_counted_stale() {
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        gpu.draw(VertexArrayId(42));
        assert_eq!(probe.stale_draws(), 1);
        assert_eq!(probe.draws(), 1);
    }
}
