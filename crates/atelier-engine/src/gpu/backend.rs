use crate::resources::VertexLayout;
use crate::shader::{LinkedProgram, UniformInfo};

use super::{
    BackendError,
    BackendStats,
    BufferId,
    CubeUpload,
    FrameStatus,
    ProgramId,
    Readback,
    TextureId,
    TextureUpload,
    VertexArrayId,
};

/// Every GPU call the registries make.
///
/// Deleting an unknown handle must not panic. Draws outside a frame are
/// dropped by the backend.
pub trait GpuBackend {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    // ── programs ──────────────────────────────────────────────────────────

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, BackendError>;
    fn delete_program(&mut self, id: ProgramId);

    /// Writes `bytes` into the block member described by `uniform`.
    ///
    /// The value sticks to the program and is used by every later draw.
    fn write_uniform(&mut self, program: ProgramId, uniform: &UniformInfo, bytes: &[u8]);

    /// Binds `texture` to the program's texture unit `unit`.
    fn bind_texture(&mut self, program: ProgramId, unit: u32, texture: TextureId);

    // ── buffers ───────────────────────────────────────────────────────────

    /// Uploads interleaved vertices, plus an optional index list drawn as a
    /// triangle list.
    fn create_buffer(
        &mut self,
        label: &str,
        vertices: &[f32],
        indices: Option<&[u32]>,
        dynamic: bool,
    ) -> Result<BufferId, BackendError>;

    /// Replaces the vertex data. Indices are kept.
    fn update_buffer(&mut self, id: BufferId, vertices: &[f32]) -> Result<(), BackendError>;
    fn delete_buffer(&mut self, id: BufferId);

    // ── render objects ────────────────────────────────────────────────────

    fn create_vertex_array(
        &mut self,
        label: &str,
        program: ProgramId,
        buffer: BufferId,
        layout: &VertexLayout,
    ) -> Result<VertexArrayId, BackendError>;
    fn delete_vertex_array(&mut self, id: VertexArrayId);
    fn draw(&mut self, id: VertexArrayId);

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureId, BackendError>;
    fn create_cube_texture(&mut self, upload: &CubeUpload<'_>) -> Result<TextureId, BackendError>;
    fn delete_texture(&mut self, id: TextureId);

    // ── frame ─────────────────────────────────────────────────────────────

    /// Opens a frame cleared to `clear` (linear RGBA).
    fn begin_frame(&mut self, clear: [f64; 4]) -> Result<FrameStatus, BackendError>;

    /// Submits recorded draws and presents.
    fn end_frame(&mut self) -> Result<(), BackendError>;

    fn resize(&mut self, width: u32, height: u32);
    fn surface_size(&self) -> (u32, u32);

    /// Asks for the framebuffer to be read back when the current frame ends.
    fn request_readback(&mut self, components: u8);

    /// Returns the pixels captured by the last completed readback.
    fn take_readback(&mut self) -> Option<Readback>;

    fn stats(&self) -> BackendStats;
}
