/// One acquired surface texture.
///
/// Short-lived: holding it prevents acquisition of the next frame.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}
