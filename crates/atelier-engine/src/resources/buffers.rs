use std::collections::BTreeMap;

use crate::gpu::{BufferId, GpuBackend};

use super::{ResourceError, ResourceKind, VertexLayout};

#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub id: BufferId,
    pub layout: VertexLayout,
    pub vertex_count: u32,
    /// Index count for indexed buffers.
    pub index_count: Option<u32>,
    /// Storage hint: the buffer is expected to be re-uploaded often.
    pub dynamic: bool,
}

/// Per-model vertex buffers.
#[derive(Debug, Default)]
pub struct VertexBufferRegistry {
    entries: BTreeMap<String, BufferEntry>,
}

impl VertexBufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads interleaved vertex data under `name`.
    ///
    /// An existing buffer under the same name is replaced.
    pub fn upload(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        data: &[f32],
        layout: VertexLayout,
        dynamic: bool,
    ) -> Result<BufferId, ResourceError> {
        self.upload_indexed(gpu, name, data, None, layout, dynamic)
    }

    /// Like [`upload`](Self::upload), with an optional triangle index list.
    pub fn upload_indexed(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        data: &[f32],
        indices: Option<&[u32]>,
        layout: VertexLayout,
        dynamic: bool,
    ) -> Result<BufferId, ResourceError> {
        let vertex_count = layout.vertex_count(data.len())?;
        let index_count = match indices {
            Some(indices) => {
                if let Some(bad) = indices.iter().find(|&&i| i >= vertex_count) {
                    return Err(ResourceError::LayoutMismatch(format!(
                        "index {bad} out of range for {vertex_count} vertices in `{name}`"
                    )));
                }
                Some(indices.len() as u32)
            }
            None => None,
        };
        let id = gpu.create_buffer(name, data, indices, dynamic)?;

        let entry = BufferEntry { id, layout, vertex_count, index_count, dynamic };
        if let Some(previous) = self.entries.insert(name.to_string(), entry) {
            log::warn!("vertex buffer `{name}` uploaded twice; dropping {}", previous.id);
            gpu.delete_buffer(previous.id);
        }
        Ok(id)
    }

    /// Re-uploads the contents of an existing buffer. Layout and indices are kept.
    pub fn update(&mut self, gpu: &mut dyn GpuBackend, name: &str, data: &[f32]) -> Result<(), ResourceError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ResourceError::unknown(ResourceKind::Buffer, name))?;

        let vertex_count = entry.layout.vertex_count(data.len())?;
        if entry.index_count.is_some() && vertex_count != entry.vertex_count {
            return Err(ResourceError::LayoutMismatch(format!(
                "indexed buffer `{name}` must keep {} vertices",
                entry.vertex_count
            )));
        }
        if !entry.dynamic {
            log::debug!("updating static vertex buffer `{name}`");
        }
        gpu.update_buffer(entry.id, data)?;
        entry.vertex_count = vertex_count;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BufferEntry> {
        self.entries.get(name)
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
            .ok_or_else(|| ResourceError::unknown(ResourceKind::Buffer, name))?;
        gpu.delete_buffer(entry.id);
        Ok(())
    }

    pub fn release_all(&mut self, gpu: &mut dyn GpuBackend) {
        for (_, entry) in std::mem::take(&mut self.entries) {
            gpu.delete_buffer(entry.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    fn quad_layout() -> VertexLayout {
        VertexLayout::parse("2f 2f", &["a_VertexPosition", "a_TexturePosition"]).unwrap()
    }

    #[test]
    fn upload_counts_vertices() {
        let mut gpu = HeadlessBackend::default();
        let mut reg = VertexBufferRegistry::new();
        reg.upload(&mut gpu, "quad", &[0.0; 24], quad_layout(), false).unwrap();
        assert_eq!(reg.get("quad").map(|e| e.vertex_count), Some(6));
    }

    #[test]
    fn upload_rejects_partial_vertices() {
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        let mut reg = VertexBufferRegistry::new();
        let err = reg.upload(&mut gpu, "quad", &[0.0; 7], quad_layout(), false).unwrap_err();
        assert!(matches!(err, ResourceError::LayoutMismatch(_)));
        assert!(probe.stats().is_empty());
    }

    #[test]
    fn indexed_upload_validates_indices() {
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        let mut reg = VertexBufferRegistry::new();
        let id = reg
            .upload_indexed(&mut gpu, "quad", &[0.0; 16], Some(&[0, 1, 2, 0, 2, 3]), quad_layout(), false)
            .unwrap();
        assert_eq!(reg.get("quad").and_then(|e| e.index_count), Some(6));
        assert_eq!(probe.buffer_indices(id), Some(vec![0, 1, 2, 0, 2, 3]));

        let err = reg
            .upload_indexed(&mut gpu, "bad", &[0.0; 16], Some(&[0, 4, 1]), quad_layout(), false)
            .unwrap_err();
        assert!(matches!(err, ResourceError::LayoutMismatch(_)));
    }

    #[test]
    fn update_rewrites_contents() {
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        let mut reg = VertexBufferRegistry::new();
        let id = reg.upload(&mut gpu, "quad", &[0.0; 8], quad_layout(), true).unwrap();
        reg.update(&mut gpu, "quad", &[1.0; 12]).unwrap();
        assert_eq!(probe.buffer_data(id), Some(vec![1.0; 12]));
        assert_eq!(reg.get("quad").map(|e| e.vertex_count), Some(3));
        assert!(reg.update(&mut gpu, "ghost", &[0.0; 4]).is_err());
    }

    #[test]
    fn release_frees_handle_and_entry() {
        let mut gpu = HeadlessBackend::default();
        let probe = gpu.probe();
        let mut reg = VertexBufferRegistry::new();
        reg.upload(&mut gpu, "quad", &[0.0; 8], quad_layout(), false).unwrap();
        reg.release(&mut gpu, "quad").unwrap();
        assert!(reg.is_empty());
        assert!(probe.stats().is_empty());
        assert!(matches!(
            reg.release(&mut gpu, "quad"),
            Err(ResourceError::UnknownResource { kind: ResourceKind::Buffer, .. })
        ));
    }
}
