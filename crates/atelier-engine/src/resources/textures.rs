use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::imageops;

use crate::gpu::{CubeUpload, GpuBackend, MipLevel, TextureFilter, TextureId, TextureUpload};
use crate::shader::TextureKind;

use super::image_data::{decode_file, mip_chain, DecodeMode};
use super::{ResourceError, ResourceKind};

/// Cubemap face file stems in upload order (+X, -X, +Y, -Y, +Z, -Z).
pub const CUBE_FACES: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

/// Channel order of an in-memory pixel surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PixelOrder {
    Rgba,
    /// Typical of window-system surfaces; swizzled on conversion.
    Bgra,
}

/// Borrowed 4-byte-per-pixel surface, rows in upload order.
#[derive(Debug, Copy, Clone)]
pub struct PixelSurface<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
    pub order: PixelOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    File { path: PathBuf, mode: DecodeMode, flip: bool },
    Cube { dir: PathBuf, ext: String },
    Surface,
}

#[derive(Debug, Clone)]
pub struct TextureEntry {
    pub id: TextureId,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Channel count of the source (3 or 4); uploads are always RGBA8.
    pub channels: u8,
    pub filter: TextureFilter,
    pub source: TextureSource,
}

/// Named 2D textures and cubemaps.
#[derive(Debug)]
pub struct TextureRegistry {
    anisotropy: u16,
    entries: BTreeMap<String, TextureEntry>,
}

impl TextureRegistry {
    pub fn new(anisotropy: u16) -> Self {
        Self { anisotropy, entries: BTreeMap::new() }
    }

    /// Loads an image file with a full mip chain and anisotropic filtering.
    ///
    /// Decoders produce rows top-down; `flip` reverses them so the image's
    /// bottom row lands at v = 0.
    pub fn load(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        path: impl AsRef<Path>,
        mode: DecodeMode,
        flip: bool,
    ) -> Result<TextureId, ResourceError> {
        let path = path.as_ref();
        let mut decoded = decode_file(path, mode)?;
        if flip {
            imageops::flip_vertical_in_place(&mut decoded.rgba);
        }
        let (width, height) = decoded.rgba.dimensions();
        let levels = mip_chain(decoded.rgba);

        let id = gpu.create_texture(&TextureUpload {
            label: name,
            levels: &levels,
            filter: TextureFilter::LinearMipNearest,
            anisotropy: self.anisotropy,
        })?;

        log::debug!(
            "texture `{name}` loaded from {} ({width}x{height}, {} channels, {} levels)",
            path.display(),
            decoded.channels,
            levels.len()
        );

        self.insert(
            gpu,
            name,
            TextureEntry {
                id,
                kind: TextureKind::D2,
                width,
                height,
                channels: decoded.channels,
                filter: TextureFilter::LinearMipNearest,
                source: TextureSource::File { path: path.to_path_buf(), mode, flip },
            },
        );
        Ok(id)
    }

    /// Loads `{right,left,top,bottom,front,back}.{ext}` from `dir` into one cubemap.
    ///
    /// All six faces must exist and be square and equally sized. On failure
    /// nothing is registered under `name`.
    pub fn load_cube(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        dir: impl AsRef<Path>,
        ext: &str,
    ) -> Result<TextureId, ResourceError> {
        let dir = dir.as_ref();
        let ext = ext.trim_start_matches('.');

        let paths: Vec<PathBuf> = CUBE_FACES.iter().map(|face| dir.join(format!("{face}.{ext}"))).collect();
        for (face, path) in CUBE_FACES.iter().zip(&paths) {
            if !path.is_file() {
                return Err(ResourceError::MissingCubeFace {
                    name: name.to_string(),
                    face: *face,
                    path: path.clone(),
                });
            }
        }

        let mut faces = Vec::with_capacity(6);
        let mut size = None;
        for (face, path) in CUBE_FACES.iter().zip(&paths) {
            let mut rgba = decode_file(path, DecodeMode::Fast)?.rgba;
            let (w, h) = rgba.dimensions();
            if w != h || size.is_some_and(|s| s != w) {
                return Err(ResourceError::Decode {
                    path: path.clone(),
                    reason: format!("cube face `{face}` is {w}x{h}; faces must be square and equally sized"),
                });
            }
            size = Some(w);

            match *face {
                "top" | "bottom" => imageops::flip_vertical_in_place(&mut rgba),
                _ => imageops::flip_horizontal_in_place(&mut rgba),
            }
            faces.push(rgba.into_raw());
        }

        let size = size.unwrap_or(0);
        let id = gpu.create_cube_texture(&CubeUpload {
            label: name,
            size,
            faces: [
                faces[0].as_slice(),
                faces[1].as_slice(),
                faces[2].as_slice(),
                faces[3].as_slice(),
                faces[4].as_slice(),
                faces[5].as_slice(),
            ],
        })?;

        self.insert(
            gpu,
            name,
            TextureEntry {
                id,
                kind: TextureKind::Cube,
                width: size,
                height: size,
                channels: 4,
                filter: TextureFilter::LinearMipNearest,
                source: TextureSource::Cube { dir: dir.to_path_buf(), ext: ext.to_string() },
            },
        );
        Ok(id)
    }

    /// Uploads an in-memory surface with nearest filtering and no mipmaps.
    ///
    /// Replaces any texture under the same name, so it can be called every
    /// frame for dynamic content.
    pub fn convert_surface(
        &mut self,
        gpu: &mut dyn GpuBackend,
        name: &str,
        surface: &PixelSurface<'_>,
    ) -> Result<TextureId, ResourceError> {
        let expected = surface.width as usize * surface.height as usize * 4;
        if surface.width == 0 || surface.height == 0 || surface.pixels.len() != expected {
            return Err(ResourceError::InvalidSurface {
                name: name.to_string(),
                reason: format!(
                    "{}x{} surface needs {expected} bytes, got {}",
                    surface.width,
                    surface.height,
                    surface.pixels.len()
                ),
            });
        }

        let mut rgba = surface.pixels.to_vec();
        if surface.order == PixelOrder::Bgra {
            for px in rgba.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }

        let levels = [MipLevel { width: surface.width, height: surface.height, rgba }];
        let id = gpu.create_texture(&TextureUpload {
            label: name,
            levels: &levels,
            filter: TextureFilter::Nearest,
            anisotropy: 1,
        })?;

        self.insert(
            gpu,
            name,
            TextureEntry {
                id,
                kind: TextureKind::D2,
                width: surface.width,
                height: surface.height,
                channels: 4,
                filter: TextureFilter::Nearest,
                source: TextureSource::Surface,
            },
        );
        Ok(id)
    }

    fn insert(&mut self, gpu: &mut dyn GpuBackend, name: &str, entry: TextureEntry) {
        if let Some(previous) = self.entries.insert(name.to_string(), entry) {
            gpu.delete_texture(previous.id);
        }
    }

    pub fn get(&self, name: &str) -> Option<&TextureEntry> {
        self.entries.get(name)
    }

    pub fn id(&self, name: &str) -> Option<TextureId> {
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
            .ok_or_else(|| ResourceError::unknown(ResourceKind::Texture, name))?;
        gpu.delete_texture(entry.id);
        Ok(())
    }

    /// Releases several textures. Every name is checked first; if any is
    /// unknown, nothing is released.
    pub fn release_many(&mut self, gpu: &mut dyn GpuBackend, names: &[&str]) -> Result<(), ResourceError> {
        if let Some(missing) = names.iter().find(|n| !self.entries.contains_key(**n)) {
            return Err(ResourceError::unknown(ResourceKind::Texture, missing));
        }
        for name in names {
            // Duplicates in `names` were already released.
            if let Some(entry) = self.entries.remove(*name) {
                gpu.delete_texture(entry.id);
            }
        }
        Ok(())
    }

    pub fn release_all(&mut self, gpu: &mut dyn GpuBackend) {
        for (_, entry) in std::mem::take(&mut self.entries) {
            gpu.delete_texture(entry.id);
        }
    }
}
