use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub(crate) u64);

        impl $name {
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// A linked shader program.
    ProgramId,
    "program"
);
handle!(
    /// A vertex buffer.
    BufferId,
    "buffer"
);
handle!(
    /// A render object: program + buffer layout.
    VertexArrayId,
    "vertex-array"
);
handle!(
    /// A 2D texture or cubemap.
    TextureId,
    "texture"
);

/// Sampling filter of a texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    /// Linear min/mag filtering, nearest mip selection.
    LinearMipNearest,
    /// Nearest filtering, single level.
    Nearest,
}

/// One level of a mip chain. Pixels are tightly packed RGBA8; row 0 samples at v = 0.
#[derive(Debug, Clone)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TextureUpload<'a> {
    pub label: &'a str,
    /// Level 0 first.
    pub levels: &'a [MipLevel],
    pub filter: TextureFilter,
    /// Requested anisotropy; backends clamp to what they support.
    pub anisotropy: u16,
}

/// Six square RGBA8 faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone)]
pub struct CubeUpload<'a> {
    pub label: &'a str,
    pub size: u32,
    pub faces: [&'a [u8]; 6],
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameStatus {
    /// A frame is open; draws are accepted until `end_frame`.
    Ready,
    /// The surface is temporarily unavailable; skip this frame.
    Skipped,
}

/// Framebuffer pixels read back at the end of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    /// 3 (RGB) or 4 (RGBA).
    pub components: u8,
    /// Tightly packed rows, bottom row first.
    pub pixels: Vec<u8>,
}

/// Live handle counts, used to detect leaks at teardown.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BackendStats {
    pub programs: usize,
    pub buffers: usize,
    pub vertex_arrays: usize,
    pub textures: usize,
}

impl BackendStats {
    pub fn total(&self) -> usize {
        self.programs + self.buffers + self.vertex_arrays + self.textures
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
