//! Vertex generation for the built-in shapes.

/// Corner positions of the unit surface, counter-clockwise from bottom-left.
const SURFACE_POSITIONS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
const SURFACE_UVS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
/// Fan triangulation of the surface.
pub const SURFACE_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

const CUBE_CORNERS: [[f32; 3]; 8] = [
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
];

/// Two counter-clockwise triangles per face: front, right, back, left, top, bottom.
pub const CUBE_POSITION_INDICES: [u32; 36] = [
    0, 2, 3, 0, 1, 2, //
    1, 7, 2, 1, 6, 7, //
    6, 5, 4, 4, 7, 6, //
    3, 4, 5, 3, 5, 0, //
    3, 7, 4, 3, 2, 7, //
    0, 6, 1, 0, 5, 6,
];

const CUBE_UV_CORNERS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// Per-face UV orientation, in the same face order as the positions.
pub const CUBE_UV_INDICES: [u32; 36] = [
    0, 2, 3, 0, 1, 2, //
    0, 2, 3, 0, 1, 2, //
    0, 1, 2, 2, 3, 0, //
    2, 3, 0, 2, 0, 1, //
    0, 2, 3, 0, 1, 2, //
    3, 1, 2, 3, 0, 1,
];

/// One normal per face, in the same face order as the positions.
pub const CUBE_FACE_NORMALS: [[f32; 3]; 6] = [
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, -1.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
];

/// Clip-space depth of the skybox triangle, just inside the far plane.
pub const SKYBOX_DEPTH: f32 = 0.9999;

/// The drawable shapes an entity can take.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Shape {
    /// Full-screen quad, optionally carrying texture coordinates.
    Surface { textures: bool },
    /// 36-vertex box with optional per-face normals and texture coordinates.
    Cube { normals: bool, texcoords: bool },
    /// One oversized clip-space triangle for cubemap backgrounds.
    Skybox,
}

/// CPU-side geometry ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexData {
    /// Interleaved per-vertex attributes.
    pub vertices: Vec<f32>,
    pub indices: Option<Vec<u32>>,
}

impl Shape {
    /// Default layout format and attribute names for this shape.
    pub fn default_layout(&self) -> (&'static str, Vec<&'static str>) {
        match *self {
            Shape::Surface { textures: true } => ("2f 2f", vec!["a_VertexPosition", "a_TexturePosition"]),
            Shape::Surface { textures: false } => ("2f", vec!["a_VertexPosition"]),
            Shape::Cube { normals, texcoords } => match (normals, texcoords) {
                (true, true) => ("3f 3f 2f", vec!["a_VertexPosition", "a_Normal", "a_TexturePosition"]),
                (true, false) => ("3f 3f", vec!["a_VertexPosition", "a_Normal"]),
                (false, true) => ("3f 2f", vec!["a_VertexPosition", "a_TexturePosition"]),
                (false, false) => ("3f", vec!["a_VertexPosition"]),
            },
            Shape::Skybox => ("3f", vec!["a_VertexPosition"]),
        }
    }

    pub fn prepare_vertex_data(&self) -> VertexData {
        match *self {
            Shape::Surface { textures } => {
                let vertices = SURFACE_POSITIONS
                    .iter()
                    .zip(SURFACE_UVS)
                    .flat_map(|(pos, uv)| {
                        let uv: &[f32] = if textures { &uv } else { &[] };
                        pos.iter().chain(uv).copied().collect::<Vec<_>>()
                    })
                    .collect();
                VertexData { vertices, indices: Some(SURFACE_INDICES.to_vec()) }
            }
            Shape::Cube { normals, texcoords } => {
                let normal_rows = cube_normals();
                let mut vertices = Vec::with_capacity(36 * 8);
                for i in 0..CUBE_POSITION_INDICES.len() {
                    vertices.extend_from_slice(&CUBE_CORNERS[CUBE_POSITION_INDICES[i] as usize]);
                    if normals {
                        vertices.extend_from_slice(&normal_rows[i]);
                    }
                    if texcoords {
                        vertices.extend_from_slice(&CUBE_UV_CORNERS[CUBE_UV_INDICES[i] as usize]);
                    }
                }
                VertexData { vertices, indices: None }
            }
            Shape::Skybox => VertexData {
                vertices: vec![
                    -1.0, -1.0, SKYBOX_DEPTH, //
                    3.0, -1.0, SKYBOX_DEPTH, //
                    -1.0, 3.0, SKYBOX_DEPTH,
                ],
                indices: None,
            },
        }
    }
}

/// Face normals broadcast to the six vertices of each face.
pub fn cube_normals() -> Vec<[f32; 3]> {
    CUBE_FACE_NORMALS.iter().flat_map(|n| std::iter::repeat_n(*n, 6)).collect()
}
