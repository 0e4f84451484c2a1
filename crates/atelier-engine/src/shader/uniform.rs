use super::reflect::UniformType;

/// A host-side uniform value.
///
/// Matrices are column-major, matching `glam` and GLSL.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Mat3([[f32; 3]; 3]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    /// Encodes the value for a block member of type `ty` using std140 rules.
    ///
    /// Returns `None` when the value cannot be written to that type. Integers
    /// widen into float members; nothing else converts.
    pub fn encode(&self, ty: UniformType) -> Option<Vec<u8>> {
        let floats = |v: &[f32]| bytemuck::cast_slice::<f32, u8>(v).to_vec();

        match (*self, ty) {
            (UniformValue::Float(v), UniformType::Float) => Some(floats(&[v])),
            (UniformValue::Int(v), UniformType::Float) => Some(floats(&[v as f32])),
            (UniformValue::UInt(v), UniformType::Float) => Some(floats(&[v as f32])),

            (UniformValue::Vec2(v), UniformType::Vec2) => Some(floats(&v)),
            (UniformValue::Vec3(v), UniformType::Vec3) => Some(floats(&v)),
            (UniformValue::Vec4(v), UniformType::Vec4) => Some(floats(&v)),

            (UniformValue::Int(v), UniformType::Int) => Some(v.to_ne_bytes().to_vec()),
            (UniformValue::Int(v), UniformType::UInt) if v >= 0 => Some((v as u32).to_ne_bytes().to_vec()),
            (UniformValue::UInt(v), UniformType::UInt) => Some(v.to_ne_bytes().to_vec()),
            (UniformValue::Bool(v), UniformType::Bool) => Some(u32::from(v).to_ne_bytes().to_vec()),
            (UniformValue::Int(v), UniformType::Bool) => Some(u32::from(v != 0).to_ne_bytes().to_vec()),

            (UniformValue::Mat3(cols), UniformType::Mat3) => {
                // std140 pads each mat3 column to a vec4.
                let mut padded = [0.0f32; 12];
                for (i, col) in cols.iter().enumerate() {
                    padded[i * 4..i * 4 + 3].copy_from_slice(col);
                }
                Some(floats(&padded))
            }
            (UniformValue::Mat4(cols), UniformType::Mat4) => Some(floats(cols.as_flattened())),

            _ => None,
        }
    }

    /// Builds a matrix from column-major floats (9 for mat3, 16 for mat4).
    pub fn matrix(cols: &[f32]) -> Option<Self> {
        match cols.len() {
            9 => {
                let mut m = [[0.0; 3]; 3];
                for (i, col) in m.iter_mut().enumerate() {
                    col.copy_from_slice(&cols[i * 3..i * 3 + 3]);
                }
                Some(UniformValue::Mat3(m))
            }
            16 => {
                let mut m = [[0.0; 4]; 4];
                for (i, col) in m.iter_mut().enumerate() {
                    col.copy_from_slice(&cols[i * 4..i * 4 + 4]);
                }
                Some(UniformValue::Mat4(m))
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "float",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::Int(_) => "int",
            UniformValue::UInt(_) => "uint",
            UniformValue::Bool(_) => "bool",
            UniformValue::Mat3(_) => "mat3",
            UniformValue::Mat4(_) => "mat4",
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        UniformValue::UInt(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<(f32, f32)> for UniformValue {
    fn from((x, y): (f32, f32)) -> Self {
        UniformValue::Vec2([x, y])
    }
}

impl From<(f32, f32, f32)> for UniformValue {
    fn from((x, y, z): (f32, f32, f32)) -> Self {
        UniformValue::Vec3([x, y, z])
    }
}

impl From<(f32, f32, f32, f32)> for UniformValue {
    fn from((x, y, z, w): (f32, f32, f32, f32)) -> Self {
        UniformValue::Vec4([x, y, z, w])
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<glam::Vec2> for UniformValue {
    fn from(v: glam::Vec2) -> Self {
        UniformValue::Vec2(v.to_array())
    }
}

impl From<glam::Vec3> for UniformValue {
    fn from(v: glam::Vec3) -> Self {
        UniformValue::Vec3(v.to_array())
    }
}

impl From<glam::Vec4> for UniformValue {
    fn from(v: glam::Vec4) -> Self {
        UniformValue::Vec4(v.to_array())
    }
}

impl From<glam::Mat3> for UniformValue {
    fn from(m: glam::Mat3) -> Self {
        UniformValue::Mat3(m.to_cols_array_2d())
    }
}

impl From<glam::Mat4> for UniformValue {
    fn from(m: glam::Mat4) -> Self {
        UniformValue::Mat4(m.to_cols_array_2d())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn scalars_and_vectors_encode_tightly() {
        assert_eq!(UniformValue::from(1.5).encode(UniformType::Float).map(|b| b.len()), Some(4));
        let v = UniformValue::from((1.0, 2.0, 3.0)).encode(UniformType::Vec3).unwrap();
        assert_eq!(as_floats(&v), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn int_widens_into_float() {
        let b = UniformValue::from(3).encode(UniformType::Float).unwrap();
        assert_eq!(as_floats(&b), vec![3.0]);
    }

    #[test]
    fn mismatched_types_are_refused() {
        assert!(UniformValue::from(1.0).encode(UniformType::Vec2).is_none());
        assert!(UniformValue::from([1.0, 2.0]).encode(UniformType::Vec4).is_none());
        assert!(UniformValue::from(-1).encode(UniformType::UInt).is_none());
        assert!(UniformValue::from(glam::Mat4::IDENTITY).encode(UniformType::Other).is_none());
    }

    #[test]
    fn mat3_columns_are_padded() {
        let b = UniformValue::from(glam::Mat3::IDENTITY).encode(UniformType::Mat3).unwrap();
        assert_eq!(b.len(), 48);
        let f = as_floats(&b);
        assert_eq!(&f[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&f[4..8], &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(&f[8..12], &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn matrix_from_column_major_floats() {
        let m = glam::Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(UniformValue::matrix(&m.to_cols_array()), Some(UniformValue::from(m)));
        assert!(UniformValue::matrix(&[0.0; 5]).is_none());
    }
}
