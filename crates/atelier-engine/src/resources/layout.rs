use crate::shader::ProgramReflection;

use super::ResourceError;

/// One float attribute inside an interleaved vertex.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VertexAttribute {
    pub name: String,
    pub components: u32,
    /// Offset inside the vertex, in floats.
    pub offset: u32,
}

/// Interleaved float vertex layout, e.g. `"3f 2f"` with names
/// `["a_VertexPosition", "a_TexturePosition"]`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: u32,
}

/// Where one layout attribute feeds the program.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttributeBinding {
    pub location: u32,
    pub components: u32,
    /// Offset inside the vertex, in bytes.
    pub byte_offset: u64,
}

impl VertexLayout {
    /// Builds a layout from `(component count, name)` pairs.
    pub fn new(attributes: &[(u32, &str)]) -> Result<Self, ResourceError> {
        if attributes.is_empty() {
            return Err(ResourceError::LayoutMismatch("layout has no attributes".to_string()));
        }

        let mut out = Vec::with_capacity(attributes.len());
        let mut offset = 0;
        for &(components, name) in attributes {
            if !(1..=4).contains(&components) {
                return Err(ResourceError::LayoutMismatch(format!(
                    "attribute `{name}` has {components} components; expected 1..=4"
                )));
            }
            out.push(VertexAttribute { name: name.to_string(), components, offset });
            offset += components;
        }

        Ok(Self { attributes: out, stride: offset })
    }

    /// Parses a compact format string (`"2f 2f"`, `"3f"`, `"3f4 2f4"`).
    pub fn parse(format: &str, names: &[&str]) -> Result<Self, ResourceError> {
        let tokens: Vec<&str> = format.split_whitespace().collect();
        if tokens.len() != names.len() {
            return Err(ResourceError::LayoutMismatch(format!(
                "format `{format}` has {} attributes but {} names were given",
                tokens.len(),
                names.len()
            )));
        }

        let mut pairs = Vec::with_capacity(tokens.len());
        for (token, name) in tokens.iter().zip(names) {
            let count = token
                .strip_suffix("f4")
                .or_else(|| token.strip_suffix('f'))
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| {
                    ResourceError::LayoutMismatch(format!("unsupported format token `{token}` in `{format}`"))
                })?;
            pairs.push((count, *name));
        }

        Self::new(&pairs)
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Floats per vertex.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn stride_bytes(&self) -> u64 {
        u64::from(self.stride) * std::mem::size_of::<f32>() as u64
    }

    /// Number of whole vertices in `len` floats.
    pub fn vertex_count(&self, len: usize) -> Result<u32, ResourceError> {
        let stride = self.stride as usize;
        if len % stride != 0 {
            return Err(ResourceError::LayoutMismatch(format!(
                "{len} floats is not a multiple of the {stride}-float stride of `{}`",
                self.format()
            )));
        }
        u32::try_from(len / stride)
            .map_err(|_| ResourceError::LayoutMismatch(format!("{len} floats is too many vertices")))
    }

    /// Format string equivalent of this layout.
    pub fn format(&self) -> String {
        self.attributes
            .iter()
            .map(|a| format!("{}f", a.components))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Maps attributes onto the program's vertex inputs.
    ///
    /// Attributes are matched by name. When the program exposes no input
    /// names they are matched by position in location order. Attributes the
    /// program does not read are skipped; every input the program reads must
    /// be fed with the same component count.
    pub fn bind_locations(&self, reflection: &ProgramReflection) -> Result<Vec<AttributeBinding>, String> {
        let inputs = reflection.inputs();
        let by_name = inputs.iter().any(|i| i.name.is_some());

        let mut bindings = Vec::with_capacity(inputs.len());
        for (index, attr) in self.attributes.iter().enumerate() {
            let input = if by_name {
                reflection.input(&attr.name)
            } else {
                inputs.get(index)
            };
            let Some(input) = input else {
                log::debug!("attribute `{}` is not read by the program; skipped", attr.name);
                continue;
            };
            if input.components != attr.components {
                return Err(format!(
                    "attribute `{}` has {} components but the shader input at location {} reads {}",
                    attr.name, attr.components, input.location, input.components
                ));
            }
            bindings.push(AttributeBinding {
                location: input.location,
                components: attr.components,
                byte_offset: u64::from(attr.offset) * std::mem::size_of::<f32>() as u64,
            });
        }

        for input in inputs {
            if !bindings.iter().any(|b| b.location == input.location) {
                let name = input.name.as_deref().unwrap_or("<unnamed>");
                return Err(format!(
                    "shader input `{name}` (location {}) has no attribute in layout `{}`",
                    input.location,
                    self.format()
                ));
            }
        }

        Ok(bindings)
    }
}
