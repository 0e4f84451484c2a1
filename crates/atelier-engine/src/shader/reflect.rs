use std::collections::{BTreeSet, HashMap};

use naga::{AddressSpace, Binding, Expression, ImageDimension, Module, ScalarKind, Statement, TypeInner};

/// Type of a uniform block member, as far as host writes care.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    UInt,
    Bool,
    Mat3,
    Mat4,
    /// Anything else (arrays, nested structs, non-square matrices). Only raw
    /// byte writes of the exact size are accepted.
    Other,
}

impl UniformType {
    /// std140 size in bytes, when fixed by the type alone.
    pub fn std140_size(self) -> Option<u32> {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt | UniformType::Bool => Some(4),
            UniformType::Vec2 => Some(8),
            UniformType::Vec3 => Some(12),
            UniformType::Vec4 => Some(16),
            UniformType::Mat3 => Some(48),
            UniformType::Mat4 => Some(64),
            UniformType::Other => None,
        }
    }
}

/// One member of a uniform block. This is what a "uniform location" resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformInfo {
    pub name: String,
    pub block: String,
    /// Binding of the owning block in set 0.
    pub binding: u32,
    pub offset: u32,
    pub size: u32,
    pub ty: UniformType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    pub name: String,
    pub binding: u32,
    /// Total std140 span of the block.
    pub size: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

/// A sampled texture. Its binding doubles as the texture unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    pub name: String,
    pub unit: u32,
    pub kind: TextureKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSlot {
    pub name: String,
    pub binding: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexInput {
    /// Source-level name, when the front end kept it.
    pub name: Option<String>,
    pub location: u32,
    pub components: u32,
}

/// Resources and interface of a linked program.
#[derive(Debug, Clone, Default)]
pub struct ProgramReflection {
    uniforms: Vec<UniformInfo>,
    blocks: Vec<UniformBlock>,
    textures: Vec<TextureSlot>,
    samplers: Vec<SamplerSlot>,
    inputs: Vec<VertexInput>,
}

impl ProgramReflection {
    pub(crate) fn from_stages(vertex: &Module, fragment: &Module) -> Result<Self, String> {
        let mut out = Self::default();
        out.collect_resources(vertex)?;
        out.collect_resources(fragment)?;
        out.inputs = vertex_inputs(vertex)?;

        out.uniforms.sort_by(|a, b| (a.binding, a.offset).cmp(&(b.binding, b.offset)));
        out.blocks.sort_by_key(|b| b.binding);
        out.textures.sort_by_key(|t| t.unit);
        out.samplers.sort_by_key(|s| s.binding);
        Ok(out)
    }

    /// Looks up a block member by name.
    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn uniforms(&self) -> &[UniformInfo] {
        &self.uniforms
    }

    pub fn blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    pub fn texture(&self, name: &str) -> Option<&TextureSlot> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn texture_at(&self, unit: u32) -> Option<&TextureSlot> {
        self.textures.iter().find(|t| t.unit == unit)
    }

    pub fn textures(&self) -> &[TextureSlot] {
        &self.textures
    }

    pub fn samplers(&self) -> &[SamplerSlot] {
        &self.samplers
    }

    pub fn inputs(&self) -> &[VertexInput] {
        &self.inputs
    }

    /// Resolves a vertex attribute name to its input.
    pub fn input(&self, name: &str) -> Option<&VertexInput> {
        self.inputs.iter().find(|i| i.name.as_deref() == Some(name))
    }

    fn occupied(&self, binding: u32) -> Option<&str> {
        if let Some(b) = self.blocks.iter().find(|b| b.binding == binding) {
            return Some(&b.name);
        }
        if let Some(t) = self.textures.iter().find(|t| t.unit == binding) {
            return Some(&t.name);
        }
        self.samplers.iter().find(|s| s.binding == binding).map(|s| s.name.as_str())
    }

    fn collect_resources(&mut self, module: &Module) -> Result<(), String> {
        for (_, var) in module.global_variables.iter() {
            let Some(rb) = var.binding.as_ref() else { continue };
            if rb.group != 0 {
                return Err(format!(
                    "resource `{}` uses set {}; only set 0 is supported",
                    var.name.as_deref().unwrap_or("<unnamed>"),
                    rb.group
                ));
            }

            let ty = &module.types[var.ty];
            let var_name = var.name.clone();

            match (&var.space, &ty.inner) {
                (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                    let block_name = ty
                        .name
                        .clone()
                        .or(var_name)
                        .unwrap_or_else(|| format!("block{}", rb.binding));

                    if let Some(existing) = self.blocks.iter().find(|b| b.binding == rb.binding) {
                        if existing.size != *span || existing.name != block_name {
                            return Err(format!(
                                "binding {} is declared as `{}` and `{}` in different stages",
                                rb.binding, existing.name, block_name
                            ));
                        }
                        continue;
                    }
                    if let Some(other) = self.occupied(rb.binding) {
                        return Err(format!("binding {} is shared by `{}` and `{}`", rb.binding, other, block_name));
                    }

                    for (i, member) in members.iter().enumerate() {
                        let Some(name) = member.name.clone() else { continue };
                        let uty = uniform_type(&module.types[member.ty].inner);
                        let next = members.get(i + 1).map(|m| m.offset).unwrap_or(*span);
                        let size = uty.std140_size().unwrap_or(next - member.offset);
                        self.uniforms.push(UniformInfo {
                            name,
                            block: block_name.clone(),
                            binding: rb.binding,
                            offset: member.offset,
                            size,
                            ty: uty,
                        });
                    }
                    self.blocks.push(UniformBlock { name: block_name, binding: rb.binding, size: *span });
                }

                (AddressSpace::Handle, TypeInner::Image { dim, arrayed, .. }) => {
                    let name = var_name.unwrap_or_else(|| format!("texture{}", rb.binding));
                    if self.textures.iter().any(|t| t.unit == rb.binding && t.name == name) {
                        continue;
                    }
                    if let Some(other) = self.occupied(rb.binding) {
                        return Err(format!("binding {} is shared by `{}` and `{}`", rb.binding, other, name));
                    }
                    let kind = match (*dim, *arrayed) {
                        (ImageDimension::D2, false) => TextureKind::D2,
                        (ImageDimension::Cube, false) => TextureKind::Cube,
                        _ => return Err(format!("texture `{name}` has an unsupported dimension")),
                    };
                    self.textures.push(TextureSlot { name, unit: rb.binding, kind });
                }

                (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => {
                    let name = var_name.unwrap_or_else(|| format!("sampler{}", rb.binding));
                    if self.samplers.iter().any(|s| s.binding == rb.binding && s.name == name) {
                        continue;
                    }
                    if let Some(other) = self.occupied(rb.binding) {
                        return Err(format!("binding {} is shared by `{}` and `{}`", rb.binding, other, name));
                    }
                    self.samplers.push(SamplerSlot { name, binding: rb.binding });
                }

                _ => {
                    return Err(format!(
                        "resource `{}` has an unsupported kind",
                        var.name.as_deref().unwrap_or("<unnamed>")
                    ));
                }
            }
        }
        Ok(())
    }
}

fn uniform_type(inner: &TypeInner) -> UniformType {
    match *inner {
        TypeInner::Scalar(s) => match (s.kind, s.width) {
            (ScalarKind::Float, 4) => UniformType::Float,
            (ScalarKind::Sint, 4) => UniformType::Int,
            (ScalarKind::Uint, 4) => UniformType::UInt,
            (ScalarKind::Bool, _) => UniformType::Bool,
            _ => UniformType::Other,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float && scalar.width == 4 => {
            match size as u32 {
                2 => UniformType::Vec2,
                3 => UniformType::Vec3,
                _ => UniformType::Vec4,
            }
        }
        TypeInner::Matrix { columns, rows, scalar } if scalar.width == 4 => match (columns as u32, rows as u32) {
            (3, 3) => UniformType::Mat3,
            (4, 4) => UniformType::Mat4,
            _ => UniformType::Other,
        },
        _ => UniformType::Other,
    }
}

fn entry_point(module: &Module, stage: naga::ShaderStage) -> Option<&naga::EntryPoint> {
    module.entry_points.iter().find(|ep| ep.stage == stage)
}

/// The GLSL front end copies each entry argument into a private global of the
/// same name; recover argument names from those stores.
fn argument_names(module: &Module, ep: &naga::EntryPoint) -> HashMap<u32, String> {
    let func = &ep.function;
    let mut names = HashMap::new();
    for stmt in func.body.iter() {
        let Statement::Store { pointer, value } = stmt else { continue };
        let (Expression::GlobalVariable(global), Expression::FunctionArgument(index)) =
            (&func.expressions[*pointer], &func.expressions[*value])
        else {
            continue;
        };
        if let Some(name) = module.global_variables[*global].name.clone() {
            names.entry(*index).or_insert(name);
        }
    }
    names
}

fn components(inner: &TypeInner) -> Option<(u32, ScalarKind)> {
    match *inner {
        TypeInner::Scalar(s) => Some((1, s.kind)),
        TypeInner::Vector { size, scalar } => Some((size as u32, scalar.kind)),
        _ => None,
    }
}

fn vertex_inputs(module: &Module) -> Result<Vec<VertexInput>, String> {
    let Some(ep) = entry_point(module, naga::ShaderStage::Vertex) else {
        return Err("vertex stage has no entry point".to_string());
    };
    let names = argument_names(module, ep);

    let mut inputs = Vec::new();
    for (index, arg) in ep.function.arguments.iter().enumerate() {
        let Some(Binding::Location { location, .. }) = arg.binding else { continue };
        let name = arg.name.clone().or_else(|| names.get(&(index as u32)).cloned());
        let Some((count, kind)) = components(&module.types[arg.ty].inner) else {
            return Err(format!("vertex input at location {location} is not a scalar or vector"));
        };
        if kind != ScalarKind::Float {
            return Err(format!("vertex input at location {location} is not floating point"));
        }
        inputs.push(VertexInput { name, location, components: count });
    }
    inputs.sort_by_key(|i| i.location);
    Ok(inputs)
}

/// Locations written by the stage's entry point result.
pub(super) fn output_locations(module: &Module, stage: naga::ShaderStage) -> BTreeSet<u32> {
    let mut out = BTreeSet::new();
    let Some(ep) = entry_point(module, stage) else { return out };
    let Some(result) = ep.function.result.as_ref() else { return out };

    if let Some(Binding::Location { location, .. }) = result.binding {
        out.insert(location);
        return out;
    }
    if let TypeInner::Struct { members, .. } = &module.types[result.ty].inner {
        for m in members {
            if let Some(Binding::Location { location, .. }) = m.binding {
                out.insert(location);
            }
        }
    }
    out
}

/// Locations read by the stage's entry point, with names when known.
pub(super) fn input_locations(module: &Module, stage: naga::ShaderStage) -> Vec<(u32, Option<String>)> {
    let Some(ep) = entry_point(module, stage) else { return Vec::new() };
    let names = argument_names(module, ep);
    ep.function
        .arguments
        .iter()
        .enumerate()
        .filter_map(|(index, arg)| match arg.binding {
            Some(Binding::Location { location, .. }) => {
                let name = arg.name.clone().or_else(|| names.get(&(index as u32)).cloned());
                Some((location, name))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::glsl::test_sources::{BASIC_FRAG, BASIC_VERT};
    use super::super::glsl::{compile_stage, link, ShaderStage};
    use super::*;

    fn basic() -> ProgramReflection {
        let vs = compile_stage(ShaderStage::Vertex, "basic", BASIC_VERT).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, "basic", BASIC_FRAG).unwrap();
        link("basic", vs, fs).unwrap().reflection
    }

    #[test]
    fn block_members_carry_std140_offsets() {
        let r = basic();
        let time = r.uniform("u_time").unwrap();
        assert_eq!((time.binding, time.offset, time.size, time.ty), (0, 0, 4, UniformType::Float));

        let res = r.uniform("u_resolution").unwrap();
        assert_eq!((res.offset, res.ty), (8, UniformType::Vec2));

        let color = r.uniform("u_color").unwrap();
        assert_eq!((color.binding, color.block.as_str(), color.ty), (1, "Params", UniformType::Vec4));
        assert_eq!(r.blocks().len(), 2);
        assert!(r.uniform("u_missing").is_none());
    }

    #[test]
    fn textures_samplers_and_inputs_are_listed() {
        let r = basic();
        assert_eq!(
            r.textures(),
            &[TextureSlot { name: "u_texture".into(), unit: 2, kind: TextureKind::D2 }]
        );
        assert_eq!(r.samplers()[0].binding, 3);
        assert_eq!(r.inputs().len(), 2);
        assert_eq!(r.inputs()[0].location, 0);
        assert_eq!(r.inputs()[1].components, 2);
        assert_eq!(r.input("a_TexturePosition").map(|i| i.location), Some(1));
    }

    #[test]
    fn rejects_non_zero_set() {
        let frag = r#"#version 450
layout(location = 0) out vec4 f_color;
layout(set = 1, binding = 0) uniform Extra { vec4 u_tint; };
void main() { f_color = u_tint; }
"#;
        let vs = compile_stage(ShaderStage::Vertex, "p", BASIC_VERT).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, "p", frag).unwrap();
        let err = link("p", vs, fs).unwrap_err();
        assert!(err.log.contains("set 1"));
    }
}
