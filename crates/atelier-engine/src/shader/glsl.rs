use std::fmt;

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

use super::reflect::{self, ProgramReflection};

/// Pipeline stage a diagnostic belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    /// Cross-stage interface check performed after both stages compiled.
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Link => "link",
        };
        f.write_str(s)
    }
}

/// A stage failed to parse, validate or link.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} stage of `{label}` failed:\n{log}")]
pub struct StageError {
    pub stage: ShaderStage,
    pub label: String,
    pub log: String,
}

/// A parsed and validated shader stage.
#[derive(Debug)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub module: naga::Module,
    pub info: ModuleInfo,
}

/// Vertex + fragment stages that passed the interface check, with reflection.
#[derive(Debug)]
pub struct LinkedProgram {
    pub label: String,
    pub vertex: CompiledStage,
    pub fragment: CompiledStage,
    pub reflection: ProgramReflection,
}

/// Parses and validates one GLSL stage.
pub fn compile_stage(stage: ShaderStage, label: &str, source: &str) -> Result<CompiledStage, StageError> {
    let fail = |log: String| StageError { stage, label: label.to_string(), log };

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
        ShaderStage::Link => return Err(fail("link is not a compilable stage".to_string())),
    };

    let options = naga::front::glsl::Options {
        stage: naga_stage,
        defines: naga::FastHashMap::default(),
    };

    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| fail(format!("{errors}")))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|err| fail(format!("validation error: {err}")))?;

    Ok(CompiledStage { stage, module, info })
}

/// Checks the vertex/fragment interface and reflects the program.
///
/// Every fragment input location must be written by a vertex output.
pub fn link(label: &str, vertex: CompiledStage, fragment: CompiledStage) -> Result<LinkedProgram, StageError> {
    let fail = |log: String| StageError { stage: ShaderStage::Link, label: label.to_string(), log };

    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(fail(format!(
            "expected vertex + fragment stages, got {} + {}",
            vertex.stage, fragment.stage
        )));
    }

    let produced = reflect::output_locations(&vertex.module, naga::ShaderStage::Vertex);
    for (location, name) in reflect::input_locations(&fragment.module, naga::ShaderStage::Fragment) {
        if !produced.contains(&location) {
            let name = name.unwrap_or_else(|| "<unnamed>".to_string());
            return Err(fail(format!(
                "fragment input `{name}` (location {location}) is not written by the vertex stage"
            )));
        }
    }

    let reflection = ProgramReflection::from_stages(&vertex.module, &fragment.module).map_err(fail)?;

    Ok(LinkedProgram {
        label: label.to_string(),
        vertex,
        fragment,
        reflection,
    })
}

#[cfg(test)]
pub(crate) mod test_sources {
    pub const BASIC_VERT: &str = r#"#version 450
layout(location = 0) in vec2 a_VertexPosition;
layout(location = 1) in vec2 a_TexturePosition;
layout(location = 0) out vec2 v_uv;

layout(set = 0, binding = 0) uniform Globals {
    float u_time;
    vec2 u_resolution;
};

void main() {
    v_uv = a_TexturePosition;
    gl_Position = vec4(a_VertexPosition * (1.0 + 0.0 * u_time + 0.0 * u_resolution.x), 0.0, 1.0);
}
"#;

    pub const BASIC_FRAG: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 f_color;

layout(set = 0, binding = 1) uniform Params {
    vec4 u_color;
};
layout(set = 0, binding = 2) uniform texture2D u_texture;
layout(set = 0, binding = 3) uniform sampler u_sampler;

void main() {
    f_color = u_color * texture(sampler2D(u_texture, u_sampler), v_uv);
}
"#;
}

#[cfg(test)]
mod tests {
    use super::test_sources::*;
    use super::*;

    #[test]
    fn compiles_and_links_basic_program() {
        let vs = compile_stage(ShaderStage::Vertex, "basic", BASIC_VERT).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, "basic", BASIC_FRAG).unwrap();
        let program = link("basic", vs, fs).unwrap();
        assert_eq!(program.label, "basic");
        assert!(program.reflection.uniform("u_time").is_some());
        assert!(program.reflection.uniform("u_color").is_some());
        assert_eq!(program.reflection.texture("u_texture").map(|t| t.unit), Some(2));
    }

    #[test]
    fn syntax_error_reports_stage() {
        let err = compile_stage(ShaderStage::Fragment, "broken", "#version 450\nvoid main( {").unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert_eq!(err.label, "broken");
        assert!(!err.log.is_empty());
    }

    #[test]
    fn link_rejects_unwritten_fragment_input() {
        let vert = r#"#version 450
layout(location = 0) in vec2 a_VertexPosition;
void main() { gl_Position = vec4(a_VertexPosition, 0.0, 1.0); }
"#;
        let frag = r#"#version 450
layout(location = 3) in vec2 v_missing;
layout(location = 0) out vec4 f_color;
void main() { f_color = vec4(v_missing, 0.0, 1.0); }
"#;
        let vs = compile_stage(ShaderStage::Vertex, "p", vert).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, "p", frag).unwrap();
        let err = link("p", vs, fs).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Link);
        assert!(err.log.contains("location 3"));
    }

    #[test]
    fn link_is_not_a_compilable_stage() {
        assert!(compile_stage(ShaderStage::Link, "x", BASIC_VERT).is_err());
    }
}
