use std::borrow::Cow;

use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::{AddressSpace, Module, ShaderStage, TypeInner};

use crate::error::ResourceError;
use crate::types::ShaderKind;

/// Vertex and fragment sources for one shader family.
pub(crate) fn sources(kind: ShaderKind) -> (&'static str, &'static str) {
    match kind {
        ShaderKind::Generic => (DESKTOP_VERTEX, DESKTOP_RGB_FRAGMENT),
        ShaderKind::Yuv => (DESKTOP_VERTEX, DESKTOP_YUV_FRAGMENT),
    }
}

/// Parses GLSL with naga's frontend so errors surface before wgpu sees the
/// source.
pub(crate) fn parse_stage(source: &str, stage: ShaderStage) -> Result<Module, ResourceError> {
    Frontend::default()
        .parse(&Options::from(stage), source)
        .map_err(|err| ResourceError::Compile(format!("{stage:?} stage: {err:?}")))
}

/// Lists `(member name, byte offset)` for every uniform block member declared
/// by the module.
pub(crate) fn reflect_uniforms(module: &Module) -> Vec<(String, u32)> {
    let mut members = Vec::new();
    for (_, variable) in module.global_variables.iter() {
        if !matches!(variable.space, AddressSpace::Uniform) {
            continue;
        }
        if let TypeInner::Struct {
            members: fields, ..
        } = &module.types[variable.ty].inner
        {
            for field in fields {
                if let Some(name) = &field.name {
                    members.push((name.clone(), field.offset));
                }
            }
        }
    }
    members
}

/// Wraps already parsed IR so wgpu does not run the GLSL frontend again.
pub(crate) fn shader_source(module: Module) -> wgpu::ShaderSource<'static> {
    wgpu::ShaderSource::Naga(Cow::Owned(module))
}

pub(crate) fn create_module(
    device: &wgpu::Device,
    label: &str,
    module: Module,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: shader_source(module),
    })
}

/// Places the unit quad at `position.xy` scaled by `position.zw` in clip space.
///
/// `DesktopParams` must stay within `UNIFORM_BLOCK_SIZE` bytes (see `gpu::shader`).
pub const DESKTOP_VERTEX: &str = r"#version 450
layout(location = 0) in vec2 vertexPosition;
layout(location = 1) in vec2 vertexUV;
layout(location = 0) out vec2 uv;

layout(std140, set = 0, binding = 0) uniform DesktopParams {
    vec4 position;
    int nv;
    float nvGain;
} params;

void main() {
    vec2 pos = params.position.xy + vertexPosition * params.position.zw;
    gl_Position = vec4(pos, 0.0, 1.0);
    uv = vertexUV;
}
";

/// Samples packed RGB-family frames from plane 0.
pub const DESKTOP_RGB_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 color;

layout(std140, set = 0, binding = 0) uniform DesktopParams {
    vec4 position;
    int nv;
    float nvGain;
} params;

layout(set = 1, binding = 0) uniform texture2D plane0;
layout(set = 1, binding = 1) uniform texture2D plane1;
layout(set = 1, binding = 2) uniform texture2D plane2;
layout(set = 1, binding = 3) uniform sampler planeSampler;

void main() {
    color = texture(sampler2D(plane0, planeSampler), uv);
    if (params.nv == 1) {
        float lumi = 1.0 - (0.2126 * color.r + 0.7152 * color.g + 0.0722 * color.b);
        color *= 1.0 + lumi;
        color *= params.nvGain;
    }
    color.a = 1.0;
}
";

/// Converts planar 4:2:0 (Y, U, V planes) to RGB with BT.601 full-range
/// coefficients.
pub const DESKTOP_YUV_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 color;

layout(std140, set = 0, binding = 0) uniform DesktopParams {
    vec4 position;
    int nv;
    float nvGain;
} params;

layout(set = 1, binding = 0) uniform texture2D plane0;
layout(set = 1, binding = 1) uniform texture2D plane1;
layout(set = 1, binding = 2) uniform texture2D plane2;
layout(set = 1, binding = 3) uniform sampler planeSampler;

void main() {
    float y = texture(sampler2D(plane0, planeSampler), uv).r;
    float u = texture(sampler2D(plane1, planeSampler), uv).r - 0.5;
    float v = texture(sampler2D(plane2, planeSampler), uv).r - 0.5;

    color = vec4(
        y + 1.402 * v,
        y - 0.344136 * u - 0.714136 * v,
        y + 1.772 * u,
        1.0
    );
    color.rgb = clamp(color.rgb, 0.0, 1.0);

    if (params.nv == 1) {
        float lumi = 1.0 - (0.2126 * color.r + 0.7152 * color.g + 0.0722 * color.b);
        color.rgb *= 1.0 + lumi;
        color.rgb *= params.nvGain;
    }
}
";
