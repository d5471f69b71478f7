use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wgpu::naga::ShaderStage;

use crate::backend::{ShaderProgram, UniformLocation, UniformValue};
use crate::compile::{create_module, parse_stage, reflect_uniforms};
use crate::error::ResourceError;

use super::model::QuadVertex;
use super::{scoped, BoundProgram, Layouts, SharedCommands, UniformBlock};

/// Size of the std140 `DesktopParams` block: a vec4, an int and a float,
/// padded to 16 bytes.
pub(crate) const UNIFORM_BLOCK_SIZE: usize = 32;

/// GLSL program whose uniform slots are byte offsets into `DesktopParams`.
pub(crate) struct WgpuShader {
    device: wgpu::Device,
    layouts: Rc<Layouts>,
    target_format: wgpu::TextureFormat,
    commands: SharedCommands,
    pipeline: Option<wgpu::RenderPipeline>,
    offsets: HashMap<String, u32>,
    uniforms: Rc<RefCell<UniformBlock>>,
}

impl WgpuShader {
    pub(crate) fn new(
        device: wgpu::Device,
        layouts: Rc<Layouts>,
        target_format: wgpu::TextureFormat,
        commands: SharedCommands,
    ) -> Self {
        Self {
            device,
            layouts,
            target_format,
            commands,
            pipeline: None,
            offsets: HashMap::new(),
            uniforms: Rc::new(RefCell::new([0; UNIFORM_BLOCK_SIZE])),
        }
    }

    fn build_pipeline(
        &self,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
    ) -> wgpu::RenderPipeline {
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("desktop pipeline"),
                layout: Some(&self.layouts.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some("main"),
                    buffers: &[QuadVertex::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
    }
}

impl ShaderProgram for WgpuShader {
    fn compile(&mut self, vertex: &str, fragment: &str) -> Result<(), ResourceError> {
        let vertex_ir = parse_stage(vertex, ShaderStage::Vertex)?;
        let fragment_ir = parse_stage(fragment, ShaderStage::Fragment)?;

        let mut offsets = HashMap::new();
        for (name, offset) in reflect_uniforms(&vertex_ir)
            .into_iter()
            .chain(reflect_uniforms(&fragment_ir))
        {
            if offset as usize >= UNIFORM_BLOCK_SIZE {
                return Err(ResourceError::Compile(format!(
                    "uniform `{name}` at offset {offset} lies outside the {UNIFORM_BLOCK_SIZE} byte block"
                )));
            }
            offsets.insert(name, offset);
        }

        let pipeline = scoped(&self.device, || {
            let vertex = create_module(&self.device, "desktop vertex", vertex_ir);
            let fragment = create_module(&self.device, "desktop fragment", fragment_ir);
            self.build_pipeline(&vertex, &fragment)
        })
        .map_err(|err| match err {
            ResourceError::Validation(message) => ResourceError::Compile(message),
            other => other,
        })?;

        tracing::debug!(uniforms = offsets.len(), "compiled desktop shader");
        self.pipeline = Some(pipeline);
        self.offsets = offsets;
        Ok(())
    }

    fn use_program(&mut self) {
        let Some(pipeline) = self.pipeline.as_ref() else {
            tracing::warn!("activating a desktop shader that was never compiled");
            return;
        };
        self.commands.borrow_mut().bound = Some(BoundProgram {
            pipeline: pipeline.clone(),
            uniforms: self.uniforms.clone(),
        });
    }

    fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.offsets.get(name).copied().map(UniformLocation)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let mut block = self.uniforms.borrow_mut();
        write_uniform(&mut block, location, value);
    }
}

fn write_uniform(block: &mut UniformBlock, location: UniformLocation, value: UniformValue) {
    let start = location.0 as usize;
    let bytes: &[u8] = match &value {
        UniformValue::Int(value) => bytemuck::bytes_of(value),
        UniformValue::Float(value) => bytemuck::bytes_of(value),
        UniformValue::Vec4(value) => bytemuck::bytes_of(value),
    };
    match block.get_mut(start..start + bytes.len()) {
        Some(slot) => slot.copy_from_slice(bytes),
        None => tracing::warn!(
            offset = start,
            len = bytes.len(),
            "uniform write outside the desktop block ignored"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_land_at_reflected_offsets() {
        let mut block = [0u8; UNIFORM_BLOCK_SIZE];
        write_uniform(
            &mut block,
            UniformLocation(0),
            UniformValue::Vec4([1.0, 2.0, 3.0, 4.0]),
        );
        write_uniform(&mut block, UniformLocation(16), UniformValue::Int(1));
        write_uniform(&mut block, UniformLocation(20), UniformValue::Float(2.0));

        let floats: Vec<f32> = block[..16]
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(floats, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(block[16..20], 1i32.to_ne_bytes());
        assert_eq!(block[20..24], 2.0f32.to_ne_bytes());
    }

    #[test]
    fn out_of_range_write_is_ignored() {
        let mut block = [0u8; UNIFORM_BLOCK_SIZE];
        write_uniform(
            &mut block,
            UniformLocation(24),
            UniformValue::Vec4([1.0; 4]),
        );
        assert_eq!(block, [0u8; UNIFORM_BLOCK_SIZE]);
    }
}
