//! wgpu implementation of the desktop collaborators.
//!
//! - `context` owns the instance, surface, and device for the viewer window.
//! - `texture` stores a frame as one packed plane or three YUV planes and
//!   publishes the bind group the model samples from.
//! - `shader` compiles the embedded GLSL through naga, reflects the uniform
//!   block, and keeps a CPU copy of it per program.
//! - `model` owns the unit quad and records draws.
//!
//! Nothing is drawn immediately. `use_program` and `Model::render` append to a
//! per-frame command list that [`WgpuBackend::encode_frame`] turns into render
//! passes, uploading each draw's uniform snapshot through a staging copy.

mod context;
mod model;
mod shader;
mod texture;

use std::cell::RefCell;
use std::rc::Rc;

use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::backend::Backend;
use crate::error::ResourceError;

pub(crate) use context::GpuContext;
pub(crate) use model::WgpuModel;
pub(crate) use shader::{WgpuShader, UNIFORM_BLOCK_SIZE};
pub(crate) use texture::WgpuTexture;

pub(crate) type UniformBlock = [u8; UNIFORM_BLOCK_SIZE];

/// Layouts and fallback resources shared by every object of one backend.
pub(crate) struct Layouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub plane_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub sampler: wgpu::Sampler,
    pub placeholder_view: wgpu::TextureView,
}

impl Layouts {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("desktop uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let mut plane_entries = Vec::with_capacity(4);
        for binding in 0..3 {
            plane_entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        plane_entries.push(wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let plane_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("desktop plane layout"),
            entries: &plane_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("desktop pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &plane_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("desktop sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let placeholder = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("desktop placeholder plane"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &[0, 0, 0, 255],
        );
        let placeholder_view = placeholder.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            uniform_layout,
            plane_layout,
            pipeline_layout,
            sampler,
            placeholder_view,
        }
    }

    /// Bind group sampling `planes`, padded with the placeholder up to three.
    pub(crate) fn plane_bind_group(
        &self,
        device: &wgpu::Device,
        planes: &[&wgpu::TextureView],
    ) -> wgpu::BindGroup {
        let view = |index: usize| planes.get(index).copied().unwrap_or(&self.placeholder_view);
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("desktop plane bind group"),
            layout: &self.plane_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view(0)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view(1)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view(2)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

/// Program selected by the last `use_program`.
pub(crate) struct BoundProgram {
    pub pipeline: wgpu::RenderPipeline,
    pub uniforms: Rc<RefCell<UniformBlock>>,
}

pub(crate) struct DrawCommand {
    pub pipeline: wgpu::RenderPipeline,
    pub uniforms: UniformBlock,
    pub vertex_buffer: wgpu::Buffer,
    pub vertex_count: u32,
    pub planes: wgpu::BindGroup,
}

#[derive(Default)]
pub(crate) struct FrameCommands {
    pub bound: Option<BoundProgram>,
    pub draws: Vec<DrawCommand>,
}

pub(crate) type SharedCommands = Rc<RefCell<FrameCommands>>;

/// Creates desktop resources on one device and replays their draws.
pub(crate) struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    layouts: Rc<Layouts>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    commands: SharedCommands,
}

impl WgpuBackend {
    pub(crate) fn new(context: &GpuContext) -> Self {
        let device = context.device.clone();
        let queue = context.queue.clone();
        let layouts = Rc::new(Layouts::new(&device, &queue));

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("desktop uniform buffer"),
            size: UNIFORM_BLOCK_SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("desktop uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            target_format: context.surface_format,
            layouts,
            uniform_buffer,
            uniform_bind_group,
            commands: SharedCommands::default(),
        }
    }

    /// Encodes every draw recorded since the last call into `view`.
    ///
    /// The first pass clears to black so an empty frame still presents a
    /// defined image.
    pub(crate) fn encode_frame(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let draws = {
            let mut commands = self.commands.borrow_mut();
            commands.bound = None;
            std::mem::take(&mut commands.draws)
        };

        let mut load = wgpu::LoadOp::Clear(wgpu::Color::BLACK);
        if draws.is_empty() {
            let _pass = begin_pass(encoder, view, load);
            return;
        }

        for draw in &draws {
            // Each pass gets its own uniform values through a staging copy.
            let staging = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("desktop uniform staging"),
                    contents: &draw.uniforms,
                    usage: wgpu::BufferUsages::COPY_SRC,
                });
            encoder.copy_buffer_to_buffer(
                &staging,
                0,
                &self.uniform_buffer,
                0,
                UNIFORM_BLOCK_SIZE as u64,
            );

            let mut pass = begin_pass(encoder, view, load);
            pass.set_pipeline(&draw.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, &draw.planes, &[]);
            pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
            pass.draw(0..draw.vertex_count, 0..1);
            load = wgpu::LoadOp::Load;
        }
    }
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("desktop pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    })
}

impl Backend for WgpuBackend {
    type Texture = WgpuTexture;
    type Shader = WgpuShader;
    type Model = WgpuModel;

    fn create_texture(&self) -> Result<WgpuTexture, ResourceError> {
        Ok(WgpuTexture::new(
            self.device.clone(),
            self.queue.clone(),
            self.layouts.clone(),
        ))
    }

    fn create_shader(&self) -> Result<WgpuShader, ResourceError> {
        Ok(WgpuShader::new(
            self.device.clone(),
            self.layouts.clone(),
            self.target_format,
            self.commands.clone(),
        ))
    }

    fn create_model(&self) -> Result<WgpuModel, ResourceError> {
        Ok(WgpuModel::new(
            self.device.clone(),
            self.layouts.clone(),
            self.commands.clone(),
        ))
    }
}

/// Runs `create` inside out-of-memory and validation error scopes.
pub(crate) fn scoped<T>(
    device: &wgpu::Device,
    create: impl FnOnce() -> T,
) -> Result<T, ResourceError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    match out_of_memory.or(validation) {
        None => Ok(value),
        Some(error @ wgpu::Error::OutOfMemory { .. }) => {
            Err(ResourceError::OutOfMemory(error.to_string()))
        }
        Some(error) => Err(ResourceError::Validation(error.to_string())),
    }
}
