use std::cell::RefCell;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::Model;

use super::{DrawCommand, Layouts, SharedCommands, WgpuTexture};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Unit quad as a triangle strip. Texture row 0 is the top of the frame, so
/// `v` runs opposite to clip-space `y`.
pub(crate) const UNIT_QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [0.0, 0.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 0.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [0.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

pub(crate) struct WgpuModel {
    device: wgpu::Device,
    layouts: Rc<Layouts>,
    commands: SharedCommands,
    vertices: Option<wgpu::Buffer>,
    vertex_count: u32,
    planes: Option<Rc<RefCell<Option<wgpu::BindGroup>>>>,
}

impl WgpuModel {
    pub(crate) fn new(device: wgpu::Device, layouts: Rc<Layouts>, commands: SharedCommands) -> Self {
        Self {
            device,
            layouts,
            commands,
            vertices: None,
            vertex_count: 0,
            planes: None,
        }
    }
}

impl Model for WgpuModel {
    type Texture = WgpuTexture;

    fn set_default(&mut self) {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("desktop quad"),
                contents: bytemuck::cast_slice(&UNIT_QUAD),
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.vertices = Some(buffer);
        self.vertex_count = UNIT_QUAD.len() as u32;
    }

    fn set_texture(&mut self, texture: &WgpuTexture) {
        self.planes = Some(texture.bind_group_slot());
    }

    fn render(&mut self) {
        let Some(vertex_buffer) = self.vertices.clone() else {
            tracing::warn!("desktop model rendered before its geometry was set");
            return;
        };

        // An unconfigured texture samples the placeholder planes.
        let planes = self
            .planes
            .as_ref()
            .and_then(|slot| slot.borrow().clone())
            .unwrap_or_else(|| self.layouts.plane_bind_group(&self.device, &[]));

        let mut commands = self.commands.borrow_mut();
        let Some(bound) = commands.bound.as_ref() else {
            tracing::warn!("desktop model rendered without an active shader");
            return;
        };
        let draw = DrawCommand {
            pipeline: bound.pipeline.clone(),
            uniforms: *bound.uniforms.borrow(),
            vertex_buffer,
            vertex_count: self.vertex_count,
            planes,
        };
        commands.draws.push(draw);
    }
}
