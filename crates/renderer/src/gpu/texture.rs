use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::Texture;
use crate::error::ResourceError;
use crate::types::{PixelFormat, SourceLayout};

use super::{scoped, Layouts};

/// Placement of one plane inside a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneSpec {
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub offset: usize,
}

impl PlaneSpec {
    fn len(&self) -> usize {
        self.bytes_per_row as usize * self.height as usize
    }
}

/// Splits a source layout into GPU planes.
///
/// Packed formats use one plane of `pitch` bytes per row. YUV 4:2:0 is a Y
/// plane of `pitch` bytes per row followed by U and V planes at half
/// resolution (rounded up) and half pitch.
pub(crate) fn plane_specs(layout: &SourceLayout) -> Result<Vec<PlaneSpec>, ResourceError> {
    let SourceLayout {
        format,
        width,
        height,
        pitch,
    } = *layout;
    if width == 0 || height == 0 {
        return Err(ResourceError::Validation(format!(
            "frame size {width}x{height} is empty"
        )));
    }

    let packed = |format| {
        if pitch / 4 < width {
            return Err(ResourceError::InvalidPitch { width, pitch });
        }
        Ok(vec![PlaneSpec {
            format,
            width,
            height,
            bytes_per_row: pitch,
            offset: 0,
        }])
    };

    match format {
        PixelFormat::Bgra => packed(wgpu::TextureFormat::Bgra8Unorm),
        PixelFormat::Rgba => packed(wgpu::TextureFormat::Rgba8Unorm),
        PixelFormat::Rgba10 => packed(wgpu::TextureFormat::Rgb10a2Unorm),
        PixelFormat::Yuv420 => {
            let chroma_width = width.div_ceil(2);
            let chroma_height = height.div_ceil(2);
            let chroma_pitch = pitch / 2;
            if pitch < width || chroma_pitch < chroma_width {
                return Err(ResourceError::InvalidPitch { width, pitch });
            }

            let luma = PlaneSpec {
                format: wgpu::TextureFormat::R8Unorm,
                width,
                height,
                bytes_per_row: pitch,
                offset: 0,
            };
            let u = PlaneSpec {
                format: wgpu::TextureFormat::R8Unorm,
                width: chroma_width,
                height: chroma_height,
                bytes_per_row: chroma_pitch,
                offset: luma.len(),
            };
            let v = PlaneSpec {
                offset: u.offset + u.len(),
                ..u
            };
            Ok(vec![luma, u, v])
        }
    }
}

/// Bytes a frame must hold to cover every plane.
pub(crate) fn required_len(planes: &[PlaneSpec]) -> usize {
    planes
        .iter()
        .map(|plane| plane.offset + plane.len())
        .max()
        .unwrap_or(0)
}

struct Plane {
    spec: PlaneSpec,
    texture: wgpu::Texture,
}

/// Desktop texture backed by one or three wgpu textures.
pub(crate) struct WgpuTexture {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layouts: Rc<Layouts>,
    planes: Vec<Plane>,
    bind_group: Rc<RefCell<Option<wgpu::BindGroup>>>,
}

impl WgpuTexture {
    pub(crate) fn new(device: wgpu::Device, queue: wgpu::Queue, layouts: Rc<Layouts>) -> Self {
        Self {
            device,
            queue,
            layouts,
            planes: Vec::new(),
            bind_group: Rc::new(RefCell::new(None)),
        }
    }

    /// Bind group slot the model samples from; empty until `setup` succeeds.
    pub(crate) fn bind_group_slot(&self) -> Rc<RefCell<Option<wgpu::BindGroup>>> {
        self.bind_group.clone()
    }
}

impl Texture for WgpuTexture {
    fn setup(&mut self, layout: &SourceLayout, streaming: bool) -> Result<(), ResourceError> {
        let specs = plane_specs(layout)?;
        let max = self.device.limits().max_texture_dimension_2d;
        if layout.width > max || layout.height > max {
            return Err(ResourceError::Validation(format!(
                "frame size {}x{} exceeds the GPU limit of {max}",
                layout.width, layout.height
            )));
        }

        let device = &self.device;
        let planes = scoped(device, || {
            specs
                .iter()
                .enumerate()
                .map(|(index, spec)| Plane {
                    spec: *spec,
                    texture: device.create_texture(&wgpu::TextureDescriptor {
                        label: Some(&format!("desktop plane #{index}")),
                        size: wgpu::Extent3d {
                            width: spec.width,
                            height: spec.height,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: spec.format,
                        usage: wgpu::TextureUsages::TEXTURE_BINDING
                            | wgpu::TextureUsages::COPY_DST,
                        view_formats: &[],
                    }),
                })
                .collect::<Vec<_>>()
        })?;

        let views: Vec<wgpu::TextureView> = planes
            .iter()
            .map(|plane| {
                plane
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default())
            })
            .collect();
        let view_refs: Vec<&wgpu::TextureView> = views.iter().collect();
        let bind_group = self.layouts.plane_bind_group(device, &view_refs);

        self.planes = planes;
        *self.bind_group.borrow_mut() = Some(bind_group);
        tracing::debug!(
            format = %layout.format,
            width = layout.width,
            height = layout.height,
            pitch = layout.pitch,
            planes = self.planes.len(),
            streaming,
            "configured desktop texture"
        );
        Ok(())
    }

    fn update(&mut self, data: &[u8]) -> Result<(), ResourceError> {
        if self.planes.is_empty() {
            return Err(ResourceError::NotConfigured);
        }
        let specs: Vec<PlaneSpec> = self.planes.iter().map(|plane| plane.spec).collect();
        let expected = required_len(&specs);
        if data.len() < expected {
            return Err(ResourceError::BufferTooSmall {
                expected,
                actual: data.len(),
            });
        }

        let queue = &self.queue;
        scoped(&self.device, || {
            for plane in &self.planes {
                let spec = plane.spec;
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &plane.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    &data[spec.offset..spec.offset + spec.len()],
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(spec.bytes_per_row),
                        rows_per_image: Some(spec.height),
                    },
                    wgpu::Extent3d {
                        width: spec.width,
                        height: spec.height,
                        depth_or_array_layers: 1,
                    },
                );
            }
        })
    }
}
