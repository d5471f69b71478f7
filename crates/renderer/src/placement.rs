use winit::dpi::PhysicalSize;

/// Clip-space origin and extent of the desktop quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Placement {
    /// Covers the whole surface.
    pub const FULL: Placement = Placement {
        x: -1.0,
        y: -1.0,
        scale_x: 2.0,
        scale_y: 2.0,
    };

    /// Fits a `frame_width`x`frame_height` frame inside `surface`, centred,
    /// keeping its aspect ratio. Bars fill the remaining axis.
    pub fn letterbox(surface: PhysicalSize<u32>, frame_width: u32, frame_height: u32) -> Self {
        if frame_width == 0 || frame_height == 0 {
            return Self::FULL;
        }
        let surface_w = surface.width.max(1) as f32;
        let surface_h = surface.height.max(1) as f32;
        let frame_w = frame_width as f32;
        let frame_h = frame_height as f32;

        let scale = (surface_w / frame_w).min(surface_h / frame_h);
        let scale_x = 2.0 * (frame_w * scale) / surface_w;
        let scale_y = 2.0 * (frame_h * scale) / surface_h;

        Self {
            x: -scale_x * 0.5,
            y: -scale_y * 0.5,
            scale_x,
            scale_y,
        }
    }
}
