//! Encoders from an RGBA8 canvas to the frame layouts the desktop accepts.

use image::RgbaImage;

use crate::types::{FrameBuffer, FrameFormat, PixelFormat};

/// Row pitch in bytes for a frame of `width` pixels.
pub fn pitch_for(format: PixelFormat, width: u32) -> u32 {
    match format {
        PixelFormat::Bgra | PixelFormat::Rgba | PixelFormat::Rgba10 => width * 4,
        PixelFormat::Yuv420 => width + (width & 1),
    }
}

/// Encodes `canvas` into `format`, returning the descriptor and the bytes.
pub fn encode(canvas: &RgbaImage, format: PixelFormat) -> (FrameFormat, FrameBuffer) {
    let (width, height) = canvas.dimensions();
    let pitch = pitch_for(format, width);
    let data = match format {
        PixelFormat::Rgba => canvas.as_raw().clone(),
        PixelFormat::Bgra => encode_bgra(canvas),
        PixelFormat::Rgba10 => encode_rgba10(canvas),
        PixelFormat::Yuv420 => encode_yuv420(canvas, pitch),
    };
    (
        FrameFormat::new(format.into(), width, height, pitch),
        data.into(),
    )
}

fn encode_bgra(canvas: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(canvas.as_raw().len());
    for pixel in canvas.pixels() {
        let [r, g, b, a] = pixel.0;
        out.extend_from_slice(&[b, g, r, a]);
    }
    out
}

/// Packs each pixel as `a:2 b:10 g:10 r:10`, red in the low bits, little
/// endian.
fn encode_rgba10(canvas: &RgbaImage) -> Vec<u8> {
    let widen = |channel: u8| (u32::from(channel) << 2) | (u32::from(channel) >> 6);
    let mut out = Vec::with_capacity(canvas.as_raw().len());
    for pixel in canvas.pixels() {
        let [r, g, b, a] = pixel.0;
        let packed = widen(r) | (widen(g) << 10) | (widen(b) << 20) | ((u32::from(a) >> 6) << 30);
        out.extend_from_slice(&packed.to_le_bytes());
    }
    out
}

/// BT.601 full-range planar 4:2:0. Chroma is averaged over each 2x2 block;
/// blocks cut by an odd edge average the pixels that exist.
fn encode_yuv420(canvas: &RgbaImage, pitch: u32) -> Vec<u8> {
    let (width, height) = canvas.dimensions();
    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);
    let chroma_pitch = (pitch / 2) as usize;
    let pitch = pitch as usize;

    let luma_len = pitch * height as usize;
    let chroma_len = chroma_pitch * chroma_height as usize;
    let mut out = vec![0u8; luma_len + 2 * chroma_len];
    let (luma, chroma) = out.split_at_mut(luma_len);
    let (u_plane, v_plane) = chroma.split_at_mut(chroma_len);

    for (x, y, pixel) in canvas.enumerate_pixels() {
        let [r, g, b, _] = pixel.0.map(f32::from);
        luma[y as usize * pitch + x as usize] = to_byte(0.299 * r + 0.587 * g + 0.114 * b);
    }

    for cy in 0..chroma_height {
        for cx in 0..chroma_width {
            let (mut u_sum, mut v_sum, mut count) = (0.0f32, 0.0f32, 0.0f32);
            for y in (cy * 2)..(cy * 2 + 2).min(height) {
                for x in (cx * 2)..(cx * 2 + 2).min(width) {
                    let [r, g, b, _] = canvas.get_pixel(x, y).0.map(f32::from);
                    u_sum += -0.168_736 * r - 0.331_264 * g + 0.5 * b;
                    v_sum += 0.5 * r - 0.418_688 * g - 0.081_312 * b;
                    count += 1.0;
                }
            }
            let index = cy as usize * chroma_pitch + cx as usize;
            u_plane[index] = to_byte(128.0 + u_sum / count);
            v_plane[index] = to_byte(128.0 + v_sum / count);
        }
    }
    out
}

fn to_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
