use image::{Rgba, RgbaImage};

use super::FrameSource;

const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Colour bars over a luma ramp with a marker that sweeps one pixel per frame.
///
/// Output depends only on the frame index, so any frame can be regenerated.
#[derive(Debug, Clone)]
pub struct PatternSource {
    width: u32,
    height: u32,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl FrameSource for PatternSource {
    fn name(&self) -> &str {
        "pattern"
    }

    fn next_canvas(&mut self, index: u64) -> anyhow::Result<RgbaImage> {
        let (width, height) = (self.width, self.height);
        let bars_height = height * 3 / 4;
        let marker_size = (height / 8).max(1);
        let marker_x = (index % u64::from(width)) as u32;
        let marker_y = bars_height.saturating_sub(marker_size) / 2;

        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let in_marker = x >= marker_x
                && x < marker_x + marker_size
                && y >= marker_y
                && y < marker_y + marker_size;
            if in_marker {
                return Rgba([255, 255, 255, 255]);
            }
            if y < bars_height {
                let bar = (x as usize * BARS.len()) / width as usize;
                let [r, g, b] = BARS[bar];
                Rgba([r, g, b, 255])
            } else {
                let level = (x * 255 / width.saturating_sub(1).max(1)).min(255) as u8;
                Rgba([level, level, level, 255])
            }
        }))
    }
}
