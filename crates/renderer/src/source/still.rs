use std::path::Path;

use anyhow::{Context, Result};
use image::RgbaImage;

use super::FrameSource;

/// Repeats one decoded image as every frame.
#[derive(Debug, Clone)]
pub struct ImageSource {
    canvas: RgbaImage,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let canvas = image::open(path)
            .with_context(|| format!("failed to load image at {}", path.display()))?
            .to_rgba8();
        tracing::debug!(
            path = %path.display(),
            width = canvas.width(),
            height = canvas.height(),
            "loaded still image source"
        );
        Ok(Self { canvas })
    }

    pub fn from_canvas(canvas: RgbaImage) -> Self {
        Self { canvas }
    }
}

impl FrameSource for ImageSource {
    fn name(&self) -> &str {
        "image"
    }

    fn next_canvas(&mut self, _index: u64) -> Result<RgbaImage> {
        Ok(self.canvas.clone())
    }
}
