use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::keybind::Hotkey;

/// Immutable, reference-counted pixel payload for one captured frame.
///
/// The producer hands a buffer to the render thread and never touches it again;
/// the controller keeps a clone only until the texture upload succeeds.
pub type FrameBuffer = Arc<[u8]>;

/// Pixel layout tag carried by an incoming frame descriptor.
///
/// Wire tags outside the known range are preserved in `Unknown` so they can be
/// reported instead of silently mapped onto a supported layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Invalid,
    Bgra,
    Rgba,
    Rgba10,
    Yuv420,
    Unknown(u32),
}

impl FrameType {
    /// Numeric tag used on the wire.
    pub fn tag(self) -> u32 {
        match self {
            FrameType::Invalid => 0,
            FrameType::Bgra => 1,
            FrameType::Rgba => 2,
            FrameType::Rgba10 => 3,
            FrameType::Yuv420 => 4,
            FrameType::Unknown(tag) => tag,
        }
    }
}

impl From<u32> for FrameType {
    fn from(tag: u32) -> Self {
        match tag {
            0 => FrameType::Invalid,
            1 => FrameType::Bgra,
            2 => FrameType::Rgba,
            3 => FrameType::Rgba10,
            4 => FrameType::Yuv420,
            other => FrameType::Unknown(other),
        }
    }
}

impl From<PixelFormat> for FrameType {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Bgra => FrameType::Bgra,
            PixelFormat::Rgba => FrameType::Rgba,
            PixelFormat::Rgba10 => FrameType::Rgba10,
            PixelFormat::Yuv420 => FrameType::Yuv420,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Invalid => f.write_str("invalid"),
            FrameType::Bgra => f.write_str("bgra"),
            FrameType::Rgba => f.write_str("rgba"),
            FrameType::Rgba10 => f.write_str("rgba10"),
            FrameType::Yuv420 => f.write_str("yuv420"),
            FrameType::Unknown(tag) => write!(f, "unknown({tag})"),
        }
    }
}

/// Descriptor of the buffer layout that accompanies every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub frame_type: FrameType,
    pub width: u32,
    pub height: u32,
    /// Bytes per row of the first (or only) plane.
    pub pitch: u32,
}

impl FrameFormat {
    pub fn new(frame_type: FrameType, width: u32, height: u32, pitch: u32) -> Self {
        Self {
            frame_type,
            width,
            height,
            pitch,
        }
    }
}

/// Internal pixel formats the desktop texture can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgra,
    Rgba,
    Rgba10,
    Yuv420,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 4] = [
        PixelFormat::Bgra,
        PixelFormat::Rgba,
        PixelFormat::Rgba10,
        PixelFormat::Yuv420,
    ];

    /// Shader family able to sample this format.
    pub fn shader_kind(self) -> ShaderKind {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba | PixelFormat::Rgba10 => ShaderKind::Generic,
            PixelFormat::Yuv420 => ShaderKind::Yuv,
        }
    }

    /// Next format in `ALL`, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL
            .iter()
            .position(|format| *format == self)
            .unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        FrameType::from(*self).fmt(f)
    }
}

/// The two shader programs the desktop switches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Packed RGB-family formats sampled from a single plane.
    Generic,
    /// Planar 4:2:0 YUV converted to RGB in the fragment stage.
    Yuv,
}

/// Resolved source layout; always replaced as a whole on a source change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
}

/// Adapter power preference forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Where the viewer pulls frames from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Animated test pattern generated in-process.
    Pattern,
    /// Still image decoded once and re-sent every tick.
    Image { path: PathBuf },
}

/// Frame producer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Wire format frames are encoded into before they reach the renderer.
    pub format: PixelFormat,
    /// Canvas size for generated frames; images keep their own dimensions.
    pub size: (u32, u32),
    pub fps: f32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Pattern,
            format: PixelFormat::Bgra,
            size: (1280, 720),
            fps: 30.0,
        }
    }
}

/// Immutable configuration passed to the viewer at start-up.
///
/// `ViewerConfig` mirrors the TOML file plus CLI overrides and tells the viewer
/// how to size its window, where frames come from, and which keys drive the
/// desktop controls.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub title: String,
    /// Initial window size in physical pixels.
    pub window_size: (u32, u32),
    pub vsync: bool,
    pub gpu_power: GpuPowerPreference,
    pub source: SourceConfig,
    pub night_vision_key: Hotkey,
    pub cycle_format_key: Hotkey,
    /// How long an alert stays in the window title.
    pub alert_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "relayview".to_string(),
            window_size: (1280, 720),
            vsync: true,
            gpu_power: GpuPowerPreference::default(),
            source: SourceConfig::default(),
            night_vision_key: Hotkey::new('N'),
            cycle_format_key: Hotkey::new('F'),
            alert_timeout: Duration::from_secs(3),
        }
    }
}
