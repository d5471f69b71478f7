//! Maps the TOML configuration onto the renderer's viewer settings.

use anyhow::{Context, Result};
use renderer::{GpuPowerPreference, Hotkey, PixelFormat, SourceConfig, SourceKind, ViewerConfig};
use viewconfig::{FormatSetting, PowerSetting, SourceKindSetting, ViewConfig};

use crate::cli::RunArgs;

/// Applies command-line overrides on top of the loaded file.
pub fn apply_overrides(config: &mut ViewConfig, args: &RunArgs) {
    if let Some(format) = args.format {
        config.source.format = format;
    }
    if let Some((width, height)) = args.size {
        config.source.width = width;
        config.source.height = height;
    }
    if let Some(fps) = args.fps {
        config.source.fps = fps;
    }
    if let Some(path) = &args.image {
        config.source.kind = SourceKindSetting::Image;
        config.source.path = Some(path.clone());
    }
    if args.no_vsync {
        config.window.vsync = false;
    }
}

pub fn viewer_config(config: &ViewConfig) -> Result<ViewerConfig> {
    let kind = match config.source.kind {
        SourceKindSetting::Pattern => SourceKind::Pattern,
        SourceKindSetting::Image => SourceKind::Image {
            path: config
                .source
                .path
                .clone()
                .context("image source requires a path")?,
        },
    };

    Ok(ViewerConfig {
        title: config.window.title.clone(),
        window_size: (config.window.width, config.window.height),
        vsync: config.window.vsync,
        gpu_power: match config.window.power {
            PowerSetting::Low => GpuPowerPreference::Low,
            PowerSetting::High => GpuPowerPreference::High,
        },
        source: SourceConfig {
            kind,
            format: pixel_format(config.source.format),
            size: (config.source.width, config.source.height),
            fps: config.source.fps,
        },
        night_vision_key: parse_key("keybinds.night_vision", &config.keybinds.night_vision)?,
        cycle_format_key: parse_key("keybinds.cycle_format", &config.keybinds.cycle_format)?,
        alert_timeout: config.alerts.timeout,
    })
}

fn pixel_format(format: FormatSetting) -> PixelFormat {
    match format {
        FormatSetting::Bgra => PixelFormat::Bgra,
        FormatSetting::Rgba => PixelFormat::Rgba,
        FormatSetting::Rgba10 => PixelFormat::Rgba10,
        FormatSetting::Yuv420 => PixelFormat::Yuv420,
    }
}

fn parse_key(field: &str, raw: &str) -> Result<Hotkey> {
    raw.parse::<Hotkey>()
        .with_context(|| format!("invalid {field}"))
}
