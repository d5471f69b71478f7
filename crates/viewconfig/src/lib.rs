//! TOML configuration for the relayview viewer.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [window]
//! title = "relayview"
//! width = 1280
//! height = 720
//! vsync = true
//! power = "high"
//!
//! [source]
//! kind = "pattern"      # or "image" with `path = "..."`
//! format = "bgra"       # bgra | rgba | rgba10 | yuv420
//! width = 1280
//! height = 720
//! fps = 30
//!
//! [keybinds]
//! night_vision = "N"
//! cycle_format = "F"
//!
//! [alerts]
//! timeout = "3s"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Accepted range for `source.fps`.
pub const MIN_FPS: f32 = 0.1;
pub const MAX_FPS: f32 = 240.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    pub window: WindowSection,
    pub source: SourceSection,
    pub keybinds: KeybindSection,
    pub alerts: AlertSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub power: PowerSetting,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: "relayview".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            power: PowerSetting::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKindSetting {
    #[default]
    Pattern,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatSetting {
    #[default]
    Bgra,
    Rgba,
    Rgba10,
    Yuv420,
}

impl FormatSetting {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bgra" => Ok(Self::Bgra),
            "rgba" => Ok(Self::Rgba),
            "rgba10" => Ok(Self::Rgba10),
            "yuv420" | "yuv" => Ok(Self::Yuv420),
            other => Err(ConfigError::Invalid(format!(
                "unknown pixel format '{other}'; expected bgra, rgba, rgba10 or yuv420"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub kind: SourceKindSetting,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub format: FormatSetting,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: SourceKindSetting::Pattern,
            path: None,
            format: FormatSetting::Bgra,
            width: 1280,
            height: 720,
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeybindSection {
    pub night_vision: String,
    pub cycle_format: String,
}

impl Default for KeybindSection {
    fn default() -> Self {
        Self {
            night_vision: "N".to_string(),
            cycle_format: "F".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertSection {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            timeout: default_alert_timeout(),
        }
    }
}

fn default_alert_timeout() -> Duration {
    Duration::from_secs(3)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl ViewConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let window = &self.window;
        if window.width == 0 || window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                window.width, window.height
            )));
        }

        let source = &self.source;
        if source.width == 0 || source.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "source size {}x{} must be non-zero",
                source.width, source.height
            )));
        }
        if !(MIN_FPS..=MAX_FPS).contains(&source.fps) {
            return Err(ConfigError::Invalid(format!(
                "source.fps must be between {MIN_FPS} and {MAX_FPS}, got {}",
                source.fps
            )));
        }
        if source.kind == SourceKindSetting::Image
            && source
                .path
                .as_ref()
                .map_or(true, |path| path.as_os_str().is_empty())
        {
            return Err(ConfigError::Invalid(
                "source.kind = \"image\" requires source.path".into(),
            ));
        }

        validate_key("keybinds.night_vision", &self.keybinds.night_vision)?;
        validate_key("keybinds.cycle_format", &self.keybinds.cycle_format)?;
        if self
            .keybinds
            .night_vision
            .trim()
            .eq_ignore_ascii_case(self.keybinds.cycle_format.trim())
        {
            return Err(ConfigError::Invalid(format!(
                "keybinds.night_vision and keybinds.cycle_format both use '{}'",
                self.keybinds.night_vision.trim()
            )));
        }

        Ok(())
    }
}

fn validate_key(field: &str, raw: &str) -> Result<(), ConfigError> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(key), None) if key.is_ascii_alphanumeric() => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "{field} must be a single letter or digit, got '{raw}'"
        ))),
    }
}

/// Parses a `WIDTHxHEIGHT` size such as `1920x1080`.
pub fn parse_size(raw: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::Invalid(format!("invalid size '{raw}'; expected WIDTHxHEIGHT"));
    let (width, height) = raw
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(invalid)?;
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}
