//! Renderer crate for relayview, a remote desktop frame viewer.
//!
//! The desktop controller turns a stream of captured frames into a textured
//! quad. Every displayed frame goes through the same sequence:
//!
//! ```text
//!   FrameProducer ──▶ FrameTracker ──▶ DesktopController::prepare_update
//!   (own thread)      (source changed?)        │ format + shader, stash data
//!                                              ▼
//!                                  DesktopController::perform_update
//!                                              │ texture setup, upload
//!                                              ▼
//!                                  DesktopController::render ──▶ wgpu pass
//! ```
//!
//! The controller only sees the collaborator traits in [`backend`], so the
//! wgpu implementation in `gpu` can be swapped for a recording double in
//! tests. [`run_viewer`] wires the real backend, a winit window, and a frame
//! producer together.

pub mod alert;
pub mod backend;
mod compile;
pub mod desktop;
pub mod error;
mod gpu;
pub mod keybind;
mod night_vision;
pub mod placement;
pub mod source;
pub mod types;
mod window;

pub use alert::{AlertLevel, AlertNotifier, AlertOverlay};
pub use desktop::{DesktopController, DesktopUniform};
pub use error::{DesktopError, ResourceError};
pub use keybind::{Hotkey, KeybindHandle, KeybindRegistry, Keybinds, ParseHotkeyError};
pub use night_vision::{gain_message, GAIN_LEVELS};
pub use types::{
    FrameBuffer, FrameFormat, FrameType, GpuPowerPreference, PixelFormat, ShaderKind,
    SourceConfig, SourceKind, SourceLayout, ViewerConfig,
};
pub use window::run_viewer;
