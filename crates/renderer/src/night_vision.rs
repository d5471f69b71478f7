use std::cell::Cell;
use std::rc::Rc;

use crate::alert::{AlertLevel, AlertNotifier};
use crate::keybind::{Hotkey, KeybindCallback};

/// Number of gain levels including "off".
pub const GAIN_LEVELS: u8 = 4;

/// Brightness gain shared between the desktop and its hot-key callback.
///
/// `Rc<Cell<_>>` keeps the state on the render thread: neither the desktop
/// nor the callback can be sent elsewhere.
#[derive(Debug, Clone, Default)]
pub(crate) struct NightVision {
    gain: Rc<Cell<u8>>,
}

impl NightVision {
    pub(crate) fn gain(&self) -> u8 {
        self.gain.get()
    }

    fn advance(&self) -> u8 {
        let next = (self.gain.get() + 1) % GAIN_LEVELS;
        self.gain.set(next);
        next
    }

    /// Builds the hot-key callback; the only code path that changes the gain.
    pub(crate) fn toggle_handler(&self, alerts: Rc<dyn AlertNotifier>) -> KeybindCallback {
        let state = self.clone();
        Box::new(move |key: Hotkey| {
            let gain = state.advance();
            tracing::debug!(%key, gain, "night vision toggled");
            alerts.post(AlertLevel::Info, gain_message(gain));
        })
    }
}

pub fn gain_message(gain: u8) -> String {
    match gain {
        0 => "Night vision disabled".to_string(),
        1 => "Night vision enabled".to_string(),
        level => format!("Night vision gain level {}", level - 1),
    }
}
