use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

/// A single-character hot-key, stored upper-cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hotkey(char);

impl Hotkey {
    pub fn new(key: char) -> Self {
        Self(key.to_ascii_uppercase())
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHotkeyError(String);

impl fmt::Display for ParseHotkeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid hot-key '{}': expected a single letter or digit",
            self.0
        )
    }
}

impl std::error::Error for ParseHotkeyError {}

impl FromStr for Hotkey {
    type Err = ParseHotkeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut chars = value.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) if key.is_ascii_alphanumeric() => Ok(Hotkey::new(key)),
            _ => Err(ParseHotkeyError(value.to_string())),
        }
    }
}

pub type KeybindCallback = Box<dyn FnMut(Hotkey)>;

/// Registration that stays active until released or dropped.
#[must_use = "dropping the handle releases the binding"]
pub struct KeybindHandle {
    release: Option<Box<dyn FnOnce()>>,
}

impl KeybindHandle {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Handle that owns no registration.
    pub fn detached() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for KeybindHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for KeybindHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeybindHandle")
            .field("active", &self.release.is_some())
            .finish()
    }
}

pub trait KeybindRegistry {
    fn register(&self, key: Hotkey, callback: KeybindCallback) -> KeybindHandle;
}

struct Binding {
    id: u64,
    key: Hotkey,
    callback: Rc<RefCell<KeybindCallback>>,
}

#[derive(Default)]
struct Bindings {
    next_id: u64,
    entries: Vec<Binding>,
}

/// In-process registry dispatched from the window's keyboard events.
///
/// Cloning yields another handle onto the same table.
#[derive(Clone, Default)]
pub struct Keybinds {
    inner: Rc<RefCell<Bindings>>,
}

impl Keybinds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes every callback bound to `key`; returns how many ran.
    pub fn dispatch(&self, key: Hotkey) -> usize {
        // Collect first so callbacks may register or release bindings.
        let callbacks: Vec<_> = self
            .inner
            .borrow()
            .entries
            .iter()
            .filter(|binding| binding.key == key)
            .map(|binding| binding.callback.clone())
            .collect();
        for callback in &callbacks {
            (callback.borrow_mut())(key);
        }
        callbacks.len()
    }

    pub fn is_bound(&self, key: Hotkey) -> bool {
        self.inner
            .borrow()
            .entries
            .iter()
            .any(|binding| binding.key == key)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeybindRegistry for Keybinds {
    fn register(&self, key: Hotkey, callback: KeybindCallback) -> KeybindHandle {
        let id = {
            let mut bindings = self.inner.borrow_mut();
            let id = bindings.next_id;
            bindings.next_id += 1;
            bindings.entries.push(Binding {
                id,
                key,
                callback: Rc::new(RefCell::new(callback)),
            });
            id
        };
        tracing::debug!(%key, id, "registered keybind");

        let table: Weak<RefCell<Bindings>> = Rc::downgrade(&self.inner);
        KeybindHandle::new(move || {
            if let Some(table) = table.upgrade() {
                table.borrow_mut().entries.retain(|binding| binding.id != id);
                tracing::debug!(%key, id, "released keybind");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn parses_single_alphanumeric_keys() {
        assert_eq!("n".parse::<Hotkey>().unwrap(), Hotkey::new('N'));
        assert_eq!(" 7 ".parse::<Hotkey>().unwrap().as_char(), '7');
        assert!("".parse::<Hotkey>().is_err());
        assert!("NV".parse::<Hotkey>().is_err());
        assert!("-".parse::<Hotkey>().is_err());
    }

    #[test]
    fn dispatch_runs_only_matching_callbacks() {
        let keybinds = Keybinds::new();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let _handle = keybinds.register(
            Hotkey::new('n'),
            Box::new(move |_| counter.set(counter.get() + 1)),
        );

        assert_eq!(keybinds.dispatch(Hotkey::new('N')), 1);
        assert_eq!(keybinds.dispatch(Hotkey::new('F')), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_handle_releases_binding() {
        let keybinds = Keybinds::new();
        let handle = keybinds.register(Hotkey::new('N'), Box::new(|_| {}));
        assert!(keybinds.is_bound(Hotkey::new('N')));
        drop(handle);
        assert!(keybinds.is_empty());
        assert_eq!(keybinds.dispatch(Hotkey::new('N')), 0);
    }

    #[test]
    fn release_after_registry_dropped_is_harmless() {
        let keybinds = Keybinds::new();
        let handle = keybinds.register(Hotkey::new('N'), Box::new(|_| {}));
        drop(keybinds);
        handle.release();
    }
}
