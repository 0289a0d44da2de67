use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Question,
    Other,
}

/// Where keyboard focus sits when a key event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Page,
    TextInput,
    TextArea,
}

impl Focus {
    fn is_text_entry(self) -> bool {
        matches!(self, Focus::TextInput | Focus::TextArea)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Set by the platform for auto-repeat while the key is held.
    pub repeat: bool,
    pub focus: Focus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Prev,
    Next,
    ToggleShortcuts,
}

/// Turns raw key events into at most one navigation per physical press.
#[derive(Debug, Default)]
pub struct ArrowNavigator {
    pressed: HashSet<Key>,
    shortcuts_visible: bool,
}

impl ArrowNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, event: KeyEvent) -> Option<NavAction> {
        if event.focus.is_text_entry() || event.repeat {
            return None;
        }
        match event.key {
            Key::ArrowLeft | Key::ArrowRight => {
                if !self.pressed.insert(event.key) {
                    return None;
                }
                Some(if event.key == Key::ArrowLeft {
                    NavAction::Prev
                } else {
                    NavAction::Next
                })
            }
            Key::Question => {
                self.shortcuts_visible = !self.shortcuts_visible;
                Some(NavAction::ToggleShortcuts)
            }
            Key::Other => None,
        }
    }

    pub fn key_up(&mut self, key: Key) {
        self.pressed.remove(&key);
    }

    pub fn shortcuts_visible(&self) -> bool {
        self.shortcuts_visible
    }
}

/// Horizontal extent of the rendered page container, read at click time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerBounds {
    pub left: f64,
    pub width: f64,
}

/// Left half turns back, right half turns forward.
pub fn click_zone(client_x: f64, bounds: ContainerBounds) -> NavAction {
    let x = client_x - bounds.left;
    if x < bounds.width / 2.0 {
        NavAction::Prev
    } else {
        NavAction::Next
    }
}
