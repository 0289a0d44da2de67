use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::store::{KeyValueStore, Persisted, keys};

pub const DEFAULT_WIDTH: u32 = 60;
pub const DEFAULT_DOUBLE_WIDTH: u32 = 90;
pub const DEFAULT_HEIGHT: u32 = 80;
pub const DEFAULT_LAST_HEIGHT: &str = "80vh";

/// Aspect ratio above which a page is treated as a double-page spread.
pub const DOUBLE_PAGE_RATIO: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub min: u32,
    pub max: u32,
}

impl ZoomBounds {
    pub fn clamp(&self, value: i64) -> u32 {
        value.clamp(i64::from(self.min), i64::from(self.max)) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Small,
    Medium,
    Large,
    Reset,
}

impl Preset {
    /// `(single, double)` width percentages.
    pub fn widths(self) -> (u32, u32) {
        match self {
            Preset::Small => (30, 50),
            Preset::Medium => (50, 70),
            Preset::Large => (100, 100),
            Preset::Reset => (50, 70),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "small" => Some(Preset::Small),
            "medium" => Some(Preset::Medium),
            "large" => Some(Preset::Large),
            "reset" => Some(Preset::Reset),
            _ => None,
        }
    }
}

/// The persisted part of the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutPrefs {
    pub width: u32,
    pub double_width: u32,
    pub height: u32,
}

impl Default for LayoutPrefs {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            double_width: DEFAULT_DOUBLE_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl LayoutPrefs {
    fn fields() -> (Persisted<u32>, Persisted<u32>, Persisted<u32>) {
        (
            Persisted::new(keys::CUSTOM_WIDTH, DEFAULT_WIDTH),
            Persisted::new(keys::CUSTOM_DOUBLE_WIDTH, DEFAULT_DOUBLE_WIDTH),
            Persisted::new(keys::CUSTOM_HEIGHT, DEFAULT_HEIGHT),
        )
    }

    pub fn load(store: &dyn KeyValueStore) -> Self {
        let (width, double_width, height) = Self::fields();
        Self {
            width: width.load(store),
            double_width: double_width.load(store),
            height: height.load(store),
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        let (width, double_width, height) = Self::fields();
        width.save(store, &self.width);
        double_width.save(store, &self.double_width);
        height.save(store, &self.height);
    }
}

/// Wheel input over the page area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelInput {
    pub delta_y: f64,
    /// Ctrl on most platforms, Cmd on macOS.
    pub zoom_modifier: bool,
}

#[derive(Debug, Clone)]
pub struct Layout {
    prefs: LayoutPrefs,
    single_bounds: ZoomBounds,
    double_bounds: ZoomBounds,
    is_double_page: bool,
    last_height: String,
    indicator_until: Option<Instant>,
}

impl Layout {
    pub fn new(prefs: LayoutPrefs, single_bounds: ZoomBounds, double_bounds: ZoomBounds) -> Self {
        Self {
            prefs,
            single_bounds,
            double_bounds,
            is_double_page: false,
            last_height: DEFAULT_LAST_HEIGHT.to_owned(),
            indicator_until: None,
        }
    }

    pub fn prefs(&self) -> LayoutPrefs {
        self.prefs
    }

    pub fn is_double_page(&self) -> bool {
        self.is_double_page
    }

    pub fn last_height(&self) -> &str {
        &self.last_height
    }

    /// Width percentage that applies to the page currently shown.
    pub fn active_width(&self) -> u32 {
        if self.is_double_page {
            self.prefs.double_width
        } else {
            self.prefs.width
        }
    }

    fn active_bounds(&self) -> ZoomBounds {
        if self.is_double_page {
            self.double_bounds
        } else {
            self.single_bounds
        }
    }

    /// Records the natural size and rendered height of a freshly loaded page.
    pub fn observe_image(&mut self, natural_width: u32, natural_height: u32, rendered_height: u32) {
        self.is_double_page = is_double_spread(natural_width, natural_height);
        self.last_height = format!("{rendered_height}px");
    }

    /// Moves the active width by `delta`, clamped to its bounds.
    ///
    /// Returns whether the stored value changed.
    pub fn adjust_width(&mut self, delta: i64) -> bool {
        let bounds = self.active_bounds();
        let current = self.active_width();
        let next = bounds.clamp(i64::from(current) + delta);
        self.set_active_width(next)
    }

    /// Applies a wheel event; only wheel input with the zoom modifier zooms.
    pub fn apply_wheel(&mut self, wheel: WheelInput, step: u32) -> Option<bool> {
        if !wheel.zoom_modifier {
            return None;
        }
        let step = i64::from(step);
        let delta = if wheel.delta_y > 0.0 { -step } else { step };
        Some(self.adjust_width(delta))
    }

    pub fn apply_preset(&mut self, preset: Preset) -> bool {
        let (single, double) = preset.widths();
        let next = LayoutPrefs {
            width: self.single_bounds.clamp(i64::from(single)),
            double_width: self.double_bounds.clamp(i64::from(double)),
            height: self.prefs.height,
        };
        self.replace(next)
    }

    pub fn set_height(&mut self, height: u32) -> bool {
        let next = LayoutPrefs {
            height,
            ..self.prefs
        };
        self.replace(next)
    }

    fn set_active_width(&mut self, value: u32) -> bool {
        let mut next = self.prefs;
        if self.is_double_page {
            next.double_width = value;
        } else {
            next.width = value;
        }
        self.replace(next)
    }

    fn replace(&mut self, next: LayoutPrefs) -> bool {
        if next == self.prefs {
            return false;
        }
        self.prefs = next;
        true
    }

    pub fn show_indicator(&mut self, now: Instant, for_how_long: Duration) -> Instant {
        let until = now + for_how_long;
        self.indicator_until = Some(until);
        until
    }

    pub fn hide_indicator_if_due(&mut self, now: Instant) {
        if matches!(self.indicator_until, Some(until) if until <= now) {
            self.indicator_until = None;
        }
    }

    pub fn indicator_visible(&self) -> bool {
        self.indicator_until.is_some()
    }
}

pub fn is_double_spread(natural_width: u32, natural_height: u32) -> bool {
    if natural_height == 0 {
        return false;
    }
    f64::from(natural_width) / f64::from(natural_height) > DOUBLE_PAGE_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn layout() -> Layout {
        Layout::new(
            LayoutPrefs::default(),
            ZoomBounds { min: 30, max: 100 },
            ZoomBounds { min: 50, max: 100 },
        )
    }

    #[test]
    fn zoom_in_settles_at_max() {
        let mut layout = layout();
        layout.apply_preset(Preset::Large);
        layout.adjust_width(-5);
        assert_eq!(layout.active_width(), 95);

        for _ in 0..5 {
            layout.adjust_width(10);
        }
        assert_eq!(layout.active_width(), 100);
        assert!(!layout.adjust_width(10));
    }

    #[test]
    fn double_page_uses_its_own_floor() {
        let mut layout = layout();
        layout.observe_image(2400, 1600, 900);
        assert!(layout.is_double_page());
        assert_eq!(layout.last_height(), "900px");

        for _ in 0..20 {
            layout.adjust_width(-5);
        }
        assert_eq!(layout.active_width(), 50);
        assert_eq!(layout.prefs().width, DEFAULT_WIDTH);
    }

    #[test]
    fn wheel_without_modifier_is_ignored() {
        let mut layout = layout();
        let plain = WheelInput {
            delta_y: 120.0,
            zoom_modifier: false,
        };
        assert_eq!(layout.apply_wheel(plain, 5), None);

        let zoom_out = WheelInput {
            delta_y: 120.0,
            zoom_modifier: true,
        };
        assert_eq!(layout.apply_wheel(zoom_out, 5), Some(true));
        assert_eq!(layout.active_width(), DEFAULT_WIDTH - 5);
    }

    #[test]
    fn aspect_ratio_threshold() {
        assert!(!is_double_spread(1300, 1000));
        assert!(is_double_spread(1301, 1000));
        assert!(!is_double_spread(1000, 0));
    }

    #[test]
    fn prefs_persist_through_store() {
        let store = MemoryStore::new();
        let prefs = LayoutPrefs {
            width: 45,
            double_width: 80,
            height: 70,
        };
        prefs.save(&store);
        assert_eq!(LayoutPrefs::load(&store), prefs);
    }
}
