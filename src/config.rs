use std::time::Duration;

use crate::layout::ZoomBounds;
use crate::proxy::ProxyRules;

pub const DEFAULT_BACKEND_URL: &str = "https://yanis-mail.fr";
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub backend_url: String,
    pub app_url: String,

    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub extraction_timeout: Duration,

    pub heartbeat_interval: Duration,
    pub heartbeat_throttle: Duration,
    pub session_expiry: Duration,

    pub auto_extract_delay: Duration,
    pub restart_delay: Duration,
    pub redirect_delay: Duration,

    pub image_error_threshold: u32,
    pub image_retry_step: Duration,
    pub image_escalation_delay: Duration,

    pub zoom_indicator: Duration,
    pub zoom_step: u32,
    pub single_bounds: ZoomBounds,
    pub double_bounds: ZoomBounds,
    pub layout_persist_debounce: Duration,

    pub prefetch_capacity: usize,
    pub proxy: ProxyRules,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_owned(),
            app_url: DEFAULT_APP_URL.to_owned(),

            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(60),
            extraction_timeout: Duration::from_secs(5 * 60),

            heartbeat_interval: Duration::from_secs(30),
            heartbeat_throttle: Duration::from_secs(5),
            session_expiry: Duration::from_secs(60),

            auto_extract_delay: Duration::from_millis(300),
            restart_delay: Duration::from_secs(1),
            redirect_delay: Duration::from_secs(2),

            image_error_threshold: 3,
            image_retry_step: Duration::from_secs(1),
            image_escalation_delay: Duration::from_secs(2),

            zoom_indicator: Duration::from_secs(1),
            zoom_step: 5,
            single_bounds: ZoomBounds { min: 30, max: 100 },
            double_bounds: ZoomBounds { min: 50, max: 100 },
            layout_persist_debounce: Duration::from_millis(250),

            prefetch_capacity: 256,
            proxy: ProxyRules::default(),
        }
    }
}

impl ViewerConfig {
    /// Defaults overridden by `COMIC_VIEWER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env_url("COMIC_VIEWER_BACKEND_URL") {
            config.backend_url = url;
        }
        if let Some(url) = env_url("COMIC_VIEWER_APP_URL") {
            config.app_url = url;
        }
        if let Some(ms) = env_millis("COMIC_VIEWER_POLL_INTERVAL_MS") {
            config.poll_interval = ms;
        }
        if let Some(ms) = env_millis("COMIC_VIEWER_POLL_TIMEOUT_MS") {
            config.poll_timeout = ms;
        }
        if let Some(ms) = env_millis("COMIC_VIEWER_EXTRACTION_TIMEOUT_MS") {
            config.extraction_timeout = ms;
        }
        config
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = normalize_base_url(&url.into());
        self
    }

    pub fn with_app_url(mut self, url: impl Into<String>) -> Self {
        self.app_url = normalize_base_url(&url.into());
        self
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn env_url(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let url = normalize_base_url(&raw);
    if url.is_empty() {
        tracing::warn!("{key} is empty, using default");
        return None;
    }
    Some(url)
}

fn env_millis(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    parse_millis(&raw).or_else(|| {
        tracing::warn!("invalid {key}={raw:?}, using default");
        None
    })
}

fn parse_millis(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
