//! The comic viewer session: submit a link, follow the extraction task, then read.
//!
//! [`Viewer`] is a single-owner state machine. Network calls and timers run as spawned
//! tasks that report back through an internal channel; the host drives the machine by
//! awaiting [`Viewer::step`] and calling the user-facing operations in between. Every
//! report is tagged with the extraction attempt that produced it, and reports from a
//! superseded attempt are dropped, so a late response can never change the session.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{ExtractionBackend, ImageLoader, TaskId, TaskSnapshot};
use crate::cache::PrefetchCache;
use crate::config::ViewerConfig;
use crate::debounce::Debounced;
use crate::error::ViewerError;
use crate::keepalive::{self, KeepAliveHandle, KeepAliveOptions, Visibility};
use crate::keys::{ArrowNavigator, ContainerBounds, Key, KeyEvent, NavAction, click_zone};
use crate::layout::{Layout, LayoutPrefs, Preset, WheelInput};
use crate::poll::{PollEvent, PollHandle, PollOptions, spawn_poller};
use crate::recovery::{self, RecoveryDecision, SessionRecoveryMarker};
use crate::session::{
    Extraction, Pages, Phase, Reading, SessionStatus, TableOfContents, TocEntry,
};
use crate::store::{KeyValueStore, Persisted, get_or_log, keys, set_or_log};

pub const DEFAULT_LOCATION: &str = "/comic-viewer";

const EXTRACTION_TOO_LONG: &str = "extraction took too long, try again with a smaller file";
const SESSION_EXPIRED: &str = "session expired, redirecting to the previous page";
const IMAGES_UNAVAILABLE: &str = "please try again";
const NO_IMAGES: &str = "the archive contains no images";
const DONE_MESSAGE: &str = "done";

/// Things the host has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A user-visible error replaced the status area.
    Error(String),
    /// Extraction finished and the reader is open.
    Ready { pages: usize },
    PageChanged { index: usize, url: String },
    /// Reload the page image from `retry_url`.
    RetryImage { src: String, retry_url: String },
    /// Navigate away to `url`.
    Redirect { url: String },
    ZoomIndicator { visible: bool },
}

/// A page image finished loading in the host.
///
/// A zero `natural_height` means the host could not measure the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLoad {
    pub src: String,
    pub natural_width: u32,
    pub natural_height: u32,
    pub rendered_height: u32,
}

#[derive(Debug)]
enum Internal {
    Submitted {
        attempt: u64,
        result: Result<TaskId, ViewerError>,
    },
    Poll {
        attempt: u64,
        event: PollEvent,
    },
    Watchdog {
        attempt: u64,
    },
    AutoExtract {
        attempt: u64,
    },
    Restart {
        attempt: u64,
    },
    RetryImage {
        attempt: u64,
        src: String,
        retry_url: String,
    },
    EscalateImages {
        attempt: u64,
        escalation: u64,
    },
    Prefetched {
        attempt: u64,
        url: String,
        ok: bool,
    },
    Redirect {
        url: String,
    },
    HideIndicator,
    FlushLayout,
}

/// One submit→done lifecycle. Cancelling the token aborts its requests and timers.
#[derive(Debug)]
struct Attempt {
    id: u64,
    token: CancellationToken,
}

/// Plain view of the session for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ViewerSnapshot {
    pub status: SessionStatus,
    pub link: String,
    pub title: String,
    pub progress: u32,
    pub status_message: String,
    pub error: Option<String>,
    pub page_count: usize,
    pub current_index: usize,
    pub current_image: Option<String>,
    pub image_loaded: bool,
    pub toc: Vec<TocEntry>,
    pub current_label: Option<String>,
    pub width: u32,
    pub double_width: u32,
    pub height: u32,
    pub is_double_page: bool,
    pub last_height: String,
    pub zoom_indicator: bool,
    pub session_recovered: bool,
}

pub struct Viewer {
    config: ViewerConfig,
    backend: Arc<dyn ExtractionBackend>,
    store: Arc<dyn KeyValueStore>,
    loader: Arc<dyn ImageLoader>,

    root: CancellationToken,
    attempt: Attempt,
    events_tx: mpsc::UnboundedSender<Internal>,
    events_rx: mpsc::UnboundedReceiver<Internal>,
    notices: mpsc::UnboundedSender<Notice>,

    location: String,
    link: String,
    title: String,
    toc: TableOfContents,
    phase: Phase,
    pending_restore: Option<usize>,
    session_recovered: bool,

    layout: Layout,
    layout_persist: Debounced<LayoutPrefs>,
    navigator: ArrowNavigator,

    prefetched: PrefetchCache,
    image_errors: u32,
    escalation: u64,

    poller: Option<PollHandle>,
    keepalive: Option<KeepAliveHandle>,
    page_tx: watch::Sender<usize>,
    torn_down: bool,
}

fn toc_pages() -> Persisted<Vec<u32>> {
    Persisted::new(keys::TABLE_CONTENTS, Vec::new())
}

fn toc_labels() -> Persisted<Vec<String>> {
    Persisted::new(keys::LABELS, Vec::new())
}

impl Viewer {
    pub fn new(
        config: ViewerConfig,
        backend: Arc<dyn ExtractionBackend>,
        store: Arc<dyn KeyValueStore>,
        loader: Arc<dyn ImageLoader>,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let root = CancellationToken::new();
        let attempt = Attempt {
            id: 0,
            token: root.child_token(),
        };
        let prefs = LayoutPrefs::default();
        let layout = Layout::new(prefs, config.single_bounds, config.double_bounds);
        let layout_persist = Debounced::new(prefs, config.layout_persist_debounce);
        let prefetched = PrefetchCache::new(config.prefetch_capacity);
        let (page_tx, _) = watch::channel(0);

        let viewer = Self {
            config,
            backend,
            store,
            loader,
            root,
            attempt,
            events_tx,
            events_rx,
            notices,
            location: DEFAULT_LOCATION.to_owned(),
            link: String::new(),
            title: String::new(),
            toc: TableOfContents::default(),
            phase: Phase::Idle,
            pending_restore: None,
            session_recovered: false,
            layout,
            layout_persist,
            navigator: ArrowNavigator::new(),
            prefetched,
            image_errors: 0,
            escalation: 0,
            poller: None,
            keepalive: None,
            page_tx,
            torn_down: false,
        };
        (viewer, notices_rx)
    }

    /// Runs the recovery guard, restores persisted state and arms auto-extraction.
    ///
    /// Must be called once, before any submission.
    pub fn mount(&mut self, location: &str) -> RecoveryDecision {
        self.location = location.to_owned();
        let decision = recovery::evaluate(
            self.store.as_ref(),
            recovery::now_ms(),
            location,
            self.config.session_expiry,
        );

        match &decision {
            RecoveryDecision::Redirect { return_url } => {
                self.phase = Phase::Failed {
                    error: SESSION_EXPIRED.to_owned(),
                };
                self.notify(Notice::Error(SESSION_EXPIRED.to_owned()));
                self.schedule(
                    self.config.redirect_delay,
                    self.root.clone(),
                    Internal::Redirect {
                        url: return_url.clone(),
                    },
                );
                return decision;
            }
            RecoveryDecision::Resume { page } => {
                self.pending_restore = Some(*page);
                self.session_recovered = true;
            }
            RecoveryDecision::Fresh => {}
        }

        let store = self.store.as_ref();
        self.link = get_or_log(store, keys::DRIVE_LINK).unwrap_or_default();
        self.title = get_or_log(store, keys::EDITION_TITLE).unwrap_or_default();
        let prefs = LayoutPrefs::load(store);
        self.layout = Layout::new(prefs, self.config.single_bounds, self.config.double_bounds);
        self.layout_persist = Debounced::new(prefs, self.config.layout_persist_debounce);
        self.toc = TableOfContents::new(toc_pages().load(store), toc_labels().load(store));

        if !self.link.is_empty() {
            tracing::info!(link = %self.link, "resuming persisted link");
            self.schedule(
                self.config.auto_extract_delay,
                self.attempt.token.clone(),
                Internal::AutoExtract {
                    attempt: self.attempt.id,
                },
            );
        }
        decision
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_owned();
    }

    /// Persists the link and preferences, then starts a fresh extraction.
    pub fn submit(&mut self, link: &str, title: &str) -> Result<(), ViewerError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(ViewerError::Validation);
        }

        if let Some(page) = recovery::pending_restore(
            self.store.as_ref(),
            recovery::now_ms(),
            self.config.session_expiry,
        ) {
            self.pending_restore = Some(page);
            self.session_recovered = true;
        }

        self.link = link.to_owned();
        self.title = title.to_owned();

        let store = self.store.as_ref();
        set_or_log(store, keys::DRIVE_LINK, &self.link);
        set_or_log(store, keys::EDITION_TITLE, &self.title);
        self.layout.prefs().save(store);
        toc_pages().save(store, &self.toc.pages().to_vec());
        toc_labels().save(store, &self.toc.labels().to_vec());

        self.start_extraction();
        Ok(())
    }

    /// Drops everything derived from the current link and re-submits it shortly after.
    pub fn force_restart(&mut self) {
        tracing::info!(link = %self.link, "forcing extraction restart");
        self.begin_attempt();
        self.phase = Phase::Idle;
        self.prefetched.clear();
        self.pending_restore = None;
        self.image_errors = 0;
        self.schedule(
            self.config.restart_delay,
            self.attempt.token.clone(),
            Internal::Restart {
                attempt: self.attempt.id,
            },
        );
    }

    /// Waits for the next internal report and applies it.
    pub async fn step(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply(event);
        }
    }

    /// Applies a report if one is already queued.
    pub fn try_step(&mut self) -> bool {
        match self.events_rx.try_recv() {
            Ok(event) => {
                self.apply(event);
                true
            }
            Err(_) => false,
        }
    }

    pub fn go_prev(&mut self) -> bool {
        self.move_cursor(Pages::go_prev)
    }

    pub fn go_next(&mut self) -> bool {
        self.move_cursor(Pages::go_next)
    }

    pub fn set_page(&mut self, index: usize) -> bool {
        self.move_cursor(|pages| pages.set(index))
    }

    /// Tap-to-turn: `bounds` must be measured at click time.
    pub fn on_image_click(&mut self, client_x: f64, bounds: ContainerBounds) -> bool {
        match click_zone(client_x, bounds) {
            NavAction::Prev => self.go_prev(),
            _ => self.go_next(),
        }
    }

    pub fn on_key_down(&mut self, event: KeyEvent) -> Option<NavAction> {
        let action = self.navigator.key_down(event)?;
        match action {
            NavAction::Prev => {
                self.go_prev();
            }
            NavAction::Next => {
                self.go_next();
            }
            NavAction::ToggleShortcuts => {}
        }
        Some(action)
    }

    pub fn on_key_up(&mut self, key: Key) {
        self.navigator.key_up(key);
    }

    pub fn on_image_load(&mut self, load: &ImageLoad) {
        if load.natural_height > 0 {
            self.layout
                .observe_image(load.natural_width, load.natural_height, load.rendered_height);
        }
        if let Phase::Ready(reading) = &mut self.phase {
            reading.image_loaded = true;
        }
        self.image_errors = 0;
        self.prefetched.insert(&load.src);
    }

    pub fn on_image_error(&mut self, src: &str) {
        if self.config.proxy.is_error_exempt(src) {
            return;
        }
        tracing::warn!(src, "image load error");

        self.image_errors += 1;
        let count = self.image_errors;
        if count >= self.config.image_error_threshold {
            self.escalation += 1;
            self.schedule(
                self.config.image_escalation_delay,
                self.attempt.token.clone(),
                Internal::EscalateImages {
                    attempt: self.attempt.id,
                    escalation: self.escalation,
                },
            );
        } else if self.config.proxy.is_retryable(src) {
            let retry_url = self.config.proxy.retry_url(src, count);
            self.schedule(
                self.config.image_retry_step * count,
                self.attempt.token.clone(),
                Internal::RetryImage {
                    attempt: self.attempt.id,
                    src: src.to_owned(),
                    retry_url,
                },
            );
        }
    }

    /// Ctrl/Cmd + wheel zoom. Returns whether the wheel was consumed.
    pub fn on_wheel(&mut self, wheel: WheelInput) -> bool {
        let Some(changed) = self.layout.apply_wheel(wheel, self.config.zoom_step) else {
            return false;
        };
        if changed {
            self.layout_changed();
        } else {
            self.show_indicator();
        }
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom_by(i64::from(self.config.zoom_step))
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom_by(-i64::from(self.config.zoom_step))
    }

    pub fn zoom_by(&mut self, delta: i64) -> bool {
        let changed = self.layout.adjust_width(delta);
        if changed {
            self.layout_changed();
        }
        changed
    }

    pub fn apply_preset(&mut self, preset: Preset) -> bool {
        let changed = self.layout.apply_preset(preset);
        if changed {
            self.layout_changed();
        }
        changed
    }

    pub fn set_height(&mut self, height: u32) -> bool {
        let changed = self.layout.set_height(height);
        if changed {
            self.layout_changed();
        }
        changed
    }

    pub fn visibility_changed(&mut self, visibility: Visibility) {
        if let Some(keepalive) = &self.keepalive {
            keepalive.visibility_changed(visibility);
        }
    }

    pub fn unload(&mut self) {
        if let Some(keepalive) = &self.keepalive {
            keepalive.unload();
        }
    }

    /// Aborts every request and timer; nothing is reported afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.root.cancel();
        self.poller = None;
        self.keepalive = None;
        self.layout_persist.set(self.layout.prefs(), Instant::now());
        if let Some(prefs) = self.layout_persist.settle(Instant::now() + self.config.layout_persist_debounce) {
            prefs.save(self.store.as_ref());
        }
        tracing::debug!("viewer torn down");
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn table_of_contents(&self) -> &TableOfContents {
        &self.toc
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn pending_restore(&self) -> Option<usize> {
        self.pending_restore
    }

    pub fn is_prefetched(&self, url: &str) -> bool {
        self.prefetched.contains(url)
    }

    pub fn shortcuts_visible(&self) -> bool {
        self.navigator.shortcuts_visible()
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        let pages = self.phase.pages();
        let page_count = pages.map(Pages::len).unwrap_or(0);
        let current_index = self.phase.current_index();
        let prefs = self.layout.prefs();
        ViewerSnapshot {
            status: self.phase.status(),
            link: self.link.clone(),
            title: self.title.clone(),
            progress: self.phase.progress(),
            status_message: self.phase.status_message().to_owned(),
            error: self.phase.error().map(str::to_owned),
            page_count,
            current_index,
            current_image: pages.map(|pages| pages.current_image().to_owned()),
            image_loaded: matches!(&self.phase, Phase::Ready(reading) if reading.image_loaded),
            toc: self.toc.entries_for(page_count),
            current_label: self.toc.label_for_index(current_index, page_count),
            width: prefs.width,
            double_width: prefs.double_width,
            height: prefs.height,
            is_double_page: self.layout.is_double_page(),
            last_height: self.layout.last_height().to_owned(),
            zoom_indicator: self.layout.indicator_visible(),
            session_recovered: self.session_recovered,
        }
    }

    fn apply(&mut self, event: Internal) {
        if self.torn_down {
            return;
        }
        match event {
            Internal::Submitted { attempt, result } if attempt == self.attempt.id => {
                self.on_submitted(result);
            }
            Internal::Poll { attempt, event } if attempt == self.attempt.id => {
                self.on_poll(event);
            }
            Internal::Watchdog { attempt } if attempt == self.attempt.id => {
                if self.phase.is_loading() {
                    self.extraction_too_long();
                }
            }
            Internal::AutoExtract { attempt } if attempt == self.attempt.id => {
                if !self.link.is_empty() && matches!(self.phase, Phase::Idle) {
                    self.start_extraction();
                }
            }
            Internal::Restart { attempt } if attempt == self.attempt.id => {
                if !self.link.is_empty() {
                    self.start_extraction();
                }
            }
            Internal::RetryImage {
                attempt,
                src,
                retry_url,
            } if attempt == self.attempt.id => {
                tracing::debug!(src = %src, retry_url = %retry_url, "retrying image");
                self.notify(Notice::RetryImage { src, retry_url });
            }
            Internal::EscalateImages {
                attempt,
                escalation,
            } if attempt == self.attempt.id && escalation == self.escalation => {
                self.images_unavailable();
            }
            Internal::Prefetched { attempt, url, ok } if attempt == self.attempt.id => {
                self.on_prefetched(url, ok);
            }
            Internal::Redirect { url } => {
                tracing::info!(url = %url, "redirecting after expired session");
                self.notify(Notice::Redirect { url });
            }
            Internal::HideIndicator => {
                self.layout.hide_indicator_if_due(Instant::now());
                if !self.layout.indicator_visible() {
                    self.notify(Notice::ZoomIndicator { visible: false });
                }
            }
            Internal::FlushLayout => {
                if let Some(prefs) = self.layout_persist.settle(Instant::now()) {
                    prefs.save(self.store.as_ref());
                }
            }
            stale => {
                tracing::debug!(?stale, current = self.attempt.id, "dropping stale report");
            }
        }
    }

    fn begin_attempt(&mut self) {
        self.attempt.token.cancel();
        self.poller = None;
        self.keepalive = None;
        self.attempt = Attempt {
            id: self.attempt.id + 1,
            token: self.root.child_token(),
        };
    }

    fn start_extraction(&mut self) {
        self.begin_attempt();
        self.prefetched.clear();
        self.image_errors = 0;
        self.phase = Phase::Extracting(Extraction {
            task_id: None,
            progress: 0,
            status_message: String::new(),
            started_at: Instant::now(),
        });
        self.page_tx
            .send_replace(self.pending_restore.unwrap_or(0));

        let attempt = self.attempt.id;
        tracing::info!(attempt, link = %self.link, "starting extraction");

        let backend = Arc::clone(&self.backend);
        let link = self.link.clone();
        let token = self.attempt.token.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = backend.submit(&link) => result,
            };
            let _ = tx.send(Internal::Submitted { attempt, result });
        });

        self.schedule(
            self.config.extraction_timeout,
            self.attempt.token.clone(),
            Internal::Watchdog { attempt },
        );
    }

    fn on_submitted(&mut self, result: Result<TaskId, ViewerError>) {
        let task_id = match result {
            Ok(task_id) => task_id,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        let Phase::Extracting(extraction) = &mut self.phase else {
            return;
        };
        tracing::info!(attempt = self.attempt.id, task_id = %task_id, "extraction accepted");
        extraction.task_id = Some(task_id.clone());

        let attempt = self.attempt.id;
        let tx = self.events_tx.clone();
        let options = PollOptions {
            interval: self.config.poll_interval,
            timeout: self.config.poll_timeout,
        };
        self.poller = Some(spawn_poller(
            Arc::clone(&self.backend),
            task_id.clone(),
            options,
            &self.attempt.token,
            move |event| {
                let _ = tx.send(Internal::Poll { attempt, event });
            },
        ));
        self.keepalive = Some(keepalive::start(
            Arc::clone(&self.backend),
            Arc::clone(&self.store),
            task_id,
            self.page_tx.subscribe(),
            &self.location,
            KeepAliveOptions {
                interval: self.config.heartbeat_interval,
                throttle: self.config.heartbeat_throttle,
            },
            &self.attempt.token,
        ));
    }

    fn on_poll(&mut self, event: PollEvent) {
        match event {
            PollEvent::Update(snapshot) => {
                let Phase::Extracting(extraction) = &mut self.phase else {
                    return;
                };
                extraction.progress = snapshot.progress.unwrap_or(0).min(100);
                extraction.status_message = snapshot.message.unwrap_or_default();
                let too_long = extraction.started_at.elapsed() > self.config.extraction_timeout;
                if too_long {
                    self.extraction_too_long();
                }
            }
            PollEvent::Done(snapshot) => self.finish_extraction(snapshot),
            PollEvent::Failed(err) => self.fail(err),
            PollEvent::Cleared => {
                self.poller = None;
            }
        }
    }

    fn finish_extraction(&mut self, snapshot: TaskSnapshot) {
        let Phase::Extracting(extraction) = &self.phase else {
            return;
        };
        let task_id = extraction.task_id.clone().unwrap_or_default();

        let images = self
            .config
            .proxy
            .rewrite_all(&snapshot.images.unwrap_or_default());
        if let Some(pages) = snapshot.table_content {
            let labels = snapshot
                .labels
                .unwrap_or_else(|| self.toc.labels().to_vec());
            self.toc = TableOfContents::new(pages, labels);
        } else if let Some(labels) = snapshot.labels {
            self.toc = TableOfContents::new(self.toc.pages().to_vec(), labels);
        }

        let Some(mut pages) = Pages::new(images) else {
            self.fail(ViewerError::Task(NO_IMAGES.to_owned()));
            return;
        };
        if let Some(page) = self.pending_restore.take() {
            pages.jump_clamped(page);
            self.session_recovered = false;
            SessionRecoveryMarker::clear(self.store.as_ref());
            tracing::info!(page = pages.current(), "restored reading position");
        }

        let page_count = pages.len();
        self.phase = Phase::Ready(Reading {
            task_id,
            pages,
            status_message: snapshot.message.unwrap_or_else(|| DONE_MESSAGE.to_owned()),
            image_loaded: false,
        });
        tracing::info!(attempt = self.attempt.id, pages = page_count, "extraction done");
        self.notify(Notice::Ready { pages: page_count });
        self.on_page_changed();
    }

    fn extraction_too_long(&mut self) {
        tracing::warn!(attempt = self.attempt.id, "extraction watchdog fired");
        self.fail(ViewerError::Timeout(EXTRACTION_TOO_LONG.to_owned()));
    }

    /// Ends the current attempt with a user-visible error.
    fn fail(&mut self, err: ViewerError) {
        if !err.is_user_visible() {
            return;
        }
        tracing::warn!(attempt = self.attempt.id, %err, "extraction failed");
        self.attempt.token.cancel();
        self.poller = None;
        self.keepalive = None;
        let message = err.to_string();
        self.phase = Phase::Failed {
            error: message.clone(),
        };
        self.notify(Notice::Error(message));
    }

    fn images_unavailable(&mut self) {
        self.fail(ViewerError::ImageLoad(IMAGES_UNAVAILABLE.to_owned()));
        if !self.link.is_empty() {
            self.prefetched.clear();
            self.start_extraction();
        }
    }

    fn move_cursor(&mut self, turn: impl FnOnce(&mut Pages) -> bool) -> bool {
        let Phase::Ready(reading) = &mut self.phase else {
            return false;
        };
        let changed = turn(&mut reading.pages);
        if changed {
            self.on_page_changed();
        }
        changed
    }

    fn on_page_changed(&mut self) {
        let Phase::Ready(reading) = &mut self.phase else {
            return;
        };
        let index = reading.pages.current();
        let current = reading.pages.current_image().to_owned();
        reading.image_loaded = self.prefetched.contains(&current);
        self.image_errors = 0;
        self.page_tx.send_replace(index);

        let wanted: Vec<String> = reading
            .pages
            .window()
            .into_iter()
            .filter(|src| !self.prefetched.contains(src) && self.config.proxy.is_prefetchable(src))
            .map(str::to_owned)
            .collect();

        self.notify(Notice::PageChanged {
            index,
            url: current,
        });
        for url in wanted {
            self.prefetch(url);
        }
    }

    fn prefetch(&self, url: String) {
        let loader = Arc::clone(&self.loader);
        let token = self.attempt.token.clone();
        let tx = self.events_tx.clone();
        let attempt = self.attempt.id;
        tokio::spawn(async move {
            let ok = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = loader.load(&url) => match result {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::debug!(url = %url, %err, "prefetch failed");
                        false
                    }
                },
            };
            let _ = tx.send(Internal::Prefetched { attempt, url, ok });
        });
    }

    fn on_prefetched(&mut self, url: String, ok: bool) {
        if !ok {
            if url.contains(&self.config.proxy.archive_fragment) {
                tracing::warn!(url = %url, "failed to prefetch page");
            }
            return;
        }
        self.prefetched.insert(&url);
        if let Phase::Ready(reading) = &mut self.phase
            && reading.pages.current_image() == url
        {
            reading.image_loaded = true;
        }
    }

    fn layout_changed(&mut self) {
        self.show_indicator();
        self.layout_persist.set(self.layout.prefs(), Instant::now());
        self.schedule(
            self.config.layout_persist_debounce,
            self.root.clone(),
            Internal::FlushLayout,
        );
    }

    fn show_indicator(&mut self) {
        self.layout
            .show_indicator(Instant::now(), self.config.zoom_indicator);
        self.notify(Notice::ZoomIndicator { visible: true });
        self.schedule(
            self.config.zoom_indicator,
            self.root.clone(),
            Internal::HideIndicator,
        );
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn schedule(&self, delay: Duration, token: CancellationToken, event: Internal) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
            }
        });
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.teardown();
    }
}
