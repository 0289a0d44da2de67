use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::{ExtractionBackend, TaskId, send_beacon};
use crate::recovery::{SessionRecoveryMarker, now_ms};
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveOptions {
    pub interval: Duration,
    /// Minimum spacing between two successful pings.
    pub throttle: Duration,
}

impl Default for KeepAliveOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            throttle: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Everything needed to write a recovery marker for the page being read.
#[derive(Clone)]
struct MarkerWriter {
    store: Arc<dyn KeyValueStore>,
    page: watch::Receiver<usize>,
    location: String,
}

impl MarkerWriter {
    fn write(&self) {
        let page = *self.page.borrow();
        SessionRecoveryMarker::new(page, &self.location, now_ms()).save(self.store.as_ref());
    }
}

/// Liveness pings for one extraction task.
///
/// Dropping the handle is a teardown: the loop stops, a final marker is written and a
/// cleanup beacon is fired without waiting for it.
pub struct KeepAliveHandle {
    task_id: TaskId,
    token: CancellationToken,
    wake: mpsc::UnboundedSender<()>,
    backend: Arc<dyn ExtractionBackend>,
    marker: MarkerWriter,
}

impl KeepAliveHandle {
    pub fn visibility_changed(&self, visibility: Visibility) {
        match visibility {
            Visibility::Visible => {
                tracing::debug!(task_id = %self.task_id, "page visible, pinging");
                let _ = self.wake.send(());
            }
            Visibility::Hidden => self.marker.write(),
        }
    }

    /// The page is going away; must not block.
    pub fn unload(&self) {
        tracing::debug!(task_id = %self.task_id, "page unloading, sending cleanup signal");
        self.marker.write();
        send_beacon(Arc::clone(&self.backend), &self.task_id);
    }
}

impl Drop for KeepAliveHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.marker.write();
        tracing::debug!(task_id = %self.task_id, "keep-alive stopped, sending cleanup signal");
        send_beacon(Arc::clone(&self.backend), &self.task_id);
    }
}

pub fn start(
    backend: Arc<dyn ExtractionBackend>,
    store: Arc<dyn KeyValueStore>,
    task_id: TaskId,
    page: watch::Receiver<usize>,
    location: &str,
    options: KeepAliveOptions,
    parent: &CancellationToken,
) -> KeepAliveHandle {
    let token = parent.child_token();
    let (wake, wake_rx) = mpsc::unbounded_channel();
    let marker = MarkerWriter {
        store,
        page,
        location: location.to_owned(),
    };

    tokio::spawn(run_keepalive(
        Arc::clone(&backend),
        task_id.clone(),
        marker.clone(),
        options,
        token.clone(),
        wake_rx,
    ));

    KeepAliveHandle {
        task_id,
        token,
        wake,
        backend,
        marker,
    }
}

async fn run_keepalive(
    backend: Arc<dyn ExtractionBackend>,
    task_id: TaskId,
    marker: MarkerWriter,
    options: KeepAliveOptions,
    token: CancellationToken,
    mut wake: mpsc::UnboundedReceiver<()>,
) {
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_ping: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
            Some(()) = wake.recv() => {}
        }

        let now = Instant::now();
        if last_ping.is_some_and(|last| now.duration_since(last) < options.throttle) {
            tracing::debug!(task_id = %task_id, "ping throttled, too recent");
            continue;
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = backend.viewer_alive(&task_id) => result,
        };
        match result {
            Ok(status) => {
                last_ping = Some(now);
                marker.write();
                tracing::info!(task_id = %task_id, status, "keep-alive ping sent");
            }
            Err(err) => {
                tracing::error!(task_id = %task_id, %err, "keep-alive ping failed");
            }
        }
    }
}
