use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::{ExtractionBackend, TaskId, TaskSnapshot, TaskStatus};
use crate::error::ViewerError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

pub const TIMEOUT_MESSAGE: &str = "progress tracking timed out";
pub const TRACKING_FAILED_MESSAGE: &str = "progress tracking failed";
pub const TASK_FAILED_MESSAGE: &str = "task failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Update(TaskSnapshot),
    Done(TaskSnapshot),
    Failed(ViewerError),
    /// Always follows `Done` or `Failed`; nothing is emitted afterwards.
    Cleared,
}

/// Owner of one running polling loop. Dropping the handle cancels the loop.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
}

impl PollHandle {
    /// Aborts the in-flight request; no event is delivered after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Starts polling `task_id` immediately and then every `options.interval`.
///
/// `parent` scopes the loop: cancelling it cancels the poller too.
pub fn spawn_poller<F>(
    backend: Arc<dyn ExtractionBackend>,
    task_id: TaskId,
    options: PollOptions,
    parent: &CancellationToken,
    on_event: F,
) -> PollHandle
where
    F: FnMut(PollEvent) + Send + 'static,
{
    let token = parent.child_token();
    let loop_token = token.clone();
    tokio::spawn(async move {
        run_poller(backend, task_id, options, loop_token, on_event).await;
    });
    PollHandle { token }
}

async fn run_poller<F>(
    backend: Arc<dyn ExtractionBackend>,
    task_id: TaskId,
    options: PollOptions,
    token: CancellationToken,
    mut on_event: F,
) where
    F: FnMut(PollEvent),
{
    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = &mut deadline => {
                tracing::warn!(task_id = %task_id, "polling timed out");
                finish(&token, &mut on_event, ViewerError::Timeout(TIMEOUT_MESSAGE.to_owned()));
                return;
            }
            _ = ticker.tick() => {
                tracing::debug!(task_id = %task_id, "slow progress response superseded");
                continue;
            }
            result = backend.progress(&task_id) => result,
        };

        match outcome {
            Ok(snapshot) => match snapshot.status {
                TaskStatus::Error => {
                    let message = snapshot
                        .error
                        .clone()
                        .unwrap_or_else(|| TASK_FAILED_MESSAGE.to_owned());
                    finish(&token, &mut on_event, ViewerError::Task(message));
                    return;
                }
                TaskStatus::Done => {
                    emit(&token, &mut on_event, PollEvent::Done(snapshot));
                    emit(&token, &mut on_event, PollEvent::Cleared);
                    return;
                }
                TaskStatus::Pending | TaskStatus::Processing => {
                    emit(&token, &mut on_event, PollEvent::Update(snapshot));
                }
            },
            Err(ViewerError::Aborted) => {}
            Err(err) => {
                tracing::warn!(task_id = %task_id, %err, "progress request failed");
                finish(
                    &token,
                    &mut on_event,
                    ViewerError::Network(TRACKING_FAILED_MESSAGE.to_owned()),
                );
                return;
            }
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = &mut deadline => {
                tracing::warn!(task_id = %task_id, "polling timed out");
                finish(&token, &mut on_event, ViewerError::Timeout(TIMEOUT_MESSAGE.to_owned()));
                return;
            }
            _ = ticker.tick() => {}
        }
    }
}

fn emit<F: FnMut(PollEvent)>(token: &CancellationToken, on_event: &mut F, event: PollEvent) {
    if token.is_cancelled() {
        return;
    }
    on_event(event);
}

fn finish<F: FnMut(PollEvent)>(token: &CancellationToken, on_event: &mut F, err: ViewerError) {
    emit(token, on_event, PollEvent::Failed(err));
    emit(token, on_event, PollEvent::Cleared);
}
