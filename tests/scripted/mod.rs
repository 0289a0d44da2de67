use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use comic_viewer::backend::{ExtractionBackend, ImageLoader, TaskId, TaskSnapshot};
use comic_viewer::error::ViewerError;

struct ScriptedTask {
    task_id: TaskId,
    submit_delay: Duration,
    snapshots: VecDeque<TaskSnapshot>,
}

/// In-process extraction service: each submission takes the next scripted task.
#[derive(Default)]
pub struct ScriptedBackend {
    queue: Mutex<VecDeque<ScriptedTask>>,
    progress: Mutex<HashMap<TaskId, VecDeque<TaskSnapshot>>>,
    submitted: Mutex<Vec<String>>,
    progress_calls: AtomicUsize,
    alive_calls: AtomicUsize,
    cleanup_calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots are served in order; the last one repeats.
    pub fn task(self, task_id: &str, snapshots: Vec<TaskSnapshot>) -> Self {
        self.delayed_task(task_id, Duration::ZERO, snapshots)
    }

    pub fn delayed_task(
        self,
        task_id: &str,
        submit_delay: Duration,
        snapshots: Vec<TaskSnapshot>,
    ) -> Self {
        self.queue
            .lock()
            .expect("lock task queue")
            .push_back(ScriptedTask {
                task_id: task_id.to_owned(),
                submit_delay,
                snapshots: snapshots.into(),
            });
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().expect("lock submissions").clone()
    }

    pub fn progress_calls(&self) -> usize {
        self.progress_calls.load(Ordering::SeqCst)
    }

    pub fn alive_calls(&self) -> usize {
        self.alive_calls.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> usize {
        self.cleanup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    async fn submit(&self, link: &str) -> Result<TaskId, ViewerError> {
        self.submitted
            .lock()
            .expect("lock submissions")
            .push(link.to_owned());
        let task = self.queue.lock().expect("lock task queue").pop_front();
        let Some(task) = task else {
            return Err(ViewerError::Network("no scripted task left".to_owned()));
        };
        tokio::time::sleep(task.submit_delay).await;
        self.progress
            .lock()
            .expect("lock progress")
            .insert(task.task_id.clone(), task.snapshots);
        Ok(task.task_id)
    }

    async fn progress(&self, task_id: &str) -> Result<TaskSnapshot, ViewerError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        let mut progress = self.progress.lock().expect("lock progress");
        let Some(snapshots) = progress.get_mut(task_id) else {
            return Ok(TaskSnapshot::pending());
        };
        let next = if snapshots.len() > 1 {
            snapshots.pop_front()
        } else {
            snapshots.front().cloned()
        };
        Ok(next.unwrap_or_else(TaskSnapshot::pending))
    }

    async fn viewer_alive(&self, _task_id: &str) -> Result<u16, ViewerError> {
        self.alive_calls.fetch_add(1, Ordering::SeqCst);
        Ok(200)
    }

    async fn viewer_cleanup(&self, _task_id: &str) -> Result<(), ViewerError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Succeeds for every image and remembers what was asked for.
#[derive(Default)]
pub struct RecordingLoader {
    loaded: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingLoader {
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().expect("lock loaded").clone()
    }
}

#[async_trait]
impl ImageLoader for RecordingLoader {
    async fn load(&self, src: &str) -> Result<(), ViewerError> {
        self.loaded.lock().expect("lock loaded").push(src.to_owned());
        Ok(())
    }
}

#[allow(dead_code)]
pub fn archive_pages(task_id: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|page| format!("https://yanis-mail.fr/api/proxy/cbr/{task_id}/{page:03}.jpg"))
        .collect()
}
