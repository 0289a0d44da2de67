use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ViewerError;

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

/// One response of the progress endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub table_content: Option<Vec<u32>>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

impl TaskSnapshot {
    pub fn pending() -> Self {
        Self::with_status(TaskStatus::Pending)
    }

    pub fn processing(progress: u32, message: &str) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.to_owned()),
            ..Self::with_status(TaskStatus::Processing)
        }
    }

    pub fn done(images: Vec<String>) -> Self {
        Self {
            images: Some(images),
            ..Self::with_status(TaskStatus::Done)
        }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            error: Some(error.to_owned()),
            ..Self::with_status(TaskStatus::Error)
        }
    }

    fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            progress: None,
            message: None,
            error: None,
            images: None,
            table_content: None,
            labels: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "taskId")]
    task_id: Option<String>,
    error: Option<String>,
}

/// The asynchronous extraction service and the app's liveness routes.
///
/// Every future is abortable by dropping it.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn submit(&self, link: &str) -> Result<TaskId, ViewerError>;
    async fn progress(&self, task_id: &str) -> Result<TaskSnapshot, ViewerError>;
    async fn viewer_alive(&self, task_id: &str) -> Result<u16, ViewerError>;
    async fn viewer_cleanup(&self, task_id: &str) -> Result<(), ViewerError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    backend_url: String,
    app_url: String,
}

impl HttpBackend {
    pub fn new(backend_url: &str, app_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend_url: backend_url.trim_end_matches('/').to_owned(),
            app_url: app_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn submit_endpoint(&self) -> String {
        format!("{}/from-drive", self.backend_url)
    }

    pub fn progress_endpoint(&self, task_id: &str) -> String {
        format!("{}/progress/{task_id}", self.backend_url)
    }

    pub fn alive_endpoint(&self, task_id: &str) -> String {
        format!("{}/api/proxy/viewer-alive/{task_id}", self.app_url)
    }

    pub fn cleanup_endpoint(&self, task_id: &str) -> String {
        format!("{}/api/proxy/viewer-cleanup/{task_id}", self.app_url)
    }
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    async fn submit(&self, link: &str) -> Result<TaskId, ViewerError> {
        let endpoint = self.submit_endpoint();
        let response = self
            .client
            .post(&endpoint)
            .json(&SubmitRequest { url: link })
            .send()
            .await
            .map_err(|err| ViewerError::Network(format!("POST {endpoint}: {err}")))?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"));
        let raw = response.text().await?;

        if !is_json {
            let preview: String = raw.chars().take(100).collect();
            return Err(ViewerError::Network(format!(
                "response is not valid JSON: {preview}"
            )));
        }

        let body: SubmitResponse = serde_json::from_str(&raw)
            .map_err(|err| ViewerError::Network(format!("parse submit response: {err}")))?;
        if !status.is_success() {
            return Err(ViewerError::Network(
                body.error.unwrap_or_else(|| "unknown error".to_owned()),
            ));
        }
        body.task_id
            .filter(|task_id| !task_id.is_empty())
            .ok_or_else(|| ViewerError::Network("response has no taskId".to_owned()))
    }

    async fn progress(&self, task_id: &str) -> Result<TaskSnapshot, ViewerError> {
        let endpoint = self.progress_endpoint(task_id);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|err| ViewerError::Network(format!("GET {endpoint}: {err}")))?;
        let raw = response.text().await?;
        serde_json::from_str(&raw)
            .map_err(|err| ViewerError::Network(format!("parse progress response: {err}")))
    }

    async fn viewer_alive(&self, task_id: &str) -> Result<u16, ViewerError> {
        let response = self
            .client
            .post(self.alive_endpoint(task_id))
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    async fn viewer_cleanup(&self, task_id: &str) -> Result<(), ViewerError> {
        let response = self
            .client
            .post(self.cleanup_endpoint(task_id))
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::debug!(task_id, status = %response.status(), "cleanup not acknowledged");
        }
        Ok(())
    }
}

/// Loads one page image so that later displays hit a warm cache.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, src: &str) -> Result<(), ViewerError>;
}

/// Fetches images over HTTP, resolving root-relative paths against the app origin.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
    app_url: String,
}

impl HttpImageLoader {
    pub fn new(app_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            app_url: app_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn resolve(&self, src: &str) -> Result<Url, ViewerError> {
        if let Ok(url) = Url::parse(src) {
            return Ok(url);
        }
        let base = Url::parse(&format!("{}/", self.app_url))
            .map_err(|err| ViewerError::ImageLoad(format!("invalid app url: {err}")))?;
        base.join(src)
            .map_err(|err| ViewerError::ImageLoad(format!("invalid image url {src}: {err}")))
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, src: &str) -> Result<(), ViewerError> {
        let url = self.resolve(src)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ViewerError::ImageLoad(format!("GET {url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ViewerError::ImageLoad(format!("GET {url}: {status}")));
        }
        response
            .bytes()
            .await
            .map_err(|err| ViewerError::ImageLoad(format!("read {url}: {err}")))?;
        Ok(())
    }
}

/// Fires a cleanup signal without waiting for it.
///
/// Falls back to logging when no runtime is available (for example during process exit).
pub fn send_beacon(backend: Arc<dyn ExtractionBackend>, task_id: &str) {
    let task_id = task_id.to_owned();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(err) = backend.viewer_cleanup(&task_id).await {
                    tracing::debug!(task_id = %task_id, %err, "cleanup beacon failed");
                }
            });
        }
        Err(_) => {
            tracing::debug!(task_id = %task_id, "no runtime for cleanup beacon, skipping");
        }
    }
}
