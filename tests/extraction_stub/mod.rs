use std::collections::VecDeque;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

/// How the stub answers `POST /from-drive`.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    Accept { task_id: String },
    Reject { status: u16, error: Option<String> },
    Html,
}

#[derive(Debug, Clone)]
pub struct ExtractionStubConfig {
    pub submit: SubmitBehavior,
    /// Served in order by `GET /progress/{id}`; the last one repeats.
    pub progress: Vec<Value>,
}

/// Extraction service plus the app's proxy routes on one local port.
pub struct ExtractionStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ExtractionStub {
    pub fn spawn(config: ExtractionStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start extraction stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let mut progress: VecDeque<Value> = config.progress.into();
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let method = request.method().to_string();
                let path = request.url().to_string();
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                seen.lock()
                    .expect("lock request log")
                    .push(format!("{method} {path}"));

                let response = match (method.as_str(), path.as_str()) {
                    ("POST", "/from-drive") => submit_response(&config.submit, &body),
                    ("GET", p) if p.starts_with("/progress/") => {
                        let next = if progress.len() > 1 {
                            progress.pop_front()
                        } else {
                            progress.front().cloned()
                        };
                        match next {
                            Some(value) => json(200, &value),
                            None => json(404, &serde_json::json!({ "error": "unknown task" })),
                        }
                    }
                    ("POST", p) if p.starts_with("/api/proxy/viewer-alive/") => {
                        json(200, &serde_json::json!({ "ok": true }))
                    }
                    ("POST", p) if p.starts_with("/api/proxy/viewer-cleanup/") => {
                        json(200, &serde_json::json!({ "ok": true }))
                    }
                    ("GET", p) if p.starts_with("/api/proxy/") => {
                        tiny_http::Response::from_data(vec![0_u8; 16]).with_status_code(200)
                    }
                    _ => tiny_http::Response::from_data(b"not found".to_vec()).with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock request log").clone()
    }
}

impl Drop for ExtractionStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn submit_response(
    behavior: &SubmitBehavior,
    body: &str,
) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    if parsed.get("url").and_then(Value::as_str).is_none() {
        return json(400, &serde_json::json!({ "error": "missing url" }));
    }
    match behavior {
        SubmitBehavior::Accept { task_id } => json(200, &serde_json::json!({ "taskId": task_id })),
        SubmitBehavior::Reject { status, error } => match error {
            Some(error) => json(*status, &serde_json::json!({ "error": error })),
            None => json(*status, &serde_json::json!({})),
        },
        SubmitBehavior::Html => {
            let header = tiny_http::Header::from_bytes("Content-Type", "text/html")
                .expect("content-type header");
            tiny_http::Response::from_data(
                b"<html><body>502 Bad Gateway</body></html>".to_vec(),
            )
            .with_status_code(502)
            .with_header(header)
        }
    }
}

fn json(status: u16, value: &Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes("Content-Type", "application/json")
        .expect("content-type header");
    tiny_http::Response::from_data(value.to_string().into_bytes())
        .with_status_code(status)
        .with_header(header)
}
