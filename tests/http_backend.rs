mod extraction_stub;

use comic_viewer::backend::{
    ExtractionBackend, HttpBackend, HttpImageLoader, ImageLoader, TaskStatus,
};
use comic_viewer::error::ViewerError;
use extraction_stub::{ExtractionStub, ExtractionStubConfig, SubmitBehavior};

fn stub(submit: SubmitBehavior) -> ExtractionStub {
    ExtractionStub::spawn(ExtractionStubConfig {
        submit,
        progress: vec![
            serde_json::json!({ "status": "processing", "progress": 40, "message": "unpacking" }),
            serde_json::json!({
                "status": "done",
                "progress": 100,
                "images": ["https://yanis-mail.fr/cbr/t1/001.jpg"],
                "table_content": [1],
                "labels": ["Issue 1"]
            }),
        ],
    })
}

#[tokio::test]
async fn submit_returns_task_id() {
    let stub = stub(SubmitBehavior::Accept {
        task_id: "t1".to_owned(),
    });
    let backend = HttpBackend::new(&stub.base_url, &stub.base_url);

    let task_id = backend
        .submit("https://drive.example.com/file/abc")
        .await
        .unwrap();
    assert_eq!(task_id, "t1");
    assert_eq!(stub.requests(), vec!["POST /from-drive".to_owned()]);
}

#[tokio::test]
async fn submit_surfaces_backend_error_message() {
    let stub = stub(SubmitBehavior::Reject {
        status: 400,
        error: Some("invalid drive link".to_owned()),
    });
    let backend = HttpBackend::new(&stub.base_url, &stub.base_url);

    let err = backend.submit("not-a-link").await.unwrap_err();
    assert_eq!(err, ViewerError::Network("invalid drive link".to_owned()));
}

#[tokio::test]
async fn submit_without_error_field_is_unknown_error() {
    let stub = stub(SubmitBehavior::Reject {
        status: 500,
        error: None,
    });
    let backend = HttpBackend::new(&stub.base_url, &stub.base_url);

    let err = backend.submit("https://drive.example.com/x").await.unwrap_err();
    assert_eq!(err.to_string(), "unknown error");
}

#[tokio::test]
async fn non_json_submit_response_is_reported_with_preview() {
    let stub = stub(SubmitBehavior::Html);
    let backend = HttpBackend::new(&stub.base_url, &stub.base_url);

    let err = backend.submit("https://drive.example.com/x").await.unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("response is not valid JSON: "), "{message}");
    assert!(message.contains("502 Bad Gateway"), "{message}");
}

#[tokio::test]
async fn progress_walks_through_scripted_snapshots() {
    let stub = stub(SubmitBehavior::Accept {
        task_id: "t1".to_owned(),
    });
    let backend = HttpBackend::new(&stub.base_url, &stub.base_url);

    let first = backend.progress("t1").await.unwrap();
    assert_eq!(first.status, TaskStatus::Processing);
    assert_eq!(first.progress, Some(40));
    assert_eq!(first.message.as_deref(), Some("unpacking"));

    let second = backend.progress("t1").await.unwrap();
    assert_eq!(second.status, TaskStatus::Done);
    assert_eq!(second.table_content, Some(vec![1]));
    assert_eq!(second.images.map(|images| images.len()), Some(1));
}

#[tokio::test]
async fn liveness_routes_hit_the_app() {
    let stub = stub(SubmitBehavior::Accept {
        task_id: "t1".to_owned(),
    });
    let backend = HttpBackend::new("http://127.0.0.1:9", &stub.base_url);

    assert_eq!(backend.viewer_alive("t1").await.unwrap(), 200);
    backend.viewer_cleanup("t1").await.unwrap();
    assert_eq!(
        stub.requests(),
        vec![
            "POST /api/proxy/viewer-alive/t1".to_owned(),
            "POST /api/proxy/viewer-cleanup/t1".to_owned(),
        ]
    );
}

#[tokio::test]
async fn image_loader_fetches_relative_proxy_paths() {
    let stub = stub(SubmitBehavior::Accept {
        task_id: "t1".to_owned(),
    });
    let loader = HttpImageLoader::new(&stub.base_url);

    loader.load("/api/proxy/cbr/t1/001.jpg").await.unwrap();
    let err = loader.load("/missing.jpg").await.unwrap_err();
    assert!(matches!(err, ViewerError::ImageLoad(_)));
}
