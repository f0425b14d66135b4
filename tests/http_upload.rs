use axum::body::Body;
use axum::http::{Request, StatusCode};
use pdf2img::config::Config;
use pdf2img::server::{AppState, ErrorResponse, UploadResponse, router};
use pdf2img::supervisor::{Supervisor, WorkerCommand};
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "pdf2img-test-boundary";

fn app(out: &Path, cfg_edit: impl FnOnce(&mut Config)) -> axum::Router {
    let mut cfg = Config::default();
    cfg.storage.output_dir = out.display().to_string();
    cfg.supervisor.timeout_seconds = 20;
    cfg_edit(&mut cfg);
    let worker =
        WorkerCommand::new(env!("CARGO_BIN_EXE_pdf2img")).args(["worker", "--engine", "mock"]);
    router(
        AppState::new(Supervisor::new(&cfg, worker)),
        cfg.server.max_upload_bytes,
    )
}

fn multipart(parts: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, content) in parts {
        body.extend(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend(b"Content-Type: application/pdf\r\n\r\n");
        body.extend(content.as_bytes());
        body.extend(b"\r\n");
    }
    body.extend(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_returns_one_image_per_page() {
    let tmp = TempDir::new().unwrap();
    let resp = app(tmp.path(), |_| {})
        .oneshot(upload(multipart(&[
            ("media", "a.pdf", "%PDF-1.4\n%mock:pages=2\n"),
            ("media", "b.pdf", "%PDF-1.4\n%mock:pages=1\n"),
        ])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: UploadResponse = json(resp).await;
    assert_eq!(body.message, "PDFs converted");
    assert_eq!(body.images.len(), 3);
    assert!(body.images[0].ends_with("-0-a-page1.png"));
    assert!(body.images[2].ends_with("-1-b-page1.png"));
    for image in &body.images {
        assert!(Path::new(image).exists(), "{image}");
    }
}

#[tokio::test]
async fn inline_mode_returns_data_urls() {
    let tmp = TempDir::new().unwrap();
    let resp = app(tmp.path(), |cfg| cfg.storage.persist_to_disk = false)
        .oneshot(upload(multipart(&[("media", "a.pdf", "%PDF-1.4\n%mock:pages=1\n")])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: UploadResponse = json(resp).await;
    assert_eq!(body.images.len(), 1);
    assert!(body.images[0].starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn no_files_is_a_bad_request() {
    let tmp = TempDir::new().unwrap();
    let resp = app(tmp.path(), |_| {})
        .oneshot(upload(multipart(&[("other", "a.pdf", "%PDF-1.4\n")])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = json(resp).await;
    assert_eq!(body.message, "No files uploaded.");
}

#[tokio::test]
async fn invalid_file_is_a_bad_request() {
    let tmp = TempDir::new().unwrap();
    let resp = app(tmp.path(), |_| {})
        .oneshot(upload(multipart(&[("media", "fake.pdf", "GIF89a")])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = json(resp).await;
    assert_eq!(body.error, "validation_error");
}

#[tokio::test]
async fn render_failure_is_a_server_error() {
    let tmp = TempDir::new().unwrap();
    let resp = app(tmp.path(), |_| {})
        .oneshot(upload(multipart(&[(
            "media",
            "a.pdf",
            "%PDF-1.4\n%mock:pages=1\n%mock:fail\n",
        )])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = json(resp).await;
    assert_eq!(body.error, "render_error");
}

#[tokio::test]
async fn timeout_is_a_server_error() {
    let tmp = TempDir::new().unwrap();
    let resp = app(tmp.path(), |cfg| cfg.supervisor.timeout_seconds = 1)
        .oneshot(upload(multipart(&[("media", "a.pdf", "%PDF-1.4\n%mock:hang\n")])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = json(resp).await;
    assert_eq!(body.error, "timeout");
}

#[tokio::test]
async fn index_and_health() {
    let tmp = TempDir::new().unwrap();
    let resp = app(tmp.path(), |_| {})
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = json(resp).await;
    assert_eq!(body["status"], "healthy");

    let resp = app(tmp.path(), |_| {})
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
