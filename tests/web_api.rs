mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use resin_host::PrinterController;
use resin_host::communication::SimulatedPrinter;
use resin_host::file_manager::FileManager;
use resin_host::printer::Printer;
use resin_host::web::api::create_router;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Router backed by a simulated board that advances half a job per progress query.
fn app(dir: &Path) -> Router {
    let mut config = common::test_config();
    config.files.directory = dir.to_path_buf();
    config.files.max_file_size = 1024;
    let files = FileManager::new(&config.files);
    let controller = PrinterController::new(&config, Arc::new(SimulatedPrinter::new(50_000)));
    let (printer_tx, printer_rx) = mpsc::channel(16);
    tokio::spawn(Printer::new(controller, files.clone()).run(printer_rx));
    create_router(printer_tx, files, config.files.max_file_size)
}

async fn call(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    call(app, Method::GET, uri, Body::empty()).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    call(app, Method::POST, uri, Body::from(body.to_string())).await
}

async fn upload(app: &Router, name: &str, contents: &'static [u8]) -> (StatusCode, Value) {
    call(app, Method::PUT, &format!("/api/files/{name}"), Body::from(contents)).await
}

#[tokio::test]
async fn status_before_connect_is_unknown() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    let (status, body) = get(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["print_status"]["state"], "UNKNOWN");
    assert!(body["firmware_version"].as_str().unwrap().starts_with("Connection Error"));
}

#[tokio::test]
async fn connect_then_status() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    let (_, body) = post(&app, "/api/connect", json!({})).await;
    assert_eq!(body["success"], true);

    let (_, body) = get(&app, "/api/status").await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["firmware_version"], "V4.13");
    assert_eq!(body["print_status"]["state"], "IDLE");
    assert_eq!(body["selected_file"], "");
    assert_eq!(body["z_position"], 0.0);
}

#[tokio::test]
async fn print_missing_file_fails() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    let (status, body) = post(&app, "/api/print_file", json!({"filename": "ghost.ctb"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "File not found: ghost.ctb");
}

#[tokio::test]
async fn upload_print_and_stop() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    let (status, body) = upload(&app, "part.ctb", b"layers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "part.ctb");

    let (_, body) = post(&app, "/api/print_file", json!({"filename": "part.ctb"})).await;
    assert_eq!(body["success"], true, "{body}");

    let (_, body) = get(&app, "/api/status").await;
    assert_eq!(body["selected_file"], "part.ctb");
    assert_eq!(body["print_status"]["state"], "PRINTING");
    assert_eq!(body["print_status"]["progress_percent"], 50.0);

    let (_, body) = post(&app, "/api/pause", json!({})).await;
    assert_eq!(body["message"], "Print paused");
    let (_, body) = post(&app, "/api/resume", json!({})).await;
    assert_eq!(body["message"], "Print resumed");

    let (_, body) = post(&app, "/api/stop", json!({})).await;
    assert_eq!(body["success"], true);
    let (_, body) = get(&app, "/api/status").await;
    assert_eq!(body["selected_file"], "");
    assert_eq!(body["print_status"]["state"], "IDLE");
    assert_eq!(body["print_status"]["current_byte"], 0);
}

#[tokio::test]
async fn select_file_connects_on_demand() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    upload(&app, "part.pwmx", b"layers").await;
    let (_, body) = post(&app, "/api/select_file", json!({"filename": "part.pwmx"})).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Selected file: part.pwmx");
}

#[tokio::test]
async fn move_and_home() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    post(&app, "/api/connect", json!({})).await;

    let (_, body) = post(&app, "/api/move_z", json!({"distance": 2.5})).await;
    assert_eq!(body["success"], true);
    let (_, body) = get(&app, "/api/status").await;
    assert_eq!(body["z_position"], 2.5);

    let (_, body) = post(&app, "/api/home_z", json!({})).await;
    assert_eq!(body["success"], true);
    let (_, body) = get(&app, "/api/status").await;
    assert_eq!(body["z_position"], 0.0);
}

#[tokio::test]
async fn move_rejects_bad_body() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    let (status, _) = post(&app, "/api/move_z", json!({"distance": "up"})).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn reboot_and_force_reset() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    post(&app, "/api/connect", json!({})).await;

    let (_, body) = post(&app, "/api/reboot", json!({})).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Printer rebooting...");

    let (_, body) = post(&app, "/api/force_reset_printer", json!({})).await;
    assert_eq!(body["success"], true);

    let (_, body) = post(&app, "/api/disconnect", json!({})).await;
    assert_eq!(body["success"], true);
    let (_, body) = get(&app, "/api/status").await;
    assert_eq!(body["connected"], false);
}

#[tokio::test]
async fn file_listing_info_and_delete() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    upload(&app, "a.ctb", b"aaaa").await;
    let (_, body) = upload(&app, "a.ctb", b"bb").await;
    assert_eq!(body["filename"], "a_1.ctb");

    let (_, body) = get(&app, "/api/files").await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = get(&app, "/api/files/a.ctb").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], 4);

    let (status, _) = call(&app, Method::DELETE, "/api/files/a.ctb", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, "/api/files/a.ctb").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::DELETE, "/api/files/a.ctb", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get(&app, "/api/storage").await;
    assert_eq!(body["total_files"], 1);
}

#[tokio::test]
async fn upload_rejections() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    let (status, body) = upload(&app, "notes.txt", b"hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = upload(&app, "huge.ctb", &[7u8; 4096]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn cleanup_keeps_newest() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    for name in ["a.ctb", "b.ctb", "c.ctb"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let (_, body) = post(&app, "/api/files/cleanup", json!({"max_files": 1})).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["deleted"], 2);
}

#[tokio::test]
async fn file_formats_lists_allowed_extensions() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());
    let (_, body) = get(&app, "/api/file_formats").await;
    assert_eq!(body["total_formats"], 8);
    assert_eq!(body["formats"][0]["extension"], ".ctb");
    assert_eq!(body["formats"][0]["name"], "CTB");
}
