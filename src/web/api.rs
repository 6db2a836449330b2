//! Defines the Axum API routes and handlers.

use crate::file_manager::{FileManager, FileManagerError};
use crate::web::models::{
    ActionResponse, CleanupRequest, CleanupResponse, FileFormat, FileFormatsResponse, FileRequest,
    MoveRequest, UploadResponse,
};
use crate::web::printer_channel::PrinterRequest;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::{mpsc::Sender, oneshot};

pub struct AppStateInner {
    pub printer_tx: Sender<PrinterRequest>,
    pub files: FileManager,
    pub max_upload: usize,
}
pub type AppState = Arc<AppStateInner>;

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(ActionResponse::failed(message))).into_response()
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(printer_tx: Sender<PrinterRequest>, files: FileManager, max_upload: u64) -> Router {
    let max_upload = usize::try_from(max_upload).unwrap_or(usize::MAX);
    create_router_with_state(Arc::new(AppStateInner { printer_tx, files, max_upload }))
}

pub fn create_router_with_state(state: AppState) -> Router {
    let max_upload = state.max_upload;
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/connect", post(connect_handler))
        .route("/api/disconnect", post(disconnect_handler))
        .route("/api/pause", post(pause_handler))
        .route("/api/resume", post(resume_handler))
        .route("/api/stop", post(stop_handler))
        .route("/api/home_z", post(home_handler))
        .route("/api/move_z", post(move_handler))
        .route("/api/reboot", post(reboot_handler))
        .route("/api/select_file", post(select_file_handler))
        .route("/api/print_file", post(print_file_handler))
        .route("/api/force_reset_printer", post(force_reset_handler))
        .route("/api/files", get(list_files))
        .route("/api/files/cleanup", post(cleanup_files))
        .route(
            "/api/files/{name}",
            get(file_info)
                .put(upload_file)
                .delete(delete_file)
                .layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/api/storage", get(storage_stats))
        .route("/api/file_formats", get(file_formats))
        .with_state(state)
}

/// Send a request to the printer task and wait for its reply.
async fn ask<T>(
    state: &AppState,
    build: impl FnOnce(oneshot::Sender<T>) -> PrinterRequest,
) -> Result<T, Response> {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state.printer_tx.send(build(resp_tx)).await.is_err() {
        return Err(json_error("Printer task unavailable", StatusCode::INTERNAL_SERVER_ERROR));
    }
    resp_rx
        .await
        .map_err(|_| json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR))
}

/// Run a printer operation and report its outcome as `{success, message|error}`.
async fn action(
    state: &AppState,
    build: impl FnOnce(oneshot::Sender<crate::controller::Outcome>) -> PrinterRequest,
) -> Response {
    match ask(state, build).await {
        Ok(outcome) => (StatusCode::OK, Json(ActionResponse::from(outcome))).into_response(),
        Err(response) => response,
    }
}

/// Handler to get the current status of the printer.
async fn get_status(State(state): State<AppState>) -> Response {
    match ask(&state, |respond_to| PrinterRequest::GetStatus { respond_to }).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(response) => response,
    }
}

async fn connect_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::Connect { respond_to }).await
}

async fn disconnect_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::Disconnect { respond_to }).await
}

/// Pause the current print job.
async fn pause_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::Pause { respond_to }).await
}

/// Resume a paused print job.
async fn resume_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::Resume { respond_to }).await
}

/// Stop the current print job.
async fn stop_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::Stop { respond_to }).await
}

async fn home_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::HomeZ { respond_to }).await
}

async fn move_handler(State(state): State<AppState>, Json(payload): Json<MoveRequest>) -> Response {
    if !payload.distance.is_finite() {
        return json_error("Distance must be a finite number", StatusCode::BAD_REQUEST);
    }
    action(&state, |respond_to| PrinterRequest::MoveZ {
        distance: payload.distance,
        respond_to,
    })
    .await
}

async fn reboot_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::Reboot { respond_to }).await
}

async fn select_file_handler(
    State(state): State<AppState>,
    Json(payload): Json<FileRequest>,
) -> Response {
    tracing::info!("Attempting to select file: {}", payload.filename);
    action(&state, |respond_to| PrinterRequest::SelectFile {
        filename: payload.filename,
        respond_to,
    })
    .await
}

async fn print_file_handler(
    State(state): State<AppState>,
    Json(payload): Json<FileRequest>,
) -> Response {
    tracing::info!("Attempting to print file: {}", payload.filename);
    action(&state, |respond_to| PrinterRequest::PrintFile {
        filename: payload.filename,
        respond_to,
    })
    .await
}

async fn force_reset_handler(State(state): State<AppState>) -> Response {
    action(&state, |respond_to| PrinterRequest::ForceReset { respond_to }).await
}

fn file_error(e: FileManagerError) -> Response {
    let status = match &e {
        FileManagerError::NotFound(_) => StatusCode::NOT_FOUND,
        FileManagerError::NotAllowed(_)
        | FileManagerError::InvalidName(_)
        | FileManagerError::NotAFile(_) => StatusCode::BAD_REQUEST,
        FileManagerError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        FileManagerError::Io(_)
        | FileManagerError::EmptyAfterWrite(_)
        | FileManagerError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("File operation failed: {}", e);
    }
    json_error(&e.to_string(), status)
}

/// GET /api/files
async fn list_files(State(state): State<AppState>) -> Response {
    match state.files.list_files().await {
        Ok(files) => (StatusCode::OK, Json(files)).into_response(),
        Err(e) => file_error(e),
    }
}

/// GET /api/files/{name}
async fn file_info(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.files.file_info(&name).await {
        Ok(Some(info)) => (StatusCode::OK, Json(info)).into_response(),
        Ok(None) => json_error("File not found", StatusCode::NOT_FOUND),
        Err(e) => file_error(e),
    }
}

/// PUT /api/files/{name} with the raw file as the body.
async fn upload_file(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> Response {
    match state.files.save_file(&name, &body).await {
        Ok(saved) => (
            StatusCode::OK,
            Json(UploadResponse {
                success: true,
                message: format!("File saved: {saved}"),
                filename: saved,
            }),
        )
            .into_response(),
        Err(e) => file_error(e),
    }
}

/// DELETE /api/files/{name}
async fn delete_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.files.delete_file(&name).await {
        Ok(()) => (StatusCode::OK, Json(ActionResponse::ok(format!("File deleted: {name}")))).into_response(),
        Err(e) => file_error(e),
    }
}

/// POST /api/files/cleanup
async fn cleanup_files(State(state): State<AppState>, Json(payload): Json<CleanupRequest>) -> Response {
    match state.files.cleanup_old_files(payload.max_files, payload.max_age_days).await {
        Ok(deleted) => (
            StatusCode::OK,
            Json(CleanupResponse {
                success: true,
                deleted,
                message: format!("Cleanup completed. Deleted {deleted} files."),
            }),
        )
            .into_response(),
        Err(e) => file_error(e),
    }
}

/// GET /api/storage
async fn storage_stats(State(state): State<AppState>) -> Response {
    match state.files.storage_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => file_error(e),
    }
}

/// GET /api/file_formats
async fn file_formats(State(state): State<AppState>) -> Response {
    let formats: Vec<FileFormat> = state
        .files
        .allowed_extensions()
        .iter()
        .map(|ext| FileFormat {
            extension: ext.clone(),
            name: ext.trim_start_matches('.').to_uppercase(),
            description: format!("{} file format", ext.to_uppercase()),
            supported: true,
        })
        .collect();
    let total_formats = formats.len();
    (
        StatusCode::OK,
        Json(FileFormatsResponse { success: true, formats, total_formats }),
    )
        .into_response()
}
