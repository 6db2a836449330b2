//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};

use crate::controller::Outcome;
use crate::printer_state::PrintStatus;

/// Represents the response for the /api/status endpoint.
#[derive(Serialize, Debug, Clone)]
pub struct StatusResponse {
    pub connected: bool,
    pub firmware_version: String,
    pub print_status: PrintStatus,
    pub selected_file: String,
    pub z_position: f64,
}

/// `{success, message}` on success, `{success, error}` on failure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, message: None, error: Some(error.into()) }
    }
}

impl From<Outcome> for ActionResponse {
    fn from(outcome: Outcome) -> Self {
        if outcome.success {
            Self::ok(outcome.message)
        } else {
            Self::failed(outcome.message)
        }
    }
}

/// Body of /api/move_z.
#[derive(Deserialize, Debug)]
pub struct MoveRequest {
    #[serde(default)]
    pub distance: f64,
}

/// Body of /api/select_file and /api/print_file.
#[derive(Deserialize, Debug)]
pub struct FileRequest {
    #[serde(default)]
    pub filename: String,
}

/// Body of /api/files/cleanup.
#[derive(Deserialize, Debug)]
pub struct CleanupRequest {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

fn default_max_files() -> usize { 50 }
fn default_max_age_days() -> i64 { 30 }

#[derive(Serialize, Debug)]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted: usize,
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
}

#[derive(Serialize, Debug)]
pub struct FileFormat {
    pub extension: String,
    pub name: String,
    pub description: String,
    pub supported: bool,
}

#[derive(Serialize, Debug)]
pub struct FileFormatsResponse {
    pub success: bool,
    pub formats: Vec<FileFormat>,
    pub total_formats: usize,
}
