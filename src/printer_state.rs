// src/printer_state.rs - Print status and its interpretation from firmware replies
use serde::Serialize;

use crate::communication::grammar::{
    NOT_SD_PRINTING_MARKER, SD_PRINTING_MARKER, extract_progress, extract_z,
};

/// Coarse printer state as reported over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrinterState {
    #[default]
    Idle,
    Printing,
    Paused,
    Finished,
    Error,
    Unknown,
}

impl std::fmt::Display for PrinterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PrinterState::Idle => "IDLE",
            PrinterState::Printing => "PRINTING",
            PrinterState::Paused => "PAUSED",
            PrinterState::Finished => "FINISHED",
            PrinterState::Error => "ERROR",
            PrinterState::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Progress of the current job.
///
/// `current_layer`/`total_layers` are reserved; the board only reports bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PrintStatus {
    pub state: PrinterState,
    pub progress_percent: f64,
    pub current_layer: u32,
    pub total_layers: u32,
    pub current_byte: u64,
    pub total_bytes: u64,
}

impl PrintStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status returned when there is no connection to ask.
    pub fn unknown() -> Self {
        Self {
            state: PrinterState::Unknown,
            ..Self::default()
        }
    }

    /// Copy of `self` flagged as failed, other fields untouched.
    pub fn as_error(&self) -> Self {
        Self {
            state: PrinterState::Error,
            ..self.clone()
        }
    }

    /// Fold an `M27` reply into the status.
    ///
    /// Returns `false` when the reply was not recognized; the status is then
    /// left exactly as it was.
    pub fn apply_progress_report(&mut self, response: &str) -> bool {
        if response.contains(SD_PRINTING_MARKER) {
            let Some((current, total)) = extract_progress(response) else {
                tracing::debug!("Unparseable progress report: {}", response);
                return false;
            };
            self.total_bytes = total;
            if total > 0 {
                let current = current.min(total);
                self.current_byte = current;
                self.progress_percent = current as f64 / total as f64 * 100.0;
                self.state = if current >= total {
                    PrinterState::Finished
                } else if current > 0 {
                    PrinterState::Printing
                } else {
                    PrinterState::Idle
                };
            } else {
                self.current_byte = current;
                self.progress_percent = 0.0;
                self.state = PrinterState::Idle;
            }
            true
        } else if response.contains(NOT_SD_PRINTING_MARKER) {
            self.state = PrinterState::Idle;
            self.progress_percent = 0.0;
            self.current_byte = 0;
            true
        } else {
            false
        }
    }

    /// Forget the job after a stop.
    pub fn reset_job(&mut self) {
        self.state = PrinterState::Idle;
        self.progress_percent = 0.0;
        self.current_byte = 0;
    }
}

/// Update `z` from an `M114` reply; a missing or malformed token keeps the old value.
pub fn apply_position_report(z: &mut f64, response: &str) -> bool {
    match extract_z(response) {
        Some(value) => {
            *z = value;
            true
        }
        None => {
            tracing::debug!("No Z position in reply: {}", response);
            false
        }
    }
}
