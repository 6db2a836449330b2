// src/controller/mod.rs - High-level printer operations over the transport
//! Connection lifecycle and print control.
//!
//! The controller owns the cached [`PrintStatus`], the selected file and the
//! last known Z position. Transport faults never escape an operation: they
//! are logged and turned into a failed [`Outcome`].

pub mod monitor;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::communication::grammar::{extract_protocol_version, is_acknowledged};
use crate::communication::{SerialInterface, Transport, TransportError};
use crate::config::{Config, PrinterConfig};
use crate::printer_state::{PrintStatus, PrinterState, apply_position_report};
pub use monitor::{MonitorHandle, PrintMonitor};

const STORAGE_INIT: &str = "M21";
const FIRMWARE_INFO: &str = "M115";
const POSITION_QUERY: &str = "M114";
const RESUME: &str = "M24";
const PAUSE: &str = "M25";
const STOP: &str = "M33";
const REBOOT: &str = "M999";
const HOME_Z: &str = "G28 Z0";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Printer not connected")]
    NotConnected,
}

/// Result of a printer operation: a success flag and a message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

pub struct PrinterController {
    config: PrinterConfig,
    transport: Arc<Transport>,
    status: Arc<RwLock<PrintStatus>>,
    monitor: PrintMonitor,
    monitor_handle: Option<MonitorHandle>,
    firmware_version: String,
    selected_file: String,
    z_position: f64,
}

impl PrinterController {
    pub fn new(config: &Config, interface: Arc<dyn SerialInterface>) -> Self {
        let transport = Arc::new(Transport::new(config, interface));
        let status = Arc::new(RwLock::new(PrintStatus::new()));
        let monitor = PrintMonitor::new(Arc::clone(&transport), Arc::clone(&status));
        Self {
            config: config.printer.clone(),
            transport,
            status,
            monitor,
            monitor_handle: None,
            firmware_version: config.printer.default_firmware_version.clone(),
            selected_file: String::new(),
            z_position: 0.0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the link, initialize storage, read the firmware version and start polling.
    pub async fn connect(&mut self) -> Outcome {
        self.stop_monitoring().await;

        if let Err(e) = self.transport.connect().await {
            tracing::error!("Failed to connect to printer: {}", e);
            return Outcome::failed(format!("Cannot connect to printer: {e}"));
        }

        if let Err(e) = self.transport.send_command(STORAGE_INIT, None).await {
            tracing::debug!("SD initialization warning: {}", e);
        }
        tokio::time::sleep(self.config.storage_settle()).await;

        match self.transport.send_command(FIRMWARE_INFO, None).await {
            Ok(response) => match extract_protocol_version(&response) {
                Some(version) => self.firmware_version = version,
                None => tracing::debug!("No protocol version in '{}'", response),
            },
            Err(e) => tracing::debug!("Could not get firmware version: {}", e),
        }

        self.monitor_handle = Some(self.monitor.spawn(self.config.monitoring_interval()));
        tracing::info!("Connected to printer, firmware: {}", self.firmware_version);
        Outcome::ok("Printer is connected")
    }

    /// Stop polling and close the link. Waits for a command in flight.
    pub async fn disconnect(&mut self) {
        self.stop_monitoring().await;
        self.transport.disconnect().await;
        tracing::info!("Disconnected from printer");
    }

    async fn stop_monitoring(&mut self) {
        if let Some(handle) = self.monitor_handle.take() {
            handle.stop().await;
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn get_firmware_version(&self) -> Result<String, ControllerError> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        Ok(self.firmware_version.clone())
    }

    /// Query progress now (`M27`) and return the resulting status.
    pub async fn get_print_status(&self) -> PrintStatus {
        self.monitor.refresh().await
    }

    /// Last status without touching the link.
    pub async fn cached_status(&self) -> PrintStatus {
        self.status.read().await.clone()
    }

    pub fn get_selected_file(&self) -> &str {
        &self.selected_file
    }

    /// Query the Z position (`M114`); falls back to the last known value.
    pub async fn get_z_position(&mut self) -> f64 {
        if !self.is_connected() {
            return self.z_position;
        }
        match self.transport.send_command(POSITION_QUERY, None).await {
            Ok(response) => {
                apply_position_report(&mut self.z_position, &response);
            }
            Err(e) => tracing::debug!("Error getting Z position: {}", e),
        }
        self.z_position
    }

    pub async fn select_file(&mut self, filename: &str) -> Outcome {
        tracing::info!("Selecting file: {}", filename);
        if let Err(e) = self.transport.send_command(STORAGE_INIT, None).await {
            return transport_failure("select file", e);
        }
        tokio::time::sleep(self.config.storage_settle()).await;

        let response = match self.transport.send_command(&format!("M23 {filename}"), None).await {
            Ok(response) => response,
            Err(e) => return transport_failure("select file", e),
        };
        let lowered = response.to_lowercase();
        if lowered.contains("ok") || lowered.contains("file opened") {
            self.selected_file = filename.to_string();
            tracing::info!("File selected successfully: {}", filename);
            Outcome::ok(format!("Selected file: {filename}"))
        } else {
            tracing::warn!("File selection failed: {}", response);
            Outcome::failed(format!("Failed to select file: {filename}"))
        }
    }

    pub async fn start_printing(&mut self, filename: Option<&str>) -> Outcome {
        if let Some(name) = filename {
            let selected = self.select_file(name).await;
            if !selected.success {
                tracing::error!("Failed to select file: {}", name);
                return selected;
            }
        }
        if self.selected_file.is_empty() {
            tracing::error!("No file selected for printing");
            return Outcome::failed("No file selected for printing");
        }

        let command = format!("M6030 '{}'", self.selected_file);
        let response = match self.transport.send_command(&command, None).await {
            Ok(response) => response,
            Err(e) => return transport_failure("start print", e),
        };
        if is_acknowledged(&response) {
            self.set_state(PrinterState::Printing).await;
            tracing::info!("Started printing: {}", self.selected_file);
            Outcome::ok(format!("Print started: {}", self.selected_file))
        } else {
            tracing::warn!("Print start failed: {}", response);
            Outcome::failed("Failed to start print")
        }
    }

    pub async fn pause_printing(&mut self) -> Outcome {
        self.acknowledged_transition(PAUSE, PrinterState::Paused, "Print paused", "pause print")
            .await
    }

    pub async fn resume_printing(&mut self) -> Outcome {
        self.acknowledged_transition(RESUME, PrinterState::Printing, "Print resumed", "resume print")
            .await
    }

    pub async fn stop_printing(&mut self) -> Outcome {
        let outcome = self
            .acknowledged_transition(STOP, PrinterState::Idle, "Print stopped", "stop print")
            .await;
        if outcome.success {
            self.status.write().await.reset_job();
            self.selected_file.clear();
        }
        outcome
    }

    async fn acknowledged_transition(
        &mut self,
        command: &str,
        next: PrinterState,
        done: &str,
        action: &str,
    ) -> Outcome {
        match self.transport.send_command(command, None).await {
            Ok(response) if is_acknowledged(&response) => {
                self.set_state(next).await;
                tracing::info!("{}", done);
                Outcome::ok(done)
            }
            Ok(response) => {
                tracing::warn!("Failed to {}: {}", action, response);
                Outcome::failed(format!("Failed to {action}"))
            }
            Err(e) => transport_failure(action, e),
        }
    }

    /// Home Z. Success only means an acknowledgment was seen.
    pub async fn move_to_home(&mut self) -> Outcome {
        match self.transport.send_command(HOME_Z, None).await {
            Ok(response) if is_acknowledged(&response) => Outcome::ok("Z axis homed"),
            Ok(_) => Outcome::failed("Failed to home Z axis"),
            Err(e) => transport_failure("home Z", e),
        }
    }

    /// Relative Z move as one three-line batch.
    pub async fn move_by(&mut self, distance: f64) -> Outcome {
        let command = format!("G91\nG1 Z{} F{}\nG90", distance, self.config.z_feed_rate);
        match self.transport.send_command(&command, None).await {
            Ok(response) if is_acknowledged(&response) => {
                Outcome::ok(format!("Moved Z by {distance}mm"))
            }
            Ok(_) => Outcome::failed(format!("Failed to move Z by {distance}mm")),
            Err(e) => transport_failure("move Z", e),
        }
    }

    /// Send `M999`. The board resets without answering, so any reply is accepted.
    pub async fn reboot(&mut self) -> Outcome {
        match self.transport.send_command(REBOOT, Some(Duration::from_millis(500))).await {
            Ok(_) => Outcome::ok("Printer rebooting..."),
            Err(e) => transport_failure("reboot printer", e),
        }
    }

    /// Set the cached state to `IDLE` whatever the link says.
    pub async fn force_reset_state(&self) {
        self.set_state(PrinterState::Idle).await;
        tracing::info!("Printer state force reset to IDLE");
    }

    async fn set_state(&self, state: PrinterState) {
        self.status.write().await.state = state;
    }
}

fn transport_failure(action: &str, e: TransportError) -> Outcome {
    tracing::error!("Failed to {}: {}", action, e);
    Outcome::failed(e.to_string())
}
