// src/printer.rs - The printer task: owns the controller and serves web requests in order
use tokio::sync::mpsc;

use crate::controller::{Outcome, PrinterController};
use crate::file_manager::FileManager;
use crate::web::models::StatusResponse;
use crate::web::printer_channel::PrinterRequest;

/// Foreground owner of the [`PrinterController`].
///
/// All user operations arrive over one channel and run one after another;
/// the only other task touching the link is the controller's poller.
pub struct Printer {
    controller: PrinterController,
    files: FileManager,
}

impl Printer {
    pub fn new(controller: PrinterController, files: FileManager) -> Self {
        Self { controller, files }
    }

    /// Serve requests until every sender is dropped, then disconnect.
    pub async fn run(mut self, mut requests: mpsc::Receiver<PrinterRequest>) {
        tracing::info!("Printer task started");
        while let Some(request) = requests.recv().await {
            self.handle(request).await;
        }
        if self.controller.is_connected() {
            self.controller.disconnect().await;
        }
        tracing::info!("Printer task stopped");
    }

    pub async fn handle(&mut self, request: PrinterRequest) {
        // A dropped receiver means the HTTP client went away; nothing to do.
        match request {
            PrinterRequest::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status().await);
            }
            PrinterRequest::Connect { respond_to } => {
                let _ = respond_to.send(self.ensure_connected().await);
            }
            PrinterRequest::Disconnect { respond_to } => {
                self.controller.disconnect().await;
                let _ = respond_to.send(Outcome::ok("Disconnected from printer"));
            }
            PrinterRequest::Pause { respond_to } => {
                let _ = respond_to.send(self.controller.pause_printing().await);
            }
            PrinterRequest::Resume { respond_to } => {
                let _ = respond_to.send(self.controller.resume_printing().await);
            }
            PrinterRequest::Stop { respond_to } => {
                let _ = respond_to.send(self.controller.stop_printing().await);
            }
            PrinterRequest::HomeZ { respond_to } => {
                let _ = respond_to.send(self.controller.move_to_home().await);
            }
            PrinterRequest::MoveZ { distance, respond_to } => {
                let _ = respond_to.send(self.controller.move_by(distance).await);
            }
            PrinterRequest::Reboot { respond_to } => {
                let _ = respond_to.send(self.controller.reboot().await);
            }
            PrinterRequest::SelectFile { filename, respond_to } => {
                let outcome = match self.prepare_file(&filename).await {
                    Some(failure) => failure,
                    None => self.controller.select_file(&filename).await,
                };
                let _ = respond_to.send(outcome);
            }
            PrinterRequest::PrintFile { filename, respond_to } => {
                let outcome = match self.prepare_file(&filename).await {
                    Some(failure) => failure,
                    None => self.controller.start_printing(Some(&filename)).await,
                };
                let _ = respond_to.send(outcome);
            }
            PrinterRequest::ForceReset { respond_to } => {
                self.controller.force_reset_state().await;
                let _ = respond_to.send(Outcome::ok("Printer state reset to IDLE"));
            }
        }
    }

    /// Connect unless already connected.
    pub async fn ensure_connected(&mut self) -> Outcome {
        if self.controller.is_connected() {
            return Outcome::ok("Printer is connected");
        }
        self.controller.connect().await
    }

    /// Existence check and connection for file operations; `Some` is the failure to report.
    async fn prepare_file(&mut self, filename: &str) -> Option<Outcome> {
        if !self.files.file_exists(filename).await {
            tracing::error!("File not found: {}", filename);
            return Some(Outcome::failed(format!("File not found: {filename}")));
        }
        let connected = self.ensure_connected().await;
        if !connected.success {
            tracing::error!("Printer not connected: {}", connected.message);
            return Some(Outcome::failed(format!("Printer not connected: {}", connected.message)));
        }
        None
    }

    pub async fn status(&mut self) -> StatusResponse {
        match self.controller.get_firmware_version() {
            Ok(firmware_version) => StatusResponse {
                connected: true,
                firmware_version,
                print_status: self.controller.get_print_status().await,
                selected_file: self.controller.get_selected_file().to_string(),
                z_position: self.controller.get_z_position().await,
            },
            Err(e) => StatusResponse {
                connected: false,
                firmware_version: format!("Connection Error: {e}"),
                print_status: self.controller.get_print_status().await,
                selected_file: self.controller.get_selected_file().to_string(),
                z_position: self.controller.get_z_position().await,
            },
        }
    }
}
