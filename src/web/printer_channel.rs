//! Defines the communication channel messages between the web server and the printer task.

use super::models::StatusResponse;
use crate::controller::Outcome;
use tokio::sync::oneshot;

/// Represents a request sent from a web handler to the printer task.
///
/// The printer task handles one request at a time, in arrival order.
#[derive(Debug)]
pub enum PrinterRequest {
    /// Connection state, firmware, progress, selected file and Z position.
    GetStatus {
        respond_to: oneshot::Sender<StatusResponse>,
    },
    Connect {
        respond_to: oneshot::Sender<Outcome>,
    },
    Disconnect {
        respond_to: oneshot::Sender<Outcome>,
    },
    /// Pause the current print job.
    Pause {
        respond_to: oneshot::Sender<Outcome>,
    },
    /// Resume a paused print job.
    Resume {
        respond_to: oneshot::Sender<Outcome>,
    },
    /// Stop the current print job and forget the selected file.
    Stop {
        respond_to: oneshot::Sender<Outcome>,
    },
    HomeZ {
        respond_to: oneshot::Sender<Outcome>,
    },
    MoveZ {
        distance: f64,
        respond_to: oneshot::Sender<Outcome>,
    },
    Reboot {
        respond_to: oneshot::Sender<Outcome>,
    },
    /// Select a file from the print file directory.
    SelectFile {
        filename: String,
        respond_to: oneshot::Sender<Outcome>,
    },
    /// Select a file and start printing it.
    PrintFile {
        filename: String,
        respond_to: oneshot::Sender<Outcome>,
    },
    /// Force the cached state back to IDLE.
    ForceReset {
        respond_to: oneshot::Sender<Outcome>,
    },
}
