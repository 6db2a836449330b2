// src/controller/monitor.rs - Background print progress poller
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::communication::Transport;
use crate::printer_state::{PrintStatus, PrinterState};

/// SD print progress query.
pub const PROGRESS_QUERY: &str = "M27";

const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Runs the progress query against the shared status.
///
/// Cloned into the poller task; foreground and background queries share
/// the transport lock.
#[derive(Debug, Clone)]
pub struct PrintMonitor {
    transport: Arc<Transport>,
    status: Arc<RwLock<PrintStatus>>,
}

impl PrintMonitor {
    pub fn new(transport: Arc<Transport>, status: Arc<RwLock<PrintStatus>>) -> Self {
        Self { transport, status }
    }

    /// Ask the board for progress and fold the reply into the cached status.
    ///
    /// Disconnected: `UNKNOWN`, cache untouched. Transport fault: the cached
    /// values flagged `ERROR`, cache untouched.
    pub async fn refresh(&self) -> PrintStatus {
        if !self.transport.is_connected() {
            return PrintStatus::unknown();
        }
        match self.transport.send_command(PROGRESS_QUERY, None).await {
            Ok(response) => {
                let mut status = self.status.write().await;
                let previous = status.state;
                if status.apply_progress_report(&response) && status.state != previous {
                    tracing::info!("Printer state {} -> {}", previous, status.state);
                }
                status.clone()
            }
            Err(e) => {
                tracing::error!("Error getting print status: {}", e);
                self.status.read().await.as_error()
            }
        }
    }

    /// Start the periodic poller. It only queries while the cached state is `PRINTING`.
    pub fn spawn(&self, period: Duration) -> MonitorHandle {
        let period = period.max(MIN_POLL_PERIOD);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let monitor = self.clone();
        let task = tokio::spawn(async move {
            // First poll one full period after connect.
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Printer monitoring loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if !monitor.transport.is_connected() {
                            continue;
                        }
                        let printing = monitor.status.read().await.state == PrinterState::Printing;
                        if printing {
                            monitor.refresh().await;
                        }
                    }
                }
            }
        });
        tracing::info!("Started printer monitoring every {:?}", period);
        MonitorHandle { shutdown_tx, task }
    }
}

/// Handle to a running poller.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the poller and wait for it to exit. A query in flight finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Printer monitoring task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
