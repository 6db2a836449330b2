// src/communication/transport.rs - Request/response exchange over the serial link
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::grammar::count_acks;
use super::normalizer::ResponseNormalizer;
use crate::config::Config;

/// Hello probe sent right after the port is opened.
pub const PROBE_COMMAND: &str = "M4002";

const SLOW_COMMANDS: [&str; 2] = ["M6030", "M23"];
const SLOW_COMMAND_MULTIPLIER: u32 = 3;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Serial connection not established")]
    NotConnected,
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: io::Error,
    },
    #[error("No response to hello command")]
    NoResponse,
    #[error("Serial connection closed by remote")]
    Closed,
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Byte-level access to an open serial channel.
#[async_trait]
pub trait SerialLink: Send {
    /// Drop whatever the device sent that nobody has read yet.
    async fn discard_input(&mut self) -> io::Result<()>;
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Read at least one byte; `Ok(0)` means the channel is gone.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens serial channels.
#[async_trait]
pub trait SerialInterface: Send + Sync {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, TransportError>;
}

/// [`SerialInterface`] backed by real hardware through `serial2-tokio`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareSerial;

struct HardwareLink {
    port: SerialPort,
}

#[async_trait]
impl SerialLink for HardwareLink {
    async fn discard_input(&mut self) -> io::Result<()> {
        self.port.discard_input_buffer()
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf).await
    }
}

#[async_trait]
impl SerialInterface for HardwareSerial {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, TransportError> {
        let serial = SerialPort::open(port, baud).map_err(|source| TransportError::Open {
            port: port.to_string(),
            source,
        })?;
        Ok(Box::new(HardwareLink { port: serial }))
    }
}

/// Transport counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub commands_sent: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timeouts: u64,
    pub errors: u64,
}

/// Owns the serial channel and runs one command/response cycle at a time.
///
/// The link lock is held from clearing the input buffer until the reply is
/// complete, so concurrent callers never interleave bytes. `disconnect`
/// takes the same lock and therefore waits for an in-flight command.
pub struct Transport {
    port: String,
    baud: u32,
    base_timeout: Duration,
    settle_delay: Duration,
    interface: Arc<dyn SerialInterface>,
    link: Mutex<Option<Box<dyn SerialLink>>>,
    connected: AtomicBool,
    normalizer: ResponseNormalizer,
    stats: StdMutex<TransportStats>,
}

impl Transport {
    pub fn new(config: &Config, interface: Arc<dyn SerialInterface>) -> Self {
        Self {
            port: config.serial.port.clone(),
            baud: config.serial.baud,
            base_timeout: config.serial.timeout(),
            settle_delay: config.serial.settle_delay(),
            interface,
            link: Mutex::new(None),
            connected: AtomicBool::new(false),
            normalizer: ResponseNormalizer::new(config.printer.default_firmware_version.clone()),
            stats: StdMutex::new(TransportStats::default()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Open the port, let the line settle, and require a reply to the hello probe.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut slot = self.link.lock().await;
        if slot.take().is_some() {
            tracing::debug!("Closing previous serial connection before reconnecting");
        }
        self.connected.store(false, Ordering::SeqCst);

        tracing::info!("Opening serial port {} at {} baud", self.port, self.baud);
        let mut link = self.interface.open(&self.port, self.baud).await?;
        tokio::time::sleep(self.settle_delay).await;
        link.discard_input().await?;

        let response = self.exchange(link.as_mut(), PROBE_COMMAND, None).await?;
        if response.is_empty() {
            tracing::error!("No response to hello command on {}", self.port);
            return Err(TransportError::NoResponse);
        }

        *slot = Some(link);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Serial connection established");
        Ok(())
    }

    /// Close the channel. Safe to call when already closed.
    pub async fn disconnect(&self) {
        let mut slot = self.link.lock().await;
        let was_open = slot.take().is_some();
        self.connected.store(false, Ordering::SeqCst);
        if was_open {
            tracing::info!("Serial connection closed");
        }
    }

    /// Send one command (or a newline-joined batch) and return the normalized reply.
    ///
    /// A reply that never arrives is an empty string, not an error.
    pub async fn send_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, TransportError> {
        let mut slot = self.link.lock().await;
        let link = slot.as_mut().ok_or(TransportError::NotConnected)?;
        match self.exchange(link.as_mut(), command, timeout).await {
            Ok(response) => {
                tracing::debug!("Command: {} -> Response: {}", command.trim(), response);
                Ok(response)
            }
            Err(e) => {
                self.with_stats(|stats| stats.errors += 1);
                tracing::error!("Communication error for command {}: {}", command.trim(), e);
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn with_stats(&self, update: impl FnOnce(&mut TransportStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }

    async fn exchange(
        &self,
        link: &mut dyn SerialLink,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, TransportError> {
        link.discard_input().await?;

        let line = if command.ends_with('\n') {
            command.to_string()
        } else {
            format!("{command}\n")
        };
        let bytes = encode_single_byte(&line);
        let expected_acks = batch_size(command);
        let timeout = response_timeout(command, self.base_timeout, timeout);
        if expected_acks.is_some() {
            tracing::debug!("Multi-command detected, extended timeout to {:?}", timeout);
        }

        link.write_all(&bytes).await?;
        self.with_stats(|stats| {
            stats.commands_sent += 1;
            stats.bytes_sent += bytes.len() as u64;
        });

        let deadline = Instant::now() + timeout;
        let mut raw = String::new();
        let mut byte = [0u8; 1];
        loop {
            match tokio::time::timeout_at(deadline, link.read(&mut byte)).await {
                Err(_) => {
                    self.with_stats(|stats| stats.timeouts += 1);
                    tracing::debug!(
                        "Timeout after {:?} for {} with {} bytes accumulated",
                        timeout,
                        command.trim(),
                        raw.len()
                    );
                    break;
                }
                Ok(Ok(0)) => return Err(TransportError::Closed),
                Ok(Ok(_)) => {
                    raw.push(char::from(byte[0]));
                    if is_complete(&raw, expected_acks) {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(TransportError::Io(e)),
            }
        }
        self.with_stats(|stats| stats.bytes_received += raw.len() as u64);

        if let Some(expected) = expected_acks {
            let actual = count_acks(&raw.to_lowercase());
            if actual < expected {
                tracing::debug!(
                    "Multi-command response: expected {} 'ok's, got {}",
                    expected,
                    actual
                );
            }
        }

        Ok(self.normalizer.normalize(&strip_non_printable(&raw)))
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("port", &self.port)
            .field("baud", &self.baud)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Number of sub-commands when `command` is a newline-joined batch.
pub fn batch_size(command: &str) -> Option<usize> {
    let trimmed = command.trim();
    trimmed.contains('\n').then(|| trimmed.lines().count())
}

/// Effective response timeout for `command`.
///
/// File select/start commands get three times the base unless the caller
/// chose a value; batches get double whatever was chosen.
pub fn response_timeout(command: &str, base: Duration, requested: Option<Duration>) -> Duration {
    let timeout = requested.unwrap_or_else(|| {
        if SLOW_COMMANDS.iter().any(|slow| command.contains(slow)) {
            base * SLOW_COMMAND_MULTIPLIER
        } else {
            base
        }
    });
    if batch_size(command).is_some() {
        timeout * 2
    } else {
        timeout
    }
}

fn is_complete(raw: &str, expected_acks: Option<usize>) -> bool {
    match expected_acks {
        Some(expected) => count_acks(raw) >= expected,
        None => raw.ends_with('\n'),
    }
}

/// Single-byte encoding; characters above U+00FF are dropped.
fn encode_single_byte(text: &str) -> Vec<u8> {
    text.chars().filter_map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

/// Keep printable ASCII plus CR/LF/TAB, then trim.
fn strip_non_printable(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| matches!(c, ' '..='~' | '\r' | '\n' | '\t'))
        .collect();
    if filtered.len() != raw.len() {
        tracing::debug!("Filtered binary data from response");
    }
    filtered.trim().to_string()
}
