//! In-process printer firmware speaking the same dialect as the real board.
//!
//! Used by `printer-host --simulate` to exercise the whole host without
//! hardware. Replies are queued when a command is written and handed out
//! byte by byte on read.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use super::transport::{SerialInterface, SerialLink, TransportError};

const DEFAULT_JOB_BYTES: u64 = 100_000;

#[derive(Debug, Clone, PartialEq)]
enum JobState {
    Idle,
    Printing,
    Paused,
}

#[derive(Debug)]
struct Firmware {
    selected: Option<String>,
    job: JobState,
    current_byte: u64,
    total_bytes: u64,
    bytes_per_poll: u64,
    z: f64,
    relative: bool,
    outbound: VecDeque<u8>,
}

impl Firmware {
    fn new(bytes_per_poll: u64) -> Self {
        Self {
            selected: None,
            job: JobState::Idle,
            current_byte: 0,
            total_bytes: 0,
            bytes_per_poll,
            z: 0.0,
            relative: false,
            outbound: VecDeque::new(),
        }
    }

    fn reply(&mut self, text: &str) {
        self.outbound.extend(text.bytes());
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        let (code, args) = line.split_once(' ').unwrap_or((line, ""));
        match code {
            "M4002" => self.reply("ok V4.13\n"),
            "M115" => self.reply("CBD make it Date:2021.06.01\nok\n"),
            "M21" => self.reply("ok\n"),
            "M23" => {
                let name = args.trim().to_string();
                self.reply(&format!("File opened: {name} Size: {DEFAULT_JOB_BYTES}\nok\n"));
                self.selected = Some(name);
            }
            "M6030" => {
                if self.selected.is_some() || !args.is_empty() {
                    self.job = JobState::Printing;
                    self.current_byte = 0;
                    self.total_bytes = DEFAULT_JOB_BYTES;
                    self.reply("ok\n");
                } else {
                    self.reply("Error:No file selected\n");
                }
            }
            "M27" => self.report_progress(),
            "M25" => {
                if self.job == JobState::Printing {
                    self.job = JobState::Paused;
                }
                self.reply("ok\n");
            }
            "M24" => {
                if self.job == JobState::Paused {
                    self.job = JobState::Printing;
                }
                self.reply("ok\n");
            }
            "M33" => {
                self.job = JobState::Idle;
                self.current_byte = 0;
                self.selected = None;
                self.reply("ok\n");
            }
            "M114" => {
                let report = format!("C: X:0.00 Y:0.00 Z:{:.2} E:0.00\n", self.z);
                self.reply(&report);
            }
            "G28" => {
                self.z = 0.0;
                self.reply("ok\n");
            }
            "G90" => {
                self.relative = false;
                self.reply("ok\n");
            }
            "G91" => {
                self.relative = true;
                self.reply("ok\n");
            }
            "G1" => {
                if let Some(value) = args
                    .split_whitespace()
                    .find_map(|word| word.strip_prefix('Z'))
                    .and_then(|v| v.parse::<f64>().ok())
                {
                    self.z = if self.relative { self.z + value } else { value };
                }
                self.reply("ok\n");
            }
            // Board resets without answering.
            "M999" => {
                self.job = JobState::Idle;
                self.outbound.clear();
            }
            "" => {}
            _ => self.reply("ok\n"),
        }
    }

    fn report_progress(&mut self) {
        match self.job {
            JobState::Idle => self.reply("Not SD printing\n"),
            JobState::Printing | JobState::Paused => {
                if self.job == JobState::Printing {
                    self.current_byte = (self.current_byte + self.bytes_per_poll).min(self.total_bytes);
                }
                let report = format!("SD printing byte {}/{}\n", self.current_byte, self.total_bytes);
                self.reply(&report);
                if self.current_byte >= self.total_bytes {
                    self.job = JobState::Idle;
                }
            }
        }
    }
}

/// Opens links to one shared simulated board.
#[derive(Debug, Clone)]
pub struct SimulatedPrinter {
    firmware: Arc<Mutex<Firmware>>,
}

impl SimulatedPrinter {
    /// `bytes_per_poll` is how far the job advances on each `M27`.
    pub fn new(bytes_per_poll: u64) -> Self {
        Self {
            firmware: Arc::new(Mutex::new(Firmware::new(bytes_per_poll))),
        }
    }
}

impl Default for SimulatedPrinter {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_BYTES / 20)
    }
}

struct SimulatedLink {
    firmware: Arc<Mutex<Firmware>>,
}

impl SimulatedLink {
    fn firmware(&self) -> std::sync::MutexGuard<'_, Firmware> {
        self.firmware.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SerialLink for SimulatedLink {
    async fn discard_input(&mut self) -> io::Result<()> {
        self.firmware().outbound.clear();
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        let mut firmware = self.firmware();
        for line in text.lines() {
            firmware.handle_line(line);
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self.firmware().outbound.pop_front();
        match (next, buf.first_mut()) {
            (Some(byte), Some(slot)) => {
                *slot = byte;
                Ok(1)
            }
            // Nothing queued: the board stays silent until the caller times out.
            _ => std::future::pending().await,
        }
    }
}

#[async_trait]
impl SerialInterface for SimulatedPrinter {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, TransportError> {
        tracing::info!("Opening simulated printer on {} at {} baud", port, baud);
        Ok(Box::new(SimulatedLink {
            firmware: Arc::clone(&self.firmware),
        }))
    }
}
