//! Scripted serial board shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use resin_host::communication::{SerialInterface, SerialLink, TransportError};
use resin_host::config::Config;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the board saw and sent, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A command was written (trimmed text).
    Write(String),
    /// The last byte of the reply to this command was read.
    Reply(String),
}

#[derive(Default)]
struct BoardState {
    rules: Vec<(String, Option<Vec<u8>>)>,
    failing: Vec<String>,
    outbound: VecDeque<u8>,
    current: Option<String>,
    writes: Vec<String>,
    events: Vec<Event>,
    byte_delay: Duration,
    refuse_open: bool,
    opens: usize,
}

/// Fake board answering commands by prefix. Unscripted commands get no reply.
#[derive(Clone, Default)]
pub struct ScriptedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl ScriptedBoard {
    /// Board answering the connect sequence.
    pub fn new() -> Self {
        let board = Self::empty();
        board.reply("M4002", "ok V4.13\n");
        board.reply("M21", "ok\n");
        board.reply("M115", "FIRMWARE_NAME:Test PROTOCOL_VERSION:V5.0\n");
        board
    }

    /// Board with no replies at all.
    pub fn empty() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardState> {
        self.state.lock().unwrap()
    }

    /// Answer commands starting with `prefix`; later rules win.
    pub fn reply(&self, prefix: &str, reply: impl AsRef<[u8]>) {
        self.lock()
            .rules
            .insert(0, (prefix.to_string(), Some(reply.as_ref().to_vec())));
    }

    /// Stay silent for commands starting with `prefix`.
    pub fn silent(&self, prefix: &str) {
        self.lock().rules.insert(0, (prefix.to_string(), None));
    }

    /// Fail the write of commands starting with `prefix`.
    pub fn fail_on(&self, prefix: &str) {
        self.lock().failing.push(prefix.to_string());
    }

    pub fn refuse_open(&self) {
        self.lock().refuse_open = true;
    }

    pub fn set_byte_delay(&self, delay: Duration) {
        self.lock().byte_delay = delay;
    }

    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    pub fn count_writes(&self, command: &str) -> usize {
        self.lock().writes.iter().filter(|w| w.as_str() == command).count()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.events.clear();
    }
}

struct ScriptedLink {
    board: ScriptedBoard,
}

#[async_trait]
impl SerialLink for ScriptedLink {
    async fn discard_input(&mut self) -> io::Result<()> {
        self.board.lock().outbound.clear();
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        let command = text.trim().to_string();
        let mut state = self.board.lock();
        if state.failing.iter().any(|prefix| command.starts_with(prefix.as_str())) {
            return Err(io::Error::other("cable unplugged"));
        }
        state.writes.push(command.clone());
        state.events.push(Event::Write(command.clone()));
        let reply = state
            .rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .and_then(|(_, reply)| reply.clone());
        if let Some(reply) = reply {
            state.outbound.extend(reply);
        }
        state.current = Some(command);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (pending, delay) = {
            let state = self.board.lock();
            (state.outbound.is_empty(), state.byte_delay)
        };
        if pending {
            return std::future::pending().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = {
            let mut state = self.board.lock();
            let next = state.outbound.pop_front();
            if next.is_some() && state.outbound.is_empty() {
                if let Some(command) = state.current.clone() {
                    state.events.push(Event::Reply(command));
                }
            }
            next
        };
        match next {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl SerialInterface for ScriptedBoard {
    async fn open(&self, port: &str, _baud: u32) -> Result<Box<dyn SerialLink>, TransportError> {
        let mut state = self.lock();
        if state.refuse_open {
            return Err(TransportError::Open {
                port: port.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
            });
        }
        state.opens += 1;
        Ok(Box::new(ScriptedLink { board: self.clone() }))
    }
}

/// Defaults with instant settling, a 1 s base timeout and a poller that
/// effectively never ticks.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.serial.port = "/dev/fake0".to_string();
    config.serial.timeout_secs = 1.0;
    config.serial.settle_delay_ms = 0;
    config.printer.storage_settle_ms = 0;
    config.printer.monitoring_interval_secs = 3600.0;
    config
}

/// Every write is immediately followed by the end of its own reply.
pub fn assert_no_interleaving(events: &[Event]) {
    assert_eq!(events.len() % 2, 0, "unpaired events: {events:?}");
    for pair in events.chunks(2) {
        match pair {
            [Event::Write(sent), Event::Reply(answered)] => {
                assert_eq!(sent, answered, "interleaved exchange in {events:?}")
            }
            other => panic!("unexpected event order {other:?} in {events:?}"),
        }
    }
}
