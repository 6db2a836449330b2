//! Host for a resin printer driven over a serial link.
//!
//! The core is [`communication`] (transport, reply normalizer, reply grammar),
//! [`printer_state`] (status interpretation) and [`controller`] (lifecycle,
//! print control and the background poller). [`printer`], [`file_manager`]
//! and [`web`] wire it to an HTTP API.

pub mod communication;
pub mod config;
pub mod controller;
pub mod file_manager;
pub mod printer;
pub mod printer_state;
pub mod web;

pub use controller::{Outcome, PrinterController};
pub use printer_state::{PrintStatus, PrinterState};
