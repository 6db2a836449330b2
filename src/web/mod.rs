//! HTTP surface: axum routes, request/response bodies and the channel
//! that carries printer requests to the printer task.

pub mod api;
pub mod models;
pub mod printer_channel;

pub use api::create_router;
pub use printer_channel::PrinterRequest;
