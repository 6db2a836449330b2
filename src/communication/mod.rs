//! Serial communication with the printer board: the transport, the
//! firmware reply normalizer, the reply grammar and a simulated board.

pub mod grammar;
pub mod normalizer;
pub mod simulated;
pub mod transport;

pub use normalizer::ResponseNormalizer;
pub use simulated::SimulatedPrinter;
pub use transport::{
    HardwareSerial, SerialInterface, SerialLink, Transport, TransportError, TransportStats,
};
