//! Serial byte-stream transport for talking to a radio coprocessor.
//!
//! Provides a unified duplex stream over the ways an NCP is usually reached:
//! - Native serial ports (USB CDC, UART adapters)
//! - TCP serial bridges (`tcp://host:port`, e.g. ser2net)
//!
//! This is the lowest layer of ncplink. The ASH link layer reads from and
//! writes to the [`SerialStream`] provided here.

pub mod error;
pub mod serial;
pub mod stream;

pub use error::{Result, TransportError};
pub use serial::{FlowControl, SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};
pub use stream::SerialStream;
