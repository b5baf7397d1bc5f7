//! ASH: the reliable link layer between a host and an EZSP coprocessor.
//!
//! Payloads submitted here reach the coprocessor exactly once and in order
//! over a lossy serial line:
//! - Frames are byte-stuffed, CRC-16 protected and flag terminated
//! - DATA payloads are scrambled per frame
//! - An 8-slot window with ACK/NAK and timed retransmission
//! - A RST/RSTACK handshake establishes each session
//!
//! [`Link`] runs the protocol on a worker thread; [`Engine`] is the
//! underlying state machine.

pub mod codec;
pub mod engine;
pub mod error;
pub mod link;
pub mod random;
pub mod reader;
pub mod seq;
pub mod writer;

pub use codec::{
    encode_frame, reset_code_name, Corruption, Frame, FrameDecoder, Inbound, MAX_PAYLOAD, VERSION,
};
pub use engine::{Engine, LinkCounters, Received};
pub use error::{AshError, ProtocolFault, Result};
pub use link::{DeliveryError, Link, LinkConfig, PayloadSink};
pub use reader::FrameReader;
pub use writer::FrameWriter;
