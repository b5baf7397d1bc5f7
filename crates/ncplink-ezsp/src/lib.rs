//! EZSP command correlation over an ASH link.
//!
//! [`Ezsp`] numbers each command, waits for the reply carrying the same
//! sequence number and routes callbacks to a bounded notification queue.
//! A [`Dispatcher`] can drain that queue into application code on its own
//! thread.
//!
//! ```no_run
//! use ncplink_ash::LinkConfig;
//! use ncplink_ezsp::{Ezsp, EzspConfig, DEFAULT_PROTOCOL_VERSION};
//! use ncplink_transport::{SerialConfig, SerialStream};
//!
//! # fn main() -> ncplink_ezsp::Result<()> {
//! let stream = SerialStream::open(&SerialConfig::new("/dev/ttyUSB0"))?;
//! let ezsp = Ezsp::open(stream, LinkConfig::default(), EzspConfig::default())?;
//! ezsp.reset()?;
//! let info = ezsp.version(DEFAULT_PROTOCOL_VERSION)?;
//! println!("stack {}", info.stack_version_string());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod correlator;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod ids;
mod pending;

pub use client::{Ezsp, Reply, Response, VersionInfo};
pub use config::{EzspConfig, DEFAULT_PROTOCOL_VERSION, MAX_COMMAND_TIMEOUT, MIN_COMMAND_TIMEOUT};
pub use correlator::Notification;
pub use dispatch::{Dispatcher, NotificationHandler};
pub use error::{DecodeError, EzspError, Result};
pub use frame::{decode, encode_command, CallbackKind, FrameKind, IncomingFrame};
pub use ids::{command_name, display_name, is_callback_id, status_name};
