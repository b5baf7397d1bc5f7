use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::SerialStream;

/// Default baud rate for EZSP coprocessors.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read timeout. Matches the inter-character timeout of the link
/// service tick so a blocked read never delays shutdown for long.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Prefix selecting a TCP serial bridge instead of a local device.
const TCP_PREFIX: &str = "tcp://";

/// Flow control mode of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    None,
    /// XON/XOFF. The coprocessor may inject 0x11/0x13 into the byte stream.
    Software,
    /// RTS/CTS.
    #[default]
    Hardware,
}

impl FlowControl {
    fn to_serialport(self) -> serialport::FlowControl {
        match self {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Configuration for opening a [`SerialStream`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM3`) or `tcp://host:port`.
    pub device: String,
    /// Line speed. Ignored for TCP bridges.
    pub baud_rate: u32,
    /// Flow control mode. Ignored for TCP bridges.
    pub flow_control: FlowControl,
    /// Read timeout applied after opening.
    pub read_timeout: Option<Duration>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            flow_control: FlowControl::default(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

impl SerialConfig {
    /// Create a config for `device` with default line settings.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Override the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Override the flow control mode.
    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }
}

impl SerialStream {
    /// Open the device described by `config` (blocking).
    ///
    /// Native ports are opened 8N1. A `tcp://host:port` device connects to a
    /// serial-over-IP bridge instead.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let device = config.device.trim();
        if device.is_empty() {
            return Err(TransportError::InvalidDevice(
                "device name must not be empty".to_string(),
            ));
        }

        let mut stream = match device.strip_prefix(TCP_PREFIX) {
            Some(addr) => connect_tcp(addr)?,
            None => open_native(device, config)?,
        };
        stream.set_read_timeout(config.read_timeout)?;
        Ok(stream)
    }
}

fn open_native(device: &str, config: &SerialConfig) -> Result<SerialStream> {
    let port = serialport::new(device, config.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(config.flow_control.to_serialport())
        .timeout(config.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT))
        .open()
        .map_err(|err| TransportError::Open {
            device: device.to_string(),
            source: err.into(),
        })?;

    info!(
        device,
        baud = config.baud_rate,
        flow_control = ?config.flow_control,
        "opened serial port"
    );
    Ok(SerialStream::from_native(port))
}

fn connect_tcp(addr: &str) -> Result<SerialStream> {
    if addr.is_empty() || !addr.contains(':') {
        return Err(TransportError::InvalidDevice(format!(
            "expected {TCP_PREFIX}host:port, got {TCP_PREFIX}{addr}"
        )));
    }

    let stream = TcpStream::connect(addr).map_err(|err| TransportError::Connect {
        addr: addr.to_string(),
        source: err,
    })?;
    // Frames are tiny; Nagle would add latency to every ACK.
    stream.set_nodelay(true)?;
    debug!(addr, "connected to tcp serial bridge");
    Ok(SerialStream::from_tcp(stream))
}
