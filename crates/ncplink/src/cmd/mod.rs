use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use ncplink_ash::LinkConfig;
use ncplink_ezsp::{Ezsp, EzspConfig, DEFAULT_PROTOCOL_VERSION};
use ncplink_transport::{FlowControl, SerialConfig, SerialStream, DEFAULT_BAUD_RATE};
use tracing::info;

use crate::exit::{ezsp_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod probe;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reset the coprocessor and print its version information.
    Probe(ProbeArgs),
    /// Send one EZSP command and print the reply.
    Send(SendArgs),
    /// Print callbacks as they arrive.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

impl From<FlowControlArg> for FlowControl {
    fn from(arg: FlowControlArg) -> Self {
        match arg {
            FlowControlArg::None => FlowControl::None,
            FlowControlArg::Software => FlowControl::Software,
            FlowControlArg::Hardware => FlowControl::Hardware,
        }
    }
}

/// How to reach the coprocessor.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device (/dev/ttyUSB0, COM3) or tcp://host:port.
    #[arg(env = "NCPLINK_DEVICE")]
    pub device: String,
    /// Line speed.
    #[arg(long, env = "NCPLINK_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Flow control.
    #[arg(long, value_enum, default_value = "hardware")]
    pub flow_control: FlowControlArg,
    /// Command reply timeout, 3s to 15s.
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    pub timeout: Duration,
}

impl DeviceArgs {
    fn serial_config(&self) -> SerialConfig {
        SerialConfig::new(&self.device)
            .with_baud_rate(self.baud)
            .with_flow_control(self.flow_control.into())
    }

    fn ezsp_config(&self) -> EzspConfig {
        EzspConfig {
            command_timeout: self.timeout,
            ..EzspConfig::default()
        }
    }
}

/// An open, freshly reset session.
pub struct Session {
    pub ezsp: Ezsp,
    pub transport: &'static str,
    pub reset_code: u8,
}

pub fn open_session(args: &DeviceArgs) -> CliResult<Session> {
    let stream = SerialStream::open(&args.serial_config())
        .map_err(|err| transport_error("open failed", err))?;
    let transport = stream.transport_name();
    let ezsp = Ezsp::open(stream, LinkConfig::default(), args.ezsp_config())
        .map_err(|err| ezsp_error("link start failed", err))?;
    let reset_code = ezsp
        .reset()
        .map_err(|err| ezsp_error("reset failed", err))?;
    info!(
        device = %args.device,
        reset = ncplink_ash::reset_code_name(reset_code),
        "coprocessor reset"
    );
    Ok(Session {
        ezsp,
        transport,
        reset_code,
    })
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// EZSP protocol version to request.
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    pub protocol: u8,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Frame id, decimal or 0x-prefixed hex.
    #[arg(long, short = 'c', value_parser = parse_frame_id)]
    pub command: u8,
    /// Command parameters as hex.
    #[arg(long, default_value = "")]
    pub data: String,
    /// Negotiate this protocol version first.
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    pub protocol: u8,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Exit after N callbacks.
    #[arg(long)]
    pub count: Option<usize>,
    /// Poll the coprocessor for callbacks at this interval (e.g. 500ms).
    #[arg(long, value_parser = parse_duration)]
    pub poll: Option<Duration>,
    /// Negotiate this protocol version first.
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    pub protocol: u8,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Parse a frame id written as `0x81` or `129`.
pub fn parse_frame_id(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid frame id {input:?}, expected 0..=255 or 0x00..=0xFF"))
}

pub fn usage(message: impl Into<String>) -> CliError {
    CliError::new(USAGE, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration(" ").is_err());
    }

    #[test]
    fn frame_ids_in_hex_or_decimal() {
        assert_eq!(parse_frame_id("0x81").unwrap(), 0x81);
        assert_eq!(parse_frame_id("129").unwrap(), 0x81);
        assert!(parse_frame_id("0x100").is_err());
        assert!(parse_frame_id("nop").is_err());
    }

    #[test]
    fn flow_control_maps_to_transport() {
        assert_eq!(FlowControl::from(FlowControlArg::Software), FlowControl::Software);
        assert_eq!(FlowControl::from(FlowControlArg::None), FlowControl::None);
    }
}
