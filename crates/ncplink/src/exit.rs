use std::fmt;
use std::io;

use ncplink_ash::AshError;
use ncplink_ezsp::EzspError;
use ncplink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidDevice(_) => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn ash_error(context: &str, err: AshError) -> CliError {
    match err {
        AshError::Transport(err) => transport_error(context, err),
        AshError::Io(source) => io_error(context, source),
        AshError::ResetFailed { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        AshError::PayloadTooLarge { .. } | AshError::EmptyPayload | AshError::Protocol(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        AshError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        AshError::PeerError { .. } | AshError::NotConnected | AshError::WindowOverflow { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn ezsp_error(context: &str, err: EzspError) -> CliError {
    match err {
        EzspError::Link(err) => ash_error(context, err),
        EzspError::Transport(err) => transport_error(context, err),
        EzspError::CommandTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        EzspError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        EzspError::InvalidCommand { .. }
        | EzspError::UnexpectedResponse { .. }
        | EzspError::UnexpectedLength { .. }
        | EzspError::CallbackInsteadOfResponse { .. }
        | EzspError::ResponseInsteadOfCallback { .. }
        | EzspError::ProtocolVersion { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        EzspError::Spawn(source) => CliError::new(INTERNAL, format!("{context}: {source}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
