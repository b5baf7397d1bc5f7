use std::time::Duration;

use ncplink_ash::AshError;

use crate::ids::{display_name, status_name};

fn name(id: &u8) -> String {
    display_name(*id)
}

fn status(code: &u8) -> &'static str {
    status_name(*code)
}

/// Why an incoming EZSP frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),

    /// Sequence number was never issued, or was issued long ago.
    #[error("frame out of sequence (received {received}, next to issue {next})")]
    OutOfSequence { received: u8, next: u8 },

    /// Frame control byte is not a response.
    #[error("invalid frame control byte 0x{0:02X}")]
    Direction(u8),

    #[error("coprocessor ran out of memory for the response (overflow)")]
    Overflow,

    #[error("response truncated by the coprocessor")]
    Truncated,

    #[error("invalid callback type in frame control byte 0x{0:02X}")]
    InvalidCallbackType(u8),

    /// A callback-only frame id arrived without the callback bits.
    #[error("{} is a callback id but not flagged as callback", name(.0))]
    UnflaggedCallback(u8),

    /// A response frame id arrived flagged as a callback.
    #[error("{} flagged as callback but is not a callback id", name(.0))]
    FlaggedResponse(u8),
}

/// Errors returned by EZSP operations.
#[derive(Debug, thiserror::Error)]
pub enum EzspError {
    /// Link layer error.
    #[error("link error: {0}")]
    Link(#[from] AshError),

    /// Serial transport error.
    #[error(transparent)]
    Transport(#[from] ncplink_transport::TransportError),

    /// No reply within the command timeout.
    #[error("{} (seq={sequence}) timed out after {timeout:?}", name(.command))]
    CommandTimeout {
        command: u8,
        sequence: u8,
        timeout: Duration,
    },

    /// The sequence number wrapped around to a request that was still
    /// waiting; the old request lost its slot.
    #[error("reply slot for seq={sequence} was reused by a newer request")]
    SlotReclaimed { sequence: u8 },

    /// The link was reset while the request was outstanding.
    #[error("request aborted by link reset")]
    Aborted,

    /// The coprocessor answered `invalidCommand`.
    #[error("{} rejected as invalid command (status {})", name(.command), self::status(.status))]
    InvalidCommand { command: u8, status: u8 },

    /// Reply carries a different frame id than the command.
    #[error("{} answered with {}", name(.expected), name(.actual))]
    UnexpectedResponse { expected: u8, actual: u8 },

    /// Reply has the wrong number of bytes.
    #[error("{} response length {actual}, expected {expected}", name(.command))]
    UnexpectedLength {
        command: u8,
        expected: usize,
        actual: usize,
    },

    /// A response was expected but the slot was completed by a callback.
    #[error("{} completed by a synchronous callback instead of a response", name(.command))]
    CallbackInsteadOfResponse { command: u8 },

    /// A command that should be answered by a callback got a response.
    #[error("{} answered with a response instead of a callback", name(.command))]
    ResponseInsteadOfCallback { command: u8 },

    /// Coprocessor speaks another EZSP protocol version.
    #[error("coprocessor protocol version {actual}, wanted {desired}")]
    ProtocolVersion { desired: u8, actual: u8 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The link is gone.
    #[error("ezsp session shut down")]
    Shutdown,
}

impl EzspError {
    /// True when the underlying link is dead and must be reopened.
    pub fn is_fatal(&self) -> bool {
        match self {
            EzspError::Link(err) => err.is_fatal(),
            EzspError::Transport(_) | EzspError::Spawn(_) | EzspError::Shutdown => true,
            _ => false,
        }
    }

    /// True when the session needs a reset before it can carry traffic.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(self, EzspError::Link(err) if err.is_protocol_fault())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EzspError::CommandTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, EzspError>;
