/// A violation of the link protocol by the coprocessor.
///
/// Faults end the current link session. The worker stays up so the session
/// can be re-established with a reset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFault {
    /// Peer acknowledged a frame we have not sent yet.
    #[error("ackNum {ack} is ahead of next frame to send {next_to_send}")]
    AckAhead { ack: u8, next_to_send: u8 },

    /// Peer went back to an already accepted frame number without the
    /// retransmit flag.
    #[error("frameNum {frame} rolled back behind {expected} without retransmit flag")]
    SequenceRollback { frame: u8, expected: u8 },

    /// Control byte does not name any known frame type.
    #[error("unknown control byte 0x{0:02X}")]
    UnknownControl(u8),

    /// Known control byte with a body of the wrong size.
    #[error("control byte 0x{control:02X} with invalid frame length {len}")]
    BadLength { control: u8, len: usize },

    /// RSTACK carried a protocol version we don't speak.
    #[error("unsupported ASH version 0x{0:02X}")]
    BadVersion(u8),

    /// Coprocessor sent RSTACK without being asked.
    #[error("coprocessor reset unexpectedly (code 0x{code:02X})")]
    PeerReset { code: u8 },

    /// The upper layer could not make sense of a delivered payload.
    #[error("payload delivery failed: {0}")]
    Delivery(String),
}

/// Errors that can occur in the ASH link layer.
#[derive(Debug, thiserror::Error)]
pub enum AshError {
    /// Data payload does not fit in a single frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Data frames must carry at least one byte.
    #[error("empty payload")]
    EmptyPayload,

    /// The send window slot for the next frame is still occupied.
    #[error("send window full (slot {slot} still unacknowledged)")]
    WindowOverflow { slot: u8 },

    /// No link session: reset has not completed, or a fault closed it.
    #[error("link not connected")]
    NotConnected,

    /// A reset is already running.
    #[error("link reset already in progress")]
    ResetInProgress,

    /// Every reset attempt went unanswered.
    #[error("link reset failed after {attempts} attempts")]
    ResetFailed { attempts: u32 },

    /// Coprocessor reported an error and entered its failed state.
    #[error("coprocessor error frame (version 0x{version:02X}, code 0x{code:02X})")]
    PeerError { version: u8, code: u8 },

    /// The link session was terminated by a protocol fault.
    #[error("protocol fault: {0}")]
    Protocol(#[from] ProtocolFault),

    /// An I/O error occurred while reading or writing frames.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial transport failed.
    #[error(transparent)]
    Transport(#[from] ncplink_transport::TransportError),

    /// The byte stream reached end of file.
    #[error("connection closed")]
    ConnectionClosed,

    /// The link worker has stopped.
    #[error("link shut down")]
    Shutdown,
}

impl AshError {
    /// True for errors that terminate the link worker (startup-fatal or
    /// peer-reported failure). Only a new link can recover.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AshError::ResetFailed { .. }
                | AshError::PeerError { .. }
                | AshError::Io(_)
                | AshError::Transport(_)
                | AshError::ConnectionClosed
                | AshError::Shutdown
        )
    }

    /// True when the session was closed by a protocol violation and a reset
    /// is needed before traffic can resume.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(self, AshError::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, AshError>;
