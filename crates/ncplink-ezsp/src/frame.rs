use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::DecodeError;
use crate::ids::is_callback_id;

/// Frame control byte of every command the host sends.
pub const COMMAND_CONTROL: u8 = 0x00;

const RESPONSE_MASK: u8 = 0xE0;
const RESPONSE: u8 = 0x80;
const OVERFLOW: u8 = 0x01;
const TRUNCATED: u8 = 0x02;
const CALLBACK_PENDING: u8 = 0x04;
const CALLBACK_TYPE_SHIFT: u8 = 3;

/// How a callback reached the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackKind {
    /// Delivered in the reply slot of the command that polled for it.
    Sync,
    /// Delivered on its own.
    Async,
}

/// Classification of an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Response,
    Callback(CallbackKind),
}

/// A decoded coprocessor-to-host frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFrame {
    pub sequence: u8,
    pub kind: FrameKind,
    /// More callbacks are waiting on the coprocessor.
    pub callback_pending: bool,
    pub command_id: u8,
    pub data: Bytes,
}

/// Build a command frame: `[sequence, control, frame id, parameters...]`.
pub fn encode_command(sequence: u8, command_id: u8, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(3 + data.len());
    buf.put_u8(sequence);
    buf.put_u8(COMMAND_CONTROL);
    buf.put_u8(command_id);
    buf.put_slice(data);
    buf.freeze()
}

/// True when `received` was not issued yet, given the next sequence number
/// to issue. Byte-wrap safe; anything up to 0x80 ahead counts.
pub fn is_out_of_sequence(received: u8, next: u8) -> bool {
    received.wrapping_sub(next) <= 0x80
}

/// Decode and validate a frame received from the coprocessor.
///
/// `next_sequence` is the sequence number the next command will use.
pub fn decode(payload: &Bytes, next_sequence: u8) -> Result<IncomingFrame, DecodeError> {
    if payload.len() < 3 {
        return Err(DecodeError::TooShort(payload.len()));
    }
    let sequence = payload[0];
    let control = payload[1];
    let command_id = payload[2];

    if is_out_of_sequence(sequence, next_sequence) {
        return Err(DecodeError::OutOfSequence {
            received: sequence,
            next: next_sequence,
        });
    }
    if control & RESPONSE_MASK != RESPONSE {
        return Err(DecodeError::Direction(control));
    }
    if control & OVERFLOW != 0 {
        return Err(DecodeError::Overflow);
    }
    if control & TRUNCATED != 0 {
        return Err(DecodeError::Truncated);
    }

    let kind = match (control >> CALLBACK_TYPE_SHIFT) & 0x03 {
        0 => FrameKind::Response,
        1 => FrameKind::Callback(CallbackKind::Sync),
        2 => FrameKind::Callback(CallbackKind::Async),
        _ => return Err(DecodeError::InvalidCallbackType(control)),
    };
    match (kind, is_callback_id(command_id)) {
        (FrameKind::Response, true) => return Err(DecodeError::UnflaggedCallback(command_id)),
        (FrameKind::Callback(_), false) => return Err(DecodeError::FlaggedResponse(command_id)),
        _ => {}
    }

    Ok(IncomingFrame {
        sequence,
        kind,
        callback_pending: control & CALLBACK_PENDING != 0,
        command_id,
        data: payload.slice(3..),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CALLBACK, NO_CALLBACKS, VERSION};

    fn frame(bytes: &[u8]) -> Bytes {
        Bytes::copy_from_slice(bytes)
    }

    #[test]
    fn encodes_command_layout() {
        let bytes = encode_command(7, VERSION, &[0x04]);
        assert_eq!(bytes.as_ref(), [0x07, 0x00, 0x00, 0x04]);
        assert_eq!(encode_command(0, CALLBACK, &[]).as_ref(), [0x00, 0x00, 0x06]);
    }

    #[test]
    fn decodes_response() {
        let got = decode(&frame(&[0x00, 0x80, 0x00, 0x04, 0x02, 0x30, 0x67]), 1).unwrap();
        assert_eq!(got.sequence, 0);
        assert_eq!(got.kind, FrameKind::Response);
        assert!(!got.callback_pending);
        assert_eq!(got.command_id, VERSION);
        assert_eq!(got.data.as_ref(), [0x04, 0x02, 0x30, 0x67]);
    }

    #[test]
    fn decodes_callbacks_and_pending_flag() {
        let sync = decode(&frame(&[0x05, 0x88, 0x19, 0x90]), 6).unwrap();
        assert_eq!(sync.kind, FrameKind::Callback(CallbackKind::Sync));

        let asynchronous = decode(&frame(&[0x05, 0x94, 0x45]), 6).unwrap();
        assert_eq!(asynchronous.kind, FrameKind::Callback(CallbackKind::Async));
        assert!(asynchronous.callback_pending);
        assert!(asynchronous.data.is_empty());
    }

    #[test]
    fn rejects_bad_control_bits() {
        assert_eq!(
            decode(&frame(&[0x00, 0x00, 0x00]), 1),
            Err(DecodeError::Direction(0x00))
        );
        assert_eq!(
            decode(&frame(&[0x00, 0x81, 0x00]), 1),
            Err(DecodeError::Overflow)
        );
        assert_eq!(
            decode(&frame(&[0x00, 0x82, 0x00]), 1),
            Err(DecodeError::Truncated)
        );
        assert_eq!(
            decode(&frame(&[0x00, 0x98, 0x45]), 1),
            Err(DecodeError::InvalidCallbackType(0x98))
        );
    }

    #[test]
    fn cross_checks_callback_ids() {
        assert_eq!(
            decode(&frame(&[0x00, 0x80, NO_CALLBACKS]), 1),
            Err(DecodeError::UnflaggedCallback(NO_CALLBACKS))
        );
        assert_eq!(
            decode(&frame(&[0x00, 0x88, VERSION]), 1),
            Err(DecodeError::FlaggedResponse(VERSION))
        );
    }

    #[test]
    fn sequence_window() {
        // Issued most recently.
        assert!(!is_out_of_sequence(4, 5));
        // Not issued yet.
        assert!(is_out_of_sequence(5, 5));
        assert!(is_out_of_sequence(6, 5));
        // Wraps across zero.
        assert!(!is_out_of_sequence(0xFF, 0x00));
        assert!(!is_out_of_sequence(0xFE, 0x02));
        // Boundary of the accepted range.
        assert!(is_out_of_sequence(0x85, 0x05));
        assert!(!is_out_of_sequence(0x86, 0x05));

        assert_eq!(
            decode(&frame(&[0x05, 0x80, 0x00]), 5),
            Err(DecodeError::OutOfSequence {
                received: 5,
                next: 5
            })
        );
    }

    #[test]
    fn too_short() {
        assert_eq!(decode(&frame(&[0x00, 0x80]), 1), Err(DecodeError::TooShort(2)));
    }
}
