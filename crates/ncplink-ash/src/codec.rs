use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_IBM_3740};
use tracing::trace;

use crate::error::{AshError, ProtocolFault, Result};
use crate::random::scramble;

/// End of frame.
pub const FLAG: u8 = 0x7E;
/// Escapes the following byte, which is XORed with [`ESCAPE_MASK`].
pub const ESCAPE: u8 = 0x7D;
/// Software flow control: resume.
pub const XON: u8 = 0x11;
/// Software flow control: pause.
pub const XOFF: u8 = 0x13;
/// Replaces a byte that had a low-level reception error.
pub const SUBSTITUTE: u8 = 0x18;
/// Terminates the frame in progress.
pub const CANCEL: u8 = 0x1A;
pub const ESCAPE_MASK: u8 = 0x20;

/// ASH protocol version carried in RSTACK and ERROR frames.
pub const VERSION: u8 = 0x02;

/// Largest DATA payload.
pub const MAX_PAYLOAD: usize = 128;
/// Smallest unstuffed frame: control + CRC.
pub const MIN_FRAME_LEN: usize = 3;
/// Largest unstuffed frame: control + payload + CRC.
pub const MAX_FRAME_LEN: usize = 1 + MAX_PAYLOAD + 2;

pub const CONTROL_RST: u8 = 0xC0;
pub const CONTROL_RSTACK: u8 = 0xC1;
pub const CONTROL_ERROR: u8 = 0xC2;
const CONTROL_ACK: u8 = 0x80;
const CONTROL_NAK: u8 = 0xA0;
const RETRANSMIT_BIT: u8 = 0x08;

const ASH_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// A link-layer frame, after unstuffing and CRC removal.
///
/// DATA payloads are held descrambled; scrambling happens in
/// [`encode_frame`] and [`Frame::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        frame_num: u8,
        ack_num: u8,
        retransmit: bool,
        payload: Bytes,
    },
    Ack {
        ack_num: u8,
    },
    Nak {
        ack_num: u8,
    },
    Reset,
    ResetAck {
        version: u8,
        code: u8,
    },
    Error {
        version: u8,
        code: u8,
    },
}

impl Frame {
    /// The control byte this frame is sent with.
    pub fn control(&self) -> u8 {
        match self {
            Frame::Data {
                frame_num,
                ack_num,
                retransmit,
                ..
            } => {
                let retx = if *retransmit { RETRANSMIT_BIT } else { 0 };
                ((frame_num & 0x07) << 4) | retx | (ack_num & 0x07)
            }
            Frame::Ack { ack_num } => CONTROL_ACK | (ack_num & 0x07),
            Frame::Nak { ack_num } => CONTROL_NAK | (ack_num & 0x07),
            Frame::Reset => CONTROL_RST,
            Frame::ResetAck { .. } => CONTROL_RSTACK,
            Frame::Error { .. } => CONTROL_ERROR,
        }
    }

    /// Short frame type name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Data { .. } => "DATA",
            Frame::Ack { .. } => "ACK",
            Frame::Nak { .. } => "NAK",
            Frame::Reset => "RST",
            Frame::ResetAck { .. } => "RSTACK",
            Frame::Error { .. } => "ERROR",
        }
    }

    /// Parse a CRC-checked frame body (control byte plus payload).
    ///
    /// DATA payloads are descrambled. Unknown control bytes and bodies of the
    /// wrong length for their type are protocol faults.
    pub fn parse(body: &[u8]) -> std::result::Result<Frame, ProtocolFault> {
        let Some((&control, rest)) = body.split_first() else {
            return Err(ProtocolFault::BadLength {
                control: 0,
                len: 0,
            });
        };
        let bad_length = || ProtocolFault::BadLength {
            control,
            len: body.len(),
        };

        if control & 0x80 == 0 {
            if rest.is_empty() || rest.len() > MAX_PAYLOAD {
                return Err(bad_length());
            }
            let mut payload = rest.to_vec();
            scramble(&mut payload);
            return Ok(Frame::Data {
                frame_num: (control >> 4) & 0x07,
                ack_num: control & 0x07,
                retransmit: control & RETRANSMIT_BIT != 0,
                payload: Bytes::from(payload),
            });
        }

        match control & 0xE0 {
            CONTROL_ACK | CONTROL_NAK => {
                if !rest.is_empty() {
                    return Err(bad_length());
                }
                let ack_num = control & 0x07;
                return Ok(if control & 0xE0 == CONTROL_ACK {
                    Frame::Ack { ack_num }
                } else {
                    Frame::Nak { ack_num }
                });
            }
            _ => {}
        }

        match (control, rest) {
            (CONTROL_RST, []) => Ok(Frame::Reset),
            (CONTROL_RSTACK | CONTROL_ERROR, &[version, _]) if version != VERSION => {
                Err(ProtocolFault::BadVersion(version))
            }
            (CONTROL_RSTACK, &[version, code]) => Ok(Frame::ResetAck { version, code }),
            (CONTROL_ERROR, &[version, code]) => Ok(Frame::Error { version, code }),
            (CONTROL_RST | CONTROL_RSTACK | CONTROL_ERROR, _) => Err(bad_length()),
            _ => Err(ProtocolFault::UnknownControl(control)),
        }
    }
}

/// Encode a frame into its wire form, flag included.
///
/// Wire format (before byte stuffing):
/// ```text
/// ┌─────────┬──────────────────┬──────────┬──────┐
/// │ Control │ Payload          │ CRC-16   │ Flag │
/// │ (1B)    │ (0..128B, DATA   │ (2B BE)  │ 0x7E │
/// │         │  scrambled)      │          │      │
/// └─────────┴──────────────────┴──────────┴──────┘
/// ```
/// Every reserved byte before the flag is sent as `0x7D, byte ^ 0x20`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let mut body = Vec::with_capacity(MAX_FRAME_LEN);
    body.push(frame.control());
    match frame {
        Frame::Data { payload, .. } => {
            if payload.is_empty() {
                return Err(AshError::EmptyPayload);
            }
            if payload.len() > MAX_PAYLOAD {
                return Err(AshError::PayloadTooLarge {
                    size: payload.len(),
                    max: MAX_PAYLOAD,
                });
            }
            let start = body.len();
            body.extend_from_slice(payload);
            scramble(&mut body[start..]);
        }
        Frame::ResetAck { version, code } | Frame::Error { version, code } => {
            body.push(*version);
            body.push(*code);
        }
        Frame::Ack { .. } | Frame::Nak { .. } | Frame::Reset => {}
    }
    let crc = ASH_CRC.checksum(&body);
    body.extend_from_slice(&crc.to_be_bytes());

    dst.reserve(body.len() * 2 + 1);
    for &byte in &body {
        if is_reserved(byte) {
            dst.put_u8(ESCAPE);
            dst.put_u8(byte ^ ESCAPE_MASK);
        } else {
            dst.put_u8(byte);
        }
    }
    dst.put_u8(FLAG);
    Ok(())
}

fn is_reserved(byte: u8) -> bool {
    matches!(byte, FLAG | ESCAPE | XON | XOFF | SUBSTITUTE | CANCEL)
}

/// Why a received frame was thrown away before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// Fewer than [`MIN_FRAME_LEN`] bytes between flags.
    TooShort(usize),
    /// More than [`MAX_FRAME_LEN`] bytes before the flag.
    TooLong,
    /// Checksum mismatch.
    BadCrc { expected: u16, actual: u16 },
    /// A substitute byte was received inside the frame.
    Substituted,
    /// The frame ended right after an escape byte.
    DanglingEscape,
}

/// One decoded item from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A checksum-valid, well-formed frame.
    Frame(Frame),
    /// A damaged frame; the receiver should NAK.
    Corrupt(Corruption),
    /// A checksum-valid frame that breaks the protocol.
    Invalid(ProtocolFault),
}

/// Incremental receive-side framer. Feed it one byte at a time.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    escaped: bool,
    corrupt: Option<Corruption>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_FRAME_LEN),
            ..Self::default()
        }
    }

    /// Process one received byte. Returns an item when `byte` ends a frame.
    pub fn push(&mut self, byte: u8) -> Option<Inbound> {
        match byte {
            XON | XOFF => None,
            CANCEL => {
                if !self.buf.is_empty() {
                    trace!(discarded = self.buf.len(), "cancel byte, dropping partial frame");
                }
                self.clear();
                None
            }
            SUBSTITUTE => {
                self.corrupt.get_or_insert(Corruption::Substituted);
                None
            }
            FLAG => self.finish(),
            ESCAPE => {
                self.escaped = true;
                None
            }
            _ => {
                let byte = if std::mem::take(&mut self.escaped) {
                    byte ^ ESCAPE_MASK
                } else {
                    byte
                };
                if self.corrupt.is_none() {
                    if self.buf.len() >= MAX_FRAME_LEN {
                        self.corrupt = Some(Corruption::TooLong);
                    } else {
                        self.buf.push(byte);
                    }
                }
                None
            }
        }
    }

    /// Drop any partially received frame.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.escaped = false;
        self.corrupt = None;
    }

    fn finish(&mut self) -> Option<Inbound> {
        let escaped = std::mem::take(&mut self.escaped);
        let corrupt = self.corrupt.take();
        let len = self.buf.len();
        let result = if let Some(reason) = corrupt {
            Some(Inbound::Corrupt(reason))
        } else if escaped {
            Some(Inbound::Corrupt(Corruption::DanglingEscape))
        } else if len == 0 {
            None
        } else if len < MIN_FRAME_LEN {
            Some(Inbound::Corrupt(Corruption::TooShort(len)))
        } else {
            let (body, tail) = self.buf.split_at(len - 2);
            let expected = u16::from_be_bytes([tail[0], tail[1]]);
            let actual = ASH_CRC.checksum(body);
            if expected != actual {
                Some(Inbound::Corrupt(Corruption::BadCrc { expected, actual }))
            } else {
                Some(match Frame::parse(body) {
                    Ok(frame) => Inbound::Frame(frame),
                    Err(fault) => Inbound::Invalid(fault),
                })
            }
        };
        self.buf.clear();
        result
    }
}

/// Readable name of the reset or error code carried by RSTACK and ERROR.
pub fn reset_code_name(code: u8) -> &'static str {
    match code {
        0x00 => "unknown",
        0x01 => "external",
        0x02 => "power-on",
        0x03 => "watchdog",
        0x06 => "assert",
        0x09 => "bootloader",
        0x0B => "software",
        0x51 => "exceeded maximum ACK timeout count",
        0x80 => "chip-specific",
        _ => "unrecognized",
    }
}
