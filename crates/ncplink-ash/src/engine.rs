//! The ASH sliding-window state machine.
//!
//! [`Engine`] does no I/O and never reads the clock: received frames and the
//! current time go in, frames to transmit come out of [`Engine::tick`]. The
//! link worker owns exactly one engine.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::codec::{reset_code_name, Corruption, Frame, MAX_PAYLOAD};
use crate::error::{AshError, ProtocolFault, Result};
use crate::seq;

const WINDOW_SIZE: usize = seq::MODULUS as usize;

/// Traffic statistics for one link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounters {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub data_sent: u64,
    pub data_received: u64,
    pub retransmissions: u64,
    pub duplicates: u64,
    pub naks_sent: u64,
    pub naks_received: u64,
    pub corrupt_frames: u64,
}

/// What a received frame amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Nothing for the upper layers.
    Nothing,
    /// An in-order DATA payload, descrambled.
    Payload(Bytes),
    /// The reset handshake finished; carries the reset code.
    ResetComplete { code: u8 },
    /// The session was closed by a protocol violation.
    Fault(ProtocolFault),
    /// The coprocessor sent an ERROR frame.
    PeerError { version: u8, code: u8 },
}

#[derive(Debug)]
pub struct Engine {
    retransmit_timeout: Duration,

    window: [Option<Bytes>; WINDOW_SIZE],
    sent_at: [Option<Instant>; WINDOW_SIZE],
    /// Slot the next submitted payload goes into.
    put: u8,
    /// frameNum of the next new DATA frame.
    next_to_send: u8,
    /// Oldest frame the peer has not acknowledged.
    oldest_unconfirmed: u8,

    next_expected: u8,
    last_ack_sent: u8,
    reject: bool,
    already_rejecting: bool,
    immediate_ack: bool,
    nak_received: bool,

    connected: bool,
    resetting: bool,
    /// Code of the reset that opened this session, until the peer sends
    /// its first frame. A repeat RSTACK with this code answers an earlier
    /// RST of the same handshake.
    fresh_reset: Option<u8>,
    counters: LinkCounters,
}

impl Engine {
    pub fn new(retransmit_timeout: Duration) -> Self {
        Self {
            retransmit_timeout,
            window: Default::default(),
            sent_at: [None; WINDOW_SIZE],
            put: 0,
            next_to_send: 0,
            oldest_unconfirmed: 0,
            next_expected: 0,
            last_ack_sent: 0,
            reject: false,
            already_rejecting: false,
            immediate_ack: false,
            nak_received: false,
            connected: false,
            resetting: false,
            fresh_reset: None,
            counters: LinkCounters::default(),
        }
    }

    /// True once a reset handshake has completed and no fault has occurred
    /// since.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// True when every sent frame has been acknowledged.
    pub fn is_idle(&self) -> bool {
        self.next_to_send == self.oldest_unconfirmed
    }

    pub fn next_expected(&self) -> u8 {
        self.next_expected
    }

    pub fn is_rejecting(&self) -> bool {
        self.reject
    }

    /// Payloads submitted or in flight, not yet acknowledged.
    pub fn outstanding(&self) -> usize {
        self.window.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn counters(&self) -> LinkCounters {
        self.counters
    }

    /// Queue a payload in the next free window slot.
    pub fn submit(&mut self, payload: Bytes) -> Result<()> {
        if !self.connected {
            return Err(AshError::NotConnected);
        }
        if payload.is_empty() {
            return Err(AshError::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(AshError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        let slot = &mut self.window[usize::from(self.put)];
        if slot.is_some() {
            return Err(AshError::WindowOverflow { slot: self.put });
        }
        *slot = Some(payload);
        self.put = seq::next(self.put);
        Ok(())
    }

    /// Close the session and return the RST frame to send.
    ///
    /// Nothing but RSTACK/ERROR is processed until [`Received::ResetComplete`].
    pub fn begin_reset(&mut self) -> Frame {
        self.connected = false;
        self.resetting = true;
        self.counters.frames_sent += 1;
        Frame::Reset
    }

    /// Stop waiting for RSTACK.
    pub fn abandon_reset(&mut self) {
        self.resetting = false;
    }

    /// Handle a damaged frame.
    pub fn corrupt(&mut self, reason: Corruption) {
        self.counters.corrupt_frames += 1;
        if self.connected {
            warn!(?reason, "corrupt frame");
            self.reject = true;
        } else {
            debug!(?reason, "corrupt frame while disconnected");
        }
    }

    /// Handle a checksum-valid frame that broke the protocol.
    pub fn invalid(&mut self, fault: ProtocolFault) -> Received {
        self.counters.frames_received += 1;
        if !self.connected {
            debug!(%fault, "invalid frame while disconnected");
            return Received::Nothing;
        }
        self.fault(fault)
    }

    /// Process one well-formed frame.
    pub fn receive(&mut self, frame: Frame) -> Received {
        self.counters.frames_received += 1;
        match frame {
            Frame::ResetAck { code, .. } => self.receive_reset_ack(code),
            Frame::Error { version, code } => {
                error!(version, code, reason = reset_code_name(code), "coprocessor error frame");
                self.connected = false;
                self.resetting = false;
                Received::PeerError { version, code }
            }
            Frame::Reset => {
                debug!("ignoring RST from coprocessor");
                Received::Nothing
            }
            other if !self.connected => {
                debug!(kind = other.kind(), "dropping frame before reset completed");
                Received::Nothing
            }
            Frame::Data {
                frame_num,
                ack_num,
                retransmit,
                payload,
            } => {
                self.fresh_reset = None;
                self.receive_data(frame_num, ack_num, retransmit, payload)
            }
            Frame::Ack { ack_num } => {
                self.fresh_reset = None;
                match self.acknowledge(ack_num) {
                    Ok(()) => Received::Nothing,
                    Err(fault) => self.fault(fault),
                }
            }
            Frame::Nak { ack_num } => {
                self.fresh_reset = None;
                self.counters.naks_received += 1;
                match self.acknowledge(ack_num) {
                    Ok(()) => {
                        debug!(ack_num, "NAK received");
                        self.nak_received = true;
                        Received::Nothing
                    }
                    Err(fault) => self.fault(fault),
                }
            }
        }
    }

    fn receive_reset_ack(&mut self, code: u8) -> Received {
        if self.resetting {
            self.clear_state();
            self.connected = true;
            self.fresh_reset = Some(code);
            info!(code, reason = reset_code_name(code), "link reset complete");
            return Received::ResetComplete { code };
        }
        if self.connected && self.fresh_reset == Some(code) {
            debug!(code, "ignoring repeated RSTACK for the completed reset");
            return Received::Nothing;
        }
        if self.connected {
            return self.fault(ProtocolFault::PeerReset { code });
        }
        debug!(code, "ignoring RSTACK outside reset");
        Received::Nothing
    }

    fn receive_data(
        &mut self,
        frame_num: u8,
        ack_num: u8,
        retransmit: bool,
        payload: Bytes,
    ) -> Received {
        if let Err(fault) = self.acknowledge(ack_num) {
            return self.fault(fault);
        }

        if frame_num == self.next_expected {
            self.next_expected = seq::next(self.next_expected);
            self.reject = false;
            self.already_rejecting = false;
            self.counters.data_received += 1;
            debug!(frame_num, ack_num, len = payload.len(), "rx DATA");
            Received::Payload(payload)
        } else if seq::is_before(frame_num, self.next_expected) {
            if !retransmit {
                return self.fault(ProtocolFault::SequenceRollback {
                    frame: frame_num,
                    expected: self.next_expected,
                });
            }
            warn!(frame_num, expected = self.next_expected, "duplicate DATA frame");
            self.counters.duplicates += 1;
            self.immediate_ack = true;
            Received::Nothing
        } else {
            warn!(frame_num, expected = self.next_expected, "out of sequence DATA frame");
            self.reject = true;
            Received::Nothing
        }
    }

    /// Validate `ack` and retire every frame it confirms.
    ///
    /// Only an `ack` in `[oldest_unconfirmed, next_to_send]` retires frames.
    /// One ahead of `next_to_send` is a fault; one behind
    /// `oldest_unconfirmed` is stale and ignored.
    fn acknowledge(&mut self, ack: u8) -> std::result::Result<(), ProtocolFault> {
        if !seq::is_before_or_eq(ack, self.next_to_send) {
            return Err(ProtocolFault::AckAhead {
                ack,
                next_to_send: self.next_to_send,
            });
        }
        let confirmed = seq::distance(self.oldest_unconfirmed, ack);
        if confirmed > seq::distance(self.oldest_unconfirmed, self.next_to_send) {
            debug!(ack, oldest = self.oldest_unconfirmed, "stale ackNum");
            return Ok(());
        }
        for _ in 0..confirmed {
            let slot = usize::from(self.oldest_unconfirmed);
            self.window[slot] = None;
            self.sent_at[slot] = None;
            self.oldest_unconfirmed = seq::next(self.oldest_unconfirmed);
        }
        Ok(())
    }

    /// Close the session because of `fault`.
    pub fn fault(&mut self, fault: ProtocolFault) -> Received {
        error!(%fault, "link protocol fault, session closed");
        self.connected = false;
        self.reject = true;
        Received::Fault(fault)
    }

    /// Run one service pass and return the frames to transmit, in order.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        let mut out = Vec::new();
        if !self.connected {
            return out;
        }

        let mut retransmitted = false;
        if std::mem::take(&mut self.nak_received) {
            retransmitted = self.retransmit_oldest(now, &mut out);
        }
        if !retransmitted && !self.is_idle() {
            let sent = self.sent_at[usize::from(self.oldest_unconfirmed)];
            if sent.is_some_and(|at| now.saturating_duration_since(at) >= self.retransmit_timeout) {
                warn!(frame_num = self.oldest_unconfirmed, "retransmit timeout");
                self.retransmit_oldest(now, &mut out);
            }
        }

        if self.is_idle() {
            let slot = usize::from(self.next_to_send);
            if let Some(payload) = self.window[slot].clone() {
                debug!(frame_num = self.next_to_send, len = payload.len(), "tx DATA");
                out.push(self.data_frame(self.next_to_send, false, payload));
                self.sent_at[slot] = Some(now);
                self.next_to_send = seq::next(self.next_to_send);
                self.counters.data_sent += 1;
            }
        }

        if self.reject && !self.already_rejecting {
            self.already_rejecting = true;
            self.counters.naks_sent += 1;
            out.push(Frame::Nak {
                ack_num: self.next_expected,
            });
            self.ack_sent();
        } else if self.last_ack_sent != self.next_expected || self.immediate_ack {
            out.push(Frame::Ack {
                ack_num: self.next_expected,
            });
            self.ack_sent();
        }

        self.counters.frames_sent += out.len() as u64;
        out
    }

    fn retransmit_oldest(&mut self, now: Instant, out: &mut Vec<Frame>) -> bool {
        if self.is_idle() {
            return false;
        }
        let slot = usize::from(self.oldest_unconfirmed);
        let Some(payload) = self.window[slot].clone() else {
            return false;
        };
        out.push(self.data_frame(self.oldest_unconfirmed, true, payload));
        self.sent_at[slot] = Some(now);
        self.counters.retransmissions += 1;
        true
    }

    fn data_frame(&mut self, frame_num: u8, retransmit: bool, payload: Bytes) -> Frame {
        self.ack_sent();
        Frame::Data {
            frame_num,
            ack_num: self.next_expected,
            retransmit,
            payload,
        }
    }

    fn ack_sent(&mut self) {
        self.last_ack_sent = self.next_expected;
        self.immediate_ack = false;
    }

    fn clear_state(&mut self) {
        self.window = Default::default();
        self.sent_at = [None; WINDOW_SIZE];
        self.put = 0;
        self.next_to_send = 0;
        self.oldest_unconfirmed = 0;
        self.next_expected = 0;
        self.last_ack_sent = 0;
        self.reject = false;
        self.already_rejecting = false;
        self.immediate_ack = false;
        self.nak_received = false;
        self.resetting = false;
        self.fresh_reset = None;
    }
}
