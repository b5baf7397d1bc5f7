//! Turns accepted link payloads into replies and notifications.

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use ncplink_ash::{DeliveryError, PayloadSink};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::frame::{decode, CallbackKind, FrameKind};
use crate::ids::display_name;
use crate::pending::{Completion, PendingTable};

/// An unsolicited event from the coprocessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Sequence number of the frame that carried it. For a sync callback
    /// this is the sequence of the command that polled for it.
    pub sequence: u8,
    pub command_id: u8,
    pub kind: CallbackKind,
    pub data: Bytes,
    /// More callbacks are waiting on the coprocessor.
    pub callback_pending: bool,
}

/// Per-session correlation state shared by callers and the link worker.
pub(crate) struct Correlator {
    sequence: AtomicU8,
    pending: PendingTable,
    notify_tx: Sender<Notification>,
    notify_rx: Receiver<Notification>,
}

impl Correlator {
    pub(crate) fn new(notification_capacity: usize) -> Self {
        let (notify_tx, notify_rx) = crossbeam_channel::bounded(notification_capacity);
        Self {
            sequence: AtomicU8::new(0),
            pending: PendingTable::new(),
            notify_tx,
            notify_rx,
        }
    }

    /// Take the next sequence number. Wraps at 256.
    pub(crate) fn allocate(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// The number the next command will use.
    pub(crate) fn next_sequence(&self) -> u8 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub(crate) fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub(crate) fn notifications(&self) -> Receiver<Notification> {
        self.notify_rx.clone()
    }

    /// Start a fresh session: sequence back to 0, every waiter aborted and
    /// queued notifications dropped.
    pub(crate) fn reinitialize(&self) {
        self.sequence.store(0, Ordering::SeqCst);
        let aborted = self.pending.abort_all();
        let drained = self.notify_rx.try_iter().count();
        if aborted > 0 || drained > 0 {
            debug!(aborted, drained, "correlation state cleared");
        }
    }

    /// Decode one payload and route it.
    pub(crate) fn accept(&self, payload: Bytes) -> Result<(), DecodeError> {
        let frame = decode(&payload, self.next_sequence())?;
        if frame.callback_pending {
            debug!(sequence = frame.sequence, "coprocessor has callbacks pending");
        }

        match frame.kind {
            FrameKind::Response => {
                let sequence = frame.sequence;
                let command_id = frame.command_id;
                if !self.pending.complete(sequence, Completion::Response(frame)) {
                    warn!(
                        sequence,
                        command = %display_name(command_id),
                        "response for a request nobody is waiting on"
                    );
                }
            }
            FrameKind::Callback(kind) => {
                let sequence = frame.sequence;
                self.enqueue(Notification {
                    sequence,
                    command_id: frame.command_id,
                    kind,
                    data: frame.data,
                    callback_pending: frame.callback_pending,
                });
                if kind == CallbackKind::Sync {
                    self.pending.complete(sequence, Completion::CallbackDelivered);
                }
            }
        }
        Ok(())
    }

    fn enqueue(&self, notification: Notification) {
        debug!(
            sequence = notification.sequence,
            callback = %display_name(notification.command_id),
            kind = ?notification.kind,
            "callback received"
        );
        match self.notify_tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => warn!(
                callback = %display_name(dropped.command_id),
                "notification queue full, dropping callback"
            ),
            // We hold the receiver ourselves.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl PayloadSink for Correlator {
    fn deliver(&self, payload: Bytes) -> Result<(), DeliveryError> {
        self.accept(payload).map_err(Into::into)
    }
}
