//! Reply slots, one per correlation sequence number.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use crate::frame::IncomingFrame;

const SLOTS: usize = 256;

/// How a pending request left the `Pending` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Completion {
    Response(IncomingFrame),
    /// A synchronous callback answered the request; its content went to the
    /// notification queue.
    CallbackDelivered,
    /// A newer request took over the slot.
    Reclaimed,
    /// The link was reset.
    Aborted,
}

struct Slot {
    ticket: u64,
    waiter: Sender<Completion>,
}

/// Fixed table of reply slots indexed by sequence number.
///
/// Each registration gets a ticket so a late `cancel` from a timed-out
/// caller never clears a newer request that reused the same number.
pub(crate) struct PendingTable {
    slots: Mutex<Vec<Option<Slot>>>,
    next_ticket: AtomicU64,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new((0..SLOTS).map(|_| None).collect()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Move `sequence` from free to pending. A request still parked on the
    /// slot is completed with [`Completion::Reclaimed`].
    pub(crate) fn register(&self, sequence: u8) -> (u64, Receiver<Completion>) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let previous = self.lock()[usize::from(sequence)].replace(Slot { ticket, waiter: tx });
        if let Some(stale) = previous {
            warn!(sequence, "reply slot still pending, reclaiming");
            let _ = stale.waiter.try_send(Completion::Reclaimed);
        }
        (ticket, rx)
    }

    /// Hand `completion` to the request waiting on `sequence` and free the
    /// slot. Returns false when nobody was waiting.
    pub(crate) fn complete(&self, sequence: u8, completion: Completion) -> bool {
        match self.lock()[usize::from(sequence)].take() {
            Some(slot) => {
                // The waiter may have given up already; the slot is free either way.
                let _ = slot.waiter.try_send(completion);
                true
            }
            None => false,
        }
    }

    /// Free `sequence` if it still belongs to `ticket`.
    pub(crate) fn cancel(&self, sequence: u8, ticket: u64) -> bool {
        let mut slots = self.lock();
        let slot = &mut slots[usize::from(sequence)];
        if slot.as_ref().is_some_and(|s| s.ticket == ticket) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Complete every pending request with [`Completion::Aborted`].
    pub(crate) fn abort_all(&self) -> usize {
        let mut aborted = 0;
        for slot in self.lock().iter_mut() {
            if let Some(slot) = slot.take() {
                let _ = slot.waiter.try_send(Completion::Aborted);
                aborted += 1;
            }
        }
        aborted
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().iter().filter(|slot| slot.is_some()).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Slot>>> {
        // Slots hold no invariant a panicking holder could break.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
