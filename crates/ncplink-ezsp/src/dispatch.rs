//! The notification-dispatch worker.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, error};

use crate::correlator::Notification;
use crate::error::Result;

/// Application code receiving callbacks.
pub trait NotificationHandler {
    fn handle(&mut self, notification: Notification);
}

impl<F> NotificationHandler for F
where
    F: FnMut(Notification),
{
    fn handle(&mut self, notification: Notification) {
        self(notification)
    }
}

/// Handle to a running dispatch worker. Dropping it stops the worker.
pub struct Dispatcher {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn spawn<H>(notifications: Receiver<Notification>, mut handler: H) -> Result<Self>
    where
        H: NotificationHandler + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let worker = thread::Builder::new()
            .name("ncplink-ezsp-dispatch".to_string())
            .spawn(move || {
                loop {
                    let next = select! {
                        recv(notifications) -> msg => msg.ok(),
                        recv(stop_rx) -> _ => None,
                    };
                    match next {
                        Some(notification) => handler.handle(notification),
                        None => break,
                    }
                }
                debug!("notification dispatcher stopped");
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Stop the worker and wait for the handler call in progress, if any.
    ///
    /// Notifications still queued stay on the queue.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel.
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("notification handler panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
