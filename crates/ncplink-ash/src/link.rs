//! The link-service worker.
//!
//! Two threads per link. The byte pump only reads: it decodes frames from
//! the stream and forwards them as messages. The worker owns the [`Engine`]
//! and the write half of the stream; everything that changes link state,
//! caller submissions included, reaches it over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{select, Receiver, Sender};
use ncplink_transport::SerialStream;
use tracing::{debug, error, info, warn};

use crate::codec::{reset_code_name, Inbound};
use crate::engine::{Engine, LinkCounters, Received};
use crate::error::{AshError, ProtocolFault, Result};
use crate::reader::{is_timeout, FrameReader};
use crate::writer::FrameWriter;

/// Error type a [`PayloadSink`] reports delivery failures with.
pub type DeliveryError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every in-order DATA payload accepted by the link.
///
/// Called on the worker thread; implementations must not block on the link.
/// An error closes the session as a protocol fault.
pub trait PayloadSink: Send + Sync {
    fn deliver(&self, payload: Bytes) -> std::result::Result<(), DeliveryError>;
}

impl<F> PayloadSink for F
where
    F: Fn(Bytes) -> std::result::Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, payload: Bytes) -> std::result::Result<(), DeliveryError> {
        self(payload)
    }
}

/// Timing of the link worker.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Service tick period. Also the read timeout of the byte pump.
    pub tick_interval: Duration,
    /// Age after which an unacknowledged frame is resent.
    pub retransmit_timeout: Duration,
    /// RST frames sent before giving up.
    pub reset_attempts: u32,
    /// How long to wait for RSTACK after each RST.
    pub reset_timeout: Duration,
    /// How long one frame write may block, e.g. while CTS is held off.
    pub write_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            retransmit_timeout: Duration::from_millis(1000),
            reset_attempts: 5,
            reset_timeout: Duration::from_millis(3000),
            write_timeout: Duration::from_millis(1000),
        }
    }
}

enum Request {
    Submit {
        payload: Bytes,
        reply: Sender<Result<()>>,
    },
    Reset {
        reply: Sender<Result<u8>>,
    },
    Counters {
        reply: Sender<LinkCounters>,
    },
    Shutdown,
}

enum PumpEvent {
    Inbound(Inbound),
    Failed(AshError),
}

/// Handle to a running ASH link.
///
/// Dropping the handle shuts both threads down.
pub struct Link {
    requests: Sender<Request>,
    faults: Receiver<AshError>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl Link {
    /// Start the worker and byte pump on `stream`.
    ///
    /// The link starts disconnected; call [`Link::reset`] before submitting.
    pub fn spawn(
        mut stream: SerialStream,
        config: LinkConfig,
        sink: Arc<dyn PayloadSink>,
    ) -> Result<Self> {
        stream.discard_input()?;
        let mut read_half = stream.try_clone()?;
        read_half.set_read_timeout(Some(config.tick_interval))?;
        stream.set_write_timeout(Some(config.write_timeout))?;

        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (fault_tx, fault_rx) = crossbeam_channel::unbounded();
        let connected = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        debug!(transport = stream.transport_name(), "starting link");

        let pump = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("ncplink-ash-rx".to_string())
                .spawn(move || pump_main(FrameReader::new(read_half), inbound_tx, stop))?
        };

        let worker = Worker {
            engine: Engine::new(config.retransmit_timeout),
            writer: FrameWriter::new(stream),
            sink,
            faults: fault_tx,
            connected: Arc::clone(&connected),
            reset: None,
            config,
        };
        let worker = match thread::Builder::new()
            .name("ncplink-ash-worker".to_string())
            .spawn(move || worker.run(request_rx, inbound_rx))
        {
            Ok(handle) => handle,
            Err(err) => {
                stop.store(true, Ordering::SeqCst);
                let _ = pump.join();
                return Err(err.into());
            }
        };

        Ok(Self {
            requests: request_tx,
            faults: fault_rx,
            connected,
            stop,
            worker: Some(worker),
            pump: Some(pump),
        })
    }

    /// Queue a payload for reliable delivery.
    ///
    /// Returns once the payload has a window slot, not when it is
    /// acknowledged.
    pub fn submit(&self, payload: impl Into<Bytes>) -> Result<()> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.request(Request::Submit {
            payload: payload.into(),
            reply,
        })?;
        rx.recv().map_err(|_| AshError::Shutdown)?
    }

    /// Run the reset handshake (blocking) and return the coprocessor's
    /// reset code.
    ///
    /// Exhausting the configured attempts is fatal: the worker stops and
    /// the link must be recreated.
    pub fn reset(&self) -> Result<u8> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.request(Request::Reset { reply })?;
        rx.recv().map_err(|_| AshError::Shutdown)?
    }

    /// Session-ending errors not tied to a specific call. Each is delivered
    /// once.
    pub fn faults(&self) -> Receiver<AshError> {
        self.faults.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Snapshot of the traffic counters.
    pub fn counters(&self) -> Result<LinkCounters> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.request(Request::Counters { reply })?;
        rx.recv().map_err(|_| AshError::Shutdown)
    }

    /// Stop both threads and wait for them.
    pub fn shutdown(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("link worker panicked");
            }
        }
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                error!("link reader panicked");
            }
        }
    }

    fn request(&self, request: Request) -> Result<()> {
        self.requests.send(request).map_err(|_| AshError::Shutdown)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump_main(mut reader: FrameReader<SerialStream>, events: Sender<PumpEvent>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        let event = match reader.read_frame() {
            Ok(item) => PumpEvent::Inbound(item),
            Err(err) if is_timeout(&err) => continue,
            Err(err) => PumpEvent::Failed(err),
        };
        let failed = matches!(event, PumpEvent::Failed(_));
        if events.send(event).is_err() || failed {
            break;
        }
    }
    debug!("link reader stopped");
}

struct PendingReset {
    reply: Sender<Result<u8>>,
    attempt: u32,
    deadline: Instant,
}

enum Step {
    Continue,
    Stop,
}

struct Worker {
    engine: Engine,
    writer: FrameWriter<SerialStream>,
    sink: Arc<dyn PayloadSink>,
    faults: Sender<AshError>,
    connected: Arc<AtomicBool>,
    reset: Option<PendingReset>,
    config: LinkConfig,
}

impl Worker {
    fn run(mut self, requests: Receiver<Request>, inbound: Receiver<PumpEvent>) {
        let mut next_tick = Instant::now() + self.config.tick_interval;
        loop {
            let mut wake = next_tick;
            if let Some(reset) = &self.reset {
                wake = wake.min(reset.deadline);
            }
            let timeout = wake.saturating_duration_since(Instant::now());

            let step = select! {
                recv(requests) -> msg => match msg {
                    Ok(request) => self.handle_request(request),
                    Err(_) => Step::Stop,
                },
                recv(inbound) -> msg => match msg {
                    Ok(event) => self.handle_event(event),
                    Err(_) => self.fatal(AshError::ConnectionClosed),
                },
                default(timeout) => Step::Continue,
            };
            if matches!(step, Step::Stop) {
                break;
            }

            let now = Instant::now();
            if matches!(self.check_reset(now), Step::Stop) {
                break;
            }
            if let Err(err) = self.service(now) {
                self.fatal(err);
                break;
            }
            if now >= next_tick {
                next_tick = now + self.config.tick_interval;
            }
            self.connected
                .store(self.engine.is_connected(), Ordering::SeqCst);
        }

        self.connected.store(false, Ordering::SeqCst);
        if let Some(reset) = self.reset.take() {
            let _ = reset.reply.send(Err(AshError::Shutdown));
        }
        debug!("link worker stopped");
    }

    fn handle_request(&mut self, request: Request) -> Step {
        match request {
            Request::Submit { payload, reply } => {
                let _ = reply.send(self.engine.submit(payload));
                Step::Continue
            }
            Request::Reset { reply } => {
                if self.reset.is_some() {
                    let _ = reply.send(Err(AshError::ResetInProgress));
                    return Step::Continue;
                }
                self.connected.store(false, Ordering::SeqCst);
                info!("resetting link");
                self.reset = Some(PendingReset {
                    reply,
                    attempt: 0,
                    deadline: Instant::now(),
                });
                if let Err(err) = self.writer.send_cancel() {
                    return self.fatal(err);
                }
                self.send_reset()
            }
            Request::Counters { reply } => {
                let _ = reply.send(self.engine.counters());
                Step::Continue
            }
            Request::Shutdown => Step::Stop,
        }
    }

    fn send_reset(&mut self) -> Step {
        let frame = self.engine.begin_reset();
        if let Err(err) = self.writer.write_frame(&frame) {
            return self.fatal(err);
        }
        if let Some(reset) = &mut self.reset {
            reset.attempt += 1;
            reset.deadline = Instant::now() + self.config.reset_timeout;
            debug!(attempt = reset.attempt, "sent RST");
        }
        Step::Continue
    }

    fn check_reset(&mut self, now: Instant) -> Step {
        let Some(reset) = &self.reset else {
            return Step::Continue;
        };
        if now < reset.deadline {
            return Step::Continue;
        }
        if reset.attempt < self.config.reset_attempts {
            warn!(attempt = reset.attempt, "no RSTACK, retrying reset");
            return self.send_reset();
        }
        let attempts = reset.attempt;
        self.engine.abandon_reset();
        self.fatal(AshError::ResetFailed { attempts })
    }

    fn handle_event(&mut self, event: PumpEvent) -> Step {
        let received = match event {
            PumpEvent::Inbound(Inbound::Frame(frame)) => self.engine.receive(frame),
            PumpEvent::Inbound(Inbound::Corrupt(reason)) => {
                self.engine.corrupt(reason);
                return Step::Continue;
            }
            PumpEvent::Inbound(Inbound::Invalid(fault)) => self.engine.invalid(fault),
            PumpEvent::Failed(err) => return self.fatal(err),
        };
        self.handle_received(received)
    }

    fn handle_received(&mut self, received: Received) -> Step {
        match received {
            Received::Nothing => Step::Continue,
            Received::Payload(payload) => match self.sink.deliver(payload) {
                Ok(()) => Step::Continue,
                Err(err) => {
                    let received = self.engine.fault(ProtocolFault::Delivery(err.to_string()));
                    self.handle_received(received)
                }
            },
            Received::ResetComplete { code } => {
                self.connected.store(true, Ordering::SeqCst);
                if let Some(reset) = self.reset.take() {
                    debug!(code, reason = reset_code_name(code), attempt = reset.attempt, "RSTACK");
                    let _ = reset.reply.send(Ok(code));
                }
                Step::Continue
            }
            Received::Fault(fault) => {
                self.connected.store(false, Ordering::SeqCst);
                let _ = self.faults.send(AshError::Protocol(fault));
                Step::Continue
            }
            Received::PeerError { version, code } => {
                self.fatal(AshError::PeerError { version, code })
            }
        }
    }

    fn service(&mut self, now: Instant) -> Result<()> {
        for frame in self.engine.tick(now) {
            self.writer.write_frame(&frame)?;
        }
        Ok(())
    }

    /// Surface `err` once and stop the worker.
    fn fatal(&mut self, err: AshError) -> Step {
        error!(%err, "link failed");
        self.connected.store(false, Ordering::SeqCst);
        match self.reset.take() {
            Some(reset) => {
                let _ = reset.reply.send(Err(err));
            }
            None => {
                let _ = self.faults.send(err);
            }
        }
        Step::Stop
    }
}
