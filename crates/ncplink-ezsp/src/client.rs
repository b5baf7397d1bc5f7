use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use ncplink_ash::{AshError, Link, LinkConfig, LinkCounters, PayloadSink};
use ncplink_transport::SerialStream;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EzspConfig;
use crate::correlator::{Correlator, Notification};
use crate::dispatch::{Dispatcher, NotificationHandler};
use crate::error::{EzspError, Result};
use crate::frame::encode_command;
use crate::ids::{display_name, CALLBACK, INVALID_COMMAND, VERSION};
use crate::pending::Completion;

/// A response frame answering a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub sequence: u8,
    pub command_id: u8,
    pub data: Bytes,
    pub callback_pending: bool,
}

impl Response {
    /// Check that this answers `command_id`.
    ///
    /// An `invalidCommand` reply becomes [`EzspError::InvalidCommand`].
    pub fn expect(self, command_id: u8) -> Result<Self> {
        if self.command_id == INVALID_COMMAND && command_id != INVALID_COMMAND {
            return match self.data.as_ref() {
                [status] => Err(EzspError::InvalidCommand {
                    command: command_id,
                    status: *status,
                }),
                other => Err(EzspError::UnexpectedLength {
                    command: INVALID_COMMAND,
                    expected: 1,
                    actual: other.len(),
                }),
            };
        }
        if self.command_id != command_id {
            return Err(EzspError::UnexpectedResponse {
                expected: command_id,
                actual: self.command_id,
            });
        }
        Ok(self)
    }

    /// [`Response::expect`] plus an exact parameter length check.
    pub fn expect_len(self, command_id: u8, len: usize) -> Result<Self> {
        let response = self.expect(command_id)?;
        if response.data.len() != len {
            return Err(EzspError::UnexpectedLength {
                command: command_id,
                expected: len,
                actual: response.data.len(),
            });
        }
        Ok(response)
    }
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Response(Response),
    /// A synchronous callback took the reply slot. Its content is on the
    /// notification queue.
    CallbackDelivered,
}

impl Reply {
    /// The response, or [`EzspError::CallbackInsteadOfResponse`].
    pub fn into_response(self, command_id: u8) -> Result<Response> {
        match self {
            Reply::Response(response) => Ok(response),
            Reply::CallbackDelivered => Err(EzspError::CallbackInsteadOfResponse {
                command: command_id,
            }),
        }
    }
}

/// Answer to the `version` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub protocol_version: u8,
    pub stack_type: u8,
    pub stack_version: u16,
}

impl VersionInfo {
    /// Stack version as dotted nibbles, e.g. `0x6700` -> `6.7.0.0`.
    pub fn stack_version_string(&self) -> String {
        let v = self.stack_version;
        format!(
            "{}.{}.{}.{}",
            (v >> 12) & 0xF,
            (v >> 8) & 0xF,
            (v >> 4) & 0xF,
            v & 0xF
        )
    }
}

/// An EZSP session over an ASH link.
///
/// Commands may be sent from any thread. Dropping the session stops the
/// link.
pub struct Ezsp {
    link: Link,
    correlator: Arc<Correlator>,
    config: EzspConfig,
}

impl Ezsp {
    /// Start the link on `stream`. Call [`Ezsp::reset`] before sending.
    pub fn open(stream: SerialStream, link_config: LinkConfig, config: EzspConfig) -> Result<Self> {
        config.validate()?;
        let correlator = Arc::new(Correlator::new(config.notification_capacity));
        let sink: Arc<dyn PayloadSink> = correlator.clone();
        let link = Link::spawn(stream, link_config, sink)?;
        Ok(Self {
            link,
            correlator,
            config,
        })
    }

    /// Reset the link and start a fresh correlation session. Returns the
    /// coprocessor's reset code.
    pub fn reset(&self) -> Result<u8> {
        let aborted = self.correlator.pending().abort_all();
        if aborted > 0 {
            debug!(aborted, "aborting requests for link reset");
        }
        let code = self.link.reset()?;
        self.correlator.reinitialize();
        info!(code, "ezsp session ready");
        Ok(code)
    }

    /// Send a command and wait up to the configured timeout for its reply.
    pub fn send_command(&self, command_id: u8, data: &[u8]) -> Result<Reply> {
        self.send_command_with_timeout(command_id, data, self.config.command_timeout)
    }

    /// Send a command and wait up to `timeout` for its reply.
    ///
    /// On timeout the reply slot is freed; a late reply is logged and
    /// dropped.
    pub fn send_command_with_timeout(
        &self,
        command_id: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Reply> {
        let sequence = self.correlator.allocate();
        let (ticket, reply) = self.correlator.pending().register(sequence);

        debug!(sequence, command = %display_name(command_id), len = data.len(), "sending command");
        if let Err(err) = self.link.submit(encode_command(sequence, command_id, data)) {
            self.correlator.pending().cancel(sequence, ticket);
            return Err(err.into());
        }

        match reply.recv_timeout(timeout) {
            Ok(Completion::Response(frame)) => Ok(Reply::Response(Response {
                sequence: frame.sequence,
                command_id: frame.command_id,
                data: frame.data,
                callback_pending: frame.callback_pending,
            })),
            Ok(Completion::CallbackDelivered) => Ok(Reply::CallbackDelivered),
            Ok(Completion::Reclaimed) => Err(EzspError::SlotReclaimed { sequence }),
            Ok(Completion::Aborted) => Err(EzspError::Aborted),
            Err(RecvTimeoutError::Timeout) => {
                self.correlator.pending().cancel(sequence, ticket);
                warn!(sequence, command = %display_name(command_id), "command timed out");
                Err(EzspError::CommandTimeout {
                    command: command_id,
                    sequence,
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(EzspError::Shutdown),
        }
    }

    /// Negotiate the protocol version.
    ///
    /// Fails with [`EzspError::ProtocolVersion`] if the coprocessor answers
    /// with a different version than `desired`.
    pub fn version(&self, desired: u8) -> Result<VersionInfo> {
        let response = self
            .send_command(VERSION, &[desired])?
            .into_response(VERSION)?
            .expect_len(VERSION, 4)?;
        let data = response.data.as_ref();
        let info = VersionInfo {
            protocol_version: data[0],
            stack_type: data[1],
            stack_version: u16::from_le_bytes([data[2], data[3]]),
        };
        if info.protocol_version != desired {
            return Err(EzspError::ProtocolVersion {
                desired,
                actual: info.protocol_version,
            });
        }
        debug!(
            protocol = info.protocol_version,
            stack_type = info.stack_type,
            stack = %info.stack_version_string(),
            "version negotiated"
        );
        Ok(info)
    }

    /// Ask the coprocessor for its queued callbacks.
    ///
    /// The callback itself arrives on the notification queue; a plain
    /// response to this command is an error.
    pub fn poll_callbacks(&self) -> Result<()> {
        match self.send_command(CALLBACK, &[])? {
            Reply::CallbackDelivered => Ok(()),
            Reply::Response(response) => {
                response.expect(CALLBACK)?;
                Err(EzspError::ResponseInsteadOfCallback { command: CALLBACK })
            }
        }
    }

    /// Receiver of callbacks. All clones share one queue.
    pub fn notifications(&self) -> Receiver<Notification> {
        self.correlator.notifications()
    }

    /// Start a worker that hands every notification to `handler`.
    pub fn spawn_dispatcher<H>(&self, handler: H) -> Result<Dispatcher>
    where
        H: NotificationHandler + Send + 'static,
    {
        Dispatcher::spawn(self.notifications(), handler)
    }

    /// Session-ending link errors, each delivered once.
    pub fn faults(&self) -> Receiver<AshError> {
        self.link.faults()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn counters(&self) -> Result<LinkCounters> {
        Ok(self.link.counters()?)
    }

    pub fn config(&self) -> &EzspConfig {
        &self.config
    }

    /// Stop the link. Pending requests fail with [`EzspError::Aborted`].
    pub fn shutdown(&mut self) {
        self.correlator.pending().abort_all();
        self.link.shutdown();
    }
}

impl std::fmt::Debug for Ezsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ezsp")
            .field("connected", &self.is_connected())
            .field("next_sequence", &self.correlator.next_sequence())
            .field("config", &self.config)
            .finish()
    }
}
