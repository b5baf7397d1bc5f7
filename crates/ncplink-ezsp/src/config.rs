use std::time::Duration;

use crate::error::{EzspError, Result};

/// Shortest allowed command timeout.
pub const MIN_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);
/// Longest allowed command timeout.
pub const MAX_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);
/// EZSP protocol version this driver speaks.
pub const DEFAULT_PROTOCOL_VERSION: u8 = 4;

/// Configuration for an EZSP session.
#[derive(Debug, Clone)]
pub struct EzspConfig {
    /// How long `send_command` waits for a reply. Default: 3 s.
    pub command_timeout: Duration,
    /// Capacity of the notification queue. Default: 64.
    pub notification_capacity: usize,
}

impl Default for EzspConfig {
    fn default() -> Self {
        Self {
            command_timeout: MIN_COMMAND_TIMEOUT,
            notification_capacity: 64,
        }
    }
}

impl EzspConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_COMMAND_TIMEOUT..=MAX_COMMAND_TIMEOUT).contains(&self.command_timeout) {
            return Err(EzspError::InvalidConfig(format!(
                "command timeout {:?} outside {:?}..={:?}",
                self.command_timeout, MIN_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT
            )));
        }
        if self.notification_capacity == 0 {
            return Err(EzspError::InvalidConfig(
                "notification capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
