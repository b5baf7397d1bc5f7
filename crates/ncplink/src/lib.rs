//! Host driver for radio coprocessors speaking EZSP over ASH.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial byte stream to the coprocessor (native port or TCP bridge)
//! - [`ash`]: the ASH link layer (framing, scrambling, ARQ, link worker)
//! - [`ezsp`]: command correlation and callback dispatch on top of the link

/// Re-export transport types.
pub mod transport {
    pub use ncplink_transport::*;
}

/// Re-export link layer types.
pub mod ash {
    pub use ncplink_ash::*;
}

/// Re-export EZSP types.
pub mod ezsp {
    pub use ncplink_ezsp::*;
}
