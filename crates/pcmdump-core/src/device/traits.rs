//! Pass-through adapter abstraction.
//!
//! The engine talks to the vehicle bus only through the [`Device`] trait:
//! one framed message out, one framed message in, plus bus-speed and timeout
//! control. Concrete adapter drivers (ELM327-class serial devices and
//! friends) live outside this crate; the [`MockDevice`](super::MockDevice)
//! implementation covers tests and bench runs.

use thiserror::Error;

use crate::protocol::Message;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("adapter not initialized")]
    NotInitialized,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("adapter disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// VPW signaling rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpwSpeed {
    /// Baseline 10.4 kbit/s signaling.
    Standard,
    /// Four-times signaling; both sides must agree before switching.
    FourX,
}

/// Receive-latency class for the adapter's read window.
///
/// The engine never hard-codes milliseconds; the adapter maps each scenario
/// to whatever its link needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScenario {
    /// Short single-message property queries.
    ReadProperty,
    /// Kernel-served memory block reads.
    ReadMemoryBlock,
    /// Streamed kernel upload, the longest window.
    SendKernel,
}

/// Capability contract for a pass-through adapter.
///
/// The engine owns its device exclusively for the duration of an operation
/// sequence; release happens through `Drop`. Implementations are not expected
/// to tolerate concurrent use.
pub trait Device {
    /// Bring the adapter to a usable state.
    fn initialize(&mut self) -> Result<(), DeviceError>;

    /// Transmit one framed message (no trailing bus CRC).
    fn send_message(&mut self, message: &Message) -> Result<(), DeviceError>;

    /// Receive one framed message; `None` when nothing arrived within the
    /// current timeout scenario.
    fn receive_message(&mut self) -> Result<Option<Message>, DeviceError>;

    /// Drop any buffered inbound messages. Response correlation on this bus
    /// is positional, so sensitive sequences start with a drained queue.
    fn clear_message_queue(&mut self);

    /// Select the receive-latency class for subsequent reads.
    fn set_timeout(&mut self, scenario: TimeoutScenario);

    /// Change the adapter's own electrical signaling rate.
    fn set_vpw_speed(&mut self, speed: VpwSpeed) -> Result<(), DeviceError>;

    /// Whether the adapter hardware can signal at 4x.
    fn supports_4x(&self) -> bool;

    /// Largest frame the adapter can transmit, including framing overhead.
    fn max_send_size(&self) -> u16;

    /// Largest frame the adapter can receive, including framing overhead.
    fn max_receive_size(&self) -> u16;

    /// Human-readable adapter name for logs.
    fn description(&self) -> &str;
}
