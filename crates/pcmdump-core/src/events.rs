//! Event system for UI decoupling.
//!
//! CLI/GUI front-ends subscribe to engine events without tight coupling to
//! the protocol logic. User-facing and debug log messages travel the same
//! channel.

use std::fmt;

/// Engine phases, in the order a full read-out passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// VIN / serial / BCC / MEC / id-word queries.
    PropertyQuery,
    /// Seed/key exchange.
    Unlock,
    /// 1x/4x bus speed negotiation.
    SpeedNegotiation,
    /// Kernel upload into PCM RAM.
    KernelUpload,
    /// Flash image read-out through the kernel.
    ImageRead,
    /// Exit-kernel / speed-revert / DTC-clear sequence.
    Cleanup,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::PropertyQuery => write!(f, "Property Query"),
            Phase::Unlock => write!(f, "Unlock"),
            Phase::SpeedNegotiation => write!(f, "Speed Negotiation"),
            Phase::KernelUpload => write!(f, "Kernel Upload"),
            Phase::ImageRead => write!(f, "Image Read"),
            Phase::Cleanup => write!(f, "Cleanup"),
            Phase::Complete => write!(f, "Complete"),
        }
    }
}

/// Bus message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx,
    Rx,
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted by the engine.
#[derive(Debug, Clone)]
pub enum VehicleEvent {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    /// Progress of a long operation (upload blocks, read blocks).
    Progress {
        phase: Phase,
        operation: String,
        current: u64,
        total: u64,
    },
    /// Something the operator should read.
    UserMessage(String),
    /// Retry chatter and wire-level detail.
    DebugMessage(String),
    /// One message crossed the bus.
    Packet {
        direction: PacketDirection,
        length: usize,
    },
    Complete,
}

/// Observer trait for receiving engine events.
pub trait VehicleObserver: Send + Sync {
    fn on_event(&self, event: &VehicleEvent);
}

/// Discards all events.
pub struct NullObserver;

impl VehicleObserver for NullObserver {
    fn on_event(&self, _event: &VehicleEvent) {}
}

/// Forwards events to `tracing`.
pub struct TracingObserver;

impl VehicleObserver for TracingObserver {
    fn on_event(&self, event: &VehicleEvent) {
        match event {
            VehicleEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            VehicleEvent::Progress {
                phase,
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 { (*current * 100) / *total } else { 0 };
                tracing::debug!(phase = %phase, operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            VehicleEvent::UserMessage(message) => {
                tracing::info!("{}", message);
            }
            VehicleEvent::DebugMessage(message) => {
                tracing::debug!("{}", message);
            }
            VehicleEvent::Packet { direction, length } => {
                tracing::trace!(dir = %direction, len = length, "Bus message");
            }
            VehicleEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}
