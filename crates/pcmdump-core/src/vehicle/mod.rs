//! The protocol engine.
//!
//! [`Vehicle`] owns the pass-through device for the duration of an operation
//! sequence and drives every multi-step exchange: property queries, unlock,
//! bus speed negotiation, kernel upload and the full flash read-out.
//!
//! Correlation on this bus is positional: there are no transaction ids, the
//! next matching-shape response after a send is that send's reply. Sensitive
//! sequences therefore start by draining the adapter's inbound queue.

pub mod properties;
pub mod read;
pub mod speed;
pub mod unlock;
pub mod upload;

pub use read::PcmInfo;
pub use speed::BusSpeed;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceError, TimeoutScenario, VpwSpeed};
use crate::events::{PacketDirection, Phase, TracingObserver, VehicleEvent, VehicleObserver};
use crate::protocol::{Message, Response, ResponseStatus, factory};

/// Sends of one message are retried this many times before giving up.
pub const MAX_SEND_ATTEMPTS: usize = 10;

/// Receive windows consumed while hunting for one expected response.
pub const MAX_RECEIVE_ATTEMPTS: usize = 15;

/// Empty receive polls before a window is declared dry.
const RECEIVE_POLLS: usize = 10;

/// Tool-present keep-alive cadence during the image read, in blocks.
const TOOL_PRESENT_INTERVAL: usize = 10;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// Where the kernel is loaded and started in PCM RAM.
    pub kernel_base_address: u32,
    /// Pause between empty receive polls.
    #[serde(skip, default = "default_backoff")]
    pub receive_backoff: Duration,
}

fn default_backoff() -> Duration {
    Duration::from_millis(10)
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            kernel_base_address: 0xFF913E,
            receive_backoff: default_backoff(),
        }
    }
}

/// The protocol engine. Owns its device exclusively; the device is released
/// when the engine is dropped.
pub struct Vehicle<D: Device, O: VehicleObserver> {
    pub(crate) device: D,
    observer: Arc<O>,
    pub(crate) config: VehicleConfig,
    pub(crate) bus_speed: BusSpeed,
}

impl<D: Device> Vehicle<D, TracingObserver> {
    /// Engine with default configuration, logging through `tracing`.
    pub fn new(device: D) -> Self {
        Self::with_observer(device, Arc::new(TracingObserver), VehicleConfig::default())
    }
}

impl<D: Device, O: VehicleObserver> Vehicle<D, O> {
    pub fn with_observer(device: D, observer: Arc<O>, config: VehicleConfig) -> Self {
        Self {
            device,
            observer,
            config,
            bus_speed: BusSpeed::Idle1x,
        }
    }

    /// Bring the adapter up.
    pub fn initialize(&mut self) -> Result<(), DeviceError> {
        self.device.initialize()
    }

    pub fn device_description(&self) -> String {
        self.device.description().to_string()
    }

    /// Release the device back to the caller.
    pub fn into_device(self) -> D {
        self.device
    }

    pub(crate) fn emit(&self, event: VehicleEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn user(&self, message: impl Into<String>) {
        self.emit(VehicleEvent::UserMessage(message.into()));
    }

    pub(crate) fn debug(&self, message: impl Into<String>) {
        self.emit(VehicleEvent::DebugMessage(message.into()));
    }

    pub(crate) fn phase(&self, from: Phase, to: Phase) {
        self.emit(VehicleEvent::PhaseChanged { from, to });
    }

    /// Transmit one message, retrying on transport failures.
    pub(crate) fn send_with_retry(&mut self, message: &Message) -> bool {
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match self.device.send_message(message) {
                Ok(()) => {
                    self.emit(VehicleEvent::Packet {
                        direction: PacketDirection::Tx,
                        length: message.len(),
                    });
                    return true;
                }
                Err(e) => {
                    self.debug(format!(
                        "send attempt {attempt}/{MAX_SEND_ATTEMPTS} failed: {e}"
                    ));
                }
            }
        }
        false
    }

    /// One receive window: poll the adapter, backing off briefly between
    /// empty polls, until a message arrives or the window is dry.
    pub(crate) fn receive_with_backoff(&mut self) -> Result<Option<Message>, DeviceError> {
        for _ in 0..RECEIVE_POLLS {
            match self.device.receive_message()? {
                Some(message) => {
                    self.emit(VehicleEvent::Packet {
                        direction: PacketDirection::Rx,
                        length: message.len(),
                    });
                    return Ok(Some(message));
                }
                None => {
                    if !self.config.receive_backoff.is_zero() {
                        thread::sleep(self.config.receive_backoff);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Send one request and parse the first matching response.
    ///
    /// Strays are ignored; the first `Success` wins. `Timeout` when the send
    /// never goes through or no matching response arrives.
    pub(crate) fn query<T, F>(&mut self, request: &Message, parse: F) -> Response<T>
    where
        T: Default,
        F: Fn(&Message) -> Response<T>,
    {
        if !self.send_with_retry(request) {
            return Response::failure(ResponseStatus::Timeout);
        }
        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            match self.receive_with_backoff() {
                Ok(Some(message)) => {
                    let parsed = parse(&message);
                    if parsed.is_success() {
                        return parsed;
                    }
                    self.debug(format!("ignoring [{message}]: {}", parsed.status));
                }
                Ok(None) => {}
                Err(e) => {
                    self.user(format!("adapter fault: {e}"));
                    return Response::failure(ResponseStatus::Error);
                }
            }
        }
        Response::failure(ResponseStatus::Timeout)
    }

    /// Broadcast the tool-present keep-alive. Fire and forget.
    pub fn notify_tool_present(&mut self) {
        let message = factory::tool_present();
        if let Err(e) = self.device.send_message(&message) {
            self.debug(format!("tool-present send failed: {e}"));
        }
    }

    /// Tell all modules to stop normal traffic before a long transfer.
    pub fn suppress_chatter(&mut self) {
        if !self.send_with_retry(&factory::suppress_chatter()) {
            self.debug("chatter suppression not acknowledged by adapter");
        }
    }

    /// Return the bus and the PCM to their normal state.
    ///
    /// Runs on every exit path of a read-out, including cancellation, and is
    /// safe to call repeatedly: exit the kernel at 4x when the adapter can
    /// speak it, drop back to 1x, exit again, then clear trouble codes.
    pub fn cleanup(&mut self) {
        self.phase(self.current_phase(), Phase::Cleanup);

        if self.device.supports_4x() && !self.send_with_retry(&factory::exit_kernel()) {
            self.debug("exit-kernel at 4x not sent");
        }

        if let Err(e) = self.device.set_vpw_speed(VpwSpeed::Standard) {
            self.debug(format!("speed revert failed: {e}"));
        }
        self.device.set_timeout(TimeoutScenario::ReadProperty);
        self.set_speed_state(BusSpeed::Idle1x);

        if !self.send_with_retry(&factory::exit_kernel()) {
            self.debug("exit-kernel at 1x not sent");
        }
        if !self.send_with_retry(&factory::clear_dtcs()) {
            self.debug("clear-DTCs not sent");
        }
        if !self.send_with_retry(&factory::clear_dtcs_ok()) {
            self.debug("clear-DTCs acknowledge not sent");
        }
    }

    fn current_phase(&self) -> Phase {
        match self.bus_speed {
            BusSpeed::Running4x => Phase::ImageRead,
            _ => Phase::Idle,
        }
    }
}
