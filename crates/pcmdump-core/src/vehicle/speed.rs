//! Bus speed negotiation.
//!
//! Switching to 4x is a two-step broadcast: first ask every module for
//! permission, then announce the switch. Any module may veto either step;
//! only after both complete without refusal does the adapter change its own
//! electrical rate. Dropping back to 1x is unconditional.

use std::fmt;

use super::Vehicle;
use crate::device::{Device, TimeoutScenario, VpwSpeed};
use crate::events::VehicleObserver;
use crate::protocol::constants::DEVICE_BROADCAST;
use crate::protocol::{Response, ResponseStatus, factory, parser};

/// Bus speed negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSpeed {
    /// Baseline signaling, nothing in flight.
    Idle1x,
    /// Permission poll / switch announcement in progress.
    Negotiating,
    /// Bus and adapter at 4x.
    Running4x,
    /// Reverting to baseline.
    Exiting4x,
}

impl fmt::Display for BusSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusSpeed::Idle1x => write!(f, "IDLE_1X"),
            BusSpeed::Negotiating => write!(f, "NEGOTIATING"),
            BusSpeed::Running4x => write!(f, "RUNNING_4X"),
            BusSpeed::Exiting4x => write!(f, "EXITING_4X"),
        }
    }
}

impl<D: Device, O: VehicleObserver> Vehicle<D, O> {
    pub fn bus_speed(&self) -> BusSpeed {
        self.bus_speed
    }

    pub(crate) fn set_speed_state(&mut self, state: BusSpeed) {
        if self.bus_speed != state {
            tracing::info!(from = %self.bus_speed, to = %state, "Bus speed transition");
        }
        self.bus_speed = state;
    }

    /// Negotiate the bus to `new_speed`.
    ///
    /// Requesting 4x on an adapter that cannot signal it reports the fact and
    /// returns `Success(false)`: not an error, the caller continues at 1x.
    /// A module refusal is terminal (`Refused`) and the bus stays at 1x.
    pub fn set_vpw_speed(&mut self, new_speed: VpwSpeed) -> Response<bool> {
        match new_speed {
            VpwSpeed::FourX => self.enter_high_speed(),
            VpwSpeed::Standard => self.exit_high_speed(),
        }
    }

    fn enter_high_speed(&mut self) -> Response<bool> {
        if !self.device.supports_4x() {
            self.user(format!(
                "{} cannot signal at 4x; continuing at standard speed",
                self.device.description()
            ));
            return Response::success(false);
        }

        self.set_speed_state(BusSpeed::Negotiating);

        let permission = factory::high_speed_permission_request(DEVICE_BROADCAST);
        if !self.send_with_retry(&permission) {
            self.set_speed_state(BusSpeed::Idle1x);
            return Response::failure(ResponseStatus::Timeout);
        }

        // Every module gets a say. Drain the whole pile of answers and stop
        // on the first dissent.
        loop {
            match self.device.receive_message() {
                Ok(Some(message)) => {
                    let answer = parser::parse_high_speed_permission(&message);
                    if answer.is_valid && !answer.permission_granted {
                        self.user(format!(
                            "module {:02X} refused high-speed operation",
                            answer.device_id
                        ));
                        self.set_speed_state(BusSpeed::Idle1x);
                        return Response::failure(ResponseStatus::Refused);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.user(format!("adapter fault during 4x poll: {e}"));
                    self.set_speed_state(BusSpeed::Idle1x);
                    return Response::failure(ResponseStatus::Error);
                }
            }
        }

        let begin = factory::begin_high_speed(DEVICE_BROADCAST);
        if !self.send_with_retry(&begin) {
            self.set_speed_state(BusSpeed::Idle1x);
            return Response::failure(ResponseStatus::Timeout);
        }

        // A module can still object to the announcement itself.
        loop {
            match self.device.receive_message() {
                Ok(Some(message)) => {
                    let refusal = parser::parse_high_speed_refusal(&message);
                    if refusal.is_success() && refusal.value {
                        self.user("a module refused the switch to 4x");
                        self.set_speed_state(BusSpeed::Idle1x);
                        return Response::failure(ResponseStatus::Refused);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.user(format!("adapter fault during 4x switch: {e}"));
                    self.set_speed_state(BusSpeed::Idle1x);
                    return Response::failure(ResponseStatus::Error);
                }
            }
        }

        if let Err(e) = self.device.set_vpw_speed(VpwSpeed::FourX) {
            self.user(format!("adapter rejected 4x: {e}"));
            self.set_speed_state(BusSpeed::Idle1x);
            return Response::failure(ResponseStatus::Error);
        }
        self.device.set_timeout(TimeoutScenario::ReadMemoryBlock);
        self.set_speed_state(BusSpeed::Running4x);
        self.debug("bus now at 4x");
        Response::success(true)
    }

    fn exit_high_speed(&mut self) -> Response<bool> {
        self.set_speed_state(BusSpeed::Exiting4x);
        if let Err(e) = self.device.set_vpw_speed(VpwSpeed::Standard) {
            self.user(format!("adapter failed to revert to 1x: {e}"));
            self.set_speed_state(BusSpeed::Idle1x);
            return Response::failure(ResponseStatus::Error);
        }
        self.device.set_timeout(TimeoutScenario::ReadProperty);
        self.set_speed_state(BusSpeed::Idle1x);
        Response::success(true)
    }
}
