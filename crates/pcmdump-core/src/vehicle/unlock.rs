//! Seed/key unlock.
//!
//! The PCM guards privileged modes behind a challenge: it hands out a 16-bit
//! seed, the tool answers with the family-specific key. A seed of zero (or
//! the PCM's already-unlocked report) short-circuits the exchange.

use super::{MAX_RECEIVE_ATTEMPTS, Vehicle};
use crate::device::{Device, TimeoutScenario};
use crate::events::{Phase, VehicleObserver};
use crate::key::KeyAlgorithm;
use crate::protocol::{Response, ResponseStatus, factory, parser};

impl<D: Device, O: VehicleObserver> Vehicle<D, O> {
    /// Run the unlock exchange using the key algorithm the caller supplies.
    ///
    /// `algorithm_id` comes from the vehicle family's [`PcmInfo`]
    /// (see [`super::PcmInfo::key_algorithm_id`]).
    pub fn unlock(&mut self, algorithm_id: u16, algorithm: &dyn KeyAlgorithm) -> Response<bool> {
        self.phase(Phase::Idle, Phase::Unlock);
        self.device.set_timeout(TimeoutScenario::ReadProperty);
        self.device.clear_message_queue();

        if !self.send_with_retry(&factory::seed_request()) {
            self.user("seed request could not be sent");
            return Response::failure(ResponseStatus::Timeout);
        }

        let mut seed = None;
        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            match self.receive_with_backoff() {
                Ok(Some(message)) => {
                    if parser::is_unlocked(&message) {
                        self.user("PCM is already unlocked");
                        return Response::success(true);
                    }
                    let parsed = parser::parse_seed(&message);
                    if parsed.is_success() {
                        seed = Some(parsed.value);
                        break;
                    }
                    self.debug(format!("ignoring [{message}] while waiting for seed"));
                }
                Ok(None) => {}
                Err(e) => {
                    self.user(format!("adapter fault during seed request: {e}"));
                    return Response::failure(ResponseStatus::Error);
                }
            }
        }

        let Some(seed) = seed else {
            self.user("no seed response from PCM");
            return Response::failure(ResponseStatus::Timeout);
        };

        if seed == 0 {
            self.user("PCM reports no unlock required");
            return Response::success(true);
        }

        let key = algorithm.derive(algorithm_id, seed);
        self.debug(format!("seed {seed:04X}, sending key (algorithm {algorithm_id})"));

        if !self.send_with_retry(&factory::unlock_request(key)) {
            self.user("unlock request could not be sent");
            return Response::failure(ResponseStatus::Timeout);
        }

        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            match self.receive_with_backoff() {
                Ok(Some(message)) => {
                    let verdict = parser::parse_unlock_response(&message);
                    match verdict.status {
                        ResponseStatus::Success => {
                            self.user("PCM unlocked");
                            return verdict;
                        }
                        ResponseStatus::Error => {
                            self.user("PCM rejected the key");
                            return verdict;
                        }
                        ResponseStatus::Timeout => {
                            self.user("PCM is in its unlock lockout window; wait and retry");
                            return verdict;
                        }
                        _ => {
                            self.debug(format!("ignoring [{message}] while waiting for unlock verdict"));
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.user(format!("adapter fault during unlock: {e}"));
                    return Response::failure(ResponseStatus::Error);
                }
            }
        }

        self.user("no answer to the unlock request");
        Response::failure(ResponseStatus::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;
    use crate::key::SeedComplement;
    use crate::vehicle::tests::test_vehicle;

    #[test]
    fn unlock_with_derived_key() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x12, 0x34]);
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x34]);

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.unlock(40, &SeedComplement);
        assert!(r.is_success());
        assert!(r.value);

        let sent = mock.sent_frames();
        assert_eq!(sent[0], vec![0x6C, 0x10, 0xF0, 0x27, 0x01]);
        // Key for seed 0x1234 under the complement algorithm.
        assert_eq!(sent[1], vec![0x6C, 0x10, 0xF0, 0x27, 0x02, 0xED, 0xCB]);
        assert_eq!(mock.clear_calls(), 1);
    }

    #[test]
    fn already_unlocked_short_circuits() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x37]);

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.unlock(40, &SeedComplement);
        assert!(r.is_success());
        // No key was ever sent.
        assert_eq!(mock.sent_frames().len(), 1);
    }

    #[test]
    fn zero_seed_means_no_unlock_needed() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x00, 0x00]);

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.unlock(40, &SeedComplement);
        assert!(r.is_success());
        assert_eq!(mock.sent_frames().len(), 1);
    }

    #[test]
    fn rejected_key_is_terminal() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x12, 0x34]);
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x36]);

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.unlock(40, &SeedComplement);
        assert_eq!(r.status, ResponseStatus::Error);
        assert!(!r.value);
    }

    #[test]
    fn strays_are_skipped_while_waiting_for_seed() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7C, 0x0A, b'A', b'B', b'C', b'D']);
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0xAB, 0xCD]);
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x34]);

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.unlock(40, &SeedComplement);
        assert!(r.is_success());
    }

    #[test]
    fn silence_times_out() {
        let mock = MockDevice::new();
        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.unlock(40, &SeedComplement);
        assert_eq!(r.status, ResponseStatus::Timeout);
    }
}
