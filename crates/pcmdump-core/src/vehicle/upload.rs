//! Kernel upload and execution.
//!
//! The unlock must already be done. The PCM grants an upload window, then
//! accepts transfer blocks into RAM one at a time, acknowledging each. The
//! final block (offset zero) carries the execute flag and starts the kernel.

use super::{MAX_RECEIVE_ATTEMPTS, MAX_SEND_ATTEMPTS, Vehicle};
use crate::cancel::CancellationToken;
use crate::device::{Device, TimeoutScenario};
use crate::events::{Phase, VehicleEvent, VehicleObserver};
use crate::kernel;
use crate::protocol::constants::*;
use crate::protocol::{Message, Response, ResponseStatus, factory, parser};

impl<D: Device, O: VehicleObserver> Vehicle<D, O> {
    /// Upload `payload` to PCM RAM at `base_address` and start it.
    pub fn execute_kernel(
        &mut self,
        payload: &[u8],
        base_address: u32,
        cancel: &CancellationToken,
    ) -> Response<bool> {
        self.phase(Phase::SpeedNegotiation, Phase::KernelUpload);

        let max_send = self.device.max_send_size() as usize;
        if max_send <= TRANSFER_OVERHEAD {
            self.user(format!(
                "{} cannot carry transfer blocks (max send {max_send})",
                self.device.description()
            ));
            return Response::failure(ResponseStatus::Error);
        }
        if payload.is_empty() || payload.len() > u16::MAX as usize {
            self.user(format!("kernel size {} is not uploadable", payload.len()));
            return Response::failure(ResponseStatus::Error);
        }

        self.device.clear_message_queue();
        let permission = self.query(
            &factory::upload_request(payload.len() as u16, base_address),
            |m| parser::simple_validation(m, PRIORITY_PHYSICAL_0, MODE_UPLOAD_REQUEST),
        );
        if !permission.is_success() {
            self.user("no answer to the upload request");
            return permission;
        }
        if !permission.value {
            self.user("PCM denied the upload request");
            return Response::failure(ResponseStatus::Refused);
        }

        self.device.set_timeout(TimeoutScenario::SendKernel);

        let chunk_size = max_send - TRANSFER_OVERHEAD;
        let blocks = kernel::plan_upload(payload.len(), chunk_size);
        let total = blocks.len() as u64;

        for (index, block) in blocks.iter().enumerate() {
            if cancel.is_cancelled() {
                self.user("upload cancelled");
                return Response::failure(ResponseStatus::Cancelled);
            }

            let message = factory::upload_block(
                payload,
                block.offset,
                block.length,
                base_address + block.offset as u32,
                block.execute,
            );
            if !self.write_to_ram(&message) {
                self.user(format!(
                    "upload block at offset {:#X} was never acknowledged",
                    block.offset
                ));
                return Response::failure(ResponseStatus::Error);
            }

            self.emit(VehicleEvent::Progress {
                phase: Phase::KernelUpload,
                operation: "kernel block".to_string(),
                current: index as u64 + 1,
                total,
            });
        }

        self.debug("kernel resident and started");
        Response::success(true)
    }

    /// Deliver one transfer block, retrying until the PCM acknowledges it.
    fn write_to_ram(&mut self, message: &Message) -> bool {
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            if let Err(e) = self.device.send_message(message) {
                self.debug(format!(
                    "block send attempt {attempt}/{MAX_SEND_ATTEMPTS} failed: {e}"
                ));
                continue;
            }

            for _ in 0..MAX_RECEIVE_ATTEMPTS {
                match self.receive_with_backoff() {
                    Ok(Some(reply)) => {
                        let ack = parser::simple_validation(&reply, PRIORITY_BLOCK, MODE_TRANSFER);
                        if ack.is_success() {
                            if ack.value {
                                return true;
                            }
                            self.debug("PCM rejected the block, resending");
                            break;
                        }
                        self.debug(format!("ignoring [{reply}] while waiting for block ack"));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.debug(format!("adapter fault during block ack wait: {e}"));
                        return false;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;
    use crate::vehicle::tests::test_vehicle;

    const ACK: [u8; 4] = [0x6D, 0xF0, 0x10, 0x76];
    const GRANT: [u8; 4] = [0x6C, 0xF0, 0x10, 0x74];

    // max send 32 -> 20-byte data chunks.
    const CHUNK: usize = 20;

    fn small_device() -> MockDevice {
        MockDevice::with_capabilities(true, 32, 32)
    }

    #[test]
    fn remainder_first_order_on_the_wire() {
        let mock = small_device();
        mock.queue_frame(&GRANT);
        for _ in 0..3 {
            mock.queue_frame(&ACK);
        }

        // 2 full chunks plus 5 remainder bytes.
        let payload: Vec<u8> = (0..(2 * CHUNK + 5) as u32).map(|b| b as u8).collect();
        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.execute_kernel(&payload, 0xFF9000, &CancellationToken::new());
        assert!(r.is_success());

        let sent = mock.sent_frames();
        // upload request + three blocks
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0][3], MODE_UPLOAD_REQUEST);

        let offsets: Vec<u32> = sent[1..]
            .iter()
            .map(|f| u32::from_be_bytes([0, f[7], f[8], f[9]]) - 0xFF9000)
            .collect();
        assert_eq!(offsets, vec![(2 * CHUNK) as u32, CHUNK as u32, 0]);

        // Only the final block carries the execute flag.
        assert_eq!(sent[1][4], SUBMODE_NO_EXECUTE);
        assert_eq!(sent[2][4], SUBMODE_NO_EXECUTE);
        assert_eq!(sent[3][4], SUBMODE_EXECUTE);

        assert_eq!(mock.timeout_log(), vec![TimeoutScenario::SendKernel]);
    }

    #[test]
    fn upload_denied_is_refused() {
        let mock = small_device();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7F, 0x34]);

        let payload = vec![0u8; 40];
        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.execute_kernel(&payload, 0xFF9000, &CancellationToken::new());
        assert_eq!(r.status, ResponseStatus::Refused);
        assert_eq!(mock.sent_frames().len(), 1);
    }

    #[test]
    fn missing_block_ack_fails_after_retries() {
        let mock = small_device();
        mock.queue_frame(&GRANT);
        // First block acked, second never answered.
        mock.queue_frame(&ACK);

        let payload = vec![0u8; 2 * CHUNK];
        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.execute_kernel(&payload, 0xFF9000, &CancellationToken::new());
        assert_eq!(r.status, ResponseStatus::Error);

        // upload request + 1 acked block + MAX_SEND_ATTEMPTS resends of the next.
        assert_eq!(mock.sent_frames().len(), 2 + MAX_SEND_ATTEMPTS);
    }

    #[test]
    fn cancellation_between_blocks() {
        let mock = small_device();
        mock.queue_frame(&GRANT);

        let payload = vec![0u8; 2 * CHUNK];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.execute_kernel(&payload, 0xFF9000, &cancel);
        assert_eq!(r.status, ResponseStatus::Cancelled);
        // Permission was asked, no block went out.
        assert_eq!(mock.sent_frames().len(), 1);
    }
}
