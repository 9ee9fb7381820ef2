//! Full flash image read-out.
//!
//! The heavy lifting happens inside the PCM: an uploaded kernel serves
//! memory reads block by block. The engine walks the image range, verifies
//! every payload's address and checksum, and assembles the result. Whatever
//! happens, the exit path runs [`Vehicle::cleanup`] so the bus is left at 1x
//! with the kernel stopped.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{MAX_RECEIVE_ATTEMPTS, MAX_SEND_ATTEMPTS, TOOL_PRESENT_INTERVAL, Vehicle};
use crate::cancel::CancellationToken;
use crate::device::{Device, TimeoutScenario, VpwSpeed};
use crate::events::{Phase, VehicleEvent, VehicleObserver};
use crate::protocol::constants::*;
use crate::protocol::{Response, ResponseStatus, factory, parser};

/// Per-family facts about the PCM under service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmInfo {
    /// Where the flash image starts (24-bit bus address).
    pub image_base_address: u32,
    /// Flash image size in bytes.
    pub image_size: u32,
    /// Selects the seed/key derivation for this family.
    pub key_algorithm_id: u16,
}

impl<D: Device, O: VehicleObserver> Vehicle<D, O> {
    /// Read the PCM's entire flash image.
    ///
    /// `kernel_payload` is the read-kernel binary; it is loaded at the
    /// configured kernel base address. Cancellation is honored at block
    /// boundaries. Every exit path, success or not, runs the cleanup
    /// sequence.
    #[instrument(skip(self, kernel_payload, cancel), fields(size = info.image_size))]
    pub fn read_contents(
        &mut self,
        info: &PcmInfo,
        kernel_payload: &[u8],
        cancel: &CancellationToken,
    ) -> Response<Vec<u8>> {
        let result = self.read_contents_inner(info, kernel_payload, cancel);
        self.cleanup();
        if result.is_success() {
            self.emit(VehicleEvent::Complete);
        }
        result
    }

    fn read_contents_inner(
        &mut self,
        info: &PcmInfo,
        kernel_payload: &[u8],
        cancel: &CancellationToken,
    ) -> Response<Vec<u8>> {
        self.notify_tool_present();
        self.suppress_chatter();

        let switched = self.set_vpw_speed(VpwSpeed::FourX);
        if !switched.is_success() {
            self.user("could not negotiate 4x; aborting read");
            return switched.recast();
        }

        let kernel_base = self.config.kernel_base_address;
        let started = self.execute_kernel(kernel_payload, kernel_base, cancel);
        if !started.is_success() {
            return started.recast();
        }

        self.phase(Phase::KernelUpload, Phase::ImageRead);
        self.device.set_timeout(TimeoutScenario::ReadMemoryBlock);

        let max_receive = self.device.max_receive_size() as usize;
        if max_receive <= TRANSFER_OVERHEAD {
            self.user(format!(
                "{} cannot carry payload blocks (max receive {max_receive})",
                self.device.description()
            ));
            return Response::failure(ResponseStatus::Error);
        }
        let block_size = max_receive - TRANSFER_OVERHEAD;

        let image_size = info.image_size as usize;
        let mut image = vec![0u8; image_size];
        let total_blocks = image_size.div_ceil(block_size) as u64;
        let end = info.image_base_address + info.image_size;

        let mut address = info.image_base_address;
        let mut blocks_done = 0u64;
        while address < end {
            if cancel.is_cancelled() {
                self.user("read cancelled");
                return Response::failure(ResponseStatus::Cancelled);
            }

            let length = block_size.min((end - address) as usize);
            let offset = (address - info.image_base_address) as usize;
            if !self.try_read_block(address, length, &mut image[offset..offset + length]) {
                self.user(format!("giving up on block at {address:#08X}"));
                return Response::failure(ResponseStatus::Error);
            }

            address += length as u32;
            blocks_done += 1;
            self.emit(VehicleEvent::Progress {
                phase: Phase::ImageRead,
                operation: "memory block".to_string(),
                current: blocks_done,
                total: total_blocks,
            });
            if blocks_done % TOOL_PRESENT_INTERVAL as u64 == 0 {
                self.notify_tool_present();
            }
        }

        self.user(format!("read {image_size} bytes"));
        Response::success(image)
    }

    /// One block: request, acknowledgement, payload. Unrelated messages
    /// during either wait are skipped, never counted as failure.
    ///
    /// A single receive budget of `MAX_SEND_ATTEMPTS * MAX_RECEIVE_ATTEMPTS`
    /// covers both waits across all resends of the request.
    fn try_read_block(&mut self, address: u32, length: usize, out: &mut [u8]) -> bool {
        let request = factory::read_request(address, length as u16);
        let mut receives_left = MAX_SEND_ATTEMPTS * MAX_RECEIVE_ATTEMPTS;

        for attempt in 1..=MAX_SEND_ATTEMPTS {
            if receives_left == 0 {
                break;
            }
            if let Err(e) = self.device.send_message(&request) {
                self.debug(format!(
                    "read request attempt {attempt}/{MAX_SEND_ATTEMPTS} failed: {e}"
                ));
                continue;
            }

            let mut acknowledged = false;
            while receives_left > 0 {
                receives_left -= 1;
                match self.receive_with_backoff() {
                    Ok(Some(reply)) => {
                        let ack =
                            parser::simple_validation(&reply, PRIORITY_PHYSICAL_0, MODE_READ_MEMORY);
                        if ack.is_success() {
                            if ack.value {
                                acknowledged = true;
                            } else {
                                self.debug(format!("read request at {address:#08X} rejected"));
                            }
                            break;
                        }
                        self.debug(format!("ignoring [{reply}] while waiting for read ack"));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.debug(format!("adapter fault during read ack wait: {e}"));
                        return false;
                    }
                }
            }
            if !acknowledged {
                continue;
            }

            while receives_left > 0 {
                receives_left -= 1;
                match self.receive_with_backoff() {
                    Ok(Some(reply)) => {
                        let payload = parser::parse_payload(&reply, length, address, out);
                        match payload.status {
                            ResponseStatus::Success => return true,
                            ResponseStatus::Error => {
                                self.debug(format!(
                                    "bad payload for {address:#08X}, requesting again"
                                ));
                                break;
                            }
                            _ => {
                                self.debug(format!("ignoring [{reply}] while waiting for payload"));
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.debug(format!("adapter fault during payload wait: {e}"));
                        return false;
                    }
                }
            }
        }
        false
    }
}
