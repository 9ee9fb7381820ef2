//! Bench PCM simulator.
//!
//! A scripted peer that answers the real wire protocol from behind the
//! [`Device`] trait, so the whole pipeline can be exercised without an
//! adapter or a vehicle. Unlocks with the one's-complement bench algorithm.

use std::collections::VecDeque;

use pcmdump_core::protocol::constants::*;
use pcmdump_core::{Device, DeviceError, Message, TimeoutScenario, VpwSpeed};

const VIN: &[u8; 17] = b"1G1YY2S213M123456";
const SERIAL: &[u8; 12] = b"PFQ0123H4567";
const BCC: &[u8; 4] = b"AZJK";
const MEC: u8 = 37;
const OS_ID: u32 = 12_593_358;
const HARDWARE_ID: u32 = 9_386_530;
const CALIBRATION_ID: u32 = 12_606_807;

pub struct BenchPcm {
    image_base: u32,
    flash: Vec<u8>,
    seed: u16,
    unlocked: bool,
    kernel_running: bool,
    pending: VecDeque<Vec<u8>>,
}

impl BenchPcm {
    pub fn new(image_base: u32, image_size: u32) -> Self {
        // Deterministic flash pattern so dumps are comparable across runs.
        let flash = (0..image_size).map(|a| (a.wrapping_mul(31) >> 3) as u8).collect();
        Self {
            image_base,
            flash,
            seed: 0x3E57,
            unlocked: false,
            kernel_running: false,
            pending: VecDeque::new(),
        }
    }

    fn respond(&mut self, bytes: Vec<u8>) {
        self.pending.push_back(bytes);
    }

    fn respond_block(&mut self, block_id: u8, data: &[u8]) {
        let mut bytes = vec![
            PRIORITY_PHYSICAL_0,
            DEVICE_TOOL,
            DEVICE_PCM,
            MODE_BLOCK_READ + RESPONSE_OFFSET,
            block_id,
        ];
        bytes.extend_from_slice(data);
        self.respond(bytes);
    }

    fn reject(&mut self, mode: u8) {
        self.respond(vec![
            PRIORITY_PHYSICAL_0,
            DEVICE_TOOL,
            DEVICE_PCM,
            MODE_REJECTED,
            mode,
        ]);
    }

    fn handle_block_read(&mut self, block_id: u8) {
        match block_id {
            BLOCK_VIN_1 => {
                let mut data = vec![0u8];
                data.extend_from_slice(&VIN[0..5]);
                self.respond_block(block_id, &data);
            }
            BLOCK_VIN_2 => self.respond_block(block_id, &VIN[5..11]),
            BLOCK_VIN_3 => self.respond_block(block_id, &VIN[11..17]),
            BLOCK_SERIAL_1 => self.respond_block(block_id, &SERIAL[0..4]),
            BLOCK_SERIAL_2 => self.respond_block(block_id, &SERIAL[4..8]),
            BLOCK_SERIAL_3 => self.respond_block(block_id, &SERIAL[8..12]),
            BLOCK_BCC => self.respond_block(block_id, BCC),
            BLOCK_MEC => self.respond_block(block_id, &[MEC]),
            BLOCK_OS_ID => self.respond_block(block_id, &OS_ID.to_be_bytes()),
            BLOCK_HARDWARE_ID => self.respond_block(block_id, &HARDWARE_ID.to_be_bytes()),
            BLOCK_CALIBRATION_ID => self.respond_block(block_id, &CALIBRATION_ID.to_be_bytes()),
            _ => self.reject(MODE_BLOCK_READ),
        }
    }

    fn handle_seed_key(&mut self, request: &[u8]) {
        match request.get(4) {
            Some(&SUBMODE_SEED) => {
                if self.unlocked {
                    self.respond(vec![
                        PRIORITY_PHYSICAL_0,
                        DEVICE_TOOL,
                        DEVICE_PCM,
                        MODE_SEED_KEY + RESPONSE_OFFSET,
                        SUBMODE_SEED,
                        UNLOCK_LOCKOUT,
                    ]);
                } else {
                    let mut bytes = vec![
                        PRIORITY_PHYSICAL_0,
                        DEVICE_TOOL,
                        DEVICE_PCM,
                        MODE_SEED_KEY + RESPONSE_OFFSET,
                        SUBMODE_SEED,
                    ];
                    bytes.extend_from_slice(&self.seed.to_be_bytes());
                    self.respond(bytes);
                }
            }
            Some(&SUBMODE_KEY) => {
                let key = match request.get(5..7) {
                    Some(k) => u16::from_be_bytes([k[0], k[1]]),
                    None => 0,
                };
                let verdict = if key == !self.seed {
                    self.unlocked = true;
                    UNLOCK_ACCEPTED
                } else {
                    UNLOCK_KEY_REJECTED
                };
                self.respond(vec![
                    PRIORITY_PHYSICAL_0,
                    DEVICE_TOOL,
                    DEVICE_PCM,
                    MODE_SEED_KEY + RESPONSE_OFFSET,
                    SUBMODE_SEED,
                    verdict,
                ]);
            }
            _ => self.reject(MODE_SEED_KEY),
        }
    }

    fn handle_transfer(&mut self, request: &[u8]) {
        if request.len() < TRANSFER_OVERHEAD {
            self.reject(MODE_TRANSFER);
            return;
        }
        if request[4] & SUBMODE_EXECUTE != 0 {
            self.kernel_running = true;
        }
        self.respond(vec![
            PRIORITY_BLOCK,
            DEVICE_TOOL,
            DEVICE_PCM,
            MODE_TRANSFER + RESPONSE_OFFSET,
        ]);
    }

    fn handle_memory_read(&mut self, request: &[u8]) {
        if !self.kernel_running || request.len() < 10 {
            self.reject(MODE_READ_MEMORY);
            return;
        }
        let length = u16::from_be_bytes([request[5], request[6]]) as usize;
        let address = u32::from_be_bytes([0, request[7], request[8], request[9]]);
        let offset = address.wrapping_sub(self.image_base) as usize;
        if offset + length > self.flash.len() {
            self.reject(MODE_READ_MEMORY);
            return;
        }

        self.respond(vec![
            PRIORITY_PHYSICAL_0,
            DEVICE_TOOL,
            DEVICE_PCM,
            MODE_READ_MEMORY + RESPONSE_OFFSET,
        ]);

        let mut payload = vec![
            PRIORITY_BLOCK,
            DEVICE_TOOL,
            DEVICE_PCM,
            MODE_TRANSFER,
            ENCODING_RAW,
        ];
        payload.extend_from_slice(&(length as u16).to_be_bytes());
        payload.extend_from_slice(&address.to_be_bytes()[1..4]);
        payload.extend_from_slice(&self.flash[offset..offset + length]);
        let sum: u16 = payload[4..]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
        payload.extend_from_slice(&sum.to_be_bytes());
        self.respond(payload);
    }

    fn handle(&mut self, request: &[u8]) {
        if request.len() < Message::HEADER_LEN {
            return;
        }
        match (request[0], request[3]) {
            (PRIORITY_PHYSICAL_0, MODE_BLOCK_READ) => {
                if let Some(&block_id) = request.get(4) {
                    self.handle_block_read(block_id);
                }
            }
            (PRIORITY_PHYSICAL_0, MODE_BLOCK_WRITE) => {
                // Accept the write, discard the data: the bench PCM's
                // properties are fixed.
                self.respond(vec![
                    PRIORITY_PHYSICAL_0,
                    DEVICE_TOOL,
                    DEVICE_PCM,
                    MODE_BLOCK_WRITE + RESPONSE_OFFSET,
                ]);
            }
            (PRIORITY_PHYSICAL_0, MODE_SEED_KEY) => self.handle_seed_key(request),
            (PRIORITY_PHYSICAL_0, MODE_HIGH_SPEED_PREPARE) => {
                self.respond(vec![
                    PRIORITY_PHYSICAL_0,
                    DEVICE_TOOL,
                    DEVICE_PCM,
                    MODE_HIGH_SPEED_GRANTED,
                ]);
            }
            (PRIORITY_PHYSICAL_0, MODE_UPLOAD_REQUEST) => {
                if self.unlocked {
                    self.respond(vec![
                        PRIORITY_PHYSICAL_0,
                        DEVICE_TOOL,
                        DEVICE_PCM,
                        MODE_UPLOAD_REQUEST + RESPONSE_OFFSET,
                    ]);
                } else {
                    self.reject(MODE_UPLOAD_REQUEST);
                }
            }
            (PRIORITY_BLOCK, MODE_TRANSFER) => self.handle_transfer(request),
            (PRIORITY_PHYSICAL_0, MODE_READ_MEMORY) => self.handle_memory_read(request),
            (PRIORITY_PHYSICAL_0, MODE_EXIT_KERNEL) => {
                self.kernel_running = false;
            }
            // Keep-alives, chatter suppression, the 4x announcement and DTC
            // clears are consumed silently, as on a real quiet bus.
            _ => {}
        }
    }
}

impl Device for BenchPcm {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn send_message(&mut self, message: &Message) -> Result<(), DeviceError> {
        self.handle(message.as_bytes());
        Ok(())
    }

    fn receive_message(&mut self) -> Result<Option<Message>, DeviceError> {
        Ok(self.pending.pop_front().map(Message::new))
    }

    fn clear_message_queue(&mut self) {
        self.pending.clear();
    }

    fn set_timeout(&mut self, _scenario: TimeoutScenario) {}

    fn set_vpw_speed(&mut self, _speed: VpwSpeed) -> Result<(), DeviceError> {
        Ok(())
    }

    fn supports_4x(&self) -> bool {
        true
    }

    fn max_send_size(&self) -> u16 {
        1024
    }

    fn max_receive_size(&self) -> u16 {
        1024
    }

    fn description(&self) -> &str {
        "bench PCM simulator"
    }
}
