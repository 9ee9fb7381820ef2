//! Named-property queries and the VIN write.
//!
//! These are short 1x exchanges: set the property timeout, drain the stale
//! queue, then run one request/response per data block. Multi-block
//! properties (VIN, serial) are collected serially and combined by the
//! parser; there is no pipelining on this bus.

use super::Vehicle;
use crate::device::{Device, TimeoutScenario};
use crate::events::VehicleObserver;
use crate::protocol::constants::*;
use crate::protocol::{Message, Response, ResponseStatus, factory, parser};

impl<D: Device, O: VehicleObserver> Vehicle<D, O> {
    /// Read the 17-character VIN from its three blocks.
    pub fn query_vin(&mut self) -> Response<String> {
        let parts = match self.read_blocks(&[BLOCK_VIN_1, BLOCK_VIN_2, BLOCK_VIN_3]) {
            Ok(parts) => parts,
            Err(status) => return Response::failure(status),
        };
        parser::parse_vin_responses(&parts[0], &parts[1], &parts[2])
    }

    /// Read the 12-character serial number from its three blocks.
    pub fn query_serial(&mut self) -> Response<String> {
        let parts = match self.read_blocks(&[BLOCK_SERIAL_1, BLOCK_SERIAL_2, BLOCK_SERIAL_3]) {
            Ok(parts) => parts,
            Err(status) => return Response::failure(status),
        };
        parser::parse_serial_responses(&parts[0], &parts[1], &parts[2])
    }

    /// Read the broadcast code.
    pub fn query_bcc(&mut self) -> Response<String> {
        self.prepare_property_query();
        self.query(
            &factory::block_read_request(BLOCK_BCC),
            parser::parse_bcc_response,
        )
    }

    /// Read the manufacturer enable counter.
    pub fn query_mec(&mut self) -> Response<String> {
        self.prepare_property_query();
        self.query(
            &factory::block_read_request(BLOCK_MEC),
            parser::parse_mec_response,
        )
    }

    pub fn query_operating_system_id(&mut self) -> Response<u32> {
        self.prepare_property_query();
        self.query(&factory::operating_system_id_request(), parser::parse_block_u32)
    }

    pub fn query_hardware_id(&mut self) -> Response<u32> {
        self.prepare_property_query();
        self.query(&factory::hardware_id_request(), parser::parse_block_u32)
    }

    pub fn query_calibration_id(&mut self) -> Response<u32> {
        self.prepare_property_query();
        self.query(&factory::calibration_id_request(), parser::parse_block_u32)
    }

    /// Write a 17-character ASCII VIN, split 5+6+6 across the three blocks.
    ///
    /// The first segment is front-padded with a zero byte to fill its
    /// 6-byte block. Any block write failure aborts the operation.
    pub fn update_vin(&mut self, vin: &str) -> Response<bool> {
        if vin.len() != 17 || !vin.is_ascii() {
            self.user(format!(
                "VIN must be 17 ASCII characters, got {:?} ({} bytes)",
                vin,
                vin.len()
            ));
            return Response::failure(ResponseStatus::Error);
        }
        let bytes = vin.as_bytes();

        let mut blocks: [(u8, [u8; 6]); 3] = [
            (BLOCK_VIN_1, [0u8; 6]),
            (BLOCK_VIN_2, [0u8; 6]),
            (BLOCK_VIN_3, [0u8; 6]),
        ];
        blocks[0].1[1..6].copy_from_slice(&bytes[0..5]);
        blocks[1].1.copy_from_slice(&bytes[5..11]);
        blocks[2].1.copy_from_slice(&bytes[11..17]);

        self.prepare_property_query();
        for (block_id, data) in &blocks {
            let written = self.query(&factory::block_write_request(*block_id, data), |m| {
                parser::simple_validation(m, PRIORITY_PHYSICAL_0, MODE_BLOCK_WRITE)
            });
            if !written.is_success() || !written.value {
                self.user(format!("VIN block {block_id:02X} write failed"));
                return Response::failure(ResponseStatus::Error);
            }
        }
        self.user("VIN updated");
        Response::success(true)
    }

    /// Short-query preamble: property timeout, drained queue.
    fn prepare_property_query(&mut self) {
        self.device.set_timeout(TimeoutScenario::ReadProperty);
        self.device.clear_message_queue();
    }

    /// Serially collect one response per requested block.
    fn read_blocks(&mut self, block_ids: &[u8]) -> Result<Vec<Message>, ResponseStatus> {
        self.prepare_property_query();
        let mut parts = Vec::with_capacity(block_ids.len());
        for &block_id in block_ids {
            if !self.send_with_retry(&factory::block_read_request(block_id)) {
                return Err(ResponseStatus::Timeout);
            }
            match self.receive_with_backoff() {
                Ok(Some(message)) => parts.push(message),
                Ok(None) => {
                    self.user(format!("no response for block {block_id:02X}"));
                    return Err(ResponseStatus::Timeout);
                }
                Err(e) => {
                    self.user(format!("adapter fault reading block {block_id:02X}: {e}"));
                    return Err(ResponseStatus::Error);
                }
            }
        }
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;
    use crate::vehicle::tests::test_vehicle;

    #[test]
    fn vin_query_end_to_end() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7C, 0x01, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59]);
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7C, 0x02, 0x32, 0x53, 0x32, 0x31, 0x33, 0x4D]);
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7C, 0x03, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36]);

        let mut vehicle = test_vehicle(&mock);
        let vin = vehicle.query_vin();
        assert!(vin.is_success());
        assert_eq!(vin.value, "1G1YY2S213M123456");

        // Stale-queue drain happened before the first request.
        assert_eq!(mock.clear_calls(), 1);
        assert_eq!(mock.timeout_log(), vec![TimeoutScenario::ReadProperty]);
        let sent = mock.sent_frames();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], vec![0x6C, 0x10, 0xF0, 0x3C, 0x01]);
        assert_eq!(sent[2], vec![0x6C, 0x10, 0xF0, 0x3C, 0x03]);
    }

    #[test]
    fn vin_query_times_out_on_missing_block() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7C, 0x01, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59]);
        // Blocks two and three never answer.

        let mut vehicle = test_vehicle(&mock);
        let vin = vehicle.query_vin();
        assert_eq!(vin.status, ResponseStatus::Timeout);
        assert!(vin.value.is_empty());
    }

    #[test]
    fn os_id_query() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7C, 0x0E, 0x00, 0xBC, 0x61, 0x4E]);

        let mut vehicle = test_vehicle(&mock);
        let os = vehicle.query_operating_system_id();
        assert!(os.is_success());
        assert_eq!(os.value, 12345678);
    }

    #[test]
    fn vin_write_sends_three_padded_blocks() {
        let mock = MockDevice::new();
        for _ in 0..3 {
            mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7B]);
        }

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.update_vin("1G1YY2S213M123456");
        assert!(r.is_success());

        let sent = mock.sent_frames();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[0],
            vec![0x6C, 0x10, 0xF0, 0x3B, 0x01, 0x00, b'1', b'G', b'1', b'Y', b'Y']
        );
        assert_eq!(
            sent[1],
            vec![0x6C, 0x10, 0xF0, 0x3B, 0x02, b'2', b'S', b'2', b'1', b'3', b'M']
        );
        assert_eq!(
            sent[2],
            vec![0x6C, 0x10, 0xF0, 0x3B, 0x03, b'1', b'2', b'3', b'4', b'5', b'6']
        );
    }

    #[test]
    fn vin_write_rejects_bad_length() {
        let mock = MockDevice::new();
        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.update_vin("TOOSHORT");
        assert_eq!(r.status, ResponseStatus::Error);
        assert!(mock.sent_frames().is_empty());
    }

    #[test]
    fn vin_write_aborts_on_rejection() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7B]);
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7F, 0x3B]);

        let mut vehicle = test_vehicle(&mock);
        let r = vehicle.update_vin("1G1YY2S213M123456");
        assert_eq!(r.status, ResponseStatus::Error);
        // Third block never attempted.
        assert_eq!(mock.sent_frames().len(), 2);
    }
}
