//! Outbound message construction.
//!
//! Pure, deterministic constructors: each returns a fully formed [`Message`]
//! ready for the adapter. Multi-byte integers are big-endian on the wire,
//! addresses are 24 bits.

use byteorder::{BigEndian, WriteBytesExt};

use super::constants::*;
use super::message::Message;

/// Read one named data block from the PCM.
pub fn block_read_request(block_id: u8) -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_PCM,
        DEVICE_TOOL,
        MODE_BLOCK_READ,
        block_id,
    ])
}

/// Write one named 6-byte data block.
pub fn block_write_request(block_id: u8, data: &[u8; 6]) -> Message {
    let mut bytes = vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_PCM,
        DEVICE_TOOL,
        MODE_BLOCK_WRITE,
        block_id,
    ];
    bytes.extend_from_slice(data);
    Message::new(bytes)
}

pub fn vin_request(segment: u8) -> Message {
    block_read_request(segment)
}

pub fn operating_system_id_request() -> Message {
    block_read_request(BLOCK_OS_ID)
}

pub fn hardware_id_request() -> Message {
    block_read_request(BLOCK_HARDWARE_ID)
}

pub fn calibration_id_request() -> Message {
    block_read_request(BLOCK_CALIBRATION_ID)
}

/// Ask the PCM for its unlock seed.
pub fn seed_request() -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_PCM,
        DEVICE_TOOL,
        MODE_SEED_KEY,
        SUBMODE_SEED,
    ])
}

/// Answer the seed challenge with the derived key.
pub fn unlock_request(key: u16) -> Message {
    let mut bytes = vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_PCM,
        DEVICE_TOOL,
        MODE_SEED_KEY,
        SUBMODE_KEY,
    ];
    bytes.write_u16::<BigEndian>(key).unwrap();
    Message::new(bytes)
}

/// Ask every module whether the bus may switch to 4x.
pub fn high_speed_permission_request(destination: u8) -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        destination,
        DEVICE_TOOL,
        MODE_HIGH_SPEED_PREPARE,
    ])
}

/// Commit the switch to 4x signaling.
pub fn begin_high_speed(destination: u8) -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        destination,
        DEVICE_TOOL,
        MODE_HIGH_SPEED,
    ])
}

/// Tell all modules to stop normal message transmission.
pub fn suppress_chatter() -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_BROADCAST,
        DEVICE_TOOL,
        MODE_SUPPRESS_CHATTER,
    ])
}

/// Keep-alive so modules hold the diagnostic session open.
pub fn tool_present() -> Message {
    Message::new(vec![
        PRIORITY_TOOL_PRESENT,
        DEVICE_BROADCAST,
        DEVICE_TOOL,
        MODE_TOOL_PRESENT,
    ])
}

/// Ask the PCM for permission to upload `size` bytes at `address`.
pub fn upload_request(size: u16, address: u32) -> Message {
    let mut bytes = vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_PCM,
        DEVICE_TOOL,
        MODE_UPLOAD_REQUEST,
        SUBMODE_NO_EXECUTE,
    ];
    bytes.write_u16::<BigEndian>(size).unwrap();
    bytes.write_u24::<BigEndian>(address).unwrap();
    Message::new(bytes)
}

/// One upload block carrying `payload[offset..offset + length]`.
///
/// `address` is where this block lands in PCM RAM. When `execute` is set the
/// PCM jumps to the start of the uploaded region after storing the block, so
/// it belongs only on the final block of the stream.
pub fn upload_block(
    payload: &[u8],
    offset: usize,
    length: usize,
    address: u32,
    execute: bool,
) -> Message {
    let mut bytes = Vec::with_capacity(length + TRANSFER_OVERHEAD);
    bytes.push(PRIORITY_BLOCK);
    bytes.push(DEVICE_PCM);
    bytes.push(DEVICE_TOOL);
    bytes.push(MODE_TRANSFER);
    bytes.push(if execute {
        SUBMODE_EXECUTE
    } else {
        SUBMODE_NO_EXECUTE
    });
    bytes.write_u16::<BigEndian>(length as u16).unwrap();
    bytes.write_u24::<BigEndian>(address).unwrap();
    bytes.extend_from_slice(&payload[offset..offset + length]);

    let sum = transfer_sum(&bytes);
    bytes.write_u16::<BigEndian>(sum).unwrap();
    Message::new(bytes)
}

/// Ask the kernel for `length` bytes of memory starting at `address`.
pub fn read_request(address: u32, length: u16) -> Message {
    let mut bytes = vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_PCM,
        DEVICE_TOOL,
        MODE_READ_MEMORY,
        ENCODING_RAW,
    ];
    bytes.write_u16::<BigEndian>(length).unwrap();
    bytes.write_u24::<BigEndian>(address).unwrap();
    Message::new(bytes)
}

/// Halt the kernel and hand the PCM back to its operating system.
pub fn exit_kernel() -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_PCM,
        DEVICE_TOOL,
        MODE_EXIT_KERNEL,
    ])
}

pub fn clear_dtcs() -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_BROADCAST,
        DEVICE_TOOL,
        MODE_CLEAR_DTCS,
    ])
}

pub fn clear_dtcs_ok() -> Message {
    Message::new(vec![
        PRIORITY_PHYSICAL_0,
        DEVICE_BROADCAST,
        DEVICE_TOOL,
        MODE_CLEAR_DTCS_OK,
    ])
}

/// 16-bit wrapping sum over everything past the four framing bytes.
fn transfer_sum(block: &[u8]) -> u16 {
    block[4..]
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vin_request_shape() {
        let m = vin_request(BLOCK_VIN_1);
        assert_eq!(m.as_bytes(), &[0x6C, 0x10, 0xF0, 0x3C, 0x01]);
    }

    #[test]
    fn seed_and_unlock_shapes() {
        assert_eq!(seed_request().as_bytes(), &[0x6C, 0x10, 0xF0, 0x27, 0x01]);
        assert_eq!(
            unlock_request(0xBEEF).as_bytes(),
            &[0x6C, 0x10, 0xF0, 0x27, 0x02, 0xBE, 0xEF]
        );
    }

    #[test]
    fn upload_request_encodes_u24_address() {
        let m = upload_request(0x0400, 0xFF913E);
        assert_eq!(
            m.as_bytes(),
            &[0x6C, 0x10, 0xF0, 0x34, 0x00, 0x04, 0x00, 0xFF, 0x91, 0x3E]
        );
    }

    #[test]
    fn upload_block_framing_and_checksum() {
        let payload = [0xAA, 0xBB, 0xCC, 0xDD];
        let m = upload_block(&payload, 0, 4, 0xFF2000, true);
        let b = m.as_bytes();
        assert_eq!(b.len(), 4 + TRANSFER_OVERHEAD);
        assert_eq!(&b[..4], &[0x6D, 0x10, 0xF0, 0x36]);
        assert_eq!(b[4], SUBMODE_EXECUTE);
        assert_eq!(&b[5..7], &[0x00, 0x04]);
        assert_eq!(&b[7..10], &[0xFF, 0x20, 0x00]);
        assert_eq!(&b[10..14], &payload);

        // Trailing sum covers bytes [4..14).
        let expected: u16 = b[4..14].iter().map(|&x| x as u16).sum();
        assert_eq!(u16::from_be_bytes([b[14], b[15]]), expected);
    }

    #[test]
    fn read_request_shape() {
        let m = read_request(0x012345, 0x0800);
        assert_eq!(
            m.as_bytes(),
            &[0x6C, 0x10, 0xF0, 0x35, 0x01, 0x08, 0x00, 0x01, 0x23, 0x45]
        );
    }

    #[test]
    fn broadcast_frames() {
        assert_eq!(tool_present().as_bytes(), &[0x8C, 0xFE, 0xF0, 0x3F]);
        assert_eq!(
            suppress_chatter().as_bytes(),
            &[0x6C, 0xFE, 0xF0, 0x28]
        );
        assert_eq!(
            begin_high_speed(DEVICE_BROADCAST).as_bytes(),
            &[0x6C, 0xFE, 0xF0, 0xA1]
        );
    }
}
