//! Inbound message parsing.
//!
//! Every function here is pure and total: raw bytes in, [`Response`] out.
//! A malformed frame becomes a status, never a panic. The one structural
//! fault that gets its own error path is a transfer block too short for its
//! own declared payload length, see [`block_checksum`].

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use super::constants::*;
use super::message::Message;
use super::response::{Response, ResponseStatus};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("transfer block too short: need {needed} bytes, have {actual}")]
    BlockTooShort { needed: usize, actual: usize },
}

/// Result of a high-speed permission poll from one module.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HighSpeedPermission {
    /// Whether the frame was a well-formed permission response at all.
    pub is_valid: bool,
    /// The responding module's device id.
    pub device_id: u8,
    /// Whether that module consented to the speed change.
    pub permission_granted: bool,
}

/// Compare the head of `actual` against `expected`.
///
/// `Truncated` when `actual` is shorter than the prefix, `UnexpectedResponse`
/// on the first mismatching byte, `Success` otherwise.
pub fn verify_prefix(actual: &[u8], expected: &[u8]) -> ResponseStatus {
    if actual.len() < expected.len() {
        return ResponseStatus::Truncated;
    }
    for (a, e) in actual.iter().zip(expected.iter()) {
        if a != e {
            return ResponseStatus::UnexpectedResponse;
        }
    }
    ResponseStatus::Success
}

const BLOCK_RESPONSE_PREFIX: [u8; 4] = [
    PRIORITY_PHYSICAL_0,
    DEVICE_TOOL,
    DEVICE_PCM,
    MODE_BLOCK_READ + RESPONSE_OFFSET,
];

fn block_response_prefix(block_id: u8) -> [u8; 5] {
    [
        PRIORITY_PHYSICAL_0,
        DEVICE_TOOL,
        DEVICE_PCM,
        MODE_BLOCK_READ + RESPONSE_OFFSET,
        block_id,
    ]
}

/// Parse a block-read response whose payload is a 32-bit big-endian word
/// (operating system, hardware and calibration ids).
pub fn parse_block_u32(message: &Message) -> Response<u32> {
    let bytes = message.as_bytes();
    let status = verify_prefix(bytes, &BLOCK_RESPONSE_PREFIX);
    if !status.is_success() {
        return Response::failure(status);
    }
    if bytes.len() < 9 {
        return Response::failure(ResponseStatus::Truncated);
    }
    Response::success(BigEndian::read_u32(&bytes[5..9]))
}

/// Assemble the 17-character VIN from its three block responses.
pub fn parse_vin_responses(r1: &Message, r2: &Message, r3: &Message) -> Response<String> {
    for (message, block_id) in [(r1, BLOCK_VIN_1), (r2, BLOCK_VIN_2), (r3, BLOCK_VIN_3)] {
        let status = verify_prefix(message.as_bytes(), &block_response_prefix(block_id));
        if !status.is_success() {
            return Response::failure(status);
        }
        if message.len() < 11 {
            return Response::failure(ResponseStatus::Truncated);
        }
    }

    let mut vin = Vec::with_capacity(17);
    vin.extend_from_slice(&r1.as_bytes()[6..11]);
    vin.extend_from_slice(&r2.as_bytes()[5..11]);
    vin.extend_from_slice(&r3.as_bytes()[5..11]);
    Response::success(vin.iter().map(|&b| b as char).collect())
}

/// Assemble the 12-character serial number from its three block responses.
///
/// Non-printable bytes are replaced with `.` before decoding.
pub fn parse_serial_responses(r1: &Message, r2: &Message, r3: &Message) -> Response<String> {
    for (message, block_id) in [
        (r1, BLOCK_SERIAL_1),
        (r2, BLOCK_SERIAL_2),
        (r3, BLOCK_SERIAL_3),
    ] {
        let status = verify_prefix(message.as_bytes(), &block_response_prefix(block_id));
        if !status.is_success() {
            return Response::failure(status);
        }
        if message.len() < 9 {
            return Response::failure(ResponseStatus::Truncated);
        }
    }

    let mut serial = Vec::with_capacity(12);
    serial.extend_from_slice(&r1.as_bytes()[5..9]);
    serial.extend_from_slice(&r2.as_bytes()[5..9]);
    serial.extend_from_slice(&r3.as_bytes()[5..9]);
    Response::success(serial.iter().map(|&b| printable(b)).collect())
}

/// Parse the 4-character broadcast code.
pub fn parse_bcc_response(message: &Message) -> Response<String> {
    let bytes = message.as_bytes();
    let status = verify_prefix(bytes, &block_response_prefix(BLOCK_BCC));
    if !status.is_success() {
        return Response::failure(status);
    }
    if bytes.len() < 9 {
        return Response::failure(ResponseStatus::Truncated);
    }
    Response::success(bytes[5..9].iter().map(|&b| printable(b)).collect())
}

/// Parse the one-byte manufacturer enable counter as a decimal string.
pub fn parse_mec_response(message: &Message) -> Response<String> {
    let bytes = message.as_bytes();
    let status = verify_prefix(bytes, &block_response_prefix(BLOCK_MEC));
    if !status.is_success() {
        return Response::failure(status);
    }
    if bytes.len() < 6 {
        return Response::failure(ResponseStatus::Truncated);
    }
    Response::success(bytes[5].to_string())
}

fn printable(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '.'
    }
}

/// True when the PCM reports the requested access level is already open.
pub fn is_unlocked(message: &Message) -> bool {
    verify_prefix(
        message.as_bytes(),
        &[
            PRIORITY_PHYSICAL_0,
            DEVICE_TOOL,
            DEVICE_PCM,
            MODE_SEED_KEY + RESPONSE_OFFSET,
            SUBMODE_SEED,
            UNLOCK_LOCKOUT,
        ],
    )
    .is_success()
}

/// Extract the 16-bit unlock seed.
///
/// A seed of zero means no unlock is required. The `0x70`-addressed variant
/// of the already-unlocked report is answered the same way.
pub fn parse_seed(message: &Message) -> Response<u16> {
    let bytes = message.as_bytes();

    if verify_prefix(
        bytes,
        &[
            PRIORITY_PHYSICAL_0,
            0x70,
            DEVICE_PCM,
            MODE_SEED_KEY + RESPONSE_OFFSET,
            SUBMODE_SEED,
            UNLOCK_LOCKOUT,
        ],
    )
    .is_success()
    {
        return Response::success(0);
    }

    if verify_prefix(
        bytes,
        &[
            PRIORITY_PHYSICAL_0,
            DEVICE_TOOL,
            DEVICE_PCM,
            MODE_SEED_KEY + RESPONSE_OFFSET,
            SUBMODE_SEED,
        ],
    )
    .is_success()
        && bytes.len() >= 7
    {
        return Response::success(BigEndian::read_u16(&bytes[5..7]));
    }

    Response::failure(ResponseStatus::Error)
}

/// Interpret the PCM's verdict on a submitted key.
///
/// `Success(true)` on acceptance, `Error` on a rejected key, `Timeout` when
/// the PCM is in its post-failure lockout window.
pub fn parse_unlock_response(message: &Message) -> Response<bool> {
    let bytes = message.as_bytes();
    if bytes.len() < 6 {
        return Response::failure(ResponseStatus::Truncated);
    }
    match bytes[5] {
        UNLOCK_ACCEPTED => Response::success(true),
        UNLOCK_KEY_REJECTED => Response::failure(ResponseStatus::Error),
        UNLOCK_LOCKOUT => Response::failure(ResponseStatus::Timeout),
        _ => Response::failure(ResponseStatus::UnexpectedResponse),
    }
}

/// Classify one module's answer to the high-speed permission poll.
pub fn parse_high_speed_permission(message: &Message) -> HighSpeedPermission {
    let bytes = message.as_bytes();
    if bytes.len() < Message::HEADER_LEN
        || bytes[0] != PRIORITY_PHYSICAL_0
        || bytes[1] != DEVICE_TOOL
    {
        return HighSpeedPermission::default();
    }

    match bytes[3] {
        MODE_HIGH_SPEED_GRANTED => HighSpeedPermission {
            is_valid: true,
            device_id: bytes[2],
            permission_granted: true,
        },
        MODE_REJECTED => HighSpeedPermission {
            is_valid: true,
            device_id: bytes[2],
            permission_granted: false,
        },
        _ => HighSpeedPermission::default(),
    }
}

/// Detect a broadcast refusal of the high-speed switch.
///
/// Succeeds only when the mode marks a rejection and the rejected sub-mode
/// is the high-speed switch itself.
pub fn parse_high_speed_refusal(message: &Message) -> Response<bool> {
    let bytes = message.as_bytes();
    if bytes.len() < Message::HEADER_LEN {
        return Response::failure(ResponseStatus::Truncated);
    }
    if bytes[0] != PRIORITY_PHYSICAL_0 || bytes[1] != DEVICE_BROADCAST || bytes[3] != MODE_REJECTED
    {
        return Response::failure(ResponseStatus::UnexpectedResponse);
    }
    if bytes.len() < 5 {
        return Response::failure(ResponseStatus::Truncated);
    }
    if bytes[4] == MODE_HIGH_SPEED {
        Response::success(true)
    } else {
        Response::failure(ResponseStatus::UnexpectedResponse)
    }
}

/// Validate a plain positive/negative response to `mode`.
///
/// `Success(true)` for `{priority, tool, pcm, mode + 0x40}`, `Success(false)`
/// for the matching rejection, anything else is a stray.
pub fn simple_validation(message: &Message, priority: u8, mode: u8) -> Response<bool> {
    let bytes = message.as_bytes();

    let accepted = [
        priority,
        DEVICE_TOOL,
        DEVICE_PCM,
        mode.wrapping_add(RESPONSE_OFFSET),
    ];
    let positive = verify_prefix(bytes, &accepted);
    if positive.is_success() {
        return Response::success(true);
    }

    let rejected = [priority, DEVICE_TOOL, DEVICE_PCM, MODE_REJECTED, mode];
    let negative = verify_prefix(bytes, &rejected);
    if negative.is_success() {
        return Response::success(false);
    }

    if positive == ResponseStatus::Truncated || negative == ResponseStatus::Truncated {
        return Response::failure(ResponseStatus::Truncated);
    }
    Response::failure(ResponseStatus::UnexpectedResponse)
}

/// Validate a memory payload block and copy its bytes into `out`.
///
/// On a checksum mismatch the payload bytes are still copied before the
/// `Error` status is returned, so the caller keeps whatever arrived. The RLE
/// branch expands the run into `out` but reports `Error`; callers treat RLE
/// payloads as failed reads and retry.
pub fn parse_payload(
    message: &Message,
    expected_length: usize,
    expected_address: u32,
    out: &mut [u8],
) -> Response<usize> {
    let bytes = message.as_bytes();

    let status = verify_prefix(
        bytes,
        &[PRIORITY_BLOCK, DEVICE_TOOL, DEVICE_PCM, MODE_TRANSFER],
    );
    if !status.is_success() {
        return Response::failure(status);
    }
    if bytes.len() < TRANSFER_HEADER_LEN {
        return Response::failure(ResponseStatus::Truncated);
    }

    let address = BigEndian::read_u24(&bytes[7..10]);
    if address != expected_address {
        return Response::failure(ResponseStatus::Error);
    }

    match bytes[4] {
        ENCODING_RAW => {
            let run_length = BigEndian::read_u16(&bytes[5..7]) as usize;
            if run_length != expected_length {
                return Response::failure(ResponseStatus::Error);
            }
            if bytes.len() < run_length + TRANSFER_OVERHEAD || out.len() < run_length {
                return Response::failure(ResponseStatus::Truncated);
            }

            let payload = &bytes[TRANSFER_HEADER_LEN..TRANSFER_HEADER_LEN + run_length];
            out[..run_length].copy_from_slice(payload);

            let computed = match block_checksum(bytes) {
                Ok(sum) => sum,
                Err(_) => return Response::failure(ResponseStatus::Error),
            };
            let stored =
                BigEndian::read_u16(&bytes[run_length + TRANSFER_HEADER_LEN..run_length + TRANSFER_OVERHEAD]);
            if stored != computed {
                return Response::failure(ResponseStatus::Error);
            }
            Response::success(run_length)
        }
        ENCODING_RLE => {
            if bytes.len() <= TRANSFER_HEADER_LEN {
                return Response::failure(ResponseStatus::Truncated);
            }
            let run_length = ((bytes[5] as usize) << 8) | bytes[6] as usize;
            let fill = bytes[TRANSFER_HEADER_LEN];
            let count = run_length.min(out.len());
            out[..count].fill(fill);
            // The original tool never accepted an RLE payload as a good read.
            Response::failure(ResponseStatus::Error)
        }
        _ => Response::failure(ResponseStatus::UnexpectedResponse),
    }
}

/// 16-bit wrapping sum over a transfer block, bytes `[4 .. payload + 10)`.
///
/// The payload length is taken from the block's own header. A block shorter
/// than `payload + 12` bytes is a structural fault, not a checksum mismatch.
pub fn block_checksum(block: &[u8]) -> Result<u16, ProtocolError> {
    if block.len() < 7 {
        return Err(ProtocolError::BlockTooShort {
            needed: 7,
            actual: block.len(),
        });
    }
    let payload_length = BigEndian::read_u16(&block[5..7]) as usize;
    let needed = payload_length + TRANSFER_OVERHEAD;
    if block.len() < needed {
        return Err(ProtocolError::BlockTooShort {
            needed,
            actual: block.len(),
        });
    }
    Ok(block[4..payload_length + TRANSFER_HEADER_LEN]
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(b as u16)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::factory;

    fn msg(bytes: &[u8]) -> Message {
        Message::from(bytes)
    }

    #[test]
    fn prefix_law() {
        assert_eq!(
            verify_prefix(&[0x6C, 0xF0], &[0x6C, 0xF0, 0x10]),
            ResponseStatus::Truncated
        );
        assert_eq!(
            verify_prefix(&[0x6C, 0xF1, 0x10], &[0x6C, 0xF0, 0x10]),
            ResponseStatus::UnexpectedResponse
        );
        assert_eq!(
            verify_prefix(&[0x6C, 0xF0, 0x10, 0x99], &[0x6C, 0xF0, 0x10]),
            ResponseStatus::Success
        );
    }

    #[test]
    fn vin_assembles_from_three_blocks() {
        let r1 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x01, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59]);
        let r2 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x02, 0x32, 0x53, 0x32, 0x31, 0x33, 0x4D]);
        let r3 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x03, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36]);

        let vin = parse_vin_responses(&r1, &r2, &r3);
        assert!(vin.is_success());
        assert_eq!(vin.value, "1G1YY2S213M123456");
    }

    #[test]
    fn vin_rejects_wrong_block_id() {
        let r1 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x02, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59]);
        let r2 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x02, 0x32, 0x53, 0x32, 0x31, 0x33, 0x4D]);
        let r3 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x03, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36]);

        let vin = parse_vin_responses(&r1, &r2, &r3);
        assert_eq!(vin.status, ResponseStatus::UnexpectedResponse);
        assert!(vin.value.is_empty());
    }

    #[test]
    fn serial_replaces_unprintable_bytes() {
        let r1 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x05, b'A', b'B', b'C', b'D']);
        let r2 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x06, 0x00, b'F', b'G', b'H']);
        let r3 = msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x07, b'I', b'J', b'K', b'L']);

        let serial = parse_serial_responses(&r1, &r2, &r3);
        assert!(serial.is_success());
        assert_eq!(serial.value, "ABCD.FGHIJKL");
    }

    #[test]
    fn bcc_and_mec() {
        let bcc = parse_bcc_response(&msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x0A, b'A', b'Z', b'J', b'K']));
        assert_eq!(bcc.value, "AZJK");

        let mec = parse_mec_response(&msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x13, 37]));
        assert_eq!(mec.value, "37");
    }

    #[test]
    fn block_u32_reads_big_endian() {
        let r = parse_block_u32(&msg(&[
            0x6C, 0xF0, 0x10, 0x7C, 0x0E, 0x00, 0xBC, 0x61, 0x4E,
        ]));
        assert!(r.is_success());
        assert_eq!(r.value, 0x00BC614E);
    }

    #[test]
    fn seed_already_unlocked_variant() {
        let r = parse_seed(&msg(&[0x6C, 0x70, 0x10, 0x67, 0x01, 0x37]));
        assert!(r.is_success());
        assert_eq!(r.value, 0);
    }

    #[test]
    fn seed_value_extraction() {
        let r = parse_seed(&msg(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x12, 0x34]));
        assert!(r.is_success());
        assert_eq!(r.value, 0x1234);

        let bad = parse_seed(&msg(&[0x6C, 0xF0, 0x10, 0x68, 0x01, 0x12, 0x34]));
        assert_eq!(bad.status, ResponseStatus::Error);
    }

    #[test]
    fn already_unlocked_detection() {
        assert!(is_unlocked(&msg(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x37])));
        assert!(!is_unlocked(&msg(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x12])));
    }

    #[test]
    fn unlock_verdicts() {
        let ok = parse_unlock_response(&msg(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x34]));
        assert!(ok.is_success());
        assert!(ok.value);

        let rejected = parse_unlock_response(&msg(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x36]));
        assert_eq!(rejected.status, ResponseStatus::Error);

        let lockout = parse_unlock_response(&msg(&[0x6C, 0xF0, 0x10, 0x67, 0x01, 0x37]));
        assert_eq!(lockout.status, ResponseStatus::Timeout);

        let short = parse_unlock_response(&msg(&[0x6C, 0xF0, 0x10, 0x67, 0x01]));
        assert_eq!(short.status, ResponseStatus::Truncated);
    }

    #[test]
    fn high_speed_permission_variants() {
        let granted = parse_high_speed_permission(&msg(&[0x6C, 0xF0, 0x10, 0xE0]));
        assert!(granted.is_valid);
        assert_eq!(granted.device_id, 0x10);
        assert!(granted.permission_granted);

        let denied = parse_high_speed_permission(&msg(&[0x6C, 0xF0, 0x40, 0x7F, 0xA0]));
        assert!(denied.is_valid);
        assert_eq!(denied.device_id, 0x40);
        assert!(!denied.permission_granted);

        let stray = parse_high_speed_permission(&msg(&[0x6C, 0xF0, 0x10, 0x7C]));
        assert!(!stray.is_valid);
    }

    #[test]
    fn high_speed_refusal_detection() {
        let refusal = parse_high_speed_refusal(&msg(&[0x6C, 0xFE, 0xF0, 0x7F, 0xA1]));
        assert!(refusal.is_success());
        assert!(refusal.value);

        let not_refusal = parse_high_speed_refusal(&msg(&[0x6C, 0xFE, 0xF0, 0xE0, 0x00]));
        assert_eq!(not_refusal.status, ResponseStatus::UnexpectedResponse);

        let wrong_submode = parse_high_speed_refusal(&msg(&[0x6C, 0xFE, 0xF0, 0x7F, 0xA0]));
        assert_eq!(wrong_submode.status, ResponseStatus::UnexpectedResponse);
    }

    #[test]
    fn simple_validation_accept_reject_stray() {
        let accepted = simple_validation(&msg(&[0x6C, 0xF0, 0x10, 0x74]), 0x6C, 0x34);
        assert!(accepted.is_success());
        assert!(accepted.value);

        let denied = simple_validation(&msg(&[0x6C, 0xF0, 0x10, 0x7F, 0x34]), 0x6C, 0x34);
        assert!(denied.is_success());
        assert!(!denied.value);

        let stray = simple_validation(&msg(&[0x6C, 0xF0, 0x10, 0x7C, 0x01]), 0x6C, 0x34);
        assert_eq!(stray.status, ResponseStatus::UnexpectedResponse);
    }

    fn payload_message(length: u16, address: u32, payload: &[u8], sum: Option<u16>) -> Message {
        let mut bytes = vec![0x6D, 0xF0, 0x10, 0x36, ENCODING_RAW];
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&address.to_be_bytes()[1..4]);
        bytes.extend_from_slice(payload);
        let sum = sum.unwrap_or_else(|| {
            bytes[4..]
                .iter()
                .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
        });
        bytes.extend_from_slice(&sum.to_be_bytes());
        Message::new(bytes)
    }

    #[test]
    fn payload_round_trip() {
        let m = payload_message(4, 0x012000, &[0xAA, 0xBB, 0xCC, 0xDD], None);
        let mut out = [0u8; 4];
        let r = parse_payload(&m, 4, 0x012000, &mut out);
        assert!(r.is_success());
        assert_eq!(r.value, 4);
        assert_eq!(out, [0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn payload_checksum_mismatch_still_copies() {
        let m = payload_message(4, 0x012000, &[0xAA, 0xBB, 0xCC, 0xDD], Some(0));
        let mut out = [0u8; 4];
        let r = parse_payload(&m, 4, 0x012000, &mut out);
        assert_eq!(r.status, ResponseStatus::Error);
        assert_eq!(out, [0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn payload_address_mismatch() {
        let m = payload_message(4, 0x012000, &[0xAA, 0xBB, 0xCC, 0xDD], None);
        let mut out = [0u8; 4];
        let r = parse_payload(&m, 4, 0x013000, &mut out);
        assert_eq!(r.status, ResponseStatus::Error);
    }

    #[test]
    fn payload_rle_expands_but_reports_error() {
        let mut bytes = vec![0x6D, 0xF0, 0x10, 0x36, ENCODING_RLE, 0x00, 0x04];
        bytes.extend_from_slice(&[0x01, 0x20, 0x00]);
        bytes.push(0x55);
        bytes.extend_from_slice(&[0x00, 0x00]);

        let mut out = [0u8; 4];
        let r = parse_payload(&Message::new(bytes), 4, 0x012000, &mut out);
        assert_eq!(r.status, ResponseStatus::Error);
        assert_eq!(out, [0x55, 0x55, 0x55, 0x55]);
    }

    #[test]
    fn payload_rle_without_fill_byte_is_truncated() {
        // Header-only RLE frame: encoding and address check out, but the
        // fill byte is missing.
        let mut bytes = vec![0x6D, 0xF0, 0x10, 0x36, ENCODING_RLE, 0x00, 0x04];
        bytes.extend_from_slice(&[0x01, 0x20, 0x00]);

        let mut out = [0u8; 4];
        let r = parse_payload(&Message::new(bytes), 4, 0x012000, &mut out);
        assert_eq!(r.status, ResponseStatus::Truncated);
        assert_eq!(out, [0u8; 4]);
    }

    #[test]
    fn checksum_law_holds_for_factory_blocks() {
        let payload: Vec<u8> = (0u8..32).collect();
        let block = factory::upload_block(&payload, 0, 32, 0xFF8000, false);
        let bytes = block.as_bytes();
        let computed = block_checksum(bytes).unwrap();
        let stored = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
        assert_eq!(computed, stored);
    }

    #[test]
    fn checksum_rejects_short_block() {
        // Declares an 8-byte payload but carries only 2.
        let block = [0x6D, 0xF0, 0x10, 0x36, 0x01, 0x00, 0x08, 0x00, 0x10, 0x00, 0xAA, 0xBB];
        assert_eq!(
            block_checksum(&block),
            Err(ProtocolError::BlockTooShort {
                needed: 20,
                actual: 12
            })
        );
    }
}
