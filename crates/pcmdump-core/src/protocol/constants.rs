//! Wire-level constants for the GM J1850 VPW diagnostic dialect.
//!
//! Everything here is bit-exact: these bytes go on the bus.

// ============================================================================
// Priority bytes (message byte 0)
// ============================================================================

/// Physically addressed request, priority 0.
pub const PRIORITY_PHYSICAL_0: u8 = 0x6C;

/// Block transfer priority, used by kernel upload and payload messages.
pub const PRIORITY_BLOCK: u8 = 0x6D;

/// Priority used by the tool-present keep-alive broadcast.
pub const PRIORITY_TOOL_PRESENT: u8 = 0x8C;

// ============================================================================
// Device identifiers (message bytes 1 and 2)
// ============================================================================

/// The scan tool / pass-through adapter.
pub const DEVICE_TOOL: u8 = 0xF0;

/// The Powertrain Control Module.
pub const DEVICE_PCM: u8 = 0x10;

/// All modules on the bus.
pub const DEVICE_BROADCAST: u8 = 0xFE;

// ============================================================================
// Mode bytes (message byte 3)
// ============================================================================
//
// A positive response echoes the request mode plus RESPONSE_OFFSET.
// A rejection is MODE_REJECTED followed by the original mode byte.

/// Added to a request mode to form the positive-response mode.
pub const RESPONSE_OFFSET: u8 = 0x40;

/// Negative response marker.
pub const MODE_REJECTED: u8 = 0x7F;

/// Read a named data block (VIN, serial, BCC, MEC, id words).
pub const MODE_BLOCK_READ: u8 = 0x3C;

/// Write a named data block.
pub const MODE_BLOCK_WRITE: u8 = 0x3B;

/// Seed/key security access.
pub const MODE_SEED_KEY: u8 = 0x27;

/// Sub-modes of [`MODE_SEED_KEY`].
pub const SUBMODE_SEED: u8 = 0x01;
pub const SUBMODE_KEY: u8 = 0x02;

/// Unlock response codes (byte 5 of the seed/key response).
pub const UNLOCK_ACCEPTED: u8 = 0x34;
pub const UNLOCK_KEY_REJECTED: u8 = 0x36;
pub const UNLOCK_LOCKOUT: u8 = 0x37;

/// Disable normal message transmission (bus chatter suppression).
pub const MODE_SUPPRESS_CHATTER: u8 = 0x28;

/// Request permission to upload to PCM RAM.
pub const MODE_UPLOAD_REQUEST: u8 = 0x34;

/// Read a range of PCM memory (served by the kernel).
pub const MODE_READ_MEMORY: u8 = 0x35;

/// Block transfer, both upload blocks and read payloads.
pub const MODE_TRANSFER: u8 = 0x36;

/// Tell the kernel to halt and return control to the operating system.
pub const MODE_EXIT_KERNEL: u8 = 0x20;

/// Tool-present keep-alive.
pub const MODE_TOOL_PRESENT: u8 = 0x3F;

/// Clear diagnostic trouble codes, and its acknowledge variant.
pub const MODE_CLEAR_DTCS: u8 = 0x04;
pub const MODE_CLEAR_DTCS_OK: u8 = 0x44;

/// Prepare for high-speed (4x) operation; positive response is 0xE0.
pub const MODE_HIGH_SPEED_PREPARE: u8 = 0xA0;
pub const MODE_HIGH_SPEED_GRANTED: u8 = 0xE0;

/// Switch the bus to high-speed operation now.
pub const MODE_HIGH_SPEED: u8 = 0xA1;

// ============================================================================
// Block identifiers for MODE_BLOCK_READ / MODE_BLOCK_WRITE
// ============================================================================

/// VIN is stored as three blocks: 5 + 6 + 6 bytes.
pub const BLOCK_VIN_1: u8 = 0x01;
pub const BLOCK_VIN_2: u8 = 0x02;
pub const BLOCK_VIN_3: u8 = 0x03;

/// Hardware id word.
pub const BLOCK_HARDWARE_ID: u8 = 0x04;

/// Serial number is stored as three 4-byte blocks.
pub const BLOCK_SERIAL_1: u8 = 0x05;
pub const BLOCK_SERIAL_2: u8 = 0x06;
pub const BLOCK_SERIAL_3: u8 = 0x07;

/// Calibration id word.
pub const BLOCK_CALIBRATION_ID: u8 = 0x08;

/// Broadcast code, four ASCII characters.
pub const BLOCK_BCC: u8 = 0x0A;

/// Operating system id word.
pub const BLOCK_OS_ID: u8 = 0x0E;

/// Manufacturer enable counter, a single byte.
pub const BLOCK_MEC: u8 = 0x13;

// ============================================================================
// Block transfer framing
// ============================================================================

/// Transfer block header bytes before the payload.
pub const TRANSFER_HEADER_LEN: usize = 10;

/// Trailing 16-bit checksum.
pub const TRANSFER_CHECKSUM_LEN: usize = 2;

/// Total framing overhead of a transfer block.
pub const TRANSFER_OVERHEAD: usize = TRANSFER_HEADER_LEN + TRANSFER_CHECKSUM_LEN;

/// Payload encoding selector (transfer block byte 4) on received payloads.
pub const ENCODING_RAW: u8 = 0x01;
pub const ENCODING_RLE: u8 = 0x02;

/// Execute-on-load flag (transfer block byte 4) on uploaded blocks.
pub const SUBMODE_EXECUTE: u8 = 0x80;
pub const SUBMODE_NO_EXECUTE: u8 = 0x00;
