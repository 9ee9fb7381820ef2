//! Kernel upload planning.
//!
//! The PCM's boot code accepts the upload in blocks sized to the adapter's
//! transmit limit. The stream is sent backwards: the tail remainder first,
//! then full chunks from the highest offset down to offset zero. The final
//! block (the one landing at offset zero) carries the execute-on-load flag,
//! so the PCM jumps into the kernel only once the whole image is resident.

/// One planned upload block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadBlock {
    /// Byte offset into the kernel payload (and into PCM RAM, relative to
    /// the load address).
    pub offset: usize,
    /// Bytes carried by this block.
    pub length: usize,
    /// Whether the PCM should start the kernel after storing this block.
    pub execute: bool,
}

/// Block sequence for uploading `payload_len` bytes with `chunk_size`-byte
/// data chunks, in transmission order.
pub fn plan_upload(payload_len: usize, chunk_size: usize) -> Vec<UploadBlock> {
    if payload_len == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let full_chunks = payload_len / chunk_size;
    let remainder = payload_len % chunk_size;

    let mut blocks = Vec::with_capacity(full_chunks + usize::from(remainder > 0));

    if remainder > 0 {
        let offset = full_chunks * chunk_size;
        blocks.push(UploadBlock {
            offset,
            length: remainder,
            execute: offset == 0,
        });
    }

    for index in (0..full_chunks).rev() {
        let offset = index * chunk_size;
        blocks.push(UploadBlock {
            offset,
            length: chunk_size,
            execute: offset == 0,
        });
    }

    blocks
}
