// In: src/format.rs

//! Defines all on-the-wire constants for the zipq container framing and the
//! engine descriptor. This is the single source of truth for both the framing
//! codec and the software engine.

//==================================================================================
// I. Container Framing
//==================================================================================

/// The zlib short header (deflate, 32K window, default level).
pub const ZLIB_HEADER: [u8; 2] = [0x78, 0x9c];
pub const ZLIB_HEADER_LEN: usize = ZLIB_HEADER.len();

/// The gzip member header. `FLG` (offset 3) has only `FEXTRA` set, `OS` is Unix.
pub const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];
pub const GZIP_HEADER_LEN: usize = GZIP_HEADER.len();

/// Offset of the flags byte inside the gzip header.
pub const GZIP_FLAGS_OFFSET: usize = 3;
/// The flags value announcing the block-length extra field.
pub const GZIP_FLAG_EXTRA: u8 = 0x04;

/// The extra field template: `XLEN = 8`, subfield id `'H' 'i'`, subfield length 4,
/// then the little-endian block length in bytes 6..10.
pub const GZIP_EXTRA_TEMPLATE: [u8; 10] = [0x08, 0x00, 0x48, 0x69, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];
pub const GZIP_EXTRA_LEN: usize = GZIP_EXTRA_TEMPLATE.len();
pub const GZIP_EXTRA_BLOCK_LEN_OFFSET: usize = 6;

/// Largest amount of framing written in front of one block.
pub const MAX_FRAME_HEADER_LEN: usize = GZIP_HEADER_LEN + GZIP_EXTRA_LEN;

//==================================================================================
// II. Engine Limits & Descriptor Codes
//==================================================================================

/// The zlib engine processes a stream in one invocation, capped at 16 MiB.
pub const HW_BLOCK_LIMIT: usize = 16 * 1024 * 1024;

/// Extra output room every slot keeps beyond the block size. Covers the stored
/// block headers, an empty final block and the 8-byte gzip trailer that the engine
/// can add to a block too small to compress.
pub const SLOT_MIN_HEADROOM: usize = 64;

/// Descriptor algorithm selectors.
pub const ALG_TAG_ZLIB: u32 = 2;
pub const ALG_TAG_GZIP: u32 = 3;

/// Only the low byte of the descriptor status word carries the completion code.
pub const STATUS_MASK: u32 = 0xff;
pub const STATUS_SUCCESS: u32 = 0x00;
/// Benign: the engine reached the end of the input block.
pub const STATUS_END_OF_BLOCK: u32 = 0x0d;
/// The input could not be decoded.
pub const STATUS_DATA_ERROR: u32 = 0x02;
/// The output did not fit in `dest_capacity`.
pub const STATUS_OUTPUT_OVERFLOW: u32 = 0x07;
/// A descriptor address did not resolve to a mapped DMA region.
pub const STATUS_ADDRESS_FAULT: u32 = 0x0b;

/// Returns true for completion codes the driver accepts.
pub fn status_is_benign(status: u32) -> bool {
    matches!(status & STATUS_MASK, STATUS_SUCCESS | STATUS_END_OF_BLOCK)
}
