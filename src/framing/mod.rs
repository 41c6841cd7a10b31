// In: src/framing/mod.rs

//! The framing codec: translates between the raw payload the engine consumes or
//! produces and the self-describing gzip/zlib container.
//!
//! The engine reports a block's compressed length only out-of-band, through the
//! descriptor. The gzip framing carries that length in-stream, in a 4-byte extra
//! field, so a reader (including this codec in decode mode) can find the next
//! member boundary without inflating.

mod codec;
mod inspect;

pub use self::codec::{frame_header, FrameCodec, FrameHeader};
pub use self::inspect::{inspect_frames, FrameInfo};
