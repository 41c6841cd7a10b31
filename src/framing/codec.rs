// In: src/framing/codec.rs

use std::io::{ErrorKind, Read, Write};

use crate::config::{Algorithm, Direction, ZipqConfig};
use crate::error::ZipqError;
use crate::format::{
    GZIP_EXTRA_BLOCK_LEN_OFFSET, GZIP_EXTRA_LEN, GZIP_EXTRA_TEMPLATE, GZIP_FLAGS_OFFSET,
    GZIP_FLAG_EXTRA, GZIP_HEADER, GZIP_HEADER_LEN, MAX_FRAME_HEADER_LEN, ZLIB_HEADER,
    ZLIB_HEADER_LEN,
};

//==================================================================================
// 1. Frame Header Construction
//==================================================================================

/// The framing bytes written in front of one block, built on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    bytes: [u8; MAX_FRAME_HEADER_LEN],
    len: usize,
}

impl FrameHeader {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds the container header for a block whose engine output is `payload_len` bytes.
///
/// For gzip, bytes 6..10 of the extra field hold `payload_len` little-endian.
pub fn frame_header(algorithm: Algorithm, payload_len: u32) -> FrameHeader {
    let mut bytes = [0u8; MAX_FRAME_HEADER_LEN];
    let len = match algorithm {
        Algorithm::Zlib => {
            bytes[..ZLIB_HEADER_LEN].copy_from_slice(&ZLIB_HEADER);
            ZLIB_HEADER_LEN
        }
        Algorithm::Gzip => {
            bytes[..GZIP_HEADER_LEN].copy_from_slice(&GZIP_HEADER);
            let extra = &mut bytes[GZIP_HEADER_LEN..MAX_FRAME_HEADER_LEN];
            extra.copy_from_slice(&GZIP_EXTRA_TEMPLATE);
            extra[GZIP_EXTRA_BLOCK_LEN_OFFSET..].copy_from_slice(&payload_len.to_le_bytes());
            MAX_FRAME_HEADER_LEN
        }
    };
    FrameHeader { bytes, len }
}

//==================================================================================
// 2. The Codec
//==================================================================================

/// Stateless framing rules for one session: which container, which direction, and
/// how large a block the slot buffers can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    algorithm: Algorithm,
    direction: Direction,
    slot_capacity: usize,
}

impl FrameCodec {
    pub fn new(algorithm: Algorithm, direction: Direction, slot_capacity: usize) -> Self {
        Self {
            algorithm,
            direction,
            slot_capacity,
        }
    }

    pub fn from_config(config: &ZipqConfig) -> Self {
        Self::new(config.algorithm, config.direction, config.slot_capacity())
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// Size of the fixed container header (without the gzip extra field).
    pub fn header_len(&self) -> usize {
        match self.algorithm {
            Algorithm::Zlib => ZLIB_HEADER_LEN,
            Algorithm::Gzip => GZIP_HEADER_LEN,
        }
    }

    /// The decode path. Fills `buf` with the next block's engine input and returns
    /// its length.
    ///
    /// `estimate` is the naive chunk length the caller already subtracted from
    /// `remaining`. When a gzip extra field reveals the true member length,
    /// `remaining` is corrected so that, across the call, it drops by exactly the
    /// number of source bytes consumed.
    pub fn fill_block<R: Read>(
        &self,
        source: &mut R,
        estimate: usize,
        buf: &mut [u8],
        remaining: &mut i64,
    ) -> Result<usize, ZipqError> {
        let payload_len = match self.direction {
            Direction::Deflate => estimate,
            Direction::Inflate => self.read_block_header(source, estimate, remaining)?,
        };

        let capacity = buf.len().min(self.slot_capacity);
        if payload_len > capacity {
            return Err(ZipqError::BlockExceedsCapacity {
                declared: payload_len,
                capacity,
            });
        }

        read_exact_or_fault(source, &mut buf[..payload_len], "block payload")?;
        Ok(payload_len)
    }

    /// The encode path. Writes one engine output block to `sink`, framed when
    /// compressing, and returns the number of bytes written.
    pub fn write_block<W: Write>(&self, sink: &mut W, payload: &[u8]) -> Result<usize, ZipqError> {
        let mut written = 0;
        if self.direction == Direction::Deflate {
            let payload_len = u32::try_from(payload.len()).map_err(|_| {
                ZipqError::FrameFormat(format!(
                    "block of {} bytes does not fit the 32-bit length field",
                    payload.len()
                ))
            })?;
            let header = frame_header(self.algorithm, payload_len);
            let context = match self.algorithm {
                Algorithm::Zlib => "zlib header",
                Algorithm::Gzip => "gzip header",
            };
            write_all_or_fault(sink, header.as_bytes(), context)?;
            written += header.len();
        }
        write_all_or_fault(sink, payload, "block payload")?;
        Ok(written + payload.len())
    }

    /// Consumes the container header of the next block and returns its payload length.
    fn read_block_header<R: Read>(
        &self,
        source: &mut R,
        estimate: usize,
        remaining: &mut i64,
    ) -> Result<usize, ZipqError> {
        match self.algorithm {
            Algorithm::Zlib => {
                let mut header = [0u8; ZLIB_HEADER_LEN];
                read_exact_or_fault(source, &mut header, "zlib header")?;
                validate_zlib_header(&header)?;
                estimate
                    .checked_sub(ZLIB_HEADER_LEN)
                    .ok_or_else(|| truncated_frame(estimate, ZLIB_HEADER_LEN))
            }
            Algorithm::Gzip => {
                let mut header = [0u8; GZIP_HEADER_LEN];
                read_exact_or_fault(source, &mut header, "gzip header")?;
                if header[..3] != GZIP_HEADER[..3] {
                    return Err(ZipqError::FrameFormat(format!(
                        "bad gzip member magic {:02x} {:02x} {:02x}",
                        header[0], header[1], header[2]
                    )));
                }
                let naive = estimate
                    .checked_sub(GZIP_HEADER_LEN)
                    .ok_or_else(|| truncated_frame(estimate, GZIP_HEADER_LEN))?;
                if header[GZIP_FLAGS_OFFSET] != GZIP_FLAG_EXTRA {
                    return Ok(naive);
                }

                let mut extra = [0u8; GZIP_EXTRA_LEN];
                read_exact_or_fault(source, &mut extra, "gzip extra field")?;
                let declared = block_len_from_extra(&extra) as usize;
                log::debug!("gzip input len {}", declared);
                if declared > self.slot_capacity {
                    return Err(ZipqError::BlockExceedsCapacity {
                        declared,
                        capacity: self.slot_capacity,
                    });
                }

                // The member need not line up with the fixed chunking used while
                // reading, so swap the estimate for what this member really consumes.
                let consumed = GZIP_HEADER_LEN + GZIP_EXTRA_LEN + declared;
                *remaining += estimate as i64 - consumed as i64;
                if *remaining < 0 {
                    return Err(ZipqError::FrameFormat(format!(
                        "gzip member of {} bytes runs {} bytes past the end of the source",
                        consumed, -*remaining
                    )));
                }
                Ok(declared)
            }
        }
    }
}

//==================================================================================
// 3. Helpers
//==================================================================================

pub(crate) fn block_len_from_extra(extra: &[u8; GZIP_EXTRA_LEN]) -> u32 {
    let mut len = [0u8; 4];
    len.copy_from_slice(&extra[GZIP_EXTRA_BLOCK_LEN_OFFSET..]);
    u32::from_le_bytes(len)
}

pub(crate) fn validate_zlib_header(header: &[u8; ZLIB_HEADER_LEN]) -> Result<(), ZipqError> {
    let (cmf, flg) = (header[0], header[1]);
    let check = (u16::from(cmf) << 8) | u16::from(flg);
    if cmf & 0x0f != 8 || check % 31 != 0 {
        return Err(ZipqError::FrameFormat(format!(
            "bad zlib header {:02x} {:02x}",
            cmf, flg
        )));
    }
    Ok(())
}

fn truncated_frame(estimate: usize, header_len: usize) -> ZipqError {
    ZipqError::FrameFormat(format!(
        "block of {} bytes is shorter than its {} byte header",
        estimate, header_len
    ))
}

/// Reads exactly `buf.len()` bytes or reports how many arrived.
pub(crate) fn read_exact_or_fault<R: Read + ?Sized>(
    source: &mut R,
    buf: &mut [u8],
    context: &'static str,
) -> Result<(), ZipqError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled != buf.len() {
        return Err(ZipqError::ShortRead {
            context,
            expected: buf.len(),
            actual: filled,
        });
    }
    Ok(())
}

pub(crate) fn write_all_or_fault<W: Write + ?Sized>(
    sink: &mut W,
    bytes: &[u8],
    context: &'static str,
) -> Result<(), ZipqError> {
    sink.write_all(bytes).map_err(|e| match e.kind() {
        ErrorKind::WriteZero => ZipqError::ShortWrite {
            context,
            expected: bytes.len(),
        },
        _ => ZipqError::Io(e),
    })
}
