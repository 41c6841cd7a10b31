// In: src/framing/inspect.rs

//! Walks a framed stream and reports where each block sits, using only the
//! in-stream framing. Nothing is inflated.

use crate::config::Algorithm;
use crate::error::ZipqError;
use crate::format::{
    GZIP_EXTRA_LEN, GZIP_FLAGS_OFFSET, GZIP_FLAG_EXTRA, GZIP_HEADER, GZIP_HEADER_LEN,
    ZLIB_HEADER_LEN,
};

use super::codec::{block_len_from_extra, validate_zlib_header};

/// Location of one framed block inside a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Offset of the first header byte.
    pub offset: usize,
    /// Header plus extra field.
    pub header_len: usize,
    /// Engine output bytes following the header.
    pub payload_len: usize,
}

impl FrameInfo {
    pub fn payload_range(&self) -> std::ops::Range<usize> {
        let start = self.offset + self.header_len;
        start..start + self.payload_len
    }

    pub fn end(&self) -> usize {
        self.offset + self.header_len + self.payload_len
    }
}

/// Lists the blocks of a stream produced by the deflate direction.
///
/// A zlib stream is a single block. A gzip stream is a sequence of members, each
/// of which must carry the block-length extra field.
pub fn inspect_frames(algorithm: Algorithm, bytes: &[u8]) -> Result<Vec<FrameInfo>, ZipqError> {
    match algorithm {
        Algorithm::Zlib => {
            if bytes.len() < ZLIB_HEADER_LEN {
                return Err(ZipqError::FrameFormat("zlib stream shorter than its header".into()));
            }
            let mut header = [0u8; ZLIB_HEADER_LEN];
            header.copy_from_slice(&bytes[..ZLIB_HEADER_LEN]);
            validate_zlib_header(&header)?;
            Ok(vec![FrameInfo {
                offset: 0,
                header_len: ZLIB_HEADER_LEN,
                payload_len: bytes.len() - ZLIB_HEADER_LEN,
            }])
        }
        Algorithm::Gzip => {
            let mut frames = Vec::new();
            let mut pos = 0;
            while pos < bytes.len() {
                let framing = GZIP_HEADER_LEN + GZIP_EXTRA_LEN;
                if bytes.len() - pos < framing {
                    return Err(ZipqError::FrameFormat(format!(
                        "truncated gzip member header at offset {}",
                        pos
                    )));
                }
                let header = &bytes[pos..pos + GZIP_HEADER_LEN];
                if header[..3] != GZIP_HEADER[..3] {
                    return Err(ZipqError::FrameFormat(format!(
                        "bad gzip member magic at offset {}",
                        pos
                    )));
                }
                if header[GZIP_FLAGS_OFFSET] != GZIP_FLAG_EXTRA {
                    return Err(ZipqError::FrameFormat(format!(
                        "gzip member at offset {} has no block-length field",
                        pos
                    )));
                }
                let mut extra = [0u8; GZIP_EXTRA_LEN];
                extra.copy_from_slice(&bytes[pos + GZIP_HEADER_LEN..pos + framing]);
                let frame = FrameInfo {
                    offset: pos,
                    header_len: framing,
                    payload_len: block_len_from_extra(&extra) as usize,
                };
                if frame.end() > bytes.len() {
                    return Err(ZipqError::FrameFormat(format!(
                        "gzip member at offset {} declares {} bytes, only {} remain",
                        pos,
                        frame.payload_len,
                        bytes.len() - pos - framing
                    )));
                }
                pos = frame.end();
                frames.push(frame);
            }
            Ok(frames)
        }
    }
}
