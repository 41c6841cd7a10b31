// In: src/error.rs

//! This module defines the single, unified error type for the entire zipq library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Every fault is fatal to the session that raised it. Transient transport
//! conditions (busy / not ready) never reach this type: they are retried inside
//! the pipeline and only show up in the session statistics.

use thiserror::Error;

/// The coarse fault class of a [`ZipqError`], used by callers (and the CLI exit
/// path) that only care about which part of the system gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Short read or write against the source or sink.
    Io,
    /// The byte stream or the requested session violates the framing contract.
    Protocol,
    /// The compute transport reported a non-transient failure.
    Device,
    /// The session configuration is unusable.
    Config,
    /// The requested operation exists in the CLI surface but is not implemented.
    Unsupported,
    /// Broken internal bookkeeping (this is a bug).
    Internal,
}

#[derive(Error, Debug)]
pub enum ZipqError {
    // =========================================================================
    // === I/O Faults
    // =========================================================================
    #[error("Short read while reading {context}: expected {expected} bytes, got {actual}")]
    ShortRead {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Short write while writing {context}: {expected} bytes could not be written")]
    ShortWrite {
        context: &'static str,
        expected: usize,
    },

    // =========================================================================
    // === Protocol Faults
    // =========================================================================
    #[error("Input stream is empty")]
    EmptyInput,

    #[error("gzip block length ({declared}) exceeds the slot buffer size ({capacity})")]
    BlockExceedsCapacity { declared: usize, capacity: usize },

    #[error("zlib payload ({payload} bytes) does not fit in a single block of {block_size} bytes")]
    ZlibPayloadTooLarge { payload: u64, block_size: usize },

    #[error("Block size {block_size} exceeds the {limit} byte engine limit")]
    BlockSizeAboveLimit { block_size: usize, limit: usize },

    #[error("Frame format error: {0}")]
    FrameFormat(String),

    // =========================================================================
    // === Device Faults
    // =========================================================================
    #[error("Submission to queue {queue} failed: {reason}")]
    SubmitFailed { queue: usize, reason: String },

    #[error("Completion wait on queue {queue} failed: {reason}")]
    CompletionFailed { queue: usize, reason: String },

    #[error("Bad device status (status={status:#04x}, type={algorithm_tag})")]
    BadStatus { status: u32, algorithm_tag: u32 },

    #[error("Device fault: {0}")]
    Device(String),

    // =========================================================================
    // === Session-Level Errors
    // =========================================================================
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session was aborted by an earlier fault and must be recreated")]
    SessionAborted,

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the underlying I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while loading a config file.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl ZipqError {
    /// Classifies this error into its fault family.
    pub fn kind(&self) -> FaultKind {
        use ZipqError::*;
        match self {
            ShortRead { .. } | ShortWrite { .. } | Io(_) => FaultKind::Io,
            EmptyInput
            | BlockExceedsCapacity { .. }
            | ZlibPayloadTooLarge { .. }
            | BlockSizeAboveLimit { .. }
            | FrameFormat(_) => FaultKind::Protocol,
            SubmitFailed { .. } | CompletionFailed { .. } | BadStatus { .. } | Device(_) => {
                FaultKind::Device
            }
            InvalidConfig(_) | SerdeJson(_) => FaultKind::Config,
            Unsupported(_) => FaultKind::Unsupported,
            SessionAborted | InternalError(_) => FaultKind::Internal,
        }
    }
}
