// In: src/transport/mod.rs

//! The boundary with the compute queue and its DMA allocator.
//!
//! Everything the pipeline needs from the hardware goes through the two traits in
//! this module. A real device binding implements them over its queue driver; the
//! crate ships `SoftwareEngine`, an in-process implementation used by the CLI,
//! the tests and the benchmarks.

use std::time::Duration;

use thiserror::Error;

use crate::config::{Algorithm, Direction};
use crate::error::ZipqError;
use crate::pool::Descriptor;

pub mod software;

pub use self::software::{EngineOptions, SoftwareEngine};

//==================================================================================
// 1. Transport Results
//==================================================================================

/// Non-success outcomes of a queue operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The queue cannot take or hand back work right now. Retry.
    #[error("device busy")]
    Busy,
    /// No completion arrived within the timeout. Retry.
    #[error("completion not ready")]
    NotReady,
    /// Anything else. Never retried.
    #[error("{0}")]
    Fatal(String),
}

impl TransportError {
    /// Busy and NotReady are retried; Fatal is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Busy | TransportError::NotReady)
    }
}

//==================================================================================
// 2. Capability Negotiation
//==================================================================================

/// How descriptors must name buffers, decided once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// The device shares the host's virtual address space; use host addresses directly.
    SharedVirtual,
    /// The device needs bus addresses from `translate_to_device_address`.
    Translated,
}

/// What the session asks the transport for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRequest {
    pub algorithm: Algorithm,
    pub direction: Direction,
    pub descriptor_size: usize,
    pub queue_count: usize,
    /// Most descriptors the session will ever have outstanding at once.
    pub pipeline_depth: usize,
}

/// What the transport granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub address_mode: AddressMode,
    pub queue_count: usize,
}

//==================================================================================
// 3. The Contracts
//==================================================================================

/// Handle to one DMA-capable buffer. The bytes themselves stay with the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaBuffer {
    pub(crate) region: usize,
    /// Host virtual address of the first byte.
    pub host_addr: u64,
    pub len: usize,
}

/// DMA-visible memory and address translation.
pub trait DmaAllocator {
    fn allocate_dma_region(&mut self, size: usize) -> Result<DmaBuffer, ZipqError>;

    fn translate_to_device_address(&self, buffer: &DmaBuffer) -> Result<u64, ZipqError>;

    /// Host view of a buffer's bytes.
    fn dma_bytes(&self, buffer: &DmaBuffer) -> Result<&[u8], ZipqError>;

    fn dma_bytes_mut(&mut self, buffer: &DmaBuffer) -> Result<&mut [u8], ZipqError>;
}

/// Asynchronous descriptor queues.
pub trait ComputeQueue {
    /// Agrees on addressing and queue count. Called once, before any allocation.
    fn negotiate(&mut self, request: &CapabilityRequest) -> Result<Capabilities, ZipqError>;

    /// Non-blocking enqueue. Only `Busy` and `Fatal` are meaningful here.
    fn submit(&mut self, queue: usize, descriptor: &Descriptor) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the oldest outstanding descriptor on `queue` and
    /// returns it as written back by the device.
    fn await_completion(
        &mut self,
        queue: usize,
        timeout: Duration,
    ) -> Result<Descriptor, TransportError>;
}

/// Everything an offload session needs from its environment.
pub trait Transport: ComputeQueue + DmaAllocator {}

impl<T: ComputeQueue + DmaAllocator> Transport for T {}
