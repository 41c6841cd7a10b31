// In: src/pool/descriptor.rs

//! The fixed-layout engine work unit.

use bytemuck::{Pod, Zeroable};

use crate::format::{status_is_benign, STATUS_MASK};

/// One unit of offloaded work, laid out exactly as the device reads it.
///
/// The driver writes the addresses, algorithm and lengths; the device writes back
/// `consumed`, `produced` and `status`. Once a descriptor has been drained it is
/// only read.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Descriptor {
    pub source_addr: u64,
    pub dest_addr: u64,
    pub algorithm_tag: u32,
    pub input_length: u32,
    pub dest_capacity: u32,
    pub consumed: u32,
    pub produced: u32,
    pub status: u32,
}

/// Size of a descriptor on the wire, reported during capability negotiation.
pub const DESCRIPTOR_SIZE: usize = std::mem::size_of::<Descriptor>();

impl Descriptor {
    /// Arms the descriptor for a new block, clearing the device-written fields.
    pub fn arm(&mut self, input_length: u32) {
        self.input_length = input_length;
        self.consumed = 0;
        self.produced = 0;
        self.status = 0;
    }

    pub fn completion_code(&self) -> u32 {
        self.status & STATUS_MASK
    }

    pub fn is_benign(&self) -> bool {
        status_is_benign(self.status)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a descriptor back from raw queue memory. `None` if the length is wrong.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != DESCRIPTOR_SIZE {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}
