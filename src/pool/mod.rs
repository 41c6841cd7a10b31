// In: src/pool/mod.rs

//! The buffer/descriptor pool: a fixed ring of reusable work slots.
//!
//! Each slot owns an input buffer, an output buffer and a descriptor whose
//! addresses are resolved once, when the pool is built. The ring is walked by two
//! independent cursors: the send cursor hands out the next slot to submit, the
//! receive cursor names the next slot to drain. Because both cursors rotate in the
//! same order, slots are always drained in the order they were submitted.

mod descriptor;

pub use self::descriptor::{Descriptor, DESCRIPTOR_SIZE};

use crate::error::ZipqError;
use crate::transport::{AddressMode, DmaAllocator, DmaBuffer};

/// One (input, output, descriptor) triple.
#[derive(Debug, Clone)]
pub struct Slot {
    pub input: DmaBuffer,
    pub output: DmaBuffer,
    pub descriptor: Descriptor,
}

/// Fixed-capacity ring of slots. Never grows or shrinks.
#[derive(Debug)]
pub struct Pool {
    slots: Vec<Slot>,
    send_cursor: usize,
    recv_cursor: usize,
    available: usize,
}

impl Pool {
    /// Allocates `depth` slots with buffers of `slot_capacity` bytes each and
    /// pre-fills every descriptor with device-visible addresses.
    pub fn new<A: DmaAllocator + ?Sized>(
        depth: usize,
        slot_capacity: usize,
        algorithm_tag: u32,
        address_mode: AddressMode,
        allocator: &mut A,
    ) -> Result<Self, ZipqError> {
        if depth == 0 {
            return Err(ZipqError::InvalidConfig("pool depth must be > 0".into()));
        }
        let dest_capacity = u32::try_from(slot_capacity).map_err(|_| {
            ZipqError::InvalidConfig(format!("slot capacity {} exceeds 32 bits", slot_capacity))
        })?;

        let mut slots = Vec::with_capacity(depth);
        for i in 0..depth {
            let input = allocator.allocate_dma_region(slot_capacity)?;
            let output = allocator.allocate_dma_region(slot_capacity)?;
            let (source_addr, dest_addr) = match address_mode {
                AddressMode::SharedVirtual => (input.host_addr, output.host_addr),
                AddressMode::Translated => (
                    allocator.translate_to_device_address(&input)?,
                    allocator.translate_to_device_address(&output)?,
                ),
            };
            let descriptor = Descriptor {
                source_addr,
                dest_addr,
                algorithm_tag,
                dest_capacity,
                ..Default::default()
            };
            log::debug!(
                "init slot {}: src={:#x} dst={:#x} cap={}",
                i,
                source_addr,
                dest_addr,
                dest_capacity
            );
            slots.push(Slot {
                input,
                output,
                descriptor,
            });
        }

        Ok(Self {
            slots,
            send_cursor: 0,
            recv_cursor: 0,
            available: depth,
        })
    }

    /// N, the pipeline depth.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn available(&self) -> usize {
        self.available
    }

    /// Slots submitted but not yet drained.
    pub fn in_flight(&self) -> usize {
        self.slots.len() - self.available
    }

    /// True when nothing is outstanding on the device.
    pub fn is_idle(&self) -> bool {
        self.available == self.slots.len()
    }

    pub fn send_cursor(&self) -> usize {
        self.send_cursor
    }

    pub fn recv_cursor(&self) -> usize {
        self.recv_cursor
    }

    /// The slot the next `acquire` will hand out, if any is free.
    pub fn next_send(&self) -> Option<usize> {
        (self.available > 0).then_some(self.send_cursor)
    }

    /// The slot the next `release` will return, if any is in flight.
    pub fn next_recv(&self) -> Option<usize> {
        (self.in_flight() > 0).then_some(self.recv_cursor)
    }

    /// Marks the slot at the send cursor as submitted.
    pub fn acquire(&mut self) -> Option<usize> {
        let index = self.next_send()?;
        self.send_cursor = (self.send_cursor + 1) % self.slots.len();
        self.available -= 1;
        Some(index)
    }

    /// Marks the slot at the receive cursor as drained.
    pub fn release(&mut self) -> Result<usize, ZipqError> {
        let index = self.next_recv().ok_or_else(|| {
            ZipqError::InternalError("release called with no slot in flight".into())
        })?;
        self.recv_cursor = (self.recv_cursor + 1) % self.slots.len();
        self.available += 1;
        Ok(index)
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }
}
