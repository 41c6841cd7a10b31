// In: src/transport/software.rs

//! An in-process compute engine that honours the full transport contract.
//!
//! The engine behaves like the block-compression hardware it stands in for:
//! descriptors are copied as raw bytes into per-queue submission rings of fixed
//! depth, buffers live in DMA regions with separate virtual and bus address
//! spaces, and each block is deflated (or inflated) into the payload format the
//! hardware emits: raw deflate followed by the zlib ADLER32 or the gzip
//! CRC32/ISIZE trailer, with no container header. Work executes when the
//! completion is polled. Busy streaks, completion latency and forced status codes
//! can be injected to exercise the scheduler's retry and fault paths.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::config::Direction;
use crate::error::ZipqError;
use crate::format::{
    ALG_TAG_GZIP, ALG_TAG_ZLIB, GZIP_HEADER_LEN, STATUS_ADDRESS_FAULT, STATUS_DATA_ERROR,
    STATUS_OUTPUT_OVERFLOW, STATUS_SUCCESS, ZLIB_HEADER, ZLIB_HEADER_LEN,
};
use crate::pool::{Descriptor, DESCRIPTOR_SIZE};

use super::{
    AddressMode, Capabilities, CapabilityRequest, ComputeQueue, DmaAllocator, DmaBuffer,
    TransportError,
};

//==================================================================================
// 0. Constants
//==================================================================================
const PAGE_SIZE: u64 = 4096;
/// Base of the host virtual window handed out by `allocate_dma_region`.
const VIRT_BASE: u64 = 0x7f00_0000_0000;
/// Base of the bus address window the device sees in translated mode.
const BUS_BASE: u64 = 0x0000_0008_0000_0000;
/// A plain gzip header (no optional fields) used to re-wrap payloads for inflate.
const BARE_GZIP_HEADER: [u8; GZIP_HEADER_LEN] =
    [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];

//==================================================================================
// 1. Options
//==================================================================================

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Report `SharedVirtual` addressing instead of `Translated`.
    pub shared_virtual_addressing: bool,
    /// Largest queue count `negotiate` grants.
    pub max_queues: usize,
    /// Submission ring entries per queue.
    pub ring_depth: usize,
    /// `NotReady` polls before each completion becomes visible.
    pub completion_latency: u32,
    /// Deflate level, 0..=9.
    pub level: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            shared_virtual_addressing: false,
            max_queues: 16,
            ring_depth: 1024,
            completion_latency: 0,
            level: 6,
        }
    }
}

//==================================================================================
// 2. Engine State
//==================================================================================

struct Region {
    virt_base: u64,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct QueueState {
    ring: VecDeque<[u8; DESCRIPTOR_SIZE]>,
    pending_polls: u32,
}

struct Session {
    capabilities: Capabilities,
    direction: Direction,
}

pub struct SoftwareEngine {
    options: EngineOptions,
    regions: Vec<Region>,
    next_virt: u64,
    queues: Vec<QueueState>,
    session: Option<Session>,

    // --- Fault injection ---
    busy_submits: u32,
    busy_completions: u32,
    forced_status: Option<u32>,
    fail_next_submit: Option<String>,

    // --- Counters ---
    submitted: u64,
    completed: u64,
    max_outstanding: usize,
}

impl SoftwareEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            regions: Vec::new(),
            next_virt: VIRT_BASE,
            queues: Vec::new(),
            session: None,
            busy_submits: 0,
            busy_completions: 0,
            forced_status: None,
            fail_next_submit: None,
            submitted: 0,
            completed: 0,
            max_outstanding: 0,
        }
    }

    /// The next `n` submissions report `Busy` before one is accepted.
    pub fn inject_submit_busy(&mut self, n: u32) {
        self.busy_submits = n;
    }

    /// The next `n` completion polls report `Busy`.
    pub fn inject_completion_busy(&mut self, n: u32) {
        self.busy_completions = n;
    }

    /// The next completed descriptor carries `status` instead of success.
    pub fn force_status(&mut self, status: u32) {
        self.forced_status = Some(status);
    }

    /// The next submission fails with a non-transient error.
    pub fn fail_next_submit(&mut self, reason: impl Into<String>) {
        self.fail_next_submit = Some(reason.into());
    }

    /// Descriptors accepted but not yet completed, across all queues.
    pub fn outstanding(&self) -> usize {
        self.queues.iter().map(|q| q.ring.len()).sum()
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    fn queue_mut(&mut self, queue: usize) -> Result<&mut QueueState, TransportError> {
        if self.session.is_none() {
            return Err(TransportError::Fatal("queue used before negotiation".into()));
        }
        let count = self.queues.len();
        self.queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::Fatal(format!("queue {} out of range ({})", queue, count)))
    }

    /// Maps a device address to (region, offset) under the negotiated addressing.
    fn resolve(&self, device_addr: u64, len: usize) -> Option<(usize, usize)> {
        let mode = self.session.as_ref()?.capabilities.address_mode;
        let virt = match mode {
            AddressMode::SharedVirtual => device_addr,
            AddressMode::Translated => device_addr.checked_sub(BUS_BASE)?.checked_add(VIRT_BASE)?,
        };
        self.regions.iter().enumerate().find_map(|(i, region)| {
            let offset = virt.checked_sub(region.virt_base)? as usize;
            (offset.checked_add(len)? <= region.bytes.len()).then_some((i, offset))
        })
    }

    /// Runs one block through the engine and writes back the device fields.
    fn execute(&mut self, mut desc: Descriptor) -> Descriptor {
        let direction = match &self.session {
            Some(session) => session.direction,
            None => Direction::Deflate,
        };
        let input_len = desc.input_length as usize;

        let Some((src_region, src_off)) = self.resolve(desc.source_addr, input_len) else {
            desc.status = STATUS_ADDRESS_FAULT;
            return desc;
        };
        let input = &self.regions[src_region].bytes[src_off..src_off + input_len];

        let output = match direction {
            Direction::Deflate => deflate_block(desc.algorithm_tag, input, self.options.level),
            Direction::Inflate => inflate_block(desc.algorithm_tag, input),
        };
        let output = match output {
            Some(bytes) => bytes,
            None => {
                desc.status = STATUS_DATA_ERROR;
                return desc;
            }
        };
        if output.len() > desc.dest_capacity as usize {
            desc.status = STATUS_OUTPUT_OVERFLOW;
            return desc;
        }

        let Some((dst_region, dst_off)) = self.resolve(desc.dest_addr, output.len()) else {
            desc.status = STATUS_ADDRESS_FAULT;
            return desc;
        };
        self.regions[dst_region].bytes[dst_off..dst_off + output.len()].copy_from_slice(&output);

        desc.consumed = desc.input_length;
        desc.produced = output.len() as u32;
        desc.status = self.forced_status.take().unwrap_or(STATUS_SUCCESS);
        desc
    }
}

//==================================================================================
// 3. Block Kernels
//==================================================================================

/// Hardware-format deflate: the container header is stripped, the trailer kept.
fn deflate_block(algorithm_tag: u32, input: &[u8], level: u32) -> Option<Vec<u8>> {
    let level = Compression::new(level.min(9));
    match algorithm_tag {
        ALG_TAG_ZLIB => {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(input.len() / 2), level);
            encoder.write_all(input).ok()?;
            let stream = encoder.finish().ok()?;
            Some(stream[ZLIB_HEADER_LEN..].to_vec())
        }
        ALG_TAG_GZIP => {
            let mut encoder = GzEncoder::new(Vec::with_capacity(input.len() / 2), level);
            encoder.write_all(input).ok()?;
            let member = encoder.finish().ok()?;
            Some(member[GZIP_HEADER_LEN..].to_vec())
        }
        _ => None,
    }
}

/// Inverse of `deflate_block`; verifies the trailer checksum.
fn inflate_block(algorithm_tag: u32, input: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    match algorithm_tag {
        ALG_TAG_ZLIB => {
            ZlibDecoder::new((&ZLIB_HEADER[..]).chain(input))
                .read_to_end(&mut out)
                .ok()?;
        }
        ALG_TAG_GZIP => {
            GzDecoder::new((&BARE_GZIP_HEADER[..]).chain(input))
                .read_to_end(&mut out)
                .ok()?;
        }
        _ => return None,
    }
    Some(out)
}

//==================================================================================
// 4. Transport Contract
//==================================================================================

impl ComputeQueue for SoftwareEngine {
    fn negotiate(&mut self, request: &CapabilityRequest) -> Result<Capabilities, ZipqError> {
        if request.descriptor_size != DESCRIPTOR_SIZE {
            return Err(ZipqError::Unsupported(format!(
                "descriptor size {} (engine expects {})",
                request.descriptor_size, DESCRIPTOR_SIZE
            )));
        }
        if request.queue_count == 0 || request.queue_count > self.options.max_queues {
            return Err(ZipqError::InvalidConfig(format!(
                "engine offers 1..={} queues, {} requested",
                self.options.max_queues, request.queue_count
            )));
        }
        // Every queue must be able to hold its round-robin share of the pipeline.
        let per_queue = request.pipeline_depth.div_ceil(request.queue_count);
        if per_queue > self.options.ring_depth {
            return Err(ZipqError::InvalidConfig(format!(
                "pipeline depth {} needs {} ring entries per queue, engine has {}",
                request.pipeline_depth, per_queue, self.options.ring_depth
            )));
        }

        let capabilities = Capabilities {
            address_mode: if self.options.shared_virtual_addressing {
                AddressMode::SharedVirtual
            } else {
                AddressMode::Translated
            },
            queue_count: request.queue_count,
        };
        self.queues = (0..request.queue_count).map(|_| QueueState::default()).collect();
        let latency = self.options.completion_latency;
        for queue in &mut self.queues {
            queue.pending_polls = latency;
        }
        self.session = Some(Session {
            capabilities,
            direction: request.direction,
        });
        log::debug!(
            "engine negotiated {} queue(s), {:?} addressing, {} {:?}",
            capabilities.queue_count,
            capabilities.address_mode,
            request.algorithm.name(),
            request.direction
        );
        Ok(capabilities)
    }

    fn submit(&mut self, queue: usize, descriptor: &Descriptor) -> Result<(), TransportError> {
        if let Some(reason) = self.fail_next_submit.take() {
            return Err(TransportError::Fatal(reason));
        }
        if self.busy_submits > 0 {
            self.busy_submits -= 1;
            return Err(TransportError::Busy);
        }
        let ring_depth = self.options.ring_depth;
        let state = self.queue_mut(queue)?;
        if state.ring.len() >= ring_depth {
            return Err(TransportError::Busy);
        }
        let mut entry = [0u8; DESCRIPTOR_SIZE];
        entry.copy_from_slice(descriptor.as_bytes());
        state.ring.push_back(entry);

        self.submitted += 1;
        self.max_outstanding = self.max_outstanding.max(self.outstanding());
        Ok(())
    }

    fn await_completion(
        &mut self,
        queue: usize,
        _timeout: Duration,
    ) -> Result<Descriptor, TransportError> {
        if self.busy_completions > 0 {
            self.busy_completions -= 1;
            return Err(TransportError::Busy);
        }
        let latency = self.options.completion_latency;
        let state = self.queue_mut(queue)?;
        if state.ring.is_empty() {
            return Err(TransportError::NotReady);
        }
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Err(TransportError::NotReady);
        }
        state.pending_polls = latency;
        let entry = state
            .ring
            .pop_front()
            .ok_or_else(|| TransportError::Fatal("submission ring underflow".into()))?;
        let desc = Descriptor::from_bytes(&entry)
            .ok_or_else(|| TransportError::Fatal("corrupt ring entry".into()))?;

        self.completed += 1;
        Ok(self.execute(desc))
    }
}

impl DmaAllocator for SoftwareEngine {
    fn allocate_dma_region(&mut self, size: usize) -> Result<DmaBuffer, ZipqError> {
        if size == 0 {
            return Err(ZipqError::InvalidConfig("zero-sized DMA region".into()));
        }
        let virt_base = self.next_virt;
        // Page-align every region and leave a guard page behind it.
        let span = (size as u64).div_ceil(PAGE_SIZE) * PAGE_SIZE + PAGE_SIZE;
        self.next_virt += span;
        self.regions.push(Region {
            virt_base,
            bytes: vec![0u8; size],
        });
        Ok(DmaBuffer {
            region: self.regions.len() - 1,
            host_addr: virt_base,
            len: size,
        })
    }

    fn translate_to_device_address(&self, buffer: &DmaBuffer) -> Result<u64, ZipqError> {
        let region = self.region_of(buffer)?;
        Ok(region.virt_base - VIRT_BASE + BUS_BASE)
    }

    fn dma_bytes(&self, buffer: &DmaBuffer) -> Result<&[u8], ZipqError> {
        Ok(&self.region_of(buffer)?.bytes[..buffer.len])
    }

    fn dma_bytes_mut(&mut self, buffer: &DmaBuffer) -> Result<&mut [u8], ZipqError> {
        self.region_of(buffer)?;
        Ok(&mut self.regions[buffer.region].bytes[..buffer.len])
    }
}

impl SoftwareEngine {
    fn region_of(&self, buffer: &DmaBuffer) -> Result<&Region, ZipqError> {
        self.regions
            .get(buffer.region)
            .filter(|r| r.virt_base == buffer.host_addr && buffer.len <= r.bytes.len())
            .ok_or_else(|| {
                ZipqError::Device(format!(
                    "DMA handle {:#x} was not allocated by this engine",
                    buffer.host_addr
                ))
            })
    }
}

//==================================================================================
// 5. Unit Tests
//==================================================================================
