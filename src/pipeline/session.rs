// In: src/pipeline/session.rs

//! The offload session: negotiated transport, pool and codec for one stream.
//!
//! `OffloadSession::new` validates the config, negotiates capabilities once and
//! builds the pool with device addresses already resolved. Each `run` then feeds
//! one source through the pipeline driver. A fault poisons the session: the pool
//! may still have descriptors outstanding on the device, so the caller has to
//! build a fresh one.

use std::io::{Read, Write};
use std::time::Duration;

use crate::config::{Algorithm, Direction, ZipqConfig};
use crate::error::ZipqError;
use crate::framing::FrameCodec;
use crate::pool::{Pool, DESCRIPTOR_SIZE};
use crate::transport::{Capabilities, CapabilityRequest, Transport};

use super::backoff::{retry_transient, Backoff};
use super::driver::{self, PipelineStrategy};
use super::stats::SessionStats;

//==================================================================================
// 1. Session
//==================================================================================

pub struct OffloadSession<T: Transport> {
    config: ZipqConfig,
    codec: FrameCodec,
    transport: T,
    pool: Pool,
    capabilities: Capabilities,
    backoff: Backoff,
    poisoned: bool,
}

impl<T: Transport> OffloadSession<T> {
    pub fn new(config: ZipqConfig, mut transport: T) -> Result<Self, ZipqError> {
        config.validate()?;
        if config.direction == Direction::Inflate {
            return Err(ZipqError::Unsupported(
                "decompression through the offload engine is not implemented".into(),
            ));
        }

        let request = CapabilityRequest {
            algorithm: config.algorithm,
            direction: config.direction,
            descriptor_size: DESCRIPTOR_SIZE,
            queue_count: config.queue_count,
            pipeline_depth: config.cache_depth,
        };
        let capabilities = transport.negotiate(&request)?;
        if capabilities.queue_count == 0 || capabilities.queue_count > config.queue_count {
            return Err(ZipqError::Device(format!(
                "transport granted {} queues for a request of {}",
                capabilities.queue_count, config.queue_count
            )));
        }

        let pool = Pool::new(
            config.cache_depth,
            config.slot_capacity(),
            config.algorithm.tag(),
            capabilities.address_mode,
            &mut transport,
        )?;

        log::info!(
            "offload session ready: {} blocks of {} bytes, depth {}, {} queue(s), {:?} addressing",
            config.algorithm.name(),
            config.block_size,
            config.cache_depth,
            capabilities.queue_count,
            capabilities.address_mode
        );

        Ok(Self {
            codec: FrameCodec::from_config(&config),
            backoff: Backoff::new(&config.backoff),
            config,
            transport,
            pool,
            capabilities,
            poisoned: false,
        })
    }

    pub fn config(&self) -> &ZipqConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Compresses `source_len` bytes from `source` into framed blocks on `sink`.
    ///
    /// Returns only after every submitted block has been drained and the sink
    /// flushed. Blocks drained before a fault stay written.
    pub fn run<R: Read, W: Write>(
        &mut self,
        source: R,
        source_len: u64,
        sink: W,
    ) -> Result<SessionStats, ZipqError> {
        if self.poisoned {
            return Err(ZipqError::SessionAborted);
        }
        if source_len == 0 {
            return Err(ZipqError::EmptyInput);
        }
        if self.config.algorithm == Algorithm::Zlib && source_len > self.config.block_size as u64 {
            return Err(ZipqError::ZlibPayloadTooLarge {
                payload: source_len,
                block_size: self.config.block_size,
            });
        }
        let remaining = i64::try_from(source_len).map_err(|_| {
            ZipqError::InvalidConfig(format!("source length {} is out of range", source_len))
        })?;

        let mut blocks = BlockRun {
            transport: &mut self.transport,
            pool: &mut self.pool,
            codec: &self.codec,
            backoff: &mut self.backoff,
            timeout: self.config.completion_timeout(),
            block_size: self.config.block_size,
            queue_count: self.capabilities.queue_count,
            stream: StreamState {
                remaining,
                source,
                sink,
            },
            send_queue: 0,
            recv_queue: 0,
            stats: SessionStats::default(),
        };

        let outcome = driver::run(&mut blocks).and_then(|report| {
            blocks.stream.sink.flush()?;
            Ok(report)
        });
        let stats = blocks.stats;

        match outcome {
            Ok(report) => {
                log::info!(
                    "session finished after {} submit and {} drain steps: {}",
                    report.submits,
                    report.drains,
                    stats
                );
                Ok(stats)
            }
            Err(err) => {
                self.poisoned = true;
                log::error!(
                    "session aborted after {} of {} blocks drained: {}",
                    stats.blocks_drained,
                    stats.blocks_submitted,
                    err
                );
                Err(err)
            }
        }
    }

    /// Convenience wrapper over `run` for in-memory data.
    pub fn compress_bytes(&mut self, data: &[u8]) -> Result<Vec<u8>, ZipqError> {
        let mut framed = Vec::with_capacity(data.len() / 2 + 64);
        self.run(data, data.len() as u64, &mut framed)?;
        Ok(framed)
    }
}

//==================================================================================
// 2. Per-Run State
//==================================================================================

/// Source, sink and the count of source bytes not yet submitted.
struct StreamState<R, W> {
    remaining: i64,
    source: R,
    sink: W,
}

/// One run's view of the session, driven through `PipelineStrategy`.
struct BlockRun<'s, T, R, W> {
    transport: &'s mut T,
    pool: &'s mut Pool,
    codec: &'s FrameCodec,
    backoff: &'s mut Backoff,
    timeout: Duration,
    block_size: usize,
    queue_count: usize,
    stream: StreamState<R, W>,
    send_queue: usize,
    recv_queue: usize,
    stats: SessionStats,
}

impl<T: Transport, R: Read, W: Write> PipelineStrategy for BlockRun<'_, T, R, W> {
    fn input_remaining(&self) -> bool {
        self.stream.remaining > 0
    }

    fn slots_available(&self) -> usize {
        self.pool.available()
    }

    fn pipeline_depth(&self) -> usize {
        self.pool.capacity()
    }

    fn submit_next(&mut self) -> Result<(), ZipqError> {
        let index = self
            .pool
            .next_send()
            .ok_or_else(|| ZipqError::InternalError("submit step with no free slot".into()))?;
        let input = self.pool.slot(index).input;

        // Only commit the new remaining count once the block is fully read.
        let previous = self.stream.remaining;
        let estimate = (previous as u64).min(self.block_size as u64) as usize;
        let mut remaining = previous - estimate as i64;
        let buf = self.transport.dma_bytes_mut(&input)?;
        let input_len =
            self.codec
                .fill_block(&mut self.stream.source, estimate, buf, &mut remaining)?;
        self.stream.remaining = remaining;

        let slot = self.pool.slot_mut(index);
        slot.descriptor.arm(input_len as u32);
        let descriptor = slot.descriptor;

        let queue = self.send_queue;
        let transport = &mut *self.transport;
        retry_transient(self.backoff, "submit", || transport.submit(queue, &descriptor)).map_err(
            |err| ZipqError::SubmitFailed {
                queue,
                reason: err.to_string(),
            },
        )?;
        self.stats.submit_retries += self.backoff.attempts();

        self.pool.acquire();
        self.send_queue = (self.send_queue + 1) % self.queue_count;
        self.stats.blocks_submitted += 1;
        self.stats.bytes_read += (previous - remaining) as u64;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.pool.in_flight());
        log::debug!(
            "submitted slot {} ({} bytes) on queue {}, {} bytes left",
            index,
            input_len,
            queue,
            remaining
        );
        Ok(())
    }

    fn drain_next(&mut self) -> Result<(), ZipqError> {
        let index = self
            .pool
            .next_recv()
            .ok_or_else(|| ZipqError::InternalError("drain step with nothing in flight".into()))?;

        let queue = self.recv_queue;
        let timeout = self.timeout;
        let transport = &mut *self.transport;
        let done = retry_transient(self.backoff, "completion", || {
            transport.await_completion(queue, timeout)
        })
        .map_err(|err| ZipqError::CompletionFailed {
            queue,
            reason: err.to_string(),
        })?;
        self.stats.completion_retries += self.backoff.attempts();

        let slot = self.pool.slot(index);
        if done.source_addr != slot.descriptor.source_addr {
            return Err(ZipqError::Device(format!(
                "completion on queue {} names buffer {:#x}, expected slot {} at {:#x}",
                queue, done.source_addr, index, slot.descriptor.source_addr
            )));
        }
        if !done.is_benign() {
            return Err(ZipqError::BadStatus {
                status: done.status,
                algorithm_tag: done.algorithm_tag,
            });
        }
        if done.produced > slot.descriptor.dest_capacity {
            return Err(ZipqError::Device(format!(
                "device produced {} bytes into a {} byte buffer",
                done.produced, slot.descriptor.dest_capacity
            )));
        }

        let output = slot.output;
        let payload = &self.transport.dma_bytes(&output)?[..done.produced as usize];
        let written = self.codec.write_block(&mut self.stream.sink, payload)?;
        self.pool.slot_mut(index).descriptor = done;
        self.pool.release()?;

        self.recv_queue = (self.recv_queue + 1) % self.queue_count;
        self.stats.blocks_drained += 1;
        self.stats.bytes_written += written as u64;
        log::debug!(
            "drained slot {} from queue {}: {} -> {} bytes, status {:#x}",
            index,
            queue,
            done.consumed,
            done.produced,
            done.status
        );
        Ok(())
    }
}
