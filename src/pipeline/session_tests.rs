use std::io::{Cursor, Read};

use flate2::read::{GzDecoder, MultiGzDecoder, ZlibDecoder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::config::{Algorithm, Direction, ZipqConfig};
use crate::error::{FaultKind, ZipqError};
use crate::format::{
    ALG_TAG_GZIP, GZIP_EXTRA_LEN, GZIP_HEADER_LEN, STATUS_DATA_ERROR, STATUS_END_OF_BLOCK,
    ZLIB_HEADER,
};
use crate::framing::{inspect_frames, FrameCodec};
use crate::transport::{AddressMode, EngineOptions, SoftwareEngine};

//==============================================================================
// Test Helpers
//==============================================================================

const BS: usize = 4096;

fn config(algorithm: Algorithm, cache_depth: usize, queue_count: usize) -> ZipqConfig {
    ZipqConfig {
        algorithm,
        block_size: BS,
        cache_depth,
        queue_count,
        ..Default::default()
    }
}

fn session(config: ZipqConfig) -> OffloadSession<SoftwareEngine> {
    OffloadSession::new(config, SoftwareEngine::new(EngineOptions::default())).unwrap()
}

/// Low-entropy bytes so blocks compress, but not to nothing.
fn sample(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| b'a' + rng.random_range(0..8u8)).collect()
}

fn gunzip_all(framed: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    MultiGzDecoder::new(framed).read_to_end(&mut out).unwrap();
    out
}

fn unzlib(framed: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ZlibDecoder::new(framed).read_to_end(&mut out).unwrap();
    out
}

/// Walks `framed` with the crate's decode path and inflates each payload.
fn decode_with_codec(algorithm: Algorithm, framed: &[u8]) -> Vec<u8> {
    let codec = FrameCodec::new(algorithm, Direction::Inflate, 4 * BS);
    let mut source = Cursor::new(framed);
    let mut remaining = framed.len() as i64;
    let mut buf = vec![0u8; 4 * BS];
    let mut out = Vec::new();
    while remaining > 0 {
        let estimate = (2 * BS).min(remaining as usize);
        remaining -= estimate as i64;
        let len = codec.fill_block(&mut source, estimate, &mut buf, &mut remaining).unwrap();
        let payload = &buf[..len];
        match algorithm {
            Algorithm::Zlib => {
                ZlibDecoder::new((&ZLIB_HEADER[..]).chain(payload))
                    .read_to_end(&mut out)
                    .unwrap();
            }
            Algorithm::Gzip => {
                let header = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0x03];
                GzDecoder::new((&header[..]).chain(payload))
                    .read_to_end(&mut out)
                    .unwrap();
            }
        }
    }
    assert_eq!(source.position() as usize, framed.len());
    out
}

/// Each gzip member of `framed`, decoded on its own.
fn members(framed: &[u8]) -> Vec<Vec<u8>> {
    inspect_frames(Algorithm::Gzip, framed)
        .unwrap()
        .iter()
        .map(|frame| {
            let mut out = Vec::new();
            GzDecoder::new(&framed[frame.offset..frame.end()])
                .read_to_end(&mut out)
                .unwrap();
            out
        })
        .collect()
}

//==============================================================================
// Round Trip
//==============================================================================

#[test]
fn test_gzip_round_trip_across_block_boundaries() {
    for (i, len) in [1, BS, BS + 1, 5 * BS + 17].into_iter().enumerate() {
        let data = sample(len, i as u64);
        let mut session = session(config(Algorithm::Gzip, 2, 1));
        let framed = session.compress_bytes(&data).unwrap();

        assert_eq!(gunzip_all(&framed), data, "len {}", len);
        assert_eq!(decode_with_codec(Algorithm::Gzip, &framed), data, "len {}", len);

        let blocks = len.div_ceil(BS);
        let frames = inspect_frames(Algorithm::Gzip, &framed).unwrap();
        assert_eq!(frames.len(), blocks);
        assert_eq!(frames.last().unwrap().end(), framed.len());
        assert!(session.pool().is_idle());
    }
}

#[test]
fn test_zlib_round_trip_single_block() {
    for len in [1, BS / 3, BS] {
        let data = sample(len, 99);
        let mut session = session(config(Algorithm::Zlib, 4, 1));
        let framed = session.compress_bytes(&data).unwrap();

        assert_eq!(&framed[..2], &ZLIB_HEADER);
        assert_eq!(unzlib(&framed), data);
        assert_eq!(decode_with_codec(Algorithm::Zlib, &framed), data);
    }
}

#[test]
fn test_stats_account_for_every_block() {
    let data = sample(3 * BS + 5, 3);
    let mut session = session(config(Algorithm::Gzip, 2, 1));
    let mut framed = Vec::new();
    let stats = session.run(&data[..], data.len() as u64, &mut framed).unwrap();

    assert_eq!(stats.blocks_submitted, 4);
    assert_eq!(stats.blocks_drained, 4);
    assert_eq!(stats.bytes_read, data.len() as u64);
    assert_eq!(stats.bytes_written, framed.len() as u64);
    assert_eq!(stats.peak_in_flight, 2);
    assert_eq!((stats.submit_retries, stats.completion_retries), (0, 0));
    assert!(stats.ratio() < 1.0);
}

#[test]
fn test_session_can_run_again_after_success() {
    let mut session = session(config(Algorithm::Gzip, 3, 2));
    let first = sample(2 * BS, 1);
    let second = sample(BS + 9, 2);
    assert_eq!(gunzip_all(&session.compress_bytes(&first).unwrap()), first);
    assert_eq!(gunzip_all(&session.compress_bytes(&second).unwrap()), second);
    assert_eq!(session.transport().outstanding(), 0);
}

#[test]
fn test_tiny_block_sizes_fit_engine_output() {
    for block_size in [1, 4, 8, 12, 33] {
        let patterned: Vec<u8> = (0..3 * block_size).map(|i| (i % 7) as u8).collect();
        let mut rng = StdRng::seed_from_u64(block_size as u64);
        let noisy: Vec<u8> = (0..3 * block_size).map(|_| rng.random::<u8>()).collect();

        for data in [patterned, noisy] {
            let config = ZipqConfig {
                block_size,
                cache_depth: 2,
                ..Default::default()
            };
            let mut session = session(config);
            let framed = session.compress_bytes(&data).unwrap();
            assert_eq!(gunzip_all(&framed), data, "block size {}", block_size);
            assert_eq!(inspect_frames(Algorithm::Gzip, &framed).unwrap().len(), 3);
        }
    }
}

#[test]
fn test_cursors_meet_after_every_run() {
    let mut session = session(config(Algorithm::Gzip, 3, 2));
    assert_eq!(session.config().cache_depth, 3);
    let data = sample(5 * BS, 13);
    session.compress_bytes(&data).unwrap();

    let pool = session.pool();
    assert_eq!(pool.send_cursor(), 5 % 3);
    assert_eq!(pool.recv_cursor(), pool.send_cursor());
    assert!(pool.is_idle());
}

//==============================================================================
// Ordering and Depth
//==============================================================================

#[test]
fn test_blocks_come_out_in_source_order_at_every_depth() {
    // Block i is filled with byte i so misordering is visible per member.
    let blocks = 11;
    let data: Vec<u8> = (0..blocks).flat_map(|i| vec![i as u8; BS]).collect();

    for depth in [1, 2, 4, 8] {
        for queues in [1, 3] {
            let engine = SoftwareEngine::new(EngineOptions {
                completion_latency: 1,
                ..Default::default()
            });
            let mut session = OffloadSession::new(config(Algorithm::Gzip, depth, queues), engine).unwrap();
            let framed = session.compress_bytes(&data).unwrap();

            let decoded = members(&framed);
            assert_eq!(decoded.len(), blocks, "depth {} queues {}", depth, queues);
            for (i, member) in decoded.iter().enumerate() {
                assert_eq!(member, &vec![i as u8; BS], "depth {} queues {}", depth, queues);
            }
            assert!(session.transport().max_outstanding() <= depth);
            assert_eq!(session.pool().available(), depth);
        }
    }
}

#[test]
fn test_three_uneven_blocks_with_two_slots() {
    let sizes = [BS, BS / 2, 1];
    let chunks: Vec<Vec<u8>> = sizes.iter().enumerate().map(|(i, &n)| sample(n, 10 + i as u64)).collect();
    let data = chunks.concat();

    let mut session = session(config(Algorithm::Gzip, 2, 1));
    let framed = session.compress_bytes(&data).unwrap();

    assert_eq!(gunzip_all(&framed), data);
    // The source is chunked at BS, so the two short pieces share the second member.
    let decoded = members(&framed);
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0], chunks[0]);
    assert_eq!(decoded[1], [chunks[1].clone(), chunks[2].clone()].concat());
    assert_eq!(session.pool().available(), 2);
    assert!(session.pool().is_idle());
}

#[test]
fn test_translated_and_shared_addressing_give_identical_output() {
    let data = sample(3 * BS, 21);
    let mut outputs = Vec::new();
    for shared in [false, true] {
        let engine = SoftwareEngine::new(EngineOptions {
            shared_virtual_addressing: shared,
            ..Default::default()
        });
        let mut session = OffloadSession::new(config(Algorithm::Gzip, 2, 1), engine).unwrap();
        let expected = if shared {
            AddressMode::SharedVirtual
        } else {
            AddressMode::Translated
        };
        assert_eq!(session.capabilities().address_mode, expected);
        outputs.push(session.compress_bytes(&data).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(gunzip_all(&outputs[0]), data);
}

//==============================================================================
// Rejections at Session Start
//==============================================================================

#[test]
fn test_empty_input_is_rejected() {
    for algorithm in [Algorithm::Gzip, Algorithm::Zlib] {
        let mut session = session(config(algorithm, 2, 1));
        let err = session.compress_bytes(&[]).unwrap_err();
        assert!(matches!(err, ZipqError::EmptyInput));
        assert_eq!(err.kind(), FaultKind::Protocol);
        assert!(!session.is_poisoned());
    }
}

#[test]
fn test_zlib_payload_above_block_size_is_rejected_before_any_io() {
    let data = sample(BS + 1, 5);
    let mut session = session(config(Algorithm::Zlib, 2, 1));
    let mut sink = Vec::new();
    let err = session.run(&data[..], data.len() as u64, &mut sink).unwrap_err();

    assert!(matches!(
        err,
        ZipqError::ZlibPayloadTooLarge {
            payload,
            block_size: BS
        } if payload == (BS + 1) as u64
    ));
    assert!(sink.is_empty());
    assert_eq!(session.transport().submitted(), 0);
}

#[test]
fn test_inflate_direction_is_unsupported() {
    let config = ZipqConfig {
        direction: Direction::Inflate,
        ..Default::default()
    };
    let err = OffloadSession::new(config, SoftwareEngine::new(EngineOptions::default()))
        .err()
        .unwrap();
    assert_eq!(err.kind(), FaultKind::Unsupported);
}

#[test]
fn test_more_queues_than_the_engine_offers_is_rejected() {
    let engine = SoftwareEngine::new(EngineOptions {
        max_queues: 2,
        ..Default::default()
    });
    let err = OffloadSession::new(config(Algorithm::Gzip, 4, 3), engine).err().unwrap();
    assert_eq!(err.kind(), FaultKind::Config);
}

//==============================================================================
// Faults and Transient Conditions
//==============================================================================

#[test]
fn test_short_source_aborts_without_partial_block() {
    // Claims three blocks but delivers two and a bit.
    let data = sample(2 * BS + 10, 8);
    let mut session = session(config(Algorithm::Gzip, 2, 1));
    let mut sink = Vec::new();
    let err = session.run(&data[..], 3 * BS as u64, &mut sink).unwrap_err();

    assert_eq!(err.kind(), FaultKind::Io);
    assert!(matches!(
        err,
        ZipqError::ShortRead {
            context: "block payload",
            expected: BS,
            actual: 10
        }
    ));
    // Only the block drained before the fault reached the sink, fully framed.
    let frames = inspect_frames(Algorithm::Gzip, &sink).unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].end(), sink.len());
    assert_eq!(gunzip_all(&sink), &data[..BS]);

    assert!(session.is_poisoned());
    let again = session.compress_bytes(b"more").unwrap_err();
    assert!(matches!(again, ZipqError::SessionAborted));
}

#[test]
fn test_transient_conditions_are_retried_and_counted() {
    let engine = SoftwareEngine::new(EngineOptions {
        completion_latency: 2,
        ..Default::default()
    });
    let mut session = OffloadSession::new(config(Algorithm::Gzip, 2, 1), engine).unwrap();
    session.transport_mut().inject_submit_busy(3);
    session.transport_mut().inject_completion_busy(2);

    let data = sample(3 * BS, 4);
    let mut framed = Vec::new();
    let stats = session.run(&data[..], data.len() as u64, &mut framed).unwrap();

    assert_eq!(gunzip_all(&framed), data);
    assert_eq!(stats.submit_retries, 3);
    // Two injected Busy polls, then two NotReady polls ahead of each of three blocks.
    assert_eq!(stats.completion_retries, 2 + 2 * 3);
}

#[test]
fn test_bad_device_status_is_fatal() {
    let mut session = session(config(Algorithm::Gzip, 2, 1));
    session.transport_mut().force_status(STATUS_DATA_ERROR);
    let err = session.compress_bytes(&sample(BS, 6)).unwrap_err();

    assert_eq!(err.kind(), FaultKind::Device);
    assert!(matches!(
        err,
        ZipqError::BadStatus {
            status: STATUS_DATA_ERROR,
            algorithm_tag: ALG_TAG_GZIP
        }
    ));
    assert!(session.is_poisoned());
}

#[test]
fn test_end_of_block_status_is_benign() {
    let data = sample(2 * BS, 7);
    let mut session = session(config(Algorithm::Gzip, 2, 1));
    session.transport_mut().force_status(0x100 | STATUS_END_OF_BLOCK);
    assert_eq!(gunzip_all(&session.compress_bytes(&data).unwrap()), data);
}

#[test]
fn test_fatal_submit_error_names_the_queue() {
    let mut session = session(config(Algorithm::Gzip, 2, 1));
    session.transport_mut().fail_next_submit("queue reset");
    let err = session.compress_bytes(&sample(BS, 2)).unwrap_err();
    match err {
        ZipqError::SubmitFailed { queue, reason } => {
            assert_eq!(queue, 0);
            assert_eq!(reason, "queue reset");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_gzip_members_declare_their_payload_length() {
    let data = sample(2 * BS + 1, 12);
    let framed = session(config(Algorithm::Gzip, 4, 2)).compress_bytes(&data).unwrap();
    for frame in inspect_frames(Algorithm::Gzip, &framed).unwrap() {
        assert_eq!(frame.header_len, GZIP_HEADER_LEN + GZIP_EXTRA_LEN);
        let mut decoder = GzDecoder::new(&framed[frame.offset..frame.end()]);
        let mut sink = Vec::new();
        decoder.read_to_end(&mut sink).unwrap();
        let extra = decoder.header().unwrap().extra().unwrap();
        let declared = u32::from_le_bytes([extra[4], extra[5], extra[6], extra[7]]);
        assert_eq!(declared as usize, frame.payload_len);
    }
}
