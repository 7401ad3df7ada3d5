use std::f32::consts::TAU;

use crate::sim::SimBackend;
use crate::{Session, SessionConfig};

#[test]
fn tone_selftest_sine_through_group() {
    let sample_rate = 48_000usize;
    let block_frames = 256usize;
    let backend = SimBackend::new(sample_rate, block_frames);
    let engine = backend.engine();
    let mut session = Session::open(backend, SessionConfig::default()).unwrap();
    let (_rx, id) = session.add_group("loop", 1, 1).unwrap();

    let frequency_hz = 1_000.0f32;
    let total_frames = sample_rate / 10; // 100ms
    let input: Vec<f32> = (0..total_frames)
        .map(|n| {
            let phase = frequency_hz * n as f32 / sample_rate as f32;
            (phase * TAU).sin() * 0.5
        })
        .collect();

    let mut played = Vec::with_capacity(input.len());
    let mut captured = Vec::with_capacity(input.len());
    for chunk in input.chunks(block_frames) {
        for &sample in chunk {
            assert_eq!(session.write(id, &[sample]).unwrap(), 1);
        }
        // A short final chunk is padded so the block can be served.
        for _ in chunk.len()..block_frames {
            session.write(id, &[0.0]).unwrap();
        }
        engine.set_input("loop-in-1", chunk).unwrap();
        assert!(engine.run_block());

        let out = engine.output("loop-out-1").unwrap();
        played.extend_from_slice(&out[..chunk.len()]);
        for _ in 0..block_frames {
            captured.push(session.read(id).unwrap()[0]);
        }
        captured.truncate(played.len());
    }

    assert_eq!(played.len(), input.len());
    assert_eq!(played, input);
    assert_eq!(captured, input);

    let counters = session.group(id).unwrap().counters();
    assert_eq!(counters.underruns, 0);
    assert_eq!(counters.overruns, 0);
    // Exactly one block is queued ahead, which is below the refill threshold.
    let blocks = input.len().div_ceil(block_frames) as u64;
    assert_eq!(counters.blocks, blocks);
    assert_eq!(counters.need_data_signals, blocks);
}

