// Tests for the capture-side frame encoder: device-rate float frames in,
// fixed-size 16 kHz base64 chunks out.

use mitra_voice::audio::pcm;
use mitra_voice::{CaptureFrame, EncoderConfig, FrameEncoder};

fn frame(samples: Vec<f32>, sample_rate: u32, channels: u16) -> CaptureFrame {
    CaptureFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms: 0,
    }
}

#[test]
fn test_emits_nothing_until_a_full_window() {
    let mut encoder = FrameEncoder::new(EncoderConfig {
        target_sample_rate: 16_000,
        frame_samples: 4096,
    });

    // 1600 samples at 16 kHz = 100ms, well short of one window
    let chunks = encoder.push(&frame(vec![0.0; 1600], 16_000, 1));
    assert!(chunks.is_empty());
    assert_eq!(encoder.chunks_emitted(), 0);
}

#[test]
fn test_emits_one_chunk_per_full_window() {
    let mut encoder = FrameEncoder::new(EncoderConfig {
        target_sample_rate: 16_000,
        frame_samples: 4096,
    });

    // 3 windows plus a remainder
    let chunks = encoder.push(&frame(vec![0.25; 4096 * 3 + 100], 16_000, 1));
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert_eq!(chunk.samples.len(), 4096);
        assert_eq!(chunk.sample_rate, 16_000);
    }

    // The remainder surfaces on flush
    let tail = encoder.flush().expect("tail chunk");
    assert_eq!(tail.samples.len(), 100);
    assert!(encoder.flush().is_none());
    assert_eq!(encoder.chunks_emitted(), 4);
}

#[test]
fn test_downsamples_device_rate_input() {
    let mut encoder = FrameEncoder::new(EncoderConfig {
        target_sample_rate: 16_000,
        frame_samples: 4096,
    });

    // 48 kHz input decimates 3:1, so 3 * 4096 device samples make one window
    let chunks = encoder.push(&frame(vec![0.5; 4096 * 3], 48_000, 1));
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].samples.len(), 4096);
}

#[test]
fn test_collapses_stereo_to_mono() {
    let mut encoder = FrameEncoder::new(EncoderConfig {
        target_sample_rate: 16_000,
        frame_samples: 4,
    });

    // L=1.0, R=0.0 averages to 0.5
    let chunks = encoder.push(&frame(vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0], 16_000, 2));
    assert_eq!(chunks.len(), 1);
    for &sample in &chunks[0].samples {
        assert_eq!(sample, pcm::f32_to_i16(0.5));
    }
}

#[test]
fn test_chunk_payload_is_transmit_ready() {
    let mut encoder = FrameEncoder::new(EncoderConfig {
        target_sample_rate: 16_000,
        frame_samples: 8,
    });

    let chunks = encoder.push(&frame(vec![0.5; 8], 16_000, 1));
    assert_eq!(chunks.len(), 1);

    let chunk = &chunks[0];
    assert_eq!(chunk.mime_type(), "audio/pcm;rate=16000");

    // The wire payload decodes back to the same quantized samples
    let decoded = pcm::decode_base64(&chunk.base64_payload()).unwrap();
    assert_eq!(decoded.len(), 8);
    for decoded_sample in decoded {
        assert!((decoded_sample - 0.5).abs() <= 1.0 / 32768.0);
    }
}

#[test]
fn test_accumulates_across_pushes() {
    let mut encoder = FrameEncoder::new(EncoderConfig {
        target_sample_rate: 16_000,
        frame_samples: 1000,
    });

    assert!(encoder.push(&frame(vec![0.1; 600], 16_000, 1)).is_empty());
    let chunks = encoder.push(&frame(vec![0.1; 600], 16_000, 1));
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].samples.len(), 1000);
}
