// PCM sample math shared by the capture and playback paths.
//
// The wire contract is fixed: we transmit 16 kHz mono signed 16-bit PCM and
// receive 24 kHz mono signed 16-bit PCM, both base64-encoded little-endian.

use base64::Engine;

use crate::error::DecodeError;

/// Sample rate for outbound microphone audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate for inbound model audio.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Convert a float sample in [-1.0, 1.0] to signed 16-bit.
///
/// `round(sample * 32768)`, clamped to the i16 range. Values at exactly 1.0
/// land on 32767, so the round-trip error is bounded by 1/32768.
pub fn f32_to_i16(sample: f32) -> i16 {
    let scaled = (sample * 32768.0).round();
    scaled.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Convert a signed 16-bit sample back to float.
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Downsample by decimation: take every Nth sample.
///
/// Only integer ratios are supported (48 kHz -> 16 kHz). If the source rate
/// is at or below the target, samples pass through unchanged.
pub fn downsample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate <= target_rate {
        return samples.to_vec();
    }

    let ratio = (source_rate / target_rate) as usize;
    if ratio <= 1 {
        return samples.to_vec();
    }

    samples.iter().step_by(ratio).copied().collect()
}

/// Collapse interleaved multi-channel samples to mono by averaging.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Pack i16 samples into little-endian bytes and base64-encode them.
pub fn encode_base64(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a base64 payload of little-endian i16 PCM into float samples.
///
/// Rejects payloads that are not valid base64, are empty, or carry an odd
/// number of bytes. Callers drop the offending frame and keep the session
/// alive.
pub fn decode_base64(payload: &str) -> Result<Vec<f32>, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16_to_f32(i16::from_le_bytes([b[0], b[1]])))
        .collect())
}
