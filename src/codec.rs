//! Wire codecs for realtime media
//!
//! Pure conversions between the transport's wire formats and in-memory audio:
//! byte buffers ↔ base64 text, and little-endian PCM16 ↔ normalized f32
//! samples. No state, no side effects.
//!
//! Truncated PCM input (an odd trailing byte) is tolerated: the frame count
//! is derived from the complete sample pairs and the remainder is ignored,
//! so a short network read never takes down the pipeline.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Encode a byte buffer as standard base64 text.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 text back into bytes.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

/// Convert little-endian PCM16 bytes to normalized f32 samples in [-1.0, 1.0].
///
/// A trailing odd byte is dropped rather than treated as an error.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            sample as f32 / 32768.0
        })
        .collect()
}

/// Convert normalized f32 samples to little-endian PCM16 bytes.
///
/// Samples outside [-1.0, 1.0] are clamped before quantization.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Convert a single normalized f32 sample to a PCM16 value, clamping.
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    // Scale by 32767 so +1.0 and -1.0 both stay in range
    (clamped * 32767.0) as i16
}

/// Convert i16 PCM samples to little-endian bytes.
pub fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|&s| s.to_le_bytes()).collect()
}
