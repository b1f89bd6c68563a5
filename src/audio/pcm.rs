//! PCM codec for the realtime wire format.
//!
//! The backend speaks base64-wrapped 16-bit little-endian PCM in both
//! directions: 16 kHz mono from the microphone, 24 kHz mono back for
//! playback. Encoding is pure and infallible; decoding validates frame
//! alignment before producing playable samples.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;

/// Microphone sample rate expected by the backend.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio coming back from the backend.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// MIME descriptor attached to every outbound audio frame.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Errors produced while turning wire bytes into playable audio.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("PCM length {len} is not a multiple of {frame} (2 bytes x {channels} channel(s))")]
    Misaligned {
        len: usize,
        frame: usize,
        channels: u16,
    },
}

/// One outbound audio frame, ready to embed in a realtime input message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedFrame {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Decoded PCM tagged with its playback format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Encode float samples in [-1, 1] as base64-wrapped 16-bit LE PCM.
///
/// Out-of-range samples saturate at the i16 limits and sub-quantum detail
/// is truncated. Accepted lossy conversion.
pub fn encode_frame(samples: &[f32]) -> EncodedFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s * 32768.0) as i16; // `as` saturates on overflow
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    EncodedFrame {
        data: BASE64.encode(&bytes),
        mime_type: INPUT_MIME_TYPE.to_string(),
    }
}

/// Decode a base64 wire payload into raw PCM bytes.
///
/// This is only the base64 inverse; it does not produce playable audio.
pub fn decode_frame(payload: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(BASE64.decode(payload)?)
}

/// Interpret raw bytes as 16-bit LE PCM and rescale to f32 in [-1, 1].
pub fn decode_to_audio_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<AudioBuffer, DecodeError> {
    let frame = 2 * channels as usize;
    if frame == 0 || bytes.len() % frame != 0 {
        return Err(DecodeError::Misaligned {
            len: bytes.len(),
            frame,
            channels,
        });
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect();
    Ok(AudioBuffer {
        samples,
        sample_rate,
        channels,
    })
}

/// Root-mean-square amplitude of a capture frame, for the live waveform.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_mime_tag() {
        let frame = encode_frame(&[0.0, 0.5]);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert!(!frame.data.is_empty());
    }

    #[test]
    fn test_encode_saturates_out_of_range() {
        let frame = encode_frame(&[2.0, -2.0]);
        let bytes = decode_frame(&frame.data).unwrap();
        let hi = i16::from_le_bytes([bytes[0], bytes[1]]);
        let lo = i16::from_le_bytes([bytes[2], bytes[3]]);
        assert_eq!(hi, i16::MAX);
        assert_eq!(lo, i16::MIN);
    }

    #[test]
    fn test_round_trip_within_quantization_error() {
        let input = vec![0.0, 0.25, -0.25, 0.99, -0.99, 0.001];
        let frame = encode_frame(&input);
        let bytes = decode_frame(&frame.data).unwrap();
        let buf = decode_to_audio_buffer(&bytes, INPUT_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.samples.len(), input.len());
        for (a, b) in input.iter().zip(buf.samples.iter()) {
            assert!((a - b).abs() < 1.0 / 32768.0 * 2.0, "{a} vs {b}");
        }
    }

    #[test]
    fn test_decode_rejects_misaligned_length() {
        let err = decode_to_audio_buffer(&[0u8, 1, 2], OUTPUT_SAMPLE_RATE, 1).unwrap_err();
        assert!(matches!(err, DecodeError::Misaligned { len: 3, .. }));
    }

    #[test]
    fn test_decode_rejects_odd_stereo_frame() {
        // 6 bytes is 3 mono samples but only 1.5 stereo frames.
        let err = decode_to_audio_buffer(&[0u8; 6], OUTPUT_SAMPLE_RATE, 2).unwrap_err();
        assert!(matches!(err, DecodeError::Misaligned { channels: 2, .. }));
    }

    #[test]
    fn test_buffer_duration() {
        let buf = AudioBuffer {
            samples: vec![0.0; 24_000],
            sample_rate: 24_000,
            channels: 1,
        };
        assert!((buf.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0, 0.0]), 0.0);
        let level = rms(&[0.5, -0.5, 0.5, -0.5]);
        assert!((level - 0.5).abs() < 1e-6);
    }
}
