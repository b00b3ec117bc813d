//! Audio device layer
//!
//! Capture and playback both run on dedicated audio threads that own their
//! CPAL streams (the `Stream` type is not `Send`), bridged to the async world
//! through channels. Capture produces mono i16 blocks at the device rate;
//! playback renders scheduled f32 chunks through a mixing output callback.

pub mod capture;
pub mod playback;
pub mod sink;

pub use capture::{start_capture, CaptureHandle};
pub use playback::{PlaybackScheduler, PlaybackSink, PlaybackSource};
pub use sink::CpalSink;

/// Errors from opening or running audio devices.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoOutputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoOutputDevice => write!(f, "No audio output device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
        }
    }
}

impl std::error::Error for AudioError {}

/// Linear-interpolating resampler for mono i16 audio.
///
/// Handles arbitrary rate ratios (44.1 kHz → 16 kHz included), which linear
/// interpolation covers well enough for speech. Fractional read position and
/// the last sample of the previous block are kept across calls, so feeding a
/// stream block by block produces the same samples as feeding it whole.
pub struct Resampler {
    /// Source samples consumed per output sample.
    step: f64,
    /// Source-timeline index of the next output sample, relative to the
    /// first sample of the current block. In (-1, step] between blocks.
    pos: f64,
    /// Last sample of the previous block, for interpolation across the
    /// block boundary.
    prev: Option<i16>,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        let step = if source_rate == 0 || target_rate == 0 {
            log::warn!(
                "Invalid sample rate (source: {}, target: {}), passing audio through",
                source_rate,
                target_rate
            );
            1.0
        } else {
            source_rate as f64 / target_rate as f64
        };

        Self {
            step,
            pos: 0.0,
            prev: None,
        }
    }

    /// Resample one block of mono samples.
    pub fn resample(&mut self, block: &[i16]) -> Vec<i16> {
        if block.is_empty() {
            return Vec::new();
        }
        if (self.step - 1.0).abs() < f64::EPSILON {
            return block.to_vec();
        }

        let n = block.len();
        let mut out = Vec::with_capacity((n as f64 / self.step) as usize + 1);
        let mut pos = self.pos;

        while pos <= n as f64 - 1.0 {
            let base = pos.floor();
            let frac = pos - base;
            let i = base as isize;

            let s0 = if i < 0 {
                // Between the previous block's last sample and this block
                self.prev.unwrap_or(block[0]) as f64
            } else {
                block[i as usize] as f64
            };

            let value = if frac > 0.0 {
                let s1 = block[(i + 1) as usize] as f64;
                s0 + (s1 - s0) * frac
            } else {
                s0
            };

            out.push(value.round() as i16);
            pos += self.step;
        }

        self.pos = pos - n as f64;
        self.prev = Some(block[n - 1]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_integer_ratio() {
        // 48kHz → 16kHz (3:1) picks every third sample
        let input = vec![90i16, 120, 150, 300, 330, 360];
        let output = Resampler::new(48_000, 16_000).resample(&input);

        assert_eq!(output, vec![90, 300]);
    }

    #[test]
    fn test_resample_fractional_ratio_yields_target_rate() {
        // One second of 44.1 kHz input must come out as 16 000 samples
        let input = vec![0i16; 44_100];
        let output = Resampler::new(44_100, 16_000).resample(&input);
        assert_eq!(output.len(), 16_000);
    }

    #[test]
    fn test_resample_fractional_ratio_interpolates() {
        // step = 1.5: outputs at source positions 0, 1.5, 3, 4.5, ...
        let input = vec![0i16, 100, 200, 300, 400, 500];
        let output = Resampler::new(24_000, 16_000).resample(&input);
        assert_eq!(output, vec![0, 150, 300, 450]);
    }

    #[test]
    fn test_resample_keeps_phase_across_blocks() {
        let input: Vec<i16> = (0..882).map(|i| (i % 1000) as i16).collect();

        let whole = Resampler::new(44_100, 16_000).resample(&input);

        let mut split = Resampler::new(44_100, 16_000);
        let mut chunked = split.resample(&input[..300]);
        chunked.extend(split.resample(&input[300..700]));
        chunked.extend(split.resample(&input[700..]));

        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_resample_same_rate_passthrough() {
        let input = vec![100i16, 200, 300];
        assert_eq!(Resampler::new(16_000, 16_000).resample(&input), input);
    }

    #[test]
    fn test_resample_zero_rate_passes_through() {
        let input = vec![100i16, 200, 300];
        assert_eq!(Resampler::new(0, 16_000).resample(&input), input);
        assert_eq!(Resampler::new(48_000, 0).resample(&input), input);
    }

    #[test]
    fn test_resample_empty_block() {
        let mut resampler = Resampler::new(44_100, 16_000);
        assert!(resampler.resample(&[]).is_empty());
    }
}
