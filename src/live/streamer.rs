//! Outbound media streaming
//!
//! Two pipelines feed the live transport while a session is connected:
//!
//! - [`CapturePipeline`]: microphone blocks at the device rate are resampled
//!   to the 16 kHz wire rate and framed into fixed 100 ms chunks.
//! - [`run_video_snapshots`]: a JPEG snapshot of the camera once per second.
//!
//! Both pipelines exit silently when their channel closes. Teardown works by
//! dropping the channels, not by signalling the pipelines directly, so a
//! pipeline observing a closed channel is the normal end of a session rather
//! than an error.

use std::time::Duration;
use tokio::sync::mpsc;

use super::protocol::ClientMessage;
use crate::audio::Resampler;

/// Wire sample rate for captured audio.
pub const CAPTURE_TARGET_RATE: u32 = 16_000;

/// Frame duration sent to the live API.
const FRAME_DURATION_MS: u32 = 100;

/// Samples per outbound audio frame (100 ms at 16 kHz).
const FRAME_SAMPLES: usize = (CAPTURE_TARGET_RATE * FRAME_DURATION_MS / 1000) as usize;

/// Interval between camera snapshots.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Source of JPEG-encoded camera frames.
///
/// The camera itself is an external collaborator; the snapshot loop only
/// needs a way to grab the latest frame. `None` means no frame is available
/// right now (camera warming up or frame not ready), which skips that tick.
pub trait FrameSource: Send {
    fn capture_jpeg(&mut self) -> Option<Vec<u8>>;
}

/// Reframes microphone blocks into fixed-size wire frames.
pub struct CapturePipeline {
    blocks_rx: mpsc::Receiver<Vec<i16>>,
    outbound: mpsc::Sender<ClientMessage>,
    resampler: Resampler,
    buffer: Vec<i16>,
}

impl CapturePipeline {
    pub fn new(
        blocks_rx: mpsc::Receiver<Vec<i16>>,
        outbound: mpsc::Sender<ClientMessage>,
        source_rate: u32,
    ) -> Self {
        Self {
            blocks_rx,
            outbound,
            resampler: Resampler::new(source_rate, CAPTURE_TARGET_RATE),
            buffer: Vec::with_capacity(FRAME_SAMPLES * 2),
        }
    }

    /// Pump capture blocks into wire frames until either channel closes.
    pub async fn run(mut self) {
        while let Some(block) = self.blocks_rx.recv().await {
            let resampled = self.resampler.resample(&block);
            self.buffer.extend_from_slice(&resampled);

            while self.buffer.len() >= FRAME_SAMPLES {
                let frame: Vec<i16> = self.buffer.drain(..FRAME_SAMPLES).collect();
                if self
                    .outbound
                    .send(ClientMessage::audio_chunk(&frame))
                    .await
                    .is_err()
                {
                    // Transport gone: session is over
                    log::debug!("Capture pipeline exiting (transport closed)");
                    return;
                }
            }
        }
        // Partial trailing frame is discarded; the session is ending anyway
        log::debug!("Capture pipeline exiting (device stopped)");
    }
}

/// Send a camera snapshot to the transport once per second.
///
/// Runs until the transport channel closes. Ticks without an available frame
/// are skipped.
pub async fn run_video_snapshots(
    mut source: Box<dyn FrameSource>,
    outbound: mpsc::Sender<ClientMessage>,
) {
    let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let Some(jpeg) = source.capture_jpeg() else {
            log::trace!("No camera frame available this tick");
            continue;
        };

        if outbound.send(ClientMessage::video_chunk(&jpeg)).await.is_err() {
            log::debug!("Snapshot loop exiting (transport closed)");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_frames(rx: &mut mpsc::Receiver<ClientMessage>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_pipeline_emits_fixed_size_frames() {
        let (blocks_tx, blocks_rx) = mpsc::channel(16);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(16);

        let pipeline = CapturePipeline::new(blocks_rx, outbound_tx, CAPTURE_TARGET_RATE);

        // 2.5 frames worth of samples at the wire rate
        blocks_tx
            .send(vec![0i16; FRAME_SAMPLES * 2 + FRAME_SAMPLES / 2])
            .await
            .unwrap();
        drop(blocks_tx);
        pipeline.run().await;

        // The partial trailing half-frame is not sent
        assert_eq!(sent_frames(&mut outbound_rx), 2);
    }

    #[tokio::test]
    async fn test_pipeline_accumulates_across_blocks() {
        let (blocks_tx, blocks_rx) = mpsc::channel(16);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(16);

        let pipeline = CapturePipeline::new(blocks_rx, outbound_tx, CAPTURE_TARGET_RATE);

        // Four blocks of half a frame each
        for _ in 0..4 {
            blocks_tx.send(vec![0i16; FRAME_SAMPLES / 2]).await.unwrap();
        }
        drop(blocks_tx);
        pipeline.run().await;

        assert_eq!(sent_frames(&mut outbound_rx), 2);
    }

    #[tokio::test]
    async fn test_pipeline_downsamples_device_rate() {
        let (blocks_tx, blocks_rx) = mpsc::channel(16);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(16);

        // 48 kHz device: three device samples per wire sample
        let pipeline = CapturePipeline::new(blocks_rx, outbound_tx, 48_000);

        blocks_tx.send(vec![0i16; FRAME_SAMPLES * 3]).await.unwrap();
        drop(blocks_tx);
        pipeline.run().await;

        assert_eq!(sent_frames(&mut outbound_rx), 1);
    }

    #[tokio::test]
    async fn test_pipeline_resamples_fractional_device_rate() {
        let (blocks_tx, blocks_rx) = mpsc::channel(64);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(64);

        // 44.1 kHz consumer microphone
        let pipeline = CapturePipeline::new(blocks_rx, outbound_tx, 44_100);

        // One second of audio in ten device blocks
        for _ in 0..10 {
            blocks_tx.send(vec![0i16; 4_410]).await.unwrap();
        }
        drop(blocks_tx);
        pipeline.run().await;

        // Exactly 16 000 wire samples: ten full 100 ms frames
        assert_eq!(sent_frames(&mut outbound_rx), 10);
    }

    #[tokio::test]
    async fn test_pipeline_exits_when_transport_closes() {
        let (blocks_tx, blocks_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::channel(16);

        let pipeline = CapturePipeline::new(blocks_rx, outbound_tx, CAPTURE_TARGET_RATE);
        drop(outbound_rx);

        blocks_tx.send(vec![0i16; FRAME_SAMPLES]).await.unwrap();
        // Must return rather than error or hang
        pipeline.run().await;
    }

    struct ScriptedCamera {
        frames: Vec<Option<Vec<u8>>>,
    }

    impl FrameSource for ScriptedCamera {
        fn capture_jpeg(&mut self) -> Option<Vec<u8>> {
            if self.frames.is_empty() {
                None
            } else {
                self.frames.remove(0)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_loop_skips_missing_frames() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(16);
        let camera = ScriptedCamera {
            frames: vec![Some(vec![1, 2, 3]), None, Some(vec![4, 5, 6])],
        };

        let task = tokio::spawn(run_video_snapshots(Box::new(camera), outbound_tx));

        // Three ticks: frame, skip, frame
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        task.abort();

        assert_eq!(sent_frames(&mut outbound_rx), 2);
    }
}
