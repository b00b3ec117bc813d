//! Microphone capture
//!
//! Opens the default input device on a dedicated audio thread (CPAL streams
//! are not `Send`) and forwards mono i16 blocks at the device's native rate
//! over a tokio channel. The capture pipeline downstream handles resampling
//! to the wire rate and framing.
//!
//! The audio callback uses `try_send` so a slow consumer drops blocks instead
//! of blocking the device thread.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::mpsc;

use super::AudioError;

/// Handle to an active capture stream.
///
/// Dropping the handle (or calling [`CaptureHandle::stop`]) shuts down the
/// audio thread and releases the device. Teardown is best-effort and never
/// fails.
pub struct CaptureHandle {
    stop_tx: Option<std_mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CaptureHandle {
    /// The device's native sample rate for the blocks sent on the channel.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop capturing and release the microphone.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start capturing from the default input device.
///
/// Mono i16 blocks at the device rate are sent to `blocks_tx`. Returns a
/// handle that stops the stream when dropped, or `AudioError` when the device
/// is missing or refuses a stream (surfaced to the user as a device-access
/// failure).
pub fn start_capture(blocks_tx: mpsc::Sender<Vec<i16>>) -> Result<CaptureHandle, AudioError> {
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, AudioError>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    let join = std::thread::Builder::new()
        .name("nia-capture".into())
        .spawn(move || capture_thread(blocks_tx, ready_tx, stop_rx))
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(sample_rate)) => Ok(CaptureHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
            sample_rate,
        }),
        Ok(Err(e)) => {
            let _ = join.join();
            Err(e)
        }
        Err(_) => {
            let _ = join.join();
            Err(AudioError::StreamCreationFailed(
                "Capture thread exited before reporting readiness".to_string(),
            ))
        }
    }
}

fn capture_thread(
    blocks_tx: mpsc::Sender<Vec<i16>>,
    ready_tx: std_mpsc::Sender<Result<u32, AudioError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_input_stream(blocks_tx) {
        Ok((stream, sample_rate)) => {
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Park until the handle signals stop or is dropped
    let _ = stop_rx.recv();
    drop(stream);
    log::debug!("Capture thread exiting");
}

fn build_input_stream(
    blocks_tx: mpsc::Sender<Vec<i16>>,
) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = device
        .default_input_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;

    log::info!(
        "Capture config: {} Hz, {} channels, {:?}",
        supported_config.sample_rate().0,
        supported_config.channels(),
        supported_config.sample_format()
    );

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(&device, &config, blocks_tx),
        SampleFormat::U16 => build_stream_typed::<u16>(&device, &config, blocks_tx),
        SampleFormat::F32 => build_stream_typed::<f32>(&device, &config, blocks_tx),
        _ => Err(AudioError::NoSupportedConfig),
    }?;

    Ok((stream, sample_rate))
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    blocks_tx: mpsc::Sender<Vec<i16>>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let err_fn = |err| log::error!("Capture stream error: {}", err);
    let channels = config.channels as usize;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let block = downmix_to_mono_i16(data, channels);
                // Drop the block if the consumer lags; never block the
                // device callback
                if blocks_tx.try_send(block).is_err() {
                    log::trace!("Capture block dropped (consumer busy or gone)");
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Average interleaved channels into mono and convert to i16.
fn downmix_to_mono_i16<T: cpal::Sample<Float = f32>>(data: &[T], channels: usize) -> Vec<i16> {
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame
                .iter()
                .map(|&s| {
                    let f: f32 = s.to_float_sample();
                    f
                })
                .sum();
            crate::codec::f32_to_i16(sum / frame.len() as f32)
        })
        .collect()
}
