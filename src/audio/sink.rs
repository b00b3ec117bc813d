//! CPAL-backed playback sink
//!
//! A single mono output stream whose render callback owns the output clock
//! (a frame counter) and mixes every scheduled voice that has reached its
//! start time. Voices are registered by the scheduler through
//! [`CpalSink::spawn`] and drop out of the mix when their samples run out or
//! their stop flag is set.
//!
//! The stream itself lives on a dedicated thread because CPAL streams are
//! not `Send`; the mixer state is shared behind a mutex that the render
//! callback holds only briefly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::playback::{PlaybackSink, PlaybackSource};
use super::AudioError;

/// Playback sample rate the remote streams at.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

struct Voice {
    samples: Vec<f32>,
    start_frame: u64,
    position: usize,
    stopped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

#[derive(Default)]
struct MixerState {
    frames_elapsed: u64,
    voices: HashMap<u64, Voice>,
    next_voice_id: u64,
}

/// Handle to one scheduled chunk inside the mixer.
pub struct CpalSource {
    stopped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl PlaybackSource for CpalSource {
    fn stop(&mut self) {
        // Idempotent: the render callback drops the voice on its next pass
        self.stopped.store(true, Ordering::SeqCst);
        self.finished.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Mixing output sink over the default output device.
pub struct CpalSink {
    state: Arc<Mutex<MixerState>>,
    sample_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open the default output device at the playback rate (24 kHz mono).
    pub fn open() -> Result<Self, AudioError> {
        let state = Arc::new(Mutex::new(MixerState::default()));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), AudioError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_state = state.clone();
        let join = std::thread::Builder::new()
            .name("nia-playback".into())
            .spawn(move || playback_thread(thread_state, ready_tx, stop_rx))
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                state,
                sample_rate: PLAYBACK_SAMPLE_RATE,
                stop_tx: Some(stop_tx),
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(AudioError::StreamCreationFailed(
                    "Playback thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }
}

impl PlaybackSink for CpalSink {
    fn clock(&self) -> f64 {
        let state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.frames_elapsed as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn spawn(&mut self, samples: Vec<f32>, start_at: f64) -> Box<dyn PlaybackSource> {
        let stopped = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let start_frame = (start_at * self.sample_rate as f64).round() as u64;

        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = state.next_voice_id;
        state.next_voice_id += 1;
        state.voices.insert(
            id,
            Voice {
                samples,
                start_frame,
                position: 0,
                stopped: stopped.clone(),
                finished: finished.clone(),
            },
        );

        Box::new(CpalSource { stopped, finished })
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn playback_thread(
    state: Arc<Mutex<MixerState>>,
    ready_tx: std_mpsc::Sender<Result<(), AudioError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_output_stream(state) {
        Ok(stream) => {
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = stop_rx.recv();
    drop(stream);
    log::debug!("Playback thread exiting");
}

fn build_output_stream(state: Arc<Mutex<MixerState>>) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or(AudioError::NoOutputDevice)?;

    log::info!("Using audio output device: {:?}", device.name());

    let config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(PLAYBACK_SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err| log::error!("Playback stream error: {}", err);

    let stream = device
        .build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render(&state, out);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Mix all due voices into the output buffer and advance the clock.
fn render(state: &Arc<Mutex<MixerState>>, out: &mut [f32]) {
    let mut state = match state.lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };

    let base_frame = state.frames_elapsed;
    let frame_count = out.len() as u64;

    out.fill(0.0);

    let mut done = Vec::new();
    for (&id, voice) in state.voices.iter_mut() {
        if voice.stopped.load(Ordering::SeqCst) {
            done.push(id);
            continue;
        }
        if voice.start_frame >= base_frame + frame_count {
            continue;
        }

        // First output index this voice contributes to in this buffer
        let offset = voice.start_frame.saturating_sub(base_frame) as usize;
        for slot in out.iter_mut().skip(offset) {
            match voice.samples.get(voice.position) {
                Some(&sample) => {
                    *slot = (*slot + sample).clamp(-1.0, 1.0);
                    voice.position += 1;
                }
                None => break,
            }
        }

        if voice.position >= voice.samples.len() {
            voice.finished.store(true, Ordering::SeqCst);
            done.push(id);
        }
    }

    for id in done {
        state.voices.remove(&id);
    }

    state.frames_elapsed = base_frame + frame_count;
}
