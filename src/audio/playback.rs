//! Gap-free playback scheduling for received audio
//!
//! The remote side streams short PCM chunks whose arrival times jitter with
//! the network. The scheduler keeps a single "next start time" cursor on the
//! output clock and schedules each chunk back-to-back at that cursor, so
//! playback stays seamless as long as arrivals keep pace with the clock.
//!
//! An interruption (the user barging in on NIA's speech) flushes everything:
//! all pending sources are stopped, the set is cleared, and the cursor resets
//! to zero so the next chunk starts at the then-current clock time.

/// A single scheduled chunk of audio, owned by the sink.
pub trait PlaybackSource: Send {
    /// Stop playback immediately. Must be safe to call on a source that has
    /// already finished or was already stopped.
    fn stop(&mut self);

    /// True once the source has played to its end or was stopped.
    fn is_finished(&self) -> bool;
}

/// Output device abstraction the scheduler runs against.
///
/// The real implementation is [`super::sink::CpalSink`]; tests use a mock
/// with a hand-driven clock.
pub trait PlaybackSink: Send {
    /// Current output clock time in seconds. Monotonic.
    fn clock(&self) -> f64;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Schedule `samples` (mono f32) to begin playing at `start_at` seconds
    /// on the output clock.
    fn spawn(&mut self, samples: Vec<f32>, start_at: f64) -> Box<dyn PlaybackSource>;
}

/// Schedules decoded audio chunks gap-free and flushes them on interruption.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    /// Next start time on the output clock, in seconds. Non-decreasing
    /// except on an explicit flush.
    cursor: f64,
    /// Sources currently scheduled or playing. Each entry leaves the set
    /// exactly once: reaped after finishing naturally, or stopped by flush.
    pending: Vec<Box<dyn PlaybackSource>>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            cursor: 0.0,
            pending: Vec::new(),
        }
    }

    /// Schedule one chunk of mono f32 samples for gap-free playback.
    ///
    /// Returns the start time assigned to the chunk.
    pub fn enqueue(&mut self, samples: Vec<f32>) -> f64 {
        self.reap_finished();

        let duration = samples.len() as f64 / self.sink.sample_rate() as f64;

        // Never schedule in the past: if arrivals lagged the clock, restart
        // at the current clock time instead of piling up behind it.
        self.cursor = self.cursor.max(self.sink.clock());
        let start_at = self.cursor;

        let source = self.sink.spawn(samples, start_at);
        self.pending.push(source);
        self.cursor += duration;

        start_at
    }

    /// Stop everything and reset the cursor to zero.
    ///
    /// Safe to call at any time, including when empty or when some sources
    /// already finished on their own. Never fails.
    pub fn flush(&mut self) {
        for source in self.pending.iter_mut() {
            // Stopping an already-finished source is a no-op per the trait
            source.stop();
        }
        self.pending.clear();
        self.cursor = 0.0;
    }

    /// Drop sources that finished playing naturally.
    fn reap_finished(&mut self) {
        self.pending.retain(|s| !s.is_finished());
    }

    /// Number of sources currently scheduled or playing.
    pub fn pending_len(&mut self) -> usize {
        self.reap_finished();
        self.pending.len()
    }

    /// Current cursor position in seconds.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }
}
