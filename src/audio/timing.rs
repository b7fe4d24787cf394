// Engine clock - the audio engine's sample counter seen from the transport
// The render callback advances it, the transport reads current time from it

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default render quantum in frames
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Shared audio engine clock
///
/// Cloning shares the sample counter, so the render side and the transport
/// always agree on the current engine time.
#[derive(Debug, Clone)]
pub struct EngineClock {
    /// Current sample position (incremented by the render callback)
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
    block_size: usize,
    /// Extra time processed ahead of the current block, in seconds
    lookahead: f64,
}

impl EngineClock {
    /// Create a clock at sample 0 with the default block size
    /// Lookahead defaults to one block
    pub fn new(sample_rate: f64) -> Self {
        Self::with_block_size(sample_rate, DEFAULT_BLOCK_SIZE)
    }

    /// Create a clock with a custom render quantum
    pub fn with_block_size(sample_rate: f64, block_size: usize) -> Self {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            log::warn!("Invalid sample rate {}, falling back to 44100 Hz", sample_rate);
            44_100.0
        };
        let block_size = block_size.max(1);
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate,
            block_size,
            lookahead: block_size as f64 / sample_rate,
        }
    }

    /// Override the lookahead (seconds, clamped to >= 0)
    pub fn with_lookahead(mut self, lookahead: f64) -> Self {
        self.lookahead = if lookahead.is_finite() { lookahead.max(0.0) } else { 0.0 };
        self
    }

    /// Current sample position
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Relaxed)
    }

    /// Advance sample position (called from the render callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Jump to an absolute sample position
    pub fn seek(&self, sample: u64) {
        self.sample_position.store(sample, Ordering::Relaxed);
    }

    /// Current engine time in seconds
    pub fn now(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Duration of one render quantum in seconds
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.sample_rate
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// Scheduling time: engine time plus lookahead
    /// A tick pass processes everything before it
    pub fn horizon(&self) -> f64 {
        self.now() + self.lookahead
    }

    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    /// Convert seconds to the nearest sample index (negative times clamp to 0)
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }
}
