// Offline rendering - drives the engine clock block by block without a device

use super::timing::EngineClock;
use crate::error::TransportResult;

/// Receiver of the per-quantum tick from the audio engine
pub trait TickListener {
    fn tick(&mut self) -> TransportResult<()>;
}

/// Runs the render loop as fast as possible
///
/// Each block: tick the listener, hand it to the observer with the block's
/// start time, then advance the clock by one block.
#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    clock: EngineClock,
}

impl OfflineRenderer {
    pub fn new(clock: EngineClock) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &EngineClock {
        &self.clock
    }

    /// Render `duration` seconds from the clock's current time
    /// Returns the number of blocks rendered
    pub fn render<L: TickListener>(&self, listener: &mut L, duration: f64) -> TransportResult<usize> {
        self.render_with(listener, duration, |_, _| {})
    }

    pub fn render_with<L, F>(
        &self,
        listener: &mut L,
        duration: f64,
        mut observer: F,
    ) -> TransportResult<usize>
    where
        L: TickListener,
        F: FnMut(&mut L, f64),
    {
        let end = self.clock.now() + duration.max(0.0);
        let mut blocks = 0;
        while self.clock.now() < end {
            let block_start = self.clock.now();
            listener.tick()?;
            observer(listener, block_start);
            self.clock.advance(self.clock.block_size());
            blocks += 1;
        }
        log::trace!("Offline render finished: {} blocks, now {:.6}s", blocks, self.clock.now());
        Ok(blocks)
    }
}
