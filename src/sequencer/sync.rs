// Signal sync - signals whose values follow the transport tempo

use crate::audio::signal::Signal;
use crate::error::{TransportError, TransportResult, ensure_finite};

/// Signals currently bound to a tempo signal
#[derive(Debug, Default)]
pub struct SignalSync {
    synced: Vec<Signal>,
}

impl SignalSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `signal` to `tempo` from now on
    ///
    /// Without an explicit ratio the signal keeps its current value: the ratio
    /// is its value over the tempo at `now`. Re-syncing replaces the ratio.
    pub fn sync(
        &mut self,
        signal: &Signal,
        tempo: &Signal,
        ratio: Option<f64>,
        now: f64,
    ) -> TransportResult<()> {
        if signal.ptr_eq(tempo) {
            return Err(TransportError::invalid(
                "the tempo signal cannot be synced to itself",
            ));
        }
        let value = signal.value_at_time(now);
        let ratio = match ratio {
            Some(ratio) => ensure_finite(ratio, "sync ratio")?,
            None if value == 0.0 => 0.0,
            None => {
                let rate = tempo.value_at_time(now);
                if rate == 0.0 {
                    return Err(TransportError::invalid(
                        "cannot derive a sync ratio while the tempo is zero",
                    ));
                }
                value / rate
            }
        };

        signal.bind(tempo, ratio, value);
        if !self.contains(signal) {
            self.synced.push(signal.clone());
        }
        log::debug!("Synced signal to tempo with ratio {:.6}", ratio);
        Ok(())
    }

    /// Detach `signal`; it holds the value it had when first synced
    ///
    /// Returns false if the signal was not synced.
    pub fn unsync(&mut self, signal: &Signal) -> bool {
        self.synced.retain(|synced| !synced.ptr_eq(signal));
        let unbound = signal.unbind();
        if unbound {
            log::debug!("Unsynced signal from tempo");
        }
        unbound
    }

    pub fn contains(&self, signal: &Signal) -> bool {
        self.synced.iter().any(|synced| synced.ptr_eq(signal))
    }

    pub fn len(&self) -> usize {
        self.synced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synced.is_empty()
    }

    /// Multiply every synced ratio (tempo curve rescaled by the inverse)
    pub(crate) fn rescale(&self, factor: f64) {
        for signal in &self.synced {
            signal.scale(factor);
        }
    }
}
