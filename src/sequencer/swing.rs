// Swing - delays off-grid positions of the swing subdivision

use super::time::Time;
use crate::error::{TransportError, TransportResult, ensure_finite};
use std::f64::consts::PI;

/// Residues closer than this to a grid line count as on the grid
const GRID_EPSILON: f64 = 1e-9;

/// Swing settings and the per-tick displacement they produce
///
/// The displacement follows a half sine over each pair of subdivisions: zero
/// on the downbeat of the pair, largest in the middle. At full swing an
/// off-beat of the subdivision moves by two thirds of a subdivision.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingEngine {
    amount: f64,
    subdivision: Time,
    subdivision_ticks: f64,
}

impl SwingEngine {
    pub fn new(subdivision: Time, subdivision_ticks: f64) -> Self {
        Self {
            amount: 0.0,
            subdivision,
            subdivision_ticks,
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Set the swing amount (0 = straight, 1 = full swing)
    pub fn set_amount(&mut self, amount: f64) -> TransportResult<()> {
        let amount = ensure_finite(amount, "swing")?;
        if !(0.0..=1.0).contains(&amount) {
            return Err(TransportError::invalid(format!(
                "swing must be within [0, 1], got {}",
                amount
            )));
        }
        self.amount = amount;
        Ok(())
    }

    pub fn subdivision(&self) -> &Time {
        &self.subdivision
    }

    pub fn subdivision_ticks(&self) -> f64 {
        self.subdivision_ticks
    }

    /// Set the swing grid; `ticks` is the subdivision resolved by the caller
    pub fn set_subdivision(&mut self, subdivision: Time, ticks: f64) -> TransportResult<()> {
        if !ticks.is_finite() || ticks <= 0.0 {
            return Err(TransportError::invalid(format!(
                "swing subdivision must be positive, got {} ticks",
                ticks
            )));
        }
        self.subdivision = subdivision;
        self.subdivision_ticks = ticks;
        Ok(())
    }

    /// Re-resolve the grid after a resolution change
    pub(crate) fn refresh_ticks(&mut self, ticks: f64) {
        if ticks.is_finite() && ticks > 0.0 {
            self.subdivision_ticks = ticks;
        }
    }

    /// Delay in ticks for an event at `tick`
    ///
    /// Quarter-note positions and the first subdivision of each pair are
    /// never moved.
    pub fn offset_ticks(&self, tick: f64, ppq: u32) -> f64 {
        if self.amount <= 0.0 || self.subdivision_ticks <= 0.0 {
            return 0.0;
        }
        let pair = self.subdivision_ticks * 2.0;
        if on_grid(tick, ppq as f64) || on_grid(tick, pair) {
            return 0.0;
        }
        let progress = tick.rem_euclid(pair) / pair;
        let amount = (progress * PI).sin() * self.amount;
        self.subdivision_ticks * 2.0 / 3.0 * amount
    }
}

fn on_grid(tick: f64, grid: f64) -> bool {
    let residue = tick.rem_euclid(grid);
    residue < GRID_EPSILON || grid - residue < GRID_EPSILON
}
