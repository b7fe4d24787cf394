// Signal - shared handle to an automatable parameter
// Signals can be bound to a tempo signal so their values follow the tempo

use super::automation::AutomationCurve;
use crate::error::{TransportError, TransportResult, ensure_finite};
use std::cell::RefCell;
use std::rc::Rc;

/// Tempo binding of a synced signal
#[derive(Debug, Clone)]
struct TempoBinding {
    tempo: Signal,
    /// Value restored when the binding is removed
    restore: f64,
}

#[derive(Debug)]
struct SignalState {
    /// Plain values, or tempo ratios while bound
    curve: AutomationCurve,
    binding: Option<TempoBinding>,
}

/// Automatable parameter handle
///
/// Clones share the same parameter. All automation methods take absolute
/// engine times in seconds.
#[derive(Debug, Clone)]
pub struct Signal {
    inner: Rc<RefCell<SignalState>>,
}

impl Signal {
    pub fn new(value: f64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SignalState {
                curve: AutomationCurve::new(value),
                binding: None,
            })),
        }
    }

    /// True if both handles point to the same parameter
    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// True while the signal follows a tempo signal
    pub fn is_synced(&self) -> bool {
        self.inner.borrow().binding.is_some()
    }

    /// Effective value at `time`
    pub fn value_at_time(&self, time: f64) -> f64 {
        let state = self.inner.borrow();
        let own = state.curve.value_at(time);
        match &state.binding {
            Some(binding) => own * binding.tempo.value_at_time(time),
            None => own,
        }
    }

    /// Drop all automation and hold `value`
    ///
    /// A synced signal converts the value against the tempo once its last
    /// scheduled change has taken effect.
    pub fn set_value(&self, value: f64) -> TransportResult<()> {
        let value = ensure_finite(value, "signal value")?;
        let mut state = self.inner.borrow_mut();
        let scaled = match &state.binding {
            Some(binding) => {
                let settled = binding.tempo.last_event_time();
                Self::ratio_for(value, &binding.tempo, settled)?
            }
            None => value,
        };
        state.curve.set_constant(scaled);
        Ok(())
    }

    /// Jump to `value` at `time`
    pub fn set_value_at_time(&self, value: f64, time: f64) -> TransportResult<()> {
        let (value, time) = Self::validate(value, time)?;
        let scaled = self.rescale(value, time)?;
        self.inner.borrow_mut().curve.set_value_at(scaled, time);
        Ok(())
    }

    /// Ramp linearly from the previous event to `value`, arriving at `time`
    pub fn linear_ramp_to_value_at_time(&self, value: f64, time: f64) -> TransportResult<()> {
        let (value, time) = Self::validate(value, time)?;
        let scaled = self.rescale(value, time)?;
        self.inner.borrow_mut().curve.linear_ramp_to(scaled, time);
        Ok(())
    }

    /// Ramp exponentially from the previous event to `value`, arriving at `time`
    ///
    /// The target must be non-zero.
    pub fn exponential_ramp_to_value_at_time(&self, value: f64, time: f64) -> TransportResult<()> {
        let (value, time) = Self::validate(value, time)?;
        if value == 0.0 {
            return Err(TransportError::invalid(
                "exponential ramp target must be non-zero",
            ));
        }
        let scaled = self.rescale(value, time)?;
        self.inner.borrow_mut().curve.exponential_ramp_to(scaled, time);
        Ok(())
    }

    /// Follow a sampled curve, spread evenly over `duration` from `start`
    pub fn set_value_curve_at_time(
        &self,
        values: &[f64],
        start: f64,
        duration: f64,
    ) -> TransportResult<()> {
        let Some((first, rest)) = values.split_first() else {
            return Err(TransportError::invalid("value curve must not be empty"));
        };
        let duration = ensure_finite(duration, "curve duration")?;
        if duration < 0.0 {
            return Err(TransportError::invalid("curve duration must not be negative"));
        }
        for value in values {
            ensure_finite(*value, "curve value")?;
        }
        self.set_value_at_time(*first, start)?;
        let step = if rest.is_empty() {
            0.0
        } else {
            duration / rest.len() as f64
        };
        for (i, value) in rest.iter().enumerate() {
            self.linear_ramp_to_value_at_time(*value, start + step * (i + 1) as f64)?;
        }
        Ok(())
    }

    /// Pin the current curve value at `time` so later ramps start from it
    pub fn set_ramp_point(&self, time: f64) -> TransportResult<()> {
        let time = Self::validate_time(time)?;
        let mut state = self.inner.borrow_mut();
        let current = state.curve.value_at(time);
        state.curve.set_value_at(current, time);
        Ok(())
    }

    /// Ramp linearly from the value at `start` to `value` over `ramp_time`
    pub fn linear_ramp_to(&self, value: f64, ramp_time: f64, start: f64) -> TransportResult<()> {
        let ramp_time = Self::validate_duration(ramp_time)?;
        self.set_ramp_point(start)?;
        self.linear_ramp_to_value_at_time(value, start + ramp_time)
    }

    /// Ramp exponentially from the value at `start` to `value` over `ramp_time`
    pub fn exponential_ramp_to(&self, value: f64, ramp_time: f64, start: f64) -> TransportResult<()> {
        let ramp_time = Self::validate_duration(ramp_time)?;
        self.set_ramp_point(start)?;
        self.exponential_ramp_to_value_at_time(value, start + ramp_time)
    }

    /// Remove every automation event at or after `time`
    pub fn cancel_scheduled_values(&self, time: f64) {
        self.inner.borrow_mut().curve.cancel_from(time);
    }

    /// Time of the last automation event, or 0 for a constant curve
    pub(crate) fn last_event_time(&self) -> f64 {
        self.inner
            .borrow()
            .curve
            .events()
            .last()
            .map_or(0.0, |event| event.time)
    }

    /// Definite integral of the signal's own curve
    pub(crate) fn integrate(&self, from: f64, to: f64) -> f64 {
        debug_assert!(!self.is_synced(), "integrals are only defined for unbound signals");
        self.inner.borrow().curve.integrate(from, to)
    }

    /// Time at which the signal's own curve has accumulated `area` since `from`
    pub(crate) fn time_for_area(&self, from: f64, area: f64) -> Option<f64> {
        self.inner.borrow().curve.time_for_area(from, area)
    }

    /// Multiply the signal's own curve (ratios while bound)
    pub(crate) fn scale(&self, factor: f64) {
        self.inner.borrow_mut().curve.scale(factor);
    }

    /// Follow `tempo`, holding `ratio` of it from now on
    ///
    /// Re-binding replaces the ratio but keeps the value captured by the
    /// first binding.
    pub(crate) fn bind(&self, tempo: &Signal, ratio: f64, restore: f64) {
        let mut state = self.inner.borrow_mut();
        let restore = state
            .binding
            .as_ref()
            .map_or(restore, |existing| existing.restore);
        state.curve.set_constant(ratio);
        state.binding = Some(TempoBinding {
            tempo: tempo.clone(),
            restore,
        });
    }

    /// Detach from the tempo and hold the captured value
    ///
    /// Returns false if the signal was not bound.
    pub(crate) fn unbind(&self) -> bool {
        let mut state = self.inner.borrow_mut();
        match state.binding.take() {
            Some(binding) => {
                state.curve.set_constant(binding.restore);
                true
            }
            None => false,
        }
    }

    /// Translate a value at `time` into the curve's domain
    fn rescale(&self, value: f64, time: f64) -> TransportResult<f64> {
        let state = self.inner.borrow();
        match &state.binding {
            Some(binding) => Self::ratio_for(value, &binding.tempo, time),
            None => Ok(value),
        }
    }

    fn ratio_for(value: f64, tempo: &Signal, time: f64) -> TransportResult<f64> {
        let rate = tempo.value_at_time(time);
        if rate == 0.0 {
            return Err(TransportError::invalid(
                "cannot automate a synced signal while the tempo is zero",
            ));
        }
        Ok(value / rate)
    }

    fn validate(value: f64, time: f64) -> TransportResult<(f64, f64)> {
        Ok((ensure_finite(value, "signal value")?, Self::validate_time(time)?))
    }

    fn validate_time(time: f64) -> TransportResult<f64> {
        let time = ensure_finite(time, "automation time")?;
        if time < 0.0 {
            return Err(TransportError::invalid(format!(
                "automation time must not be negative, got {}",
                time
            )));
        }
        Ok(time)
    }

    fn validate_duration(duration: f64) -> TransportResult<f64> {
        let duration = ensure_finite(duration, "ramp time")?;
        if duration < 0.0 {
            return Err(TransportError::invalid("ramp time must not be negative"));
        }
        Ok(duration)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new(0.0)
    }
}
