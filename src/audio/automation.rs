// Automation curve - time-ordered parameter automation (set / linear / exponential)
// Pure data: evaluates values, definite integrals and their inverse

/// How the curve reaches an event's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampKind {
    /// Jump to the value at the event time
    Set,
    /// Linear interpolation from the previous event
    Linear,
    /// Exponential interpolation from the previous event
    Exponential,
}

/// A single automation point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub kind: RampKind,
    pub time: f64,
    pub value: f64,
}

/// Shape of the curve between two consecutive event times
#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Constant(f64),
    Linear { t0: f64, v0: f64, t1: f64, v1: f64 },
    Exponential { t0: f64, v0: f64, t1: f64, v1: f64 },
}

impl Shape {
    fn value(&self, t: f64) -> f64 {
        match *self {
            Shape::Constant(v) => v,
            Shape::Linear { t0, v0, t1, v1 } => {
                let progress = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
                v0 + (v1 - v0) * progress
            }
            Shape::Exponential { t0, v0, t1, v1 } => {
                let progress = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
                v0 * (v1 / v0).powf(progress)
            }
        }
    }

    /// Definite integral over [a, b] (a <= b, both inside the segment)
    fn area(&self, a: f64, b: f64) -> f64 {
        if b <= a {
            return 0.0;
        }
        match *self {
            Shape::Constant(v) => v * (b - a),
            Shape::Linear { .. } => (self.value(a) + self.value(b)) * 0.5 * (b - a),
            Shape::Exponential { t0, v0, t1, v1 } => {
                let tau = (t1 - t0) / (v1 / v0).ln();
                tau * (self.value(b) - self.value(a))
            }
        }
    }

    /// Smallest x >= 0 such that area(a, a + x) == target, if the curve gets there
    fn solve(&self, a: f64, target: f64) -> Option<f64> {
        let va = self.value(a);
        match *self {
            Shape::Constant(v) => (v > 0.0).then(|| target / v),
            Shape::Linear { t0, v0, t1, v1 } => {
                let slope = (v1 - v0) / (t1 - t0);
                if slope.abs() < 1e-12 {
                    return (va > 0.0).then(|| target / va);
                }
                let discriminant = va * va + 2.0 * slope * target;
                if discriminant < 0.0 {
                    return None;
                }
                // Rationalized root, stable when slope is tiny
                let denominator = va + discriminant.sqrt();
                (denominator > 0.0).then(|| 2.0 * target / denominator)
            }
            Shape::Exponential { t0, v0, t1, v1 } => {
                let tau = (t1 - t0) / (v1 / v0).ln();
                let reached = va + target / tau;
                if va <= 0.0 || reached <= 0.0 {
                    return None;
                }
                Some(tau * (reached / va).ln())
            }
        }
    }
}

/// Ordered automation events over an initial value
///
/// Events at the same time keep insertion order. Ramps with no earlier event
/// start from the initial value at time 0.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationCurve {
    initial: f64,
    events: Vec<AutomationEvent>,
}

impl AutomationCurve {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    /// Drop all automation and hold a constant value
    pub fn set_constant(&mut self, value: f64) {
        self.initial = value;
        self.events.clear();
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Insert an event after any existing events at the same time
    pub fn insert(&mut self, event: AutomationEvent) {
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
    }

    pub fn set_value_at(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent {
            kind: RampKind::Set,
            time,
            value,
        });
    }

    pub fn linear_ramp_to(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent {
            kind: RampKind::Linear,
            time,
            value,
        });
    }

    pub fn exponential_ramp_to(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent {
            kind: RampKind::Exponential,
            time,
            value,
        });
    }

    /// Remove every event at or after `time`
    pub fn cancel_from(&mut self, time: f64) {
        let index = self.events.partition_point(|e| e.time < time);
        self.events.truncate(index);
    }

    /// Multiply every value on the curve
    pub fn scale(&mut self, factor: f64) {
        self.initial *= factor;
        for event in &mut self.events {
            event.value *= factor;
        }
    }

    /// Value of the curve at `time`
    pub fn value_at(&self, time: f64) -> f64 {
        self.segment_at(time).0.value(time)
    }

    /// The shape that holds at `time` and the time it stops holding
    fn segment_at(&self, time: f64) -> (Shape, f64) {
        let index = self.events.partition_point(|e| e.time <= time);
        let (t0, v0) = match index.checked_sub(1) {
            Some(i) => (self.events[i].time, self.events[i].value),
            None => (0.0, self.initial),
        };
        let Some(next) = self.events.get(index) else {
            return (Shape::Constant(v0), f64::INFINITY);
        };
        let shape = match next.kind {
            RampKind::Set => Shape::Constant(v0),
            _ if next.time <= t0 || time < t0 => Shape::Constant(v0),
            RampKind::Linear => Shape::Linear {
                t0,
                v0,
                t1: next.time,
                v1: next.value,
            },
            RampKind::Exponential if v0 * next.value > 0.0 && v0 != next.value => {
                Shape::Exponential {
                    t0,
                    v0,
                    t1: next.time,
                    v1: next.value,
                }
            }
            // Degenerate exponential ramps hold the starting value
            RampKind::Exponential => Shape::Constant(v0),
        };
        (shape, next.time)
    }

    /// Definite integral of the curve over [from, to]
    pub fn integrate(&self, from: f64, to: f64) -> f64 {
        let mut t = from;
        let mut area = 0.0;
        while t < to {
            let (shape, end) = self.segment_at(t);
            let until = end.min(to);
            area += shape.area(t, until);
            if until <= t {
                break;
            }
            t = until;
        }
        area
    }

    /// Earliest time `t >= from` where `integrate(from, t) == area`
    ///
    /// Returns `None` if the curve never accumulates that much (the value
    /// drops to zero or below and stays there).
    pub fn time_for_area(&self, from: f64, area: f64) -> Option<f64> {
        if area <= 0.0 {
            return Some(from);
        }
        let mut t = from;
        let mut remaining = area;
        loop {
            let (shape, end) = self.segment_at(t);
            if end.is_infinite() {
                return shape.solve(t, remaining).map(|dt| t + dt);
            }
            let piece = shape.area(t, end);
            if piece >= remaining {
                let dt = shape.solve(t, remaining)?;
                return Some((t + dt).min(end));
            }
            remaining -= piece;
            if end <= t {
                return None;
            }
            t = end;
        }
    }
}

impl Default for AutomationCurve {
    fn default() -> Self {
        Self::new(0.0)
    }
}
