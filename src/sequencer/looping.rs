// Loop region - loop flag and bounds in ticks, playhead wraparound

use crate::error::{TransportError, TransportResult};

/// Loop settings
///
/// The end point falls back to one measure while unset, so the effective
/// end depends on the current resolution and time signature.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopRegion {
    enabled: bool,
    start: f64,
    end: Option<f64>,
}

impl LoopRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    /// Effective end in ticks
    pub fn end(&self, measure: f64) -> f64 {
        self.end.unwrap_or(measure)
    }

    pub fn has_explicit_end(&self) -> bool {
        self.end.is_some()
    }

    pub fn length(&self, measure: f64) -> f64 {
        self.end(measure) - self.start
    }

    pub fn set_start(&mut self, start: f64, measure: f64) -> TransportResult<()> {
        Self::validate(start, self.end(measure))?;
        self.start = start;
        Ok(())
    }

    pub fn set_end(&mut self, end: f64) -> TransportResult<()> {
        Self::validate(self.start, end)?;
        self.end = Some(end);
        Ok(())
    }

    pub fn set_points(&mut self, start: f64, end: f64) -> TransportResult<()> {
        Self::validate(start, end)?;
        self.start = start;
        self.end = Some(end);
        Ok(())
    }

    /// Check that the region stays valid under a new measure length
    pub fn check_measure(&self, measure: f64) -> TransportResult<()> {
        Self::validate(self.start, self.end(measure))
    }

    fn validate(start: f64, end: f64) -> TransportResult<()> {
        if start < 0.0 {
            return Err(TransportError::OutOfRangeTime(start));
        }
        if end < 0.0 {
            return Err(TransportError::OutOfRangeTime(end));
        }
        if !(start < end) {
            return Err(TransportError::invalid(format!(
                "loop start ({} ticks) must be before loop end ({} ticks)",
                start, end
            )));
        }
        Ok(())
    }

    /// End tick a piece starting at `from` must stop at, if the loop cuts it
    pub fn crossing(&self, from: f64, to: f64, measure: f64) -> Option<f64> {
        let end = self.end(measure);
        (self.enabled && from < end && to >= end).then_some(end)
    }

    /// Position after wrapping, if the loop is active and `ticks` is past its end
    ///
    /// The loop length is subtracted as many times as needed, so long gaps
    /// land on the same phase.
    pub fn wrap(&self, ticks: f64, measure: f64) -> Option<f64> {
        let end = self.end(measure);
        if !self.enabled || ticks < end {
            return None;
        }
        let length = end - self.start;
        let loops = ((ticks - end) / length).floor() + 1.0;
        let mut wrapped = ticks - loops * length;
        // Float rounding may leave the result a hair outside the region
        while wrapped >= end {
            wrapped -= length;
        }
        Some(wrapped.max(self.start))
    }

    /// Position within the loop as a fraction in [0, 1); 0 when disabled
    pub fn progress(&self, ticks: f64, measure: f64) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        let ticks = self.wrap(ticks, measure).unwrap_or(ticks);
        ((ticks - self.start) / self.length(measure)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEASURE: f64 = 768.0;

    #[test]
    fn test_default_end_is_one_measure() {
        let region = LoopRegion::new();
        assert!(!region.is_enabled());
        assert_eq!(region.start(), 0.0);
        assert_eq!(region.end(MEASURE), MEASURE);
        assert!(!region.has_explicit_end());
    }

    #[test]
    fn test_inverted_region_is_rejected() {
        let mut region = LoopRegion::new();
        assert!(matches!(
            region.set_points(10.0, 10.0),
            Err(TransportError::InvalidArgument(_))
        ));
        assert!(region.set_points(20.0, 10.0).is_err());
        assert!(matches!(
            region.set_points(-1.0, 10.0),
            Err(TransportError::OutOfRangeTime(_))
        ));
        // Failed calls change nothing
        assert_eq!(region.end(MEASURE), MEASURE);

        region.set_end(100.0).unwrap();
        assert!(region.set_start(100.0, MEASURE).is_err());
        region.set_start(50.0, MEASURE).unwrap();
        assert!(region.set_end(40.0).is_err());
    }

    #[test]
    fn test_wrap_reduces_repeatedly() {
        let mut region = LoopRegion::new();
        region.set_points(100.0, 200.0).unwrap();
        assert_eq!(region.wrap(250.0, MEASURE), None);

        region.set_enabled(true);
        assert_eq!(region.wrap(199.0, MEASURE), None);
        assert_eq!(region.wrap(200.0, MEASURE), Some(100.0));
        assert_eq!(region.wrap(250.0, MEASURE), Some(150.0));
        // Three loop lengths past the end
        assert_eq!(region.wrap(525.0, MEASURE), Some(125.0));
    }

    #[test]
    fn test_crossing() {
        let mut region = LoopRegion::new();
        region.set_points(0.0, 38.4).unwrap();
        assert_eq!(region.crossing(30.0, 40.0, MEASURE), None);
        region.set_enabled(true);
        assert_eq!(region.crossing(30.0, 40.0, MEASURE), Some(38.4));
        assert_eq!(region.crossing(30.0, 38.4, MEASURE), Some(38.4));
        assert_eq!(region.crossing(30.0, 38.0, MEASURE), None);
        // Already past the end: handled by wrap, not by crossing
        assert_eq!(region.crossing(40.0, 50.0, MEASURE), None);
    }

    #[test]
    fn test_progress() {
        let mut region = LoopRegion::new();
        assert_eq!(region.progress(384.0, MEASURE), 0.0);
        region.set_enabled(true);
        assert_eq!(region.progress(0.0, MEASURE), 0.0);
        assert!((region.progress(384.0, MEASURE) - 0.5).abs() < 1e-12);
        assert!((region.progress(576.0, MEASURE) - 0.75).abs() < 1e-12);
        assert_eq!(region.progress(MEASURE, MEASURE), 0.0);
    }

    #[test]
    fn test_measure_change_check() {
        let mut region = LoopRegion::new();
        region.set_start(600.0, MEASURE).unwrap();
        assert!(region.check_measure(576.0).is_err());
        assert!(region.check_measure(MEASURE).is_ok());
    }
}
