// Scheduler - callbacks attached to timeline entries

use super::timeline::{EventClass, EventId, EventKind, Occurrence, Timeline};
use super::transport::Transport;
use crate::error::{TransportError, TransportResult, ensure_finite};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// Scheduled callback: receives the transport and the exact audio time the
/// event is due
pub type Callback = Box<dyn FnMut(&mut Transport, f64) -> TransportResult<()>>;

/// Timeline entries plus the callbacks they fire
#[derive(Default)]
pub struct Scheduler {
    timeline: Timeline,
    callbacks: HashMap<EventId, Callback>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Fire at `tick` every time the playhead crosses it
    pub fn schedule(&mut self, tick: f64, callback: Callback) -> TransportResult<EventId> {
        let tick = validate_tick(tick)?;
        Ok(self.insert(tick, EventKind::OneShot, callback))
    }

    /// Fire at `tick` once, then forget the entry
    pub fn schedule_once(&mut self, tick: f64, callback: Callback) -> TransportResult<EventId> {
        let tick = validate_tick(tick)?;
        Ok(self.insert(tick, EventKind::Once, callback))
    }

    /// Fire at `start`, `start + interval`, ... up to `start + duration`
    pub fn schedule_repeat(
        &mut self,
        start: f64,
        interval: f64,
        duration: Option<f64>,
        callback: Callback,
    ) -> TransportResult<EventId> {
        let interval = ensure_finite(interval, "repeat interval")?;
        if interval <= 0.0 {
            return Err(TransportError::invalid(format!(
                "repeat interval must be positive, got {} ticks",
                interval
            )));
        }
        let start = validate_tick(start)?;
        let until = match duration {
            Some(duration) => {
                let duration = ensure_finite(duration, "repeat duration")?;
                if duration < 0.0 {
                    return Err(TransportError::invalid(format!(
                        "repeat duration must not be negative, got {} ticks",
                        duration
                    )));
                }
                Some(start + duration)
            }
            None => None,
        };
        Ok(self.insert(start, EventKind::Repeating { interval, until }, callback))
    }

    /// Remove every entry at or after `after`; returns how many were removed
    pub fn cancel(&mut self, after: f64) -> usize {
        let removed = self.timeline.cancel_from(after);
        for id in &removed {
            self.callbacks.remove(id);
        }
        removed.len()
    }

    /// Remove one entry; unknown ids are ignored
    pub fn clear(&mut self, id: EventId) -> bool {
        self.callbacks.remove(&id);
        self.timeline.remove(id)
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub(crate) fn due(&self, window: Range<f64>) -> Vec<Occurrence> {
        self.timeline.due(window)
    }

    /// Borrow the callback of a due occurrence for the duration of its call
    ///
    /// Once entries leave the timeline here, before their callback runs.
    pub(crate) fn take(&mut self, occurrence: &Occurrence) -> Option<Callback> {
        let callback = self.callbacks.remove(&occurrence.id)?;
        if occurrence.class == EventClass::Once {
            self.timeline.remove(occurrence.id);
        }
        Some(callback)
    }

    /// Put a callback back unless its entry was removed meanwhile
    pub(crate) fn restore(&mut self, id: EventId, callback: Callback) {
        if self.timeline.contains(id) {
            self.callbacks.insert(id, callback);
        }
    }

    fn insert(&mut self, tick: f64, kind: EventKind, callback: Callback) -> EventId {
        let id = self.timeline.insert(tick, kind);
        self.callbacks.insert(id, callback);
        id
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("timeline", &self.timeline)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

fn validate_tick(tick: f64) -> TransportResult<f64> {
    let tick = ensure_finite(tick, "scheduled position")?;
    if tick < 0.0 {
        return Err(TransportError::OutOfRangeTime(tick));
    }
    Ok(tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Box::new(|_, _| Ok(()))
    }

    #[test]
    fn test_schedule_classes() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.0, noop()).unwrap();
        scheduler.schedule_once(10.0, noop()).unwrap();
        scheduler.schedule_repeat(0.0, 5.0, None, noop()).unwrap();
        assert_eq!(scheduler.len(), 3);
        assert_eq!(scheduler.timeline().len_of(EventClass::OneShot), 1);
        assert_eq!(scheduler.timeline().len_of(EventClass::Once), 1);
        assert_eq!(scheduler.timeline().len_of(EventClass::Repeating), 1);
    }

    #[test]
    fn test_invalid_positions_leave_scheduler_unchanged() {
        let mut scheduler = Scheduler::new();
        assert!(matches!(
            scheduler.schedule(-1.0, noop()),
            Err(TransportError::OutOfRangeTime(_))
        ));
        assert!(matches!(
            scheduler.schedule_repeat(10.0, 0.0, None, noop()),
            Err(TransportError::InvalidArgument(_))
        ));
        assert!(scheduler.schedule_repeat(10.0, -4.0, None, noop()).is_err());
        assert!(scheduler.schedule_repeat(0.0, 4.0, Some(-1.0), noop()).is_err());
        assert!(scheduler.schedule(f64::NAN, noop()).is_err());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_repeat_duration_sets_until() {
        let mut scheduler = Scheduler::new();
        let id = scheduler
            .schedule_repeat(10.0, 5.0, Some(20.0), noop())
            .unwrap();
        let event = scheduler.timeline().get(id).unwrap();
        assert_eq!(
            event.kind,
            EventKind::Repeating {
                interval: 5.0,
                until: Some(30.0)
            }
        );
    }

    #[test]
    fn test_clear_and_cancel() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.schedule(0.0, noop()).unwrap();
        scheduler.schedule_once(1.0, noop()).unwrap();
        scheduler.schedule(2.0, noop()).unwrap();

        assert!(scheduler.clear(a));
        assert!(!scheduler.clear(a));
        assert_eq!(scheduler.cancel(2.0), 1);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.cancel(0.0), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_take_removes_once_entries() {
        let mut scheduler = Scheduler::new();
        let once = scheduler.schedule_once(0.0, noop()).unwrap();
        let shot = scheduler.schedule(0.0, noop()).unwrap();
        let due = scheduler.due(0.0..1.0);
        assert_eq!(due.len(), 2);

        let callback = scheduler.take(&due[0]).unwrap();
        assert!(!scheduler.timeline().contains(once));
        scheduler.restore(once, callback);
        assert!(scheduler.take(&due[0]).is_none());

        let callback = scheduler.take(&due[1]).unwrap();
        assert!(scheduler.timeline().contains(shot));
        scheduler.restore(shot, callback);
        assert!(scheduler.take(&due[1]).is_some());
    }
}
