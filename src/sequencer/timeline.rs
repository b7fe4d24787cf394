// Timeline - ordered store of scheduled events keyed by tick position
// One ordered set per event class, plus an index by id for removal

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Range;

/// Slack for "repeat until" comparisons after float accumulation
const UNTIL_EPSILON: f64 = 1e-6;

/// Identifier handed out by the scheduler
///
/// Ids increase monotonically, so they also record submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event classes, stored separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// Fires whenever the playhead crosses its tick
    OneShot,
    /// Removed from the timeline as soon as it fires
    Once,
    /// Fires at start, start + interval, ...
    Repeating,
}

/// How an entry fires
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    OneShot,
    Once,
    Repeating {
        interval: f64,
        /// Last tick an occurrence may land on
        until: Option<f64>,
    },
}

impl EventKind {
    pub fn class(&self) -> EventClass {
        match self {
            EventKind::OneShot => EventClass::OneShot,
            EventKind::Once => EventClass::Once,
            EventKind::Repeating { .. } => EventClass::Repeating,
        }
    }
}

/// A stored entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub id: EventId,
    /// Trigger tick (first occurrence for repeating entries)
    pub tick: f64,
    pub kind: EventKind,
}

/// A due firing of an entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence {
    pub id: EventId,
    pub tick: f64,
    pub class: EventClass,
}

/// Order key for non-negative ticks
///
/// The IEEE-754 bit pattern of a non-negative float sorts like the value.
type TickKey = u64;

fn tick_key(tick: f64) -> TickKey {
    // `+ 0.0` folds -0.0 into +0.0
    (tick.max(0.0) + 0.0).to_bits()
}

/// Ordered event store
///
/// Ticks must be finite and non-negative; the scheduler validates them.
#[derive(Debug, Default)]
pub struct Timeline {
    next_id: u64,
    one_shot: BTreeSet<(TickKey, EventId)>,
    once: BTreeSet<(TickKey, EventId)>,
    repeating: BTreeSet<(TickKey, EventId)>,
    entries: HashMap<EventId, ScheduledEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry and return its id
    pub fn insert(&mut self, tick: f64, kind: EventKind) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.class_set_mut(kind.class()).insert((tick_key(tick), id));
        self.entries.insert(id, ScheduledEvent { id, tick, kind });
        id
    }

    pub fn get(&self, id: EventId) -> Option<&ScheduledEvent> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stored entries of one class
    pub fn len_of(&self, class: EventClass) -> usize {
        self.class_set(class).len()
    }

    /// Remove one entry; false if the id is unknown
    pub fn remove(&mut self, id: EventId) -> bool {
        let Some(event) = self.entries.remove(&id) else {
            return false;
        };
        self.class_set_mut(event.kind.class())
            .remove(&(tick_key(event.tick), id));
        true
    }

    /// Remove every entry with a trigger tick at or after `after`
    ///
    /// Returns the removed ids in tick order.
    pub fn cancel_from(&mut self, after: f64) -> Vec<EventId> {
        let from = (tick_key(after), EventId(0));
        let mut removed: Vec<(TickKey, EventId)> = Vec::new();
        for class in [EventClass::OneShot, EventClass::Once, EventClass::Repeating] {
            removed.extend(self.class_set_mut(class).split_off(&from));
        }
        removed.sort();
        let ids: Vec<EventId> = removed.into_iter().map(|(_, id)| id).collect();
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.one_shot.clear();
        self.once.clear();
        self.repeating.clear();
        self.entries.clear();
    }

    /// Every firing with a tick inside `window`, ordered by tick then id
    pub fn due(&self, window: Range<f64>) -> Vec<Occurrence> {
        let mut due = Vec::new();
        if !(window.start < window.end) {
            return due;
        }
        let lower = (tick_key(window.start), EventId(0));
        let upper = (tick_key(window.end), EventId(0));

        for class in [EventClass::OneShot, EventClass::Once] {
            let set = self.class_set(class);
            for &(_, id) in set.range(lower..upper) {
                if let Some(event) = self.entries.get(&id) {
                    due.push(Occurrence {
                        id,
                        tick: event.tick,
                        class,
                    });
                }
            }
        }

        for &(_, id) in self.repeating.range(..upper) {
            let Some(event) = self.entries.get(&id) else {
                continue;
            };
            let EventKind::Repeating { interval, until } = event.kind else {
                continue;
            };
            let limit = until.map_or(f64::INFINITY, |until| until + UNTIL_EPSILON);
            let mut k = ((window.start - event.tick) / interval).floor().max(0.0);
            let mut tick = event.tick + k * interval;
            while tick < window.start {
                k += 1.0;
                tick = event.tick + k * interval;
            }
            while tick < window.end && tick <= limit {
                due.push(Occurrence {
                    id,
                    tick,
                    class: EventClass::Repeating,
                });
                k += 1.0;
                tick = event.tick + k * interval;
            }
        }

        due.sort_by(|a, b| a.tick.total_cmp(&b.tick).then(a.id.cmp(&b.id)));
        due
    }

    /// Iterate stored entries in trigger order
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> + '_ {
        let mut keys: Vec<&(TickKey, EventId)> = self
            .one_shot
            .iter()
            .chain(self.once.iter())
            .chain(self.repeating.iter())
            .collect();
        keys.sort();
        keys.into_iter()
            .filter_map(move |(_, id)| self.entries.get(id))
    }

    fn class_set(&self, class: EventClass) -> &BTreeSet<(TickKey, EventId)> {
        match class {
            EventClass::OneShot => &self.one_shot,
            EventClass::Once => &self.once,
            EventClass::Repeating => &self.repeating,
        }
    }

    fn class_set_mut(&mut self, class: EventClass) -> &mut BTreeSet<(TickKey, EventId)> {
        match class {
            EventClass::OneShot => &mut self.one_shot,
            EventClass::Once => &mut self.once,
            EventClass::Repeating => &mut self.repeating,
        }
    }
}
