// Transport events - typed notifications and their subscribers

use crate::error::TransportError;
use std::fmt;
use std::str::FromStr;

/// Notification raised by the transport while processing
///
/// Times are engine times in seconds. Offsets are the playhead position in
/// seconds at the moment of the event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    Start { time: f64, offset: f64 },
    Stop { time: f64 },
    Pause { time: f64 },
    Loop { time: f64 },
    LoopStart { time: f64, offset: f64 },
    LoopEnd { time: f64 },
}

impl TransportEvent {
    pub fn kind(&self) -> TransportEventKind {
        match self {
            TransportEvent::Start { .. } => TransportEventKind::Start,
            TransportEvent::Stop { .. } => TransportEventKind::Stop,
            TransportEvent::Pause { .. } => TransportEventKind::Pause,
            TransportEvent::Loop { .. } => TransportEventKind::Loop,
            TransportEvent::LoopStart { .. } => TransportEventKind::LoopStart,
            TransportEvent::LoopEnd { .. } => TransportEventKind::LoopEnd,
        }
    }

    pub fn time(&self) -> f64 {
        match *self {
            TransportEvent::Start { time, .. }
            | TransportEvent::Stop { time }
            | TransportEvent::Pause { time }
            | TransportEvent::Loop { time }
            | TransportEvent::LoopStart { time, .. }
            | TransportEvent::LoopEnd { time } => time,
        }
    }
}

/// Closed set of notification names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    Start,
    Stop,
    Pause,
    Loop,
    LoopStart,
    LoopEnd,
}

impl TransportEventKind {
    pub const ALL: [TransportEventKind; 6] = [
        TransportEventKind::Start,
        TransportEventKind::Stop,
        TransportEventKind::Pause,
        TransportEventKind::Loop,
        TransportEventKind::LoopStart,
        TransportEventKind::LoopEnd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransportEventKind::Start => "start",
            TransportEventKind::Stop => "stop",
            TransportEventKind::Pause => "pause",
            TransportEventKind::Loop => "loop",
            TransportEventKind::LoopStart => "loopStart",
            TransportEventKind::LoopEnd => "loopEnd",
        }
    }
}

impl fmt::Display for TransportEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportEventKind {
    type Err = TransportError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| TransportError::invalid(format!("unknown transport event '{}'", name)))
    }
}

/// Boxed notification handler
pub type EventHandler = Box<dyn FnMut(&TransportEvent)>;

/// Handle returned by `on`, used to unsubscribe that one handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    kind: TransportEventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> TransportEventKind {
        self.kind
    }
}

/// Subscribers per notification kind
///
/// Handlers of one kind run in subscription order.
#[derive(Default)]
pub struct EventRegistry {
    next_id: u64,
    handlers: Vec<(Subscription, EventHandler)>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: TransportEventKind, handler: F) -> Subscription
    where
        F: FnMut(&TransportEvent) + 'static,
    {
        let subscription = Subscription {
            kind,
            id: self.next_id,
        };
        self.next_id += 1;
        self.handlers.push((subscription, Box::new(handler)));
        subscription
    }

    /// Remove one handler; false if it was already removed
    pub fn off(&mut self, subscription: Subscription) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(s, _)| *s != subscription);
        self.handlers.len() != before
    }

    /// Remove every handler of a kind
    pub fn off_all(&mut self, kind: TransportEventKind) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|(s, _)| s.kind != kind);
        before - self.handlers.len()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn count(&self, kind: TransportEventKind) -> usize {
        self.handlers.iter().filter(|(s, _)| s.kind == kind).count()
    }

    pub fn emit(&mut self, event: &TransportEvent) {
        let kind = event.kind();
        for (subscription, handler) in &mut self.handlers {
            if subscription.kind == kind {
                handler(event);
            }
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_event_kind_and_time() {
        let event = TransportEvent::Start {
            time: 0.2,
            offset: 0.5,
        };
        assert_eq!(event.kind(), TransportEventKind::Start);
        assert_eq!(event.time(), 0.2);
        assert_eq!(TransportEvent::LoopEnd { time: 1.0 }.kind().name(), "loopEnd");
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(
            "loopStart".parse::<TransportEventKind>().unwrap(),
            TransportEventKind::LoopStart
        );
        assert!("rewind".parse::<TransportEventKind>().is_err());
    }

    #[test]
    fn test_handlers_fire_in_order_for_their_kind() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = EventRegistry::new();
        for name in ["first", "second"] {
            let log = log.clone();
            registry.on(TransportEventKind::Stop, move |_| log.borrow_mut().push(name));
        }
        let other = log.clone();
        registry.on(TransportEventKind::Start, move |_| other.borrow_mut().push("start"));

        registry.emit(&TransportEvent::Stop { time: 0.0 });
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut registry = EventRegistry::new();
        let c = count.clone();
        let sub = registry.on(TransportEventKind::Loop, move |_| *c.borrow_mut() += 1);
        let c = count.clone();
        registry.on(TransportEventKind::Loop, move |_| *c.borrow_mut() += 10);
        registry.on(TransportEventKind::Pause, |_| {});

        assert!(registry.off(sub));
        assert!(!registry.off(sub));
        registry.emit(&TransportEvent::Loop { time: 0.0 });
        assert_eq!(*count.borrow(), 10);

        assert_eq!(registry.off_all(TransportEventKind::Loop), 1);
        assert_eq!(registry.count(TransportEventKind::Pause), 1);
        assert_eq!(registry.len(), 1);
    }
}
