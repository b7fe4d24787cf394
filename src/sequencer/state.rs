// Transport state - started/stopped/paused and the queue of timed transitions

use std::fmt;

/// Transport state
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Started,
    #[default]
    Stopped,
    Paused,
}

impl TransportState {
    /// Check if ticks are advancing
    pub fn is_started(&self) -> bool {
        matches!(self, TransportState::Started)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, TransportState::Paused)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Started => "started",
            TransportState::Stopped => "stopped",
            TransportState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// A transition that takes effect at an engine time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChange {
    pub state: TransportState,
    pub time: f64,
    /// Tick position to jump to (starts only)
    pub offset: Option<f64>,
}

/// Current state plus transitions that have not been applied yet
///
/// Pending changes are kept sorted by time. Changes at the same time apply
/// in the order they were queued.
#[derive(Debug, Clone, Default)]
pub struct StateTimeline {
    current: TransportState,
    pending: Vec<StateChange>,
}

impl StateTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// State after every applied transition
    pub fn current(&self) -> TransportState {
        self.current
    }

    pub fn pending(&self) -> &[StateChange] {
        &self.pending
    }

    /// Queue a transition after any others at the same time
    pub fn push(&mut self, change: StateChange) {
        let index = self.pending.partition_point(|c| c.time <= change.time);
        self.pending.insert(index, change);
    }

    /// State in effect at `time`, counting pending transitions
    pub fn state_at(&self, time: f64) -> TransportState {
        self.pending
            .iter()
            .take_while(|c| c.time <= time)
            .last()
            .map_or(self.current, |c| c.state)
    }

    /// Drop pending transitions at or after `time`
    pub fn cancel_from(&mut self, time: f64) -> usize {
        let index = self.pending.partition_point(|c| c.time < time);
        let removed = self.pending.len() - index;
        self.pending.truncate(index);
        removed
    }

    /// Time of the earliest pending transition
    pub fn next_time(&self) -> Option<f64> {
        self.pending.first().map(|c| c.time)
    }

    /// Apply the earliest pending transition
    pub fn pop_next(&mut self) -> Option<StateChange> {
        if self.pending.is_empty() {
            return None;
        }
        let change = self.pending.remove(0);
        self.current = change.state;
        Some(change)
    }
}
