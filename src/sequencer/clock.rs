// Clock - tick counter driven by the tempo curve
// Ticks accumulate as the integral of the ticks-per-second signal while started

use super::state::{StateChange, StateTimeline, TransportState};
use crate::audio::signal::Signal;
use crate::error::{TransportError, TransportResult};
use std::collections::VecDeque;

/// Known (time, ticks, state) point behind the processing cursor
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    time: f64,
    ticks: f64,
    state: TransportState,
}

/// Musical clock
///
/// The clock is processed forward in pieces by the transport. Everything
/// before `cursor` is settled; transitions queued for later times are applied
/// when processing reaches them. Queries ahead of the cursor simulate the
/// pending transitions, queries behind it use the anchors recorded while
/// processing.
#[derive(Debug)]
pub struct Clock {
    /// Tempo in ticks per second
    frequency: Signal,
    ppq: u32,
    states: StateTimeline,
    /// Tick counter at the cursor
    ticks: f64,
    cursor: f64,
    anchors: VecDeque<Anchor>,
}

impl Clock {
    pub fn new(frequency: Signal, ppq: u32, start_time: f64) -> Self {
        let mut clock = Self {
            frequency,
            ppq: ppq.max(1),
            states: StateTimeline::new(),
            ticks: 0.0,
            cursor: start_time,
            anchors: VecDeque::new(),
        };
        clock.reset_anchors();
        clock
    }

    /// Tempo signal in ticks per second
    pub fn frequency(&self) -> &Signal {
        &self.frequency
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    /// Change the resolution, rescaling the tempo curve so BPM is unchanged
    ///
    /// Elapsed ticks are kept as they are. Returns the factor applied to the
    /// ticks-per-second curve.
    pub fn set_ppq(&mut self, ppq: u32) -> TransportResult<f64> {
        if ppq == 0 {
            return Err(TransportError::invalid("PPQ must be at least 1"));
        }
        let factor = ppq as f64 / self.ppq as f64;
        self.frequency.scale(factor);
        self.ppq = ppq;
        self.reset_anchors();
        Ok(factor)
    }

    pub fn ticks_per_second_at(&self, time: f64) -> f64 {
        self.frequency.value_at_time(time)
    }

    /// Time processed so far
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Tick counter at the cursor
    pub fn ticks(&self) -> f64 {
        self.ticks
    }

    /// State at the cursor
    pub fn state(&self) -> TransportState {
        self.states.current()
    }

    pub fn pending(&self) -> &[StateChange] {
        self.states.pending()
    }

    /// Queue a start; an offset jumps the counter when it takes effect
    ///
    /// Starting while started retriggers. Times behind the cursor take effect
    /// at the cursor.
    pub fn start(&mut self, time: f64, offset: Option<f64>) {
        let time = time.max(self.cursor);
        self.states.push(StateChange {
            state: TransportState::Started,
            time,
            offset,
        });
    }

    /// Queue a pause; ignored unless started at that time
    pub fn pause(&mut self, time: f64) -> bool {
        let time = time.max(self.cursor);
        if !self.states.state_at(time).is_started() {
            return false;
        }
        self.states.push(StateChange {
            state: TransportState::Paused,
            time,
            offset: None,
        });
        true
    }

    /// Queue a stop, dropping transitions at or after it
    ///
    /// Returns false if the clock is already stopped at that time.
    pub fn stop(&mut self, time: f64) -> bool {
        let time = time.max(self.cursor);
        self.states.cancel_from(time);
        if self.states.state_at(time).is_stopped() {
            return false;
        }
        self.states.push(StateChange {
            state: TransportState::Stopped,
            time,
            offset: None,
        });
        true
    }

    pub fn state_at(&self, time: f64) -> TransportState {
        if time >= self.cursor {
            return self.states.state_at(time);
        }
        self.anchor_before(time)
            .map_or(self.states.current(), |anchor| anchor.state)
    }

    /// Tick position at `time`
    pub fn ticks_at(&self, time: f64) -> f64 {
        if time >= self.cursor {
            let mut ticks = self.ticks;
            let mut from = self.cursor;
            let mut state = self.states.current();
            for change in self.states.pending().iter().take_while(|c| c.time <= time) {
                if state.is_started() {
                    ticks += self.integrate(from, change.time);
                }
                ticks = Self::ticks_after(change, ticks);
                state = change.state;
                from = change.time;
            }
            if state.is_started() {
                ticks += self.integrate(from, time);
            }
            return ticks;
        }

        match self.anchor_before(time) {
            Some(anchor) if anchor.state.is_started() => {
                anchor.ticks + self.integrate(anchor.time, time)
            }
            Some(anchor) => anchor.ticks,
            None => self.anchors.front().map_or(self.ticks, |anchor| anchor.ticks),
        }
    }

    /// Set the counter at the cursor
    pub fn set_ticks(&mut self, ticks: f64) {
        self.ticks = ticks;
        self.reset_anchors();
    }

    /// Ticks accumulated over [from, to] regardless of state
    pub fn integrate(&self, from: f64, to: f64) -> f64 {
        self.frequency.integrate(from, to)
    }

    /// Time at which `ticks` more ticks have elapsed since `from`
    pub fn time_for_ticks(&self, from: f64, ticks: f64) -> Option<f64> {
        self.frequency.time_for_area(from, ticks)
    }

    pub fn next_change_time(&self) -> Option<f64> {
        self.states.next_time()
    }

    /// Apply the earliest pending transition and move the cursor to it
    pub(crate) fn apply_next_change(&mut self) -> Option<StateChange> {
        let next = self.states.next_time()?;
        if self.states.current().is_started() && next > self.cursor {
            self.ticks += self.integrate(self.cursor, next);
        }
        let change = self.states.pop_next()?;
        self.cursor = self.cursor.max(change.time);
        self.ticks = Self::ticks_after(&change, self.ticks);
        self.push_anchor();
        Some(change)
    }

    /// Settle processing up to `time` with the counter at `ticks`
    pub(crate) fn advance_to(&mut self, time: f64, ticks: f64) {
        self.cursor = self.cursor.max(time);
        self.ticks = ticks;
        self.push_anchor();
    }

    /// Move the cursor without ticking (stopped or paused)
    pub(crate) fn idle_to(&mut self, time: f64) {
        self.cursor = self.cursor.max(time);
    }

    /// Jump the counter at the cursor, keeping history (loop wraps)
    pub(crate) fn jump(&mut self, ticks: f64) {
        self.ticks = ticks;
        self.push_anchor();
    }

    /// Forget anchors that no query at or after `time` needs
    pub fn prune(&mut self, time: f64) {
        while self.anchors.len() > 1 && self.anchors[1].time <= time {
            self.anchors.pop_front();
        }
    }

    fn ticks_after(change: &StateChange, ticks: f64) -> f64 {
        match change.state {
            TransportState::Started => change.offset.unwrap_or(ticks),
            TransportState::Stopped => 0.0,
            TransportState::Paused => ticks,
        }
    }

    fn anchor_before(&self, time: f64) -> Option<&Anchor> {
        let index = self.anchors.partition_point(|a| a.time <= time);
        index.checked_sub(1).map(|i| &self.anchors[i])
    }

    fn push_anchor(&mut self) {
        self.anchors.push_back(Anchor {
            time: self.cursor,
            ticks: self.ticks,
            state: self.states.current(),
        });
    }

    fn reset_anchors(&mut self) {
        self.anchors.clear();
        self.push_anchor();
    }
}
