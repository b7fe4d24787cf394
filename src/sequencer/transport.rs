// Transport - musical scheduling locked to the audio engine clock
// Owns the clock, timeline, loop and swing state and processes them once per render quantum

use super::clock::Clock;
use super::looping::LoopRegion;
use super::scheduler::Scheduler;
use super::settings::TransportSettings;
use super::state::TransportState;
use super::swing::SwingEngine;
use super::sync::SignalSync;
use super::time::{DEFAULT_PPQ, Time, TimeConverter, TimeSignature, ticks_per_second};
use super::timeline::{EventId, Occurrence, Timeline};
use crate::audio::offline::TickListener;
use crate::audio::signal::Signal;
use crate::audio::timing::EngineClock;
use crate::error::{TransportError, TransportResult, ensure_finite};
use crate::messaging::channels::EventProducer;
use crate::messaging::events::{EventRegistry, Subscription, TransportEvent, TransportEventKind};
use std::fmt;
use std::ops::Range;

pub const DEFAULT_BPM: f64 = 120.0;

/// BPM view of the transport's tempo signal
///
/// The clock runs on a ticks-per-second signal; this view converts to and
/// from beats per minute at the current resolution. Times are engine times.
#[derive(Debug, Clone, Copy)]
pub struct Tempo<'a> {
    frequency: &'a Signal,
    ppq: u32,
    now: f64,
}

impl Tempo<'_> {
    fn to_bpm(&self, ticks_per_second: f64) -> f64 {
        ticks_per_second * 60.0 / self.ppq as f64
    }

    fn to_ticks_per_second(&self, bpm: f64) -> TransportResult<f64> {
        let bpm = ensure_finite(bpm, "bpm")?;
        if bpm <= 0.0 {
            return Err(TransportError::invalid(format!(
                "bpm must be positive, got {}",
                bpm
            )));
        }
        Ok(ticks_per_second(bpm, self.ppq))
    }

    /// BPM at the transport's current time
    pub fn value(&self) -> f64 {
        self.value_at_time(self.now)
    }

    pub fn value_at_time(&self, time: f64) -> f64 {
        self.to_bpm(self.frequency.value_at_time(time))
    }

    pub fn ticks_per_second(&self) -> f64 {
        self.frequency.value_at_time(self.now)
    }

    /// Hold the tempo at `bpm`, replacing any automation
    pub fn set_value(&self, bpm: f64) -> TransportResult<()> {
        self.frequency.set_value(self.to_ticks_per_second(bpm)?)
    }

    pub fn set_value_at_time(&self, bpm: f64, time: f64) -> TransportResult<()> {
        self.frequency
            .set_value_at_time(self.to_ticks_per_second(bpm)?, time)
    }

    pub fn linear_ramp_to_value_at_time(&self, bpm: f64, time: f64) -> TransportResult<()> {
        self.frequency
            .linear_ramp_to_value_at_time(self.to_ticks_per_second(bpm)?, time)
    }

    pub fn exponential_ramp_to_value_at_time(&self, bpm: f64, time: f64) -> TransportResult<()> {
        self.frequency
            .exponential_ramp_to_value_at_time(self.to_ticks_per_second(bpm)?, time)
    }

    /// Sampled tempo curve spread over `duration` from `start`
    pub fn set_value_curve_at_time(&self, bpms: &[f64], start: f64, duration: f64) -> TransportResult<()> {
        let values = bpms
            .iter()
            .map(|bpm| self.to_ticks_per_second(*bpm))
            .collect::<TransportResult<Vec<f64>>>()?;
        self.frequency.set_value_curve_at_time(&values, start, duration)
    }

    /// Ramp exponentially from the current tempo to `bpm` over `ramp_time` seconds
    pub fn ramp_to(&self, bpm: f64, ramp_time: f64) -> TransportResult<()> {
        self.frequency
            .exponential_ramp_to(self.to_ticks_per_second(bpm)?, ramp_time, self.now)
    }

    pub fn cancel_scheduled_values(&self, time: f64) {
        self.frequency.cancel_scheduled_values(time);
    }
}

/// Musical transport
///
/// Time arguments accept anything convertible into [`Time`]: seconds as
/// numbers, or expressions such as `"4n"`, `"1:2:0"` and `"+0.5"`. Untimed
/// calls act at [`Transport::now`], the engine time plus lookahead.
pub struct Transport {
    engine: EngineClock,
    clock: Clock,
    time_signature: TimeSignature,
    scheduler: Scheduler,
    swing: SwingEngine,
    loop_region: LoopRegion,
    sync: SignalSync,
    events: EventRegistry,
    sink: Option<EventProducer>,
}

impl Transport {
    /// Create a stopped transport at 120 BPM, 192 PPQ, 4/4
    pub fn new(engine: EngineClock) -> Self {
        let frequency = Signal::new(ticks_per_second(DEFAULT_BPM, DEFAULT_PPQ));
        let clock = Clock::new(frequency, DEFAULT_PPQ, engine.now());
        Self {
            engine,
            clock,
            time_signature: TimeSignature::four_four(),
            scheduler: Scheduler::new(),
            swing: SwingEngine::new(Time::from("8n"), DEFAULT_PPQ as f64 / 2.0),
            loop_region: LoopRegion::new(),
            sync: SignalSync::new(),
            events: EventRegistry::new(),
            sink: None,
        }
    }

    pub fn with_settings(engine: EngineClock, settings: &TransportSettings) -> TransportResult<Self> {
        let mut transport = Self::new(engine);
        transport.apply_settings(settings)?;
        Ok(transport)
    }

    pub fn engine(&self) -> &EngineClock {
        &self.engine
    }

    /// Scheduling time: engine time plus lookahead
    pub fn now(&self) -> f64 {
        self.engine.horizon()
    }

    /// Converter for the tempo, resolution and meter in effect now
    pub fn converter(&self) -> TimeConverter {
        TimeConverter::new(self.bpm().value(), self.clock.ppq(), self.time_signature)
    }

    // === Conversions ===

    /// Engine time in seconds; relative expressions count from now
    pub fn to_seconds(&self, time: impl Into<Time>) -> TransportResult<f64> {
        self.converter().to_seconds(&time.into(), self.now())
    }

    /// Transport position in ticks; relative expressions count from the playhead
    pub fn to_ticks(&self, time: impl Into<Time>) -> TransportResult<f64> {
        self.converter().to_ticks(&time.into(), self.ticks())
    }

    pub fn ticks_to_seconds(&self, ticks: f64) -> f64 {
        self.converter().ticks_to_seconds(ticks)
    }

    fn resolve_time(&self, time: Time) -> TransportResult<f64> {
        let seconds = self.converter().to_seconds(&time, self.now())?;
        ensure_finite(seconds, "time")
    }

    fn resolve_position(&self, time: Time) -> TransportResult<f64> {
        let ticks = self.converter().to_ticks(&time, self.ticks())?;
        let ticks = ensure_finite(ticks, "position")?;
        if ticks < 0.0 {
            return Err(TransportError::OutOfRangeTime(ticks));
        }
        Ok(ticks)
    }

    fn resolve_duration(&self, time: Time) -> TransportResult<f64> {
        let ticks = self.converter().duration_ticks(&time)?;
        ensure_finite(ticks, "duration")
    }

    fn ticks_per_measure(&self) -> f64 {
        self.clock.ppq() as f64 * self.time_signature.quarters_per_bar()
    }

    /// Seconds spanned by `ticks` at the tempo in effect at `time`
    fn offset_seconds(&self, ticks: f64, time: f64) -> f64 {
        let rate = self.clock.ticks_per_second_at(time);
        if rate > 0.0 { ticks / rate } else { 0.0 }
    }

    // === State ===

    /// State at the current time
    pub fn state(&self) -> TransportState {
        self.clock.state_at(self.now())
    }

    pub fn state_at(&self, time: f64) -> TransportState {
        self.clock.state_at(time)
    }

    /// Start now, continuing from the current position
    pub fn start(&mut self) -> TransportResult<&mut Self> {
        let now = self.now();
        self.start_at(now, None)
    }

    /// Start at `time`, optionally jumping the playhead to `offset`
    ///
    /// Starting while started retriggers from the offset.
    pub fn start_at(&mut self, time: impl Into<Time>, offset: Option<Time>) -> TransportResult<&mut Self> {
        let time = self.resolve_time(time.into())?;
        let offset = offset
            .map(|offset| self.resolve_position(offset))
            .transpose()?;
        self.clock.start(time, offset);
        log::debug!("Transport start queued at {:.6}s (offset {:?} ticks)", time, offset);
        Ok(self)
    }

    /// Stop now; the playhead returns to zero
    pub fn stop(&mut self) -> TransportResult<&mut Self> {
        let now = self.now();
        self.stop_at(now)
    }

    /// Stop at `time`, dropping transitions queued at or after it
    pub fn stop_at(&mut self, time: impl Into<Time>) -> TransportResult<&mut Self> {
        let time = self.resolve_time(time.into())?;
        if self.clock.stop(time) {
            log::debug!("Transport stop queued at {:.6}s", time);
        }
        Ok(self)
    }

    /// Pause now, keeping the playhead where it is
    pub fn pause(&mut self) -> TransportResult<&mut Self> {
        let now = self.now();
        self.pause_at(now)
    }

    /// Pause at `time`; ignored unless started at that time
    pub fn pause_at(&mut self, time: impl Into<Time>) -> TransportResult<&mut Self> {
        let time = self.resolve_time(time.into())?;
        if self.clock.pause(time) {
            log::debug!("Transport pause queued at {:.6}s", time);
        }
        Ok(self)
    }

    // === Scheduling ===

    /// Invoke `callback` whenever the playhead reaches `time`
    ///
    /// The callback receives the transport and the exact audio time the event
    /// is due.
    pub fn schedule<F>(&mut self, callback: F, time: impl Into<Time>) -> TransportResult<EventId>
    where
        F: FnMut(&mut Transport, f64) -> TransportResult<()> + 'static,
    {
        let tick = self.resolve_position(time.into())?;
        self.scheduler.schedule(tick, Box::new(callback))
    }

    /// Invoke `callback` every `interval` from `start`, for `duration` if given
    pub fn schedule_repeat<F>(
        &mut self,
        callback: F,
        interval: impl Into<Time>,
        start: impl Into<Time>,
        duration: Option<Time>,
    ) -> TransportResult<EventId>
    where
        F: FnMut(&mut Transport, f64) -> TransportResult<()> + 'static,
    {
        let interval = self.resolve_duration(interval.into())?;
        let start = self.resolve_position(start.into())?;
        let duration = duration
            .map(|duration| self.resolve_duration(duration))
            .transpose()?;
        self.scheduler
            .schedule_repeat(start, interval, duration, Box::new(callback))
    }

    /// Invoke `callback` the first time the playhead reaches `time`, then forget it
    pub fn schedule_once<F>(&mut self, callback: F, time: impl Into<Time>) -> TransportResult<EventId>
    where
        F: FnMut(&mut Transport, f64) -> TransportResult<()> + 'static,
    {
        let tick = self.resolve_position(time.into())?;
        self.scheduler.schedule_once(tick, Box::new(callback))
    }

    /// Remove every scheduled event at or after `after`
    pub fn cancel(&mut self, after: impl Into<Time>) -> TransportResult<usize> {
        let after = self.resolve_position(after.into())?;
        let removed = self.scheduler.cancel(after);
        log::debug!("Cancelled {} events from tick {:.3}", removed, after);
        Ok(removed)
    }

    /// Remove one scheduled event; false if it does not exist
    pub fn clear(&mut self, id: EventId) -> bool {
        self.scheduler.clear(id)
    }

    pub fn timeline(&self) -> &Timeline {
        self.scheduler.timeline()
    }

    // === Tempo, resolution, meter ===

    pub fn bpm(&self) -> Tempo<'_> {
        Tempo {
            frequency: self.clock.frequency(),
            ppq: self.clock.ppq(),
            now: self.now(),
        }
    }

    pub fn ppq(&self) -> u32 {
        self.clock.ppq()
    }

    /// Change the resolution; BPM and synced signal values are preserved
    ///
    /// Positions already stored in ticks (scheduled events, loop points, the
    /// playhead) are kept as tick counts.
    pub fn set_ppq(&mut self, ppq: u32) -> TransportResult<()> {
        if ppq == 0 {
            return Err(TransportError::invalid("PPQ must be at least 1"));
        }
        let converter = TimeConverter::new(self.bpm().value(), ppq, self.time_signature);
        self.loop_region.check_measure(converter.ticks_per_measure())?;
        let swing_ticks = converter.duration_ticks(self.swing.subdivision())?;

        let factor = self.clock.set_ppq(ppq)?;
        self.sync.rescale(1.0 / factor);
        self.swing.refresh_ticks(swing_ticks);
        log::debug!("PPQ set to {}", ppq);
        Ok(())
    }

    /// Bar length in quarter notes
    pub fn time_signature(&self) -> f64 {
        self.time_signature.quarters_per_bar()
    }

    pub fn signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// Accepts a beat count (`5`), a pair (`(6, 8)`) or an array (`[6, 8]`)
    pub fn set_time_signature(&mut self, signature: impl Into<TimeSignature>) -> TransportResult<()> {
        let signature = signature.into();
        signature.validate()?;
        let converter = TimeConverter::new(self.bpm().value(), self.clock.ppq(), signature);
        self.loop_region.check_measure(converter.ticks_per_measure())?;
        let swing_ticks = converter.duration_ticks(self.swing.subdivision())?;

        self.time_signature = signature;
        self.swing.refresh_ticks(swing_ticks);
        log::debug!("Time signature set to {}", signature);
        Ok(())
    }

    // === Loop ===

    pub fn loop_enabled(&self) -> bool {
        self.loop_region.is_enabled()
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_region.set_enabled(enabled);
    }

    /// Loop start in seconds at the current tempo
    pub fn loop_start(&self) -> f64 {
        self.ticks_to_seconds(self.loop_region.start())
    }

    /// Loop end in seconds at the current tempo
    pub fn loop_end(&self) -> f64 {
        self.ticks_to_seconds(self.loop_end_ticks())
    }

    pub fn loop_start_ticks(&self) -> f64 {
        self.loop_region.start()
    }

    pub fn loop_end_ticks(&self) -> f64 {
        self.loop_region.end(self.ticks_per_measure())
    }

    pub fn set_loop_start(&mut self, time: impl Into<Time>) -> TransportResult<()> {
        let start = self.resolve_position(time.into())?;
        self.loop_region.set_start(start, self.ticks_per_measure())
    }

    pub fn set_loop_end(&mut self, time: impl Into<Time>) -> TransportResult<()> {
        let end = self.resolve_position(time.into())?;
        self.loop_region.set_end(end)
    }

    /// Set both loop points; the start must come before the end
    pub fn set_loop_points(
        &mut self,
        start: impl Into<Time>,
        end: impl Into<Time>,
    ) -> TransportResult<&mut Self> {
        let start = self.resolve_position(start.into())?;
        let end = self.resolve_position(end.into())?;
        self.loop_region.set_points(start, end)?;
        Ok(self)
    }

    // === Swing ===

    pub fn swing(&self) -> f64 {
        self.swing.amount()
    }

    pub fn set_swing(&mut self, amount: f64) -> TransportResult<()> {
        self.swing.set_amount(amount)
    }

    pub fn swing_subdivision(&self) -> &Time {
        self.swing.subdivision()
    }

    pub fn set_swing_subdivision(&mut self, subdivision: impl Into<Time>) -> TransportResult<()> {
        let subdivision = subdivision.into();
        let ticks = self.resolve_duration(subdivision.clone())?;
        self.swing.set_subdivision(subdivision, ticks)
    }

    // === Playhead ===

    /// Playhead in ticks
    pub fn ticks(&self) -> f64 {
        let now = self.now();
        let ticks = self.clock.ticks_at(now);
        if self.clock.state_at(now).is_started() {
            if let Some(wrapped) = self.loop_region.wrap(ticks, self.ticks_per_measure()) {
                return wrapped;
            }
        }
        ticks
    }

    /// Move the playhead; takes effect at the processing cursor
    pub fn set_ticks(&mut self, ticks: f64) -> TransportResult<()> {
        let ticks = ensure_finite(ticks, "ticks")?;
        if ticks < 0.0 {
            return Err(TransportError::OutOfRangeTime(ticks));
        }
        self.clock.set_ticks(ticks);
        Ok(())
    }

    /// Playhead as "bars:beats:sixteenths"
    pub fn position(&self) -> String {
        self.converter().ticks_to_bars_beats_sixteenths(self.ticks())
    }

    pub fn set_position(&mut self, position: impl Into<Time>) -> TransportResult<()> {
        let ticks = self.resolve_position(position.into())?;
        self.set_ticks(ticks)
    }

    /// Playhead in seconds at the current tempo
    pub fn seconds(&self) -> f64 {
        self.converter().ticks_to_seconds(self.ticks())
    }

    pub fn set_seconds(&mut self, seconds: f64) -> TransportResult<()> {
        let seconds = ensure_finite(seconds, "seconds")?;
        let ticks = self.converter().seconds_to_ticks(seconds);
        self.set_ticks(ticks)
    }

    /// Position inside the loop in [0, 1); 0 when not looping
    pub fn progress(&self) -> f64 {
        self.loop_region
            .progress(self.ticks(), self.ticks_per_measure())
    }

    /// Engine time of the next multiple of `subdivision` after now
    ///
    /// Returns 0 unless the transport is started.
    pub fn next_subdivision(&self, subdivision: impl Into<Time>) -> TransportResult<f64> {
        let subdivision = self.resolve_duration(subdivision.into())?;
        if subdivision <= 0.0 {
            return Err(TransportError::invalid(format!(
                "subdivision must be positive, got {} ticks",
                subdivision
            )));
        }
        if !self.state().is_started() {
            return Ok(0.0);
        }
        let now = self.now();
        let position = self.clock.ticks_at(now);
        let remaining = subdivision - position.rem_euclid(subdivision);
        Ok(self
            .clock
            .time_for_ticks(now, remaining)
            .unwrap_or(f64::INFINITY))
    }

    // === Signals ===

    /// Make `signal` follow the tempo
    ///
    /// Without a ratio the signal keeps its current value at the current
    /// tempo and scales with later tempo changes.
    pub fn sync_signal(&mut self, signal: &Signal, ratio: Option<f64>) -> TransportResult<()> {
        let now = self.now();
        self.sync.sync(signal, self.clock.frequency(), ratio, now)
    }

    /// Detach `signal` from the tempo; false if it was not synced
    pub fn unsync_signal(&mut self, signal: &Signal) -> bool {
        self.sync.unsync(signal)
    }

    pub fn is_synced(&self, signal: &Signal) -> bool {
        self.sync.contains(signal)
    }

    // === Notifications ===

    pub fn on<F>(&mut self, kind: TransportEventKind, handler: F) -> Subscription
    where
        F: FnMut(&TransportEvent) + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn off(&mut self, subscription: Subscription) -> bool {
        self.events.off(subscription)
    }

    pub fn off_all(&mut self, kind: TransportEventKind) -> usize {
        self.events.off_all(kind)
    }

    /// Also forward every notification into a lock-free channel
    pub fn set_event_sink(&mut self, producer: EventProducer) {
        self.sink = Some(producer);
    }

    pub fn take_event_sink(&mut self) -> Option<EventProducer> {
        self.sink.take()
    }

    fn emit(&mut self, event: TransportEvent) {
        self.events.emit(&event);
        if let Some(sink) = self.sink.as_mut() {
            if ringbuf::traits::Producer::try_push(sink, event).is_err() {
                log::warn!("Transport event channel full, dropping {:?}", event.kind());
            }
        }
    }

    // === Settings ===

    /// Snapshot of the live configuration
    pub fn settings(&self) -> TransportSettings {
        TransportSettings {
            bpm: self.bpm().value(),
            ppq: self.clock.ppq(),
            time_signature: self.time_signature,
            swing: self.swing.amount(),
            swing_subdivision: self.swing.subdivision().to_string(),
            loop_enabled: self.loop_region.is_enabled(),
            loop_start: format!("{}i", self.loop_region.start()),
            loop_end: self
                .loop_region
                .has_explicit_end()
                .then(|| format!("{}i", self.loop_end_ticks())),
        }
    }

    /// Apply a configuration; nothing changes if any field is invalid
    pub fn apply_settings(&mut self, settings: &TransportSettings) -> TransportResult<()> {
        settings.validate()?;
        let converter = TimeConverter::new(settings.bpm, settings.ppq, settings.time_signature);
        let now_ticks = self.ticks();
        let swing_subdivision = Time::from(settings.swing_subdivision.as_str());
        let swing_ticks = converter.duration_ticks(&swing_subdivision)?;

        let mut loop_region = self.loop_region;
        let loop_start = converter.to_ticks(&Time::from(settings.loop_start.as_str()), now_ticks)?;
        match &settings.loop_end {
            Some(end) => {
                let loop_end = converter.to_ticks(&Time::from(end.as_str()), now_ticks)?;
                loop_region.set_points(loop_start, loop_end)?;
            }
            None => {
                loop_region = LoopRegion::new();
                loop_region.set_start(loop_start, converter.ticks_per_measure())?;
            }
        }
        loop_region.set_enabled(settings.loop_enabled);
        let mut swing = self.swing.clone();
        swing.set_amount(settings.swing)?;
        swing.set_subdivision(swing_subdivision, swing_ticks)?;

        if settings.ppq != self.clock.ppq() {
            let factor = self.clock.set_ppq(settings.ppq)?;
            self.sync.rescale(1.0 / factor);
        }
        self.bpm().set_value(settings.bpm)?;
        self.time_signature = settings.time_signature;
        self.loop_region = loop_region;
        self.swing = swing;
        log::debug!(
            "Applied transport settings: {} BPM, {} PPQ, {}",
            settings.bpm,
            settings.ppq,
            settings.time_signature
        );
        Ok(())
    }

    // === Processing ===

    /// Process everything due before `now()`
    ///
    /// Called once per render quantum. Errors returned by scheduled callbacks
    /// abort the rest of the pass and are returned unchanged.
    pub fn tick(&mut self) -> TransportResult<()> {
        self.clock.prune(self.engine.now());
        let horizon = self.now();
        self.process_until(horizon)
    }

    fn process_until(&mut self, horizon: f64) -> TransportResult<()> {
        log::trace!("Processing transport from {:.6}s to {:.6}s", self.clock.cursor(), horizon);
        loop {
            if self.clock.state().is_started() {
                self.wrap_playhead();
            }
            let next_change = self.clock.next_change_time();
            let segment_end = next_change.map_or(horizon, |time| time.min(horizon));
            if self.clock.state().is_started() && self.clock.cursor() < segment_end {
                self.advance_piece(segment_end)?;
                continue;
            }
            match next_change {
                Some(time) if time < horizon => self.apply_next_change(),
                _ => break,
            }
        }
        self.clock.idle_to(horizon);
        Ok(())
    }

    /// Run the started clock up to `until`, stopping early at the loop end
    fn advance_piece(&mut self, until: f64) -> TransportResult<()> {
        let start_time = self.clock.cursor();
        let start_ticks = self.clock.ticks();
        let mut end_time = until;
        let mut end_ticks = start_ticks + self.clock.integrate(start_time, until);

        if let Some(loop_end) =
            self.loop_region
                .crossing(start_ticks, end_ticks, self.ticks_per_measure())
        {
            end_ticks = loop_end;
            end_time = self
                .clock
                .time_for_ticks(start_time, loop_end - start_ticks)
                .map_or(until, |time| time.clamp(start_time, until));
        }

        self.clock.advance_to(end_time, end_ticks);
        self.fire_window(start_ticks..end_ticks, start_time)
    }

    /// Jump back into the loop if the playhead reached its end
    fn wrap_playhead(&mut self) {
        let ticks = self.clock.ticks();
        let Some(wrapped) = self.loop_region.wrap(ticks, self.ticks_per_measure()) else {
            return;
        };
        let time = self.clock.cursor();
        log::trace!("Loop at {:.6}s: {:.3} -> {:.3} ticks", time, ticks, wrapped);
        self.emit(TransportEvent::LoopEnd { time });
        self.clock.jump(wrapped);
        let offset = self.offset_seconds(wrapped, time);
        self.emit(TransportEvent::LoopStart { time, offset });
        self.emit(TransportEvent::Loop { time });
    }

    fn apply_next_change(&mut self) {
        let Some(change) = self.clock.apply_next_change() else {
            return;
        };
        let time = self.clock.cursor();
        log::debug!("Transport {} at {:.6}s", change.state, time);
        let event = match change.state {
            TransportState::Started => {
                let offset = self.offset_seconds(self.clock.ticks(), time);
                TransportEvent::Start { time, offset }
            }
            TransportState::Stopped => TransportEvent::Stop { time },
            TransportState::Paused => TransportEvent::Pause { time },
        };
        self.emit(event);
    }

    /// Fire every occurrence inside `window`, which starts at `window_start` seconds
    fn fire_window(&mut self, window: Range<f64>, window_start: f64) -> TransportResult<()> {
        let due = self.scheduler.due(window.clone());
        for occurrence in due {
            let Some(mut callback) = self.scheduler.take(&occurrence) else {
                continue;
            };
            let time = self.occurrence_time(&occurrence, window.start, window_start);
            let result = callback(&mut *self, time);
            self.scheduler.restore(occurrence.id, callback);
            result?;
        }
        Ok(())
    }

    /// Audio time of an occurrence, including swing
    fn occurrence_time(&self, occurrence: &Occurrence, window_ticks: f64, window_start: f64) -> f64 {
        let elapsed = (occurrence.tick - window_ticks).max(0.0);
        let time = self
            .clock
            .time_for_ticks(window_start, elapsed)
            .unwrap_or(window_start);
        let swing = self.swing.offset_ticks(occurrence.tick, self.clock.ppq());
        if swing > 0.0 {
            time + self.offset_seconds(swing, time)
        } else {
            time
        }
    }
}

impl TickListener for Transport {
    fn tick(&mut self) -> TransportResult<()> {
        Transport::tick(self)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("engine", &self.engine)
            .field("clock", &self.clock)
            .field("time_signature", &self.time_signature)
            .field("scheduler", &self.scheduler)
            .field("swing", &self.swing)
            .field("loop_region", &self.loop_region)
            .field("sync", &self.sync)
            .field("events", &self.events)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline::OfflineRenderer;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn transport() -> (Transport, OfflineRenderer) {
        let engine = EngineClock::new(44100.0);
        (Transport::new(engine.clone()), OfflineRenderer::new(engine))
    }

    fn recorder() -> (Rc<RefCell<Vec<f64>>>, impl FnMut(&mut Transport, f64) -> TransportResult<()> + 'static) {
        let times = Rc::new(RefCell::new(Vec::new()));
        let sink = times.clone();
        (times, move |_: &mut Transport, time: f64| {
            sink.borrow_mut().push(time);
            Ok(())
        })
    }

    #[test]
    fn test_defaults() {
        let (transport, _) = transport();
        assert!((transport.bpm().value() - 120.0).abs() < 1e-9);
        assert_eq!(transport.ppq(), 192);
        assert_eq!(transport.time_signature(), 4.0);
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.position(), "0:0:0");
        assert_eq!(transport.swing(), 0.0);
        assert_eq!(transport.swing_subdivision().to_string(), "8n");
        assert!(!transport.loop_enabled());
    }

    #[test]
    fn test_bpm_view_writes_ticks_per_second() {
        let (transport, _) = transport();
        transport.bpm().set_value(125.0).unwrap();
        assert!((transport.bpm().value() - 125.0).abs() < 1e-9);
        transport.bpm().set_value(120.0).unwrap();
        assert!((transport.bpm().ticks_per_second() - 2.0 * 192.0).abs() < 1e-9);
        assert!(transport.bpm().set_value(0.0).is_err());
        assert!(transport.bpm().set_value(-5.0).is_err());
    }

    #[test]
    fn test_schedule_fires_at_exact_start_time() {
        let (mut transport, renderer) = transport();
        let (times, callback) = recorder();
        transport.schedule(callback, 0).unwrap();
        transport.start_at(0.1, None).unwrap();
        renderer.render(&mut transport, 0.2).unwrap();
        assert_eq!(*times.borrow(), vec![0.1]);
    }

    #[test]
    fn test_callback_errors_propagate() {
        let (mut transport, renderer) = transport();
        transport
            .schedule(|_, _| Err(TransportError::Callback("boom".to_string())), 0.05)
            .unwrap();
        transport.start_at(0.0, None).unwrap();
        let result = renderer.render(&mut transport, 0.2);
        assert!(matches!(result, Err(TransportError::Callback(_))));
    }

    #[test]
    fn test_callback_can_clear_itself() {
        let (mut transport, renderer) = transport();
        let count = Rc::new(RefCell::new(0));
        let seen = count.clone();
        let id = Rc::new(RefCell::new(None));
        let own_id = id.clone();
        let event = transport
            .schedule_repeat(
                move |transport, _| {
                    *seen.borrow_mut() += 1;
                    if let Some(id) = *own_id.borrow() {
                        transport.clear(id);
                    }
                    Ok(())
                },
                0.05,
                0,
                None,
            )
            .unwrap();
        *id.borrow_mut() = Some(event);
        transport.start_at(0.0, None).unwrap();
        renderer.render(&mut transport, 0.3).unwrap();
        assert_eq!(*count.borrow(), 1);
        assert!(transport.timeline().is_empty());
    }

    #[test]
    fn test_start_event_offset() {
        let (mut transport, renderer) = transport();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        transport.on(TransportEventKind::Start, move |event| log.borrow_mut().push(*event));
        transport.start_at(0.2, Some("4n".into())).unwrap();
        renderer.render(&mut transport, 0.3).unwrap();

        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        let TransportEvent::Start { time, offset } = events[0] else {
            panic!("expected a start event");
        };
        assert!((time - 0.2).abs() < 1e-9);
        assert!((offset - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sync_rejects_own_tempo() {
        let (mut transport, _) = transport();
        let tempo = transport.clock.frequency().clone();
        assert!(matches!(
            transport.sync_signal(&tempo, None),
            Err(TransportError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_ppq_keeps_bpm_and_synced_values() {
        let (mut transport, _) = transport();
        let signal = Signal::new(3.0);
        transport.sync_signal(&signal, None).unwrap();
        transport.set_ppq(96).unwrap();
        assert_eq!(transport.ppq(), 96);
        assert!((transport.bpm().value() - 120.0).abs() < 1e-9);
        assert!((signal.value_at_time(transport.now()) - 3.0).abs() < 1e-9);
        assert_eq!(transport.swing.subdivision_ticks(), 48.0);
        assert!(transport.set_ppq(0).is_err());
    }

    #[test]
    fn test_event_sink_receives_notifications() {
        let (mut transport, renderer) = transport();
        let (tx, mut rx) = crate::messaging::channels::create_event_channel(8);
        transport.set_event_sink(tx);
        transport.start_at(0.0, None).unwrap().stop_at(0.05).unwrap();
        renderer.render(&mut transport, 0.1).unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = ringbuf::traits::Consumer::try_pop(&mut rx) {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec![TransportEventKind::Start, TransportEventKind::Stop]);
    }

    #[test]
    fn test_full_event_sink_drops_without_failing() {
        let (mut transport, renderer) = transport();
        let (tx, _rx) = crate::messaging::channels::create_event_channel(1);
        transport.set_event_sink(tx);
        transport
            .start_at(0.0, None)
            .unwrap()
            .stop_at(0.05)
            .unwrap()
            .start_at(0.06, None)
            .unwrap();
        assert!(renderer.render(&mut transport, 0.1).is_ok());
        assert!(transport.take_event_sink().is_some());
    }
}
