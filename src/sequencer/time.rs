// Musical time - conversions between seconds, ticks and bars:beats:sixteenths
// Handles time signatures and the time expression grammar ("4n", "1m", "2:1:0", "+8n")

use crate::error::{TransportError, TransportResult};
use std::fmt;

/// Default resolution in pulses per quarter note
pub const DEFAULT_PPQ: u32 = 192;

/// Slack used when flooring positions that come out of float arithmetic
const FLOOR_EPSILON: f64 = 1e-6;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar (typically 3, 4, 5, 6, 7)
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a validated time signature
    pub fn new(numerator: u8, denominator: u8) -> TransportResult<Self> {
        let signature = Self {
            numerator,
            denominator,
        };
        signature.validate()?;
        Ok(signature)
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self {
            numerator: 3,
            denominator: 4,
        }
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self {
            numerator: 6,
            denominator: 8,
        }
    }

    /// Numerator must be > 0 and the denominator a power of two
    pub fn validate(&self) -> TransportResult<()> {
        if self.numerator == 0 {
            return Err(TransportError::invalid(
                "time signature numerator must be > 0",
            ));
        }
        if !self.denominator.is_power_of_two() {
            return Err(TransportError::invalid(format!(
                "time signature denominator must be a power of 2, got {}",
                self.denominator
            )));
        }
        Ok(())
    }

    /// Number of beats per bar
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64
    }

    /// Beat duration relative to quarter note
    /// Example: 4/4 = 1.0, 6/8 = 0.5 (eighth notes)
    pub fn beat_duration_multiplier(&self) -> f64 {
        4.0 / self.denominator as f64
    }

    /// Bar length in quarter notes
    /// Example: 4/4 = 4.0, 6/8 = 3.0, 7/8 = 3.5
    pub fn quarters_per_bar(&self) -> f64 {
        self.beats_per_bar() * self.beat_duration_multiplier()
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// A bare number is a count of quarter-note beats per bar
impl From<u8> for TimeSignature {
    fn from(beats: u8) -> Self {
        Self {
            numerator: beats,
            denominator: 4,
        }
    }
}

impl From<(u8, u8)> for TimeSignature {
    fn from((numerator, denominator): (u8, u8)) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl From<[u8; 2]> for TimeSignature {
    fn from([numerator, denominator]: [u8; 2]) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

/// Ticks per second at a tempo and resolution
pub fn ticks_per_second(bpm: f64, ppq: u32) -> f64 {
    bpm / 60.0 * ppq as f64
}

pub fn seconds_to_ticks(seconds: f64, bpm: f64, ppq: u32) -> f64 {
    seconds * ticks_per_second(bpm, ppq)
}

pub fn ticks_to_seconds(ticks: f64, bpm: f64, ppq: u32) -> f64 {
    ticks / ticks_per_second(bpm, ppq)
}

/// A time value as accepted by the transport
///
/// Expressions are kept as text and resolved at call time, so they follow
/// later tempo, PPQ and time signature changes.
#[derive(Debug, Clone, PartialEq)]
pub enum Time {
    Seconds(f64),
    Ticks(f64),
    Expression(String),
}

impl Time {
    pub fn ticks(ticks: f64) -> Self {
        Time::Ticks(ticks)
    }
}

impl From<f64> for Time {
    fn from(seconds: f64) -> Self {
        Time::Seconds(seconds)
    }
}

impl From<i32> for Time {
    fn from(seconds: i32) -> Self {
        Time::Seconds(seconds as f64)
    }
}

impl From<&str> for Time {
    fn from(expression: &str) -> Self {
        Time::Expression(expression.to_string())
    }
}

impl From<String> for Time {
    fn from(expression: String) -> Self {
        Time::Expression(expression)
    }
}

impl From<&Time> for Time {
    fn from(time: &Time) -> Self {
        time.clone()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Time::Seconds(seconds) => write!(f, "{}", seconds),
            Time::Ticks(ticks) => write!(f, "{}i", ticks),
            Time::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

/// One term of a time expression
#[derive(Debug, Clone, Copy, PartialEq)]
enum Term {
    Seconds(f64),
    Ticks(f64),
    Measures(f64),
    Note { division: f64, triplet: bool, dots: u32 },
    BarsBeats { bars: f64, beats: f64, sixteenths: f64 },
}

/// Parsed expression: optional "relative to now" marker and signed terms
#[derive(Debug, Clone, PartialEq)]
struct Expression {
    relative: bool,
    terms: Vec<(f64, Term)>,
}

fn invalid_time(input: &str) -> TransportError {
    TransportError::InvalidTime(input.to_string())
}

fn parse_number(text: &str, input: &str) -> TransportResult<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| invalid_time(input))
}

fn parse_term(text: &str, input: &str) -> TransportResult<Term> {
    if text.contains(':') {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() > 3 {
            return Err(invalid_time(input));
        }
        let bars = parse_number(parts[0], input)?;
        let beats = parse_number(parts[1], input)?;
        let sixteenths = match parts.get(2) {
            Some(part) => parse_number(part, input)?,
            None => 0.0,
        };
        return Ok(Term::BarsBeats {
            bars,
            beats,
            sixteenths,
        });
    }

    let undotted = text.trim_end_matches('.');
    let dots = (text.len() - undotted.len()) as u32;
    let Some(unit) = undotted.chars().last() else {
        return Err(invalid_time(input));
    };
    let number = &undotted[..undotted.len() - unit.len_utf8()];

    let term = match unit {
        'n' | 't' => {
            let division = parse_number(number, input)?;
            if division <= 0.0 {
                return Err(invalid_time(input));
            }
            Term::Note {
                division,
                triplet: unit == 't',
                dots,
            }
        }
        _ if dots > 0 => return Err(invalid_time(input)),
        'm' => Term::Measures(parse_number(number, input)?),
        'i' => Term::Ticks(parse_number(number, input)?),
        's' => Term::Seconds(parse_number(number, input)?),
        _ => Term::Seconds(parse_number(undotted, input)?),
    };
    Ok(term)
}

fn parse_expression(input: &str) -> TransportResult<Expression> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let (relative, body) = match compact.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, compact.as_str()),
    };
    if body.is_empty() {
        return Err(invalid_time(input));
    }

    let mut terms = Vec::new();
    let mut sign = 1.0;
    let mut start = 0;
    let bytes = body.as_bytes();
    for (i, &byte) in bytes.iter().enumerate() {
        let is_operator = (byte == b'+' || byte == b'-') && i > 0;
        // Keep exponents such as "1e-3" inside their number
        let in_exponent = i >= 2 && bytes[i - 1] == b'e' && bytes[i - 2].is_ascii_digit();
        if is_operator && !in_exponent {
            terms.push((sign, parse_term(&body[start..i], input)?));
            sign = if byte == b'-' { -1.0 } else { 1.0 };
            start = i + 1;
        }
    }
    terms.push((sign, parse_term(&body[start..], input)?));

    Ok(Expression { relative, terms })
}

/// Parse "bars:beats[:sixteenths]" into ticks
pub fn parse_bars_beats_sixteenths(
    text: &str,
    ppq: u32,
    time_signature: &TimeSignature,
) -> TransportResult<f64> {
    let converter = TimeConverter::new(120.0, ppq, *time_signature);
    match parse_term(text.trim(), text)? {
        term @ Term::BarsBeats { .. } => Ok(converter.term_ticks(term)),
        _ => Err(invalid_time(text)),
    }
}

/// Converts time values using a snapshot of tempo, resolution and meter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeConverter {
    bpm: f64,
    ppq: u32,
    time_signature: TimeSignature,
}

impl TimeConverter {
    pub fn new(bpm: f64, ppq: u32, time_signature: TimeSignature) -> Self {
        Self {
            bpm,
            ppq: ppq.max(1),
            time_signature,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn ticks_per_second(&self) -> f64 {
        ticks_per_second(self.bpm, self.ppq)
    }

    pub fn seconds_to_ticks(&self, seconds: f64) -> f64 {
        seconds_to_ticks(seconds, self.bpm, self.ppq)
    }

    pub fn ticks_to_seconds(&self, ticks: f64) -> f64 {
        ticks_to_seconds(ticks, self.bpm, self.ppq)
    }

    /// Length of one bar in ticks
    pub fn ticks_per_measure(&self) -> f64 {
        self.ppq as f64 * self.time_signature.quarters_per_bar()
    }

    fn term_ticks(&self, term: Term) -> f64 {
        let ppq = self.ppq as f64;
        match term {
            Term::Seconds(seconds) => self.seconds_to_ticks(seconds),
            Term::Ticks(ticks) => ticks,
            Term::Measures(measures) => measures * self.ticks_per_measure(),
            Term::Note {
                division,
                triplet,
                dots,
            } => {
                let mut ticks = 4.0 * ppq / division;
                if triplet {
                    ticks *= 2.0 / 3.0;
                }
                // Each dot adds half of the previous addition
                ticks * (2.0 - 0.5f64.powi(dots as i32))
            }
            Term::BarsBeats {
                bars,
                beats,
                sixteenths,
            } => bars * self.ticks_per_measure() + beats * ppq + sixteenths * ppq / 4.0,
        }
    }

    /// Evaluate an expression to (relative, ticks)
    fn expression_ticks(&self, input: &str) -> TransportResult<(bool, f64)> {
        let expression = parse_expression(input)?;
        let ticks = expression
            .terms
            .iter()
            .map(|(sign, term)| sign * self.term_ticks(*term))
            .sum();
        Ok((expression.relative, ticks))
    }

    /// Resolve a transport position; relative expressions count from `now_ticks`
    pub fn to_ticks(&self, time: &Time, now_ticks: f64) -> TransportResult<f64> {
        match time {
            Time::Seconds(seconds) => Ok(self.seconds_to_ticks(*seconds)),
            Time::Ticks(ticks) => Ok(*ticks),
            Time::Expression(text) => {
                let (relative, ticks) = self.expression_ticks(text)?;
                Ok(if relative { now_ticks + ticks } else { ticks })
            }
        }
    }

    /// Resolve a length in ticks; a leading "+" carries no meaning here
    pub fn duration_ticks(&self, time: &Time) -> TransportResult<f64> {
        self.to_ticks(time, 0.0)
    }

    /// Resolve an engine time; relative expressions count from `now` seconds
    pub fn to_seconds(&self, time: &Time, now: f64) -> TransportResult<f64> {
        match time {
            Time::Seconds(seconds) => Ok(*seconds),
            Time::Ticks(ticks) => Ok(self.ticks_to_seconds(*ticks)),
            Time::Expression(text) => {
                let (relative, ticks) = self.expression_ticks(text)?;
                let seconds = self.ticks_to_seconds(ticks);
                Ok(if relative { now + seconds } else { seconds })
            }
        }
    }

    /// Render a position as "bar:beat:sixteenth" (all zero-based, floored)
    pub fn ticks_to_bars_beats_sixteenths(&self, ticks: f64) -> String {
        let ppq = self.ppq as f64;
        let measure = self.ticks_per_measure();
        let ticks = ticks.max(0.0) + FLOOR_EPSILON;

        let bars = (ticks / measure).floor();
        let in_bar = ticks - bars * measure;
        let beats = (in_bar / ppq).floor();
        let in_beat = in_bar - beats * ppq;
        let sixteenths = (in_beat / (ppq / 4.0)).floor();

        format!("{}:{}:{}", bars as u64, beats as u64, sixteenths as u64)
    }

    /// Parse "bar:beat[:sixteenth]" into ticks
    pub fn bars_beats_sixteenths_to_ticks(&self, text: &str) -> TransportResult<f64> {
        parse_bars_beats_sixteenths(text, self.ppq, &self.time_signature)
    }
}

impl Default for TimeConverter {
    fn default() -> Self {
        Self::new(120.0, DEFAULT_PPQ, TimeSignature::default())
    }
}
