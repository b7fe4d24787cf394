// Property tests: time conversion and playhead invariants

use mymusic_transport::{
    EngineClock, OfflineRenderer, Time, TimeConverter, TimeSignature, Transport,
};
use proptest::prelude::*;

fn converter(bpm: f64, ppq: u32, numerator: u8) -> TimeConverter {
    TimeConverter::new(bpm, ppq, TimeSignature::from(numerator))
}

proptest! {
    #[test]
    fn test_seconds_survive_tick_conversion(
        bpm in 20.0f64..300.0,
        ppq in 1u32..960,
        seconds in 0.0f64..1000.0,
    ) {
        let c = converter(bpm, ppq, 4);
        let back = c.ticks_to_seconds(c.seconds_to_ticks(seconds));
        prop_assert!((back - seconds).abs() <= 1e-9 * seconds.max(1.0));
    }

    #[test]
    fn test_bars_beats_sixteenths_round_trip(
        numerator in 1u8..13,
        bars in 0u32..500,
        beat_index in 0u8..12,
        sixteenths in 0u8..4,
    ) {
        let beats = beat_index % numerator;
        let c = converter(120.0, 192, numerator);
        let text = format!("{}:{}:{}", bars, beats, sixteenths);
        let ticks = c.bars_beats_sixteenths_to_ticks(&text).unwrap();
        prop_assert_eq!(c.ticks_to_bars_beats_sixteenths(ticks), text);
    }

    #[test]
    fn test_note_values_scale_with_resolution(ppq in 1u32..960, division in 0u32..6) {
        let note = 1u32 << division;
        let c = converter(120.0, ppq, 4);
        let ticks = c.duration_ticks(&Time::from(format!("{}n", note))).unwrap();
        prop_assert!((ticks - ppq as f64 * 4.0 / note as f64).abs() < 1e-9);
    }

    #[test]
    fn test_relative_positions_count_from_now(now in 0.0f64..10_000.0, offset in 0u32..64) {
        let c = converter(120.0, 192, 4);
        let time = Time::from(format!("+{}i", offset));
        prop_assert_eq!(c.to_ticks(&time, now).unwrap(), now + offset as f64);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_playhead_never_runs_backwards_without_a_loop(
        bpm in 30.0f64..240.0,
        target in 60.0f64..240.0,
        ramp in 0.0f64..2.0,
    ) {
        let engine = EngineClock::new(44100.0);
        let renderer = OfflineRenderer::new(engine.clone());
        let mut transport = Transport::new(engine);
        transport.bpm().set_value(bpm).unwrap();
        transport.bpm().ramp_to(target, ramp).unwrap();
        transport.start().unwrap();

        let mut last = transport.ticks();
        let mut monotonic = true;
        renderer
            .render_with(&mut transport, 1.0, |transport, _| {
                let ticks = transport.ticks();
                monotonic &= ticks >= last;
                last = ticks;
            })
            .unwrap();
        prop_assert!(monotonic);
        prop_assert!(last > 0.0);
    }
}
