// Integration test: transport state machine, playhead and notifications

use mymusic_transport::{
    EngineClock, OfflineRenderer, Time, Transport, TransportEvent, TransportEventKind,
    TransportState,
};
use std::cell::RefCell;
use std::rc::Rc;

const EPS: f64 = 1e-6;

fn setup() -> (Transport, OfflineRenderer) {
    let engine = EngineClock::new(44100.0);
    (Transport::new(engine.clone()), OfflineRenderer::new(engine))
}

/// Subscribe to every notification kind and collect them in order
fn listen(transport: &mut Transport) -> Rc<RefCell<Vec<TransportEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    for kind in TransportEventKind::ALL {
        let events = events.clone();
        transport.on(kind, move |event| events.borrow_mut().push(*event));
    }
    events
}

#[test]
fn test_state_queries_see_queued_transitions() {
    let (mut transport, _) = setup();
    transport
        .start_at(0, None)
        .unwrap()
        .pause_at(0.2)
        .unwrap()
        .start_at(0.3, None)
        .unwrap()
        .stop_at(0.5)
        .unwrap();

    assert_eq!(transport.state_at(0.1), TransportState::Started);
    assert_eq!(transport.state_at(0.25), TransportState::Paused);
    assert_eq!(transport.state_at(0.4), TransportState::Started);
    assert_eq!(transport.state_at(0.6), TransportState::Stopped);
}

#[test]
fn test_notifications_follow_transitions() {
    let (mut transport, renderer) = setup();
    let events = listen(&mut transport);
    transport
        .start_at(0, None)
        .unwrap()
        .pause_at(0.2)
        .unwrap()
        .start_at(0.3, None)
        .unwrap()
        .stop_at(0.5)
        .unwrap();
    renderer.render(&mut transport, 0.6).unwrap();

    let events = events.borrow();
    let kinds: Vec<_> = events.iter().map(|event| event.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            TransportEventKind::Start,
            TransportEventKind::Pause,
            TransportEventKind::Start,
            TransportEventKind::Stop,
        ]
    );
    let times: Vec<_> = events.iter().map(|event| event.time()).collect();
    for (time, expected) in times.iter().zip([0.0, 0.2, 0.3, 0.5]) {
        assert!((time - expected).abs() < EPS);
    }
    // Resuming reports where the playhead was frozen
    let TransportEvent::Start { offset, .. } = events[2] else {
        panic!("expected a start event");
    };
    assert!((offset - 0.2).abs() < EPS);
}

#[test]
fn test_pause_freezes_playhead() {
    let (mut transport, renderer) = setup();
    transport.start_at(0, None).unwrap().pause_at(0.2).unwrap();
    renderer.render(&mut transport, 0.3).unwrap();

    assert_eq!(transport.state(), TransportState::Paused);
    assert!((transport.ticks() - 76.8).abs() < EPS);
    assert!((transport.seconds() - 0.2).abs() < EPS);
}

#[test]
fn test_stop_rewinds_playhead() {
    let (mut transport, renderer) = setup();
    transport.start_at(0, None).unwrap().stop_at(0.3).unwrap();
    renderer.render(&mut transport, 0.4).unwrap();

    assert_eq!(transport.state(), TransportState::Stopped);
    assert_eq!(transport.ticks(), 0.0);
    assert_eq!(transport.position(), "0:0:0");
}

#[test]
fn test_redundant_transitions_are_ignored() {
    let (mut transport, renderer) = setup();
    let events = listen(&mut transport);
    transport.pause().unwrap();
    transport.stop().unwrap();
    renderer.render(&mut transport, 0.1).unwrap();

    assert_eq!(transport.state(), TransportState::Stopped);
    assert!(events.borrow().is_empty());
}

#[test]
fn test_untimed_start_takes_effect_now() {
    let (mut transport, renderer) = setup();
    transport.start().unwrap();
    assert_eq!(transport.state(), TransportState::Started);
    renderer.render(&mut transport, 0.5).unwrap();
    assert!(transport.ticks() > 0.0);
}

#[test]
fn test_start_while_started_retriggers() {
    let (mut transport, renderer) = setup();
    let events = listen(&mut transport);
    transport
        .start_at(0, None)
        .unwrap()
        .start_at(0.5, Some(Time::ticks(0.0)))
        .unwrap();
    renderer.render(&mut transport, 0.6).unwrap();

    assert_eq!(events.borrow().len(), 2);
    // 0.1s since the retrigger
    assert!(transport.ticks() < 0.15 * 384.0);
}

#[test]
fn test_stop_drops_later_transitions() {
    let (mut transport, _) = setup();
    transport
        .start_at(0, None)
        .unwrap()
        .start_at(0.5, Some(Time::from("1m")))
        .unwrap()
        .stop_at(0.2)
        .unwrap();
    assert_eq!(transport.state_at(0.6), TransportState::Stopped);
}

#[test]
fn test_start_offset_moves_playhead() {
    let (mut transport, renderer) = setup();
    transport.start_at(0, Some("1:0:0".into())).unwrap();
    renderer.render(&mut transport, 0.1).unwrap();
    assert!(transport.position().starts_with("1:0:"));
}

#[test]
fn test_ticks_set_before_start_are_kept() {
    let (mut transport, renderer) = setup();
    transport.set_ticks(200.0).unwrap();
    transport.start_at(0, None).unwrap();
    renderer.render(&mut transport, 0.1).unwrap();
    assert!(transport.ticks() >= 200.0);
}

#[test]
fn test_playhead_setters_read_back() {
    let (mut transport, _) = setup();
    transport.set_seconds(3.0).unwrap();
    assert!((transport.seconds() - 3.0).abs() < EPS);

    transport.set_position("3:0").unwrap();
    assert_eq!(transport.position(), "3:0:0");

    assert!(transport.set_ticks(-1.0).is_err());
    assert!(transport.set_ticks(f64::NAN).is_err());
    assert_eq!(transport.position(), "3:0:0");
}

#[test]
fn test_lower_resolution_ticks_slower() {
    let (mut transport, renderer) = setup();
    transport.set_ppq(96).unwrap();
    transport.bpm().set_value(90.0).unwrap();
    transport.start_at(0, None).unwrap();
    renderer.render(&mut transport, 0.5).unwrap();
    assert!(transport.ticks() >= 72.0);
    assert!(transport.ticks() < 80.0);
}

#[test]
fn test_tempo_ramp_speeds_up_playhead() {
    let (mut transport, renderer) = setup();
    transport.bpm().ramp_to(240.0, 1.0).unwrap();
    transport.start().unwrap();
    renderer.render(&mut transport, 1.5).unwrap();

    assert!((transport.bpm().value() - 240.0).abs() < 1e-6);
    // Faster than a constant 120 BPM, slower than a constant 240 BPM
    let seconds_at_120 = transport.ticks() / 384.0;
    assert!(seconds_at_120 > 1.5);
    assert!(seconds_at_120 < 3.0);
}

#[test]
fn test_unsubscribed_handlers_stay_silent() {
    let (mut transport, renderer) = setup();
    let count = Rc::new(RefCell::new(0));
    let seen = count.clone();
    let subscription = transport.on(TransportEventKind::Start, move |_| *seen.borrow_mut() += 1);
    assert!(transport.off(subscription));
    assert!(!transport.off(subscription));

    transport.start_at(0, None).unwrap();
    renderer.render(&mut transport, 0.1).unwrap();
    assert_eq!(*count.borrow(), 0);
}
