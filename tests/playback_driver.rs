use std::sync::Arc;

use segue::{
    BackendKind, Clip, DriverState, EffectId, ExportOptions, ExportPipeline, InMemorySink,
    LiveSide, ManualClock, PlaybackDriver, PlaybackState, QualityPreset, Resolution, SegueError,
    SyntheticSource, Timeline, TransitionAnchor,
};

fn timeline(clock: &Arc<ManualClock>, durations: &[f64]) -> Timeline {
    let mut tl = Timeline::new();
    for (i, d) in durations.iter().enumerate() {
        let color = [40 * i as u8, 100, 200, 255];
        let src = SyntheticSource::with_clock(*d, 15, 9, color, clock.clone());
        tl.add_clip(Clip::new(format!("c{i}"), Arc::new(src)).unwrap());
    }
    tl
}

#[test]
fn plays_through_a_transition_to_the_end() {
    let clock = Arc::new(ManualClock::new());
    let mut tl = timeline(&clock, &[2.0, 2.0]);
    tl.set_transition(EffectId::Fade, 1.0, TransitionAnchor::Between(0))
        .unwrap();
    let mut d = PlaybackDriver::for_timeline(&tl, BackendKind::Cpu, clock.clone()).unwrap();
    assert_eq!(d.compositor().resolution(), Resolution {
        width: 14,
        height: 8
    });

    d.play(&tl).unwrap();
    let (a, b) = (tl.clips()[0].source(), tl.clips()[1].source());
    let mut saw_a_live = false;
    let mut saw_b_live = false;
    let mut finished = None;

    for _ in 0..200 {
        clock.advance_secs(0.05);
        let out = d.tick(&tl);
        if out.finished {
            finished = Some(out);
            break;
        }
        if let PlaybackState::Transition(t) = out.state {
            match t.live {
                LiveSide::A => {
                    saw_a_live = true;
                    assert!(!a.is_paused());
                    assert!(b.is_paused());
                    assert!(b.current_time() <= 0.01 + 1e-9);
                }
                LiveSide::B => {
                    saw_b_live = true;
                    assert!(a.is_paused());
                    assert!(!b.is_paused());
                }
                LiveSide::None => panic!("pair transition never has no live side"),
            }
        }
    }

    assert!(saw_a_live && saw_b_live);
    let out = finished.expect("playback should finish");
    assert_eq!(out.time, 4.0);
    assert_eq!(d.state(), DriverState::Stopped);
    assert!(a.is_paused() && b.is_paused());
    assert!(d.compositor().draw_count() > 0);
}

#[test]
fn seek_while_playing_reanchors() {
    let clock = Arc::new(ManualClock::new());
    let tl = timeline(&clock, &[5.0]);
    let mut d = PlaybackDriver::for_timeline(&tl, BackendKind::Cpu, clock.clone()).unwrap();
    d.play(&tl).unwrap();
    clock.advance_secs(1.0);
    d.tick(&tl);

    let out = d.seek(&tl, 3.0);
    assert!(d.is_playing());
    assert!((out.time - 3.0).abs() < 1e-9);

    clock.advance_secs(0.5);
    let out = d.tick(&tl);
    assert!((out.time - 3.5).abs() < 1e-9);
}

#[test]
fn export_waits_for_playback_to_release_sources() {
    let clock = Arc::new(ManualClock::new());
    let tl = timeline(&clock, &[0.5, 0.5]);
    let mut d = PlaybackDriver::for_timeline(&tl, BackendKind::Cpu, clock.clone()).unwrap();
    let opts = ExportOptions {
        quality: QualityPreset::Low,
        backend: BackendKind::Cpu,
        ..ExportOptions::default()
    };
    let pipeline = ExportPipeline::new(clock.clone());

    d.play(&tl).unwrap();
    d.tick(&tl);
    let err = pipeline
        .run(&tl, &opts, &mut InMemorySink::new(), &mut |_| {})
        .unwrap_err();
    assert!(matches!(err, SegueError::Ownership(_)));

    d.pause();
    assert!(d.holds_sources());
    assert!(
        pipeline
            .run(&tl, &opts, &mut InMemorySink::new(), &mut |_| {})
            .is_err()
    );

    d.stop();
    let mut sink = InMemorySink::new();
    let report = pipeline.run(&tl, &opts, &mut sink, &mut |_| {}).unwrap();
    assert_eq!(report.frames, 20);
    assert!(tl.clips().iter().all(|c| !c.source().is_released()));

    d.play(&tl).unwrap();
    assert!(d.holds_sources());
}
