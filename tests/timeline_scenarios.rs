use std::sync::Arc;

use segue::{
    Clip, EffectId, LiveSide, PlaybackState, SyntheticSource, Timeline, TransitionAnchor,
    shader_source, shader_source_for_id,
};

fn timeline(durations: &[f64]) -> Timeline {
    let mut tl = Timeline::new();
    for (i, d) in durations.iter().enumerate() {
        let src = SyntheticSource::new(*d, 16, 9, [i as u8 * 60, 0, 0, 255]);
        tl.add_clip(Clip::new(format!("c{i}"), Arc::new(src)).unwrap());
    }
    tl
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn two_clip_fade_walkthrough() {
    let mut tl = timeline(&[5.0, 3.0]);
    tl.set_transition(EffectId::Fade, 2.0, TransitionAnchor::Between(0))
        .unwrap();
    let (a, b) = (tl.clips()[0].id(), tl.clips()[1].id());

    assert_eq!(tl.total_duration(), 8.0);

    let PlaybackState::Clip(c) = tl.resolve(3.0) else {
        panic!("expected plain clip at 3s");
    };
    assert_eq!((c.id, c.local_time), (a, 3.0));

    let PlaybackState::Transition(t) = tl.resolve(4.0) else {
        panic!("expected transition at 4s");
    };
    assert!(approx(t.progress, 0.0));
    assert!(approx(t.clip_a.unwrap().local_time, 4.0));
    assert_eq!(t.clip_b.unwrap().local_time, 0.0);
    assert_eq!(t.live, LiveSide::A);

    let PlaybackState::Transition(t) = tl.resolve(5.0) else {
        panic!("expected transition at the boundary");
    };
    assert!(approx(t.progress, 0.5));
    assert_eq!(t.clip_a.unwrap().id, a);
    assert_eq!(t.clip_b.unwrap().id, b);
    assert_eq!(t.live, LiveSide::B);

    let PlaybackState::Clip(c) = tl.resolve(6.0) else {
        panic!("expected clip B after the window");
    };
    assert_eq!(c.id, b);
    assert!(approx(c.local_time, 1.0));
}

#[test]
fn short_neighbor_clamps_the_window() {
    let mut tl = timeline(&[5.0, 1.0, 5.0]);
    tl.set_transition(EffectId::Swirl, 4.0, TransitionAnchor::Between(0))
        .unwrap();
    let PlaybackState::Transition(t) = tl.resolve(4.6) else {
        panic!("expected transition inside clamped window");
    };
    assert!(approx(t.effective_duration, 1.0));
    assert!(approx(t.progress, 0.1));
    assert!(matches!(tl.resolve(4.4), PlaybackState::Clip(_)));
}

#[test]
fn empty_timeline_resolves_to_empty() {
    let tl = Timeline::new();
    assert_eq!(tl.resolve(0.0), PlaybackState::Empty);
    assert_eq!(tl.total_duration(), 0.0);
    assert!(tl.output_resolution().is_err());
}

#[test]
fn removing_a_clip_drops_and_shifts_transitions() {
    let mut tl = timeline(&[2.0, 2.0, 2.0, 2.0]);
    assert_eq!(tl.apply_to_all_pairs(EffectId::Fade, 1.0).unwrap(), 3);
    tl.set_transition(EffectId::Ripple, 0.5, TransitionAnchor::End)
        .unwrap();

    let removed = tl.clips()[1].id();
    tl.remove_clip(removed).unwrap();

    let mut anchors: Vec<_> = tl.transitions().iter().map(|t| t.anchor).collect();
    anchors.sort();
    assert_eq!(anchors, vec![TransitionAnchor::End, TransitionAnchor::Between(1)]);
    assert_eq!(tl.total_duration(), 6.0);
}

#[test]
fn moving_a_clip_keeps_boundary_transitions() {
    let mut tl = timeline(&[1.0, 2.0, 3.0]);
    tl.set_transition(EffectId::Fade, 0.5, TransitionAnchor::Between(0))
        .unwrap();
    let last = tl.clips()[2].id();
    tl.move_clip(2, 0).unwrap();
    assert_eq!(tl.clips()[0].id(), last);
    assert!(tl.transition(TransitionAnchor::Between(0)).is_some());
    assert!(tl.move_clip(0, 3).is_err());
}

#[test]
fn anchors_must_exist_when_set() {
    let mut tl = timeline(&[1.0, 1.0]);
    assert!(
        tl.set_transition(EffectId::Fade, 1.0, TransitionAnchor::Between(1))
            .is_err()
    );
    assert!(
        tl.set_transition(EffectId::Fade, 0.0, TransitionAnchor::Start)
            .is_err()
    );
    tl.set_transition(EffectId::Fade, 1.0, TransitionAnchor::Start)
        .unwrap();
    tl.set_transition(EffectId::Dissolve, 0.5, TransitionAnchor::Start)
        .unwrap();
    assert_eq!(tl.transitions().len(), 1);
    assert_eq!(
        tl.transition(TransitionAnchor::Start).unwrap().effect,
        EffectId::Dissolve
    );
}

#[test]
fn unknown_effect_ids_fall_back_to_fade() {
    assert_eq!(
        shader_source_for_id("no-such-effect"),
        shader_source(EffectId::Fade)
    );
    assert!("no-such-effect".parse::<EffectId>().is_err());
    assert_eq!("page-curl".parse::<EffectId>().unwrap(), EffectId::PageCurl);
}

#[test]
fn resolved_state_serializes_with_mode_tag() {
    let mut tl = timeline(&[2.0, 2.0]);
    tl.set_transition(EffectId::Fade, 1.0, TransitionAnchor::Between(0))
        .unwrap();
    let json = serde_json::to_value(tl.resolve(2.0)).unwrap();
    assert_eq!(json["mode"], "transition");
    assert_eq!(json["transition"]["effect"], "fade");
    assert_eq!(json["live"], "b");
}
