use std::sync::Arc;

use proptest::prelude::*;
use segue::{
    Clip, ClipRef, EffectId, LiveSide, PlaybackState, SyntheticSource, Transition,
    TransitionAnchor, resolve,
    foundation::core::CLIP_END_EPSILON,
    timeline::{boundaries, effective_duration, total_duration, transition_window},
};

fn clips(durations: &[f64]) -> Vec<Clip> {
    durations
        .iter()
        .map(|d| Clip::new("p", Arc::new(SyntheticSource::new(*d, 2, 2, [0; 4]))).unwrap())
        .collect()
}

fn transitions(pairs: &[Option<f64>], start: Option<f64>, end: Option<f64>) -> Vec<Transition> {
    let mut out: Vec<Transition> = pairs
        .iter()
        .enumerate()
        .filter_map(|(i, d)| {
            d.map(|d| Transition::new(EffectId::Fade, d, TransitionAnchor::Between(i)).unwrap())
        })
        .collect();
    if let Some(d) = start {
        out.push(Transition::new(EffectId::Dissolve, d, TransitionAnchor::Start).unwrap());
    }
    if let Some(d) = end {
        out.push(Transition::new(EffectId::ZoomOut, d, TransitionAnchor::End).unwrap());
    }
    out
}

/// The clip reference whose playhead carries the timeline at that instant.
fn leading_ref(state: &PlaybackState) -> Option<ClipRef> {
    match state {
        PlaybackState::Empty => None,
        PlaybackState::Clip(c) => Some(*c),
        PlaybackState::Transition(ts) => match ts.live {
            LiveSide::B => ts.clip_b,
            LiveSide::A | LiveSide::None => ts.clip_a,
        },
    }
}

fn touched_indices(anchor: TransitionAnchor, clip_count: usize) -> Vec<usize> {
    match anchor {
        TransitionAnchor::Start => vec![0],
        TransitionAnchor::End => vec![clip_count - 1],
        TransitionAnchor::Between(i) => vec![i, i + 1],
    }
}

fn timeline_strategy()
-> impl Strategy<Value = (Vec<f64>, Vec<Option<f64>>, Option<f64>, Option<f64>)> {
    prop::collection::vec(0.1f64..10.0, 1..6).prop_flat_map(|durations| {
        let pairs = prop::collection::vec(
            prop::option::of(0.05f64..6.0),
            durations.len().saturating_sub(1),
        );
        (
            Just(durations),
            pairs,
            prop::option::of(0.05f64..6.0),
            prop::option::of(0.05f64..6.0),
        )
    })
}

proptest! {
    #[test]
    fn every_time_resolves_to_valid_references(
        (durations, pairs, start, end) in timeline_strategy(),
        t in -5.0f64..70.0,
    ) {
        let clips = clips(&durations);
        let trs = transitions(&pairs, start, end);
        let state = resolve(&clips, &trs, t);

        prop_assert!(!matches!(state, PlaybackState::Empty));
        for r in state.clip_refs() {
            prop_assert!(r.index < clips.len());
            prop_assert_eq!(r.id, clips[r.index].id());
            prop_assert!(r.local_time >= -1e-9);
            prop_assert!(r.local_time <= clips[r.index].duration() + 1e-9);
        }
        if let PlaybackState::Transition(ts) = state {
            prop_assert!((0.0..=1.0).contains(&ts.progress));
            prop_assert!(ts.clip_a.is_some() || ts.clip_b.is_some());
            let expected = effective_duration(&clips, &ts.transition).unwrap();
            prop_assert!((ts.effective_duration - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn transitions_never_change_total_duration(
        (durations, pairs, start, end) in timeline_strategy(),
        frac in 0.0f64..=1.0,
    ) {
        let clips = clips(&durations);
        let trs = transitions(&pairs, start, end);
        let sum: f64 = durations.iter().sum();
        let bounds = boundaries(&clips);
        prop_assert!((total_duration(&clips) - sum).abs() < 1e-9);
        prop_assert_eq!(bounds.len(), clips.len() + 1);

        // The leading playhead sits exactly at `t`, so overlaps neither add nor remove time.
        let t = frac * sum;
        let state = resolve(&clips, &trs, t);
        let lead = leading_ref(&state).unwrap();
        let global = bounds[lead.index] + lead.local_time;
        prop_assert!((global - t).abs() <= CLIP_END_EPSILON + 1e-9, "{} vs {}", global, t);

        // Past the end nothing new starts.
        prop_assert_eq!(resolve(&clips, &trs, sum + 1.0), resolve(&clips, &trs, sum));
    }

    #[test]
    fn between_progress_runs_from_zero_to_one_without_reversing(
        durations in prop::collection::vec(0.1f64..10.0, 2..6),
        pick in any::<prop::sample::Index>(),
        requested in 0.05f64..6.0,
        mut fracs in prop::collection::vec(0.0f64..0.999, 1..24),
    ) {
        let clips = clips(&durations);
        let i = pick.index(clips.len() - 1);
        let tr = Transition::new(EffectId::Fade, requested, TransitionAnchor::Between(i)).unwrap();
        let trs = [tr];
        let (start, end) = transition_window(&clips, &tr).unwrap();

        let at_start = resolve(&clips, &trs, start).progress().unwrap();
        prop_assert!(at_start.abs() < 1e-9, "progress {} at window start", at_start);
        let at_end = resolve(&clips, &trs, end - 1e-9).progress().unwrap();
        prop_assert!((at_end - 1.0).abs() < 1e-6, "progress {} at window end", at_end);

        fracs.sort_by(f64::total_cmp);
        let mut last = 0.0;
        for f in fracs {
            let t = start + f * (end - start);
            let PlaybackState::Transition(ts) = resolve(&clips, &trs, t) else {
                return Err(TestCaseError::fail(format!("t={t} fell outside the window")));
            };
            prop_assert_eq!(ts.transition.anchor, TransitionAnchor::Between(i));
            prop_assert!(ts.progress >= last, "progress went back: {} -> {}", last, ts.progress);
            last = ts.progress;
        }
    }

    #[test]
    fn effective_duration_fits_every_touched_clip(
        (durations, pairs, start, end) in timeline_strategy(),
        t in 0.0f64..60.0,
    ) {
        let clips = clips(&durations);
        let trs = transitions(&pairs, start, end);
        for tr in &trs {
            let d = effective_duration(&clips, tr).unwrap();
            prop_assert!(d <= tr.duration);
            for idx in touched_indices(tr.anchor, clips.len()) {
                prop_assert!(d <= clips[idx].duration(), "{:?}: {} > clip {}", tr.anchor, d, idx);
            }
        }
        if let PlaybackState::Transition(ts) = resolve(&clips, &trs, t) {
            for r in [ts.clip_a, ts.clip_b].into_iter().flatten() {
                prop_assert!(ts.effective_duration <= clips[r.index].duration());
            }
        }
    }

    #[test]
    fn resolve_is_pure(
        (durations, pairs, start, end) in timeline_strategy(),
        t in -5.0f64..70.0,
        other in -5.0f64..70.0,
    ) {
        let clips = clips(&durations);
        let trs = transitions(&pairs, start, end);
        let first = resolve(&clips, &trs, t);
        let _ = resolve(&clips, &trs, other);
        prop_assert_eq!(resolve(&clips, &trs, t), first);
        let copied: Vec<Transition> = trs.to_vec();
        prop_assert_eq!(resolve(&clips, &copied, t), first);
    }

    #[test]
    fn bare_timelines_map_time_to_owning_clip(
        durations in prop::collection::vec(0.1f64..10.0, 1..6),
        frac in 0.0f64..1.0,
    ) {
        let clips = clips(&durations);
        let bounds = boundaries(&clips);
        let total = bounds[clips.len()];
        let t = frac * total;
        let PlaybackState::Clip(c) = resolve(&clips, &[], t) else {
            return Err(TestCaseError::fail("bare timeline produced a transition"));
        };
        prop_assert!(bounds[c.index] <= t + 1e-9);
        prop_assert!(t < bounds[c.index + 1] + 1e-9);
    }

    #[test]
    fn out_of_range_times_clamp(
        (durations, pairs, start, end) in timeline_strategy(),
        over in 0.0f64..100.0,
    ) {
        let clips = clips(&durations);
        let trs = transitions(&pairs, start, end);
        let total = total_duration(&clips);
        prop_assert_eq!(resolve(&clips, &trs, total + over), resolve(&clips, &trs, total));
        prop_assert_eq!(resolve(&clips, &trs, -over), resolve(&clips, &trs, 0.0));
    }
}
