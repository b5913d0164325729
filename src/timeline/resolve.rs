//! Global time to visible-clip resolution.
//!
//! Transitions are centered on the boundary they decorate and never add time: the
//! timeline lasts exactly the sum of its clip durations. Inside a `Between(i)` window of
//! effective length `d`, clip `i` plays its final `d/2` seconds while clip `i + 1` waits on
//! its first frame; past the boundary, clip `i` holds its last frame while clip `i + 1`
//! plays its first `d/2` seconds.

use crate::{
    foundation::core::{CLIP_END_EPSILON, clamp_time},
    timeline::model::{
        Clip, ClipRef, LiveSide, PlaybackState, Transition, TransitionAnchor, TransitionState,
    },
};

/// Cumulative clip start times; `len() == clips.len() + 1` and the last entry is the total.
pub fn boundaries(clips: &[Clip]) -> Vec<f64> {
    let mut out = Vec::with_capacity(clips.len() + 1);
    let mut acc = 0.0;
    out.push(acc);
    for clip in clips {
        acc += clip.duration();
        out.push(acc);
    }
    out
}

pub fn total_duration(clips: &[Clip]) -> f64 {
    clips.iter().map(Clip::duration).sum()
}

pub(crate) fn find_transition(
    transitions: &[Transition],
    anchor: TransitionAnchor,
) -> Option<&Transition> {
    transitions.iter().find(|t| t.anchor == anchor)
}

/// Requested duration clamped to every clip the transition touches.
///
/// `None` when the anchor does not exist in `clips`.
pub fn effective_duration(clips: &[Clip], transition: &Transition) -> Option<f64> {
    let d = transition.duration;
    match transition.anchor {
        TransitionAnchor::Start => clips.first().map(|c| d.min(c.duration())),
        TransitionAnchor::End => clips.last().map(|c| d.min(c.duration())),
        TransitionAnchor::Between(i) => {
            let a = clips.get(i)?;
            let b = clips.get(i.checked_add(1)?)?;
            Some(d.min(a.duration()).min(b.duration()))
        }
    }
}

/// Absolute `[start, end)` window the transition occupies.
pub fn transition_window(clips: &[Clip], transition: &Transition) -> Option<(f64, f64)> {
    let d = effective_duration(clips, transition)?;
    let center = match transition.anchor {
        TransitionAnchor::Start => return Some((0.0, d)),
        TransitionAnchor::End => total_duration(clips),
        TransitionAnchor::Between(i) => boundaries(clips)[i + 1],
    };
    Some((center - d / 2.0, center + d / 2.0))
}

fn clip_ref(clips: &[Clip], index: usize, local_time: f64) -> ClipRef {
    ClipRef {
        index,
        id: clips[index].id(),
        local_time,
    }
}

/// Centered window test shared by `Between` and `End`.
///
/// Returns the A-side reference, the optional B-side reference, progress and live side.
fn centered(
    clips: &[Clip],
    a: usize,
    b: Option<usize>,
    boundary: f64,
    d: f64,
    t: f64,
) -> Option<(ClipRef, Option<ClipRef>, f64, LiveSide)> {
    let start = boundary - d / 2.0;
    let end = boundary + d / 2.0;
    if t < start || t >= end {
        return None;
    }
    let tt = t - start;
    let progress = tt / d;
    let dur_a = clips[a].duration();
    if t < boundary {
        let a_ref = clip_ref(clips, a, dur_a - d / 2.0 + tt);
        let b_ref = b.map(|b| clip_ref(clips, b, 0.0));
        Some((a_ref, b_ref, progress, LiveSide::A))
    } else {
        let a_ref = clip_ref(clips, a, dur_a);
        let b_ref = b.map(|b| clip_ref(clips, b, tt - d / 2.0));
        let live = if b.is_some() {
            LiveSide::B
        } else {
            LiveSide::None
        };
        Some((a_ref, b_ref, progress, live))
    }
}

/// Resolve the playback state at global time `t`.
///
/// Total over every input: `t` is clamped into `[0, total]` (NaN counts as 0). Among
/// overlapping windows the start transition wins, then earlier boundaries.
pub fn resolve(clips: &[Clip], transitions: &[Transition], t: f64) -> PlaybackState {
    if clips.is_empty() {
        return PlaybackState::Empty;
    }
    let bounds = boundaries(clips);
    let n = clips.len();
    let t = clamp_time(t, bounds[n]);

    if let Some(start) = find_transition(transitions, TransitionAnchor::Start) {
        let d = start.duration.min(clips[0].duration());
        if t < d {
            return PlaybackState::Transition(TransitionState {
                transition: *start,
                effective_duration: d,
                clip_a: None,
                clip_b: Some(clip_ref(clips, 0, t)),
                progress: t / d,
                live: LiveSide::B,
            });
        }
    }

    let end_transition = find_transition(transitions, TransitionAnchor::End);

    for i in 0..n {
        let clip_start = bounds[i];
        let clip_end = bounds[i + 1];

        if i + 1 < n
            && let Some(tr) = find_transition(transitions, TransitionAnchor::Between(i))
        {
            let d = tr
                .duration
                .min(clips[i].duration())
                .min(clips[i + 1].duration());
            if let Some((a, b, progress, live)) = centered(clips, i, Some(i + 1), clip_end, d, t)
            {
                return PlaybackState::Transition(TransitionState {
                    transition: *tr,
                    effective_duration: d,
                    clip_a: Some(a),
                    clip_b: b,
                    progress,
                    live,
                });
            }
        }

        if i + 1 == n
            && let Some(tr) = end_transition
        {
            let d = tr.duration.min(clips[i].duration());
            if let Some((a, _, progress, live)) = centered(clips, i, None, clip_end, d, t) {
                return PlaybackState::Transition(TransitionState {
                    transition: *tr,
                    effective_duration: d,
                    clip_a: Some(a),
                    clip_b: None,
                    progress,
                    live,
                });
            }
        }

        if t >= clip_start && t < clip_end {
            let local = (t - clip_start).min(clips[i].duration() - CLIP_END_EPSILON);
            return PlaybackState::Clip(clip_ref(clips, i, local));
        }
    }

    let last = n - 1;
    PlaybackState::Clip(clip_ref(
        clips,
        last,
        clips[last].duration() - CLIP_END_EPSILON,
    ))
}
