//! Which slice of the timeline an export covers.
//!
//! A full export spans the whole timeline. A transition-only export spans one transition plus
//! a short pad on each side; inside the pads the output is pinned to the transition's end
//! states so the clip shows the effect and nothing else.

use crate::{
    foundation::{
        core::CLIP_END_EPSILON,
        error::{SegueError, SegueResult},
    },
    timeline::{
        Clip, ClipRef, LiveSide, PlaybackState, Timeline, Transition, TransitionAnchor,
        TransitionState, boundaries, resolve, transition_window,
    },
};

/// Seconds of context exported before and after a focused transition.
pub const TRANSITION_PAD: f64 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportScope {
    #[default]
    Full,
    TransitionOnly { anchor: TransitionAnchor },
}

/// The transition a transition-only export is built around.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Focus {
    pub transition: Transition,
    /// Where the transition window actually begins on the timeline.
    pub actual_start: f64,
    pub effective_duration: f64,
    pub clip_a: Option<usize>,
    pub clip_b: Option<usize>,
}

impl Focus {
    fn end(&self) -> f64 {
        self.actual_start + self.effective_duration
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportWindow {
    pub start: f64,
    pub duration: f64,
    pub focus: Option<Focus>,
}

impl ExportWindow {
    pub fn for_scope(timeline: &Timeline, scope: ExportScope) -> SegueResult<Self> {
        if timeline.is_empty() {
            return Err(SegueError::validation("cannot export an empty timeline"));
        }
        let total = timeline.total_duration();
        let anchor = match scope {
            ExportScope::Full => {
                return Ok(Self {
                    start: 0.0,
                    duration: total,
                    focus: None,
                });
            }
            ExportScope::TransitionOnly { anchor } => anchor,
        };

        let transition = timeline
            .transition(anchor)
            .copied()
            .ok_or_else(|| SegueError::validation(format!("no transition at {anchor}")))?;
        let (actual_start, end) = transition_window(timeline.clips(), &transition)
            .ok_or_else(|| {
                SegueError::validation(format!("transition anchor {anchor} has no clips"))
            })?;
        let n = timeline.clips().len();
        let (clip_a, clip_b) = match anchor {
            TransitionAnchor::Start => (None, Some(0)),
            TransitionAnchor::End => (Some(n - 1), None),
            TransitionAnchor::Between(i) => (Some(i), Some(i + 1)),
        };

        let start = (actual_start - TRANSITION_PAD).max(0.0);
        let stop = (end + TRANSITION_PAD).min(total);
        Ok(Self {
            start,
            duration: stop - start,
            focus: Some(Focus {
                transition,
                actual_start,
                effective_duration: end - actual_start,
                clip_a,
                clip_b,
            }),
        })
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Output frames needed to cover the window at `fps`.
    pub fn frame_count(&self, fps: u32) -> u64 {
        (self.duration * f64::from(fps) - 1e-9).ceil().max(1.0) as u64
    }

    /// State to render at global time `t`, with pad zones pinned to the focused transition.
    pub fn state_at(&self, clips: &[Clip], transitions: &[Transition], t: f64) -> PlaybackState {
        let state = resolve(clips, transitions, t);
        let Some(focus) = self.focus else {
            return state;
        };
        let before = t < focus.actual_start;
        let after = t >= focus.end();
        if !before && !after {
            return state;
        }
        let progress = if before { 0.0 } else { 1.0 };

        match state {
            PlaybackState::Transition(mut ts) => {
                ts.progress = progress;
                PlaybackState::Transition(ts)
            }
            PlaybackState::Clip(_) => {
                let starts = boundaries(clips);
                let local = |i: usize| {
                    let d = clips[i].duration();
                    (t - starts[i]).clamp(0.0, (d - CLIP_END_EPSILON).max(0.0))
                };
                let make = |i: usize, local_time: f64| ClipRef {
                    index: i,
                    id: clips[i].id(),
                    local_time,
                };
                let (clip_a, clip_b, live) = if before {
                    (
                        focus.clip_a.map(|a| make(a, local(a))),
                        focus.clip_b.map(|b| make(b, 0.0)),
                        LiveSide::A,
                    )
                } else {
                    (
                        focus
                            .clip_a
                            .map(|a| make(a, clips[a].duration() - CLIP_END_EPSILON)),
                        focus.clip_b.map(|b| make(b, local(b))),
                        LiveSide::B,
                    )
                };
                PlaybackState::Transition(TransitionState {
                    transition: focus.transition,
                    effective_duration: focus.effective_duration,
                    clip_a,
                    clip_b,
                    progress,
                    live,
                })
            }
            PlaybackState::Empty => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{effects::EffectId, media::synthetic::SyntheticSource};

    fn timeline(durations: &[f64]) -> Timeline {
        let mut tl = Timeline::new();
        for d in durations {
            let src = Arc::new(SyntheticSource::new(*d, 2, 2, [0; 4]));
            tl.add_clip(Clip::new("c", src).unwrap());
        }
        tl
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn full_scope_spans_the_timeline() {
        let tl = timeline(&[2.0, 3.0]);
        let w = ExportWindow::for_scope(&tl, ExportScope::Full).unwrap();
        assert_eq!((w.start, w.duration), (0.0, 5.0));
        assert_eq!(w.frame_count(30), 150);
        assert!(ExportWindow::for_scope(&Timeline::new(), ExportScope::Full).is_err());
    }

    #[test]
    fn transition_window_is_padded_around_actual_start() {
        let mut tl = timeline(&[5.0, 3.0]);
        tl.set_transition(EffectId::Fade, 2.0, TransitionAnchor::Between(0))
            .unwrap();
        let w = ExportWindow::for_scope(
            &tl,
            ExportScope::TransitionOnly {
                anchor: TransitionAnchor::Between(0),
            },
        )
        .unwrap();
        assert!(approx(w.start, 3.9));
        assert!(approx(w.duration, 2.2));
    }

    #[test]
    fn window_uses_effective_duration() {
        let mut tl = timeline(&[1.0, 3.0]);
        tl.set_transition(EffectId::Fade, 2.0, TransitionAnchor::Between(0))
            .unwrap();
        let w = ExportWindow::for_scope(
            &tl,
            ExportScope::TransitionOnly {
                anchor: TransitionAnchor::Between(0),
            },
        )
        .unwrap();
        let f = w.focus.unwrap();
        assert!(approx(f.actual_start, 0.5));
        assert!(approx(f.effective_duration, 1.0));
        assert!(approx(w.end(), 1.6));
    }

    #[test]
    fn pad_zones_synthesize_pinned_transition_states() {
        let mut tl = timeline(&[5.0, 3.0]);
        tl.set_transition(EffectId::Swirl, 2.0, TransitionAnchor::Between(0))
            .unwrap();
        let w = ExportWindow::for_scope(
            &tl,
            ExportScope::TransitionOnly {
                anchor: TransitionAnchor::Between(0),
            },
        )
        .unwrap();
        let clips = tl.clips();

        let PlaybackState::Transition(before) = w.state_at(clips, tl.transitions(), 3.95) else {
            panic!("expected synthesized transition before the window");
        };
        assert_eq!(before.progress, 0.0);
        assert_eq!(before.live, LiveSide::A);
        assert!(approx(before.clip_a.unwrap().local_time, 3.95));
        assert_eq!(before.clip_b.unwrap().local_time, 0.0);

        let PlaybackState::Transition(after) = w.state_at(clips, tl.transitions(), 6.05) else {
            panic!("expected synthesized transition after the window");
        };
        assert_eq!(after.progress, 1.0);
        assert_eq!(after.live, LiveSide::B);
        assert!(approx(after.clip_a.unwrap().local_time, 5.0 - CLIP_END_EPSILON));
        assert!(approx(after.clip_b.unwrap().local_time, 1.05));

        let inside = w.state_at(clips, tl.transitions(), 5.0);
        assert!(approx(inside.progress().unwrap(), 0.5));
    }

    #[test]
    fn missing_transition_is_a_validation_error() {
        let tl = timeline(&[1.0, 1.0]);
        let err = ExportWindow::for_scope(
            &tl,
            ExportScope::TransitionOnly {
                anchor: TransitionAnchor::Between(0),
            },
        )
        .unwrap_err();
        assert!(matches!(err, SegueError::Validation(_)));
    }
}
