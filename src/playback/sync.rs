//! Keeping source transports aligned with the resolver's targets.
//!
//! Live sources are nudged with playback-rate corrections instead of seeks so playback stays
//! smooth; held sources are parked and only re-seeked once they drift past a tolerance.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    media::{clock::Clock, source::MediaSource},
    playback::ownership::PoolLease,
    timeline::{Clip, ClipId, LiveSide, PlaybackState},
};

#[derive(Clone, Debug)]
pub struct SyncTuning {
    /// Drift (seconds) at or below which a live source runs at exactly 1.0x.
    pub in_sync_threshold: f64,
    /// Rate change per second of drift.
    pub gain: f64,
    /// Largest deviation from 1.0x.
    pub max_correction: f64,
    /// Drift a held source may accumulate before it is re-seeked.
    pub hold_tolerance: f64,
    /// Tighter tolerance for sources held on their first frame.
    pub frame_zero_tolerance: f64,
    /// A live source restarting this far from its target is seeked first.
    pub restart_seek_threshold: f64,
    /// Drift tolerated on a live source while the driver is stopped.
    pub paused_seek_threshold: f64,
    /// Wait after a restart seek so the decoder can land on the new position.
    pub settle_delay: Duration,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            in_sync_threshold: 0.1,
            gain: 0.5,
            max_correction: 0.5,
            hold_tolerance: 0.1,
            frame_zero_tolerance: 0.01,
            restart_seek_threshold: 0.1,
            paused_seek_threshold: 0.05,
            settle_delay: Duration::from_millis(50),
        }
    }
}

/// Playback rate that closes the gap between `current` and `target`.
pub fn corrected_rate(current: f64, target: f64, tuning: &SyncTuning) -> f64 {
    let diff = target - current;
    if !diff.is_finite() || diff.abs() <= tuning.in_sync_threshold {
        return 1.0;
    }
    let correction = (diff.abs() * tuning.gain).clamp(-tuning.max_correction, tuning.max_correction);
    1.0 + correction * diff.signum()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SlotRole {
    Live { target: f64 },
    Held { target: f64 },
    Idle,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncPlan {
    pub roles: Vec<(ClipId, SlotRole)>,
}

impl SyncPlan {
    pub fn role_of(&self, id: ClipId) -> Option<SlotRole> {
        self.roles.iter().find(|(c, _)| *c == id).map(|(_, r)| *r)
    }
}

/// Decide, for every clip, whether its source plays, holds or idles.
pub fn plan_for_state(state: &PlaybackState, clips: &[Clip]) -> SyncPlan {
    let mut roles: Vec<(ClipId, SlotRole)> =
        clips.iter().map(|c| (c.id(), SlotRole::Idle)).collect();
    let mut assign = |id: ClipId, role: SlotRole| {
        if let Some(entry) = roles.iter_mut().find(|(c, _)| *c == id) {
            entry.1 = role;
        }
    };

    match state {
        PlaybackState::Empty => {}
        PlaybackState::Clip(c) => assign(c.id, SlotRole::Live {
            target: c.local_time,
        }),
        PlaybackState::Transition(t) => {
            let (a_live, b_live) = match t.live {
                LiveSide::A => (true, false),
                LiveSide::B => (false, true),
                LiveSide::None => (false, false),
            };
            let role = |live: bool, target: f64| {
                if live {
                    SlotRole::Live { target }
                } else {
                    SlotRole::Held { target }
                }
            };
            if let Some(a) = t.clip_a {
                assign(a.id, role(a_live, a.local_time));
            }
            if let Some(b) = t.clip_b {
                assign(b.id, role(b_live, b.local_time));
            }
        }
    }
    SyncPlan { roles }
}

/// What a sync pass did, for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: usize,
    pub paused: usize,
    pub seeks: usize,
    pub rate_changes: usize,
}

fn pause(source: &dyn MediaSource, report: &mut SyncReport) {
    if !source.is_paused() {
        source.pause();
        report.paused += 1;
    }
}

fn seek(source: &dyn MediaSource, target: f64, report: &mut SyncReport) {
    source.seek(target);
    report.seeks += 1;
}

/// Realize `plan` on the leased sources.
///
/// `playing` selects between running live sources and merely positioning them.
pub fn apply_plan(
    lease: &PoolLease,
    plan: &SyncPlan,
    playing: bool,
    clock: &dyn Clock,
    tuning: &SyncTuning,
) -> SyncReport {
    let mut report = SyncReport::default();
    for (clip_id, role) in &plan.roles {
        let Some(source) = lease.source(*clip_id) else {
            continue;
        };
        let source = source.as_ref();
        match *role {
            SlotRole::Live { target } if playing => {
                if source.is_paused() {
                    if (source.current_time() - target).abs() > tuning.restart_seek_threshold {
                        seek(source, target, &mut report);
                        clock.sleep(tuning.settle_delay);
                    }
                    match source.play() {
                        Ok(()) => report.started += 1,
                        Err(e) => warn!(clip = %clip_id, error = %e, "source refused to play"),
                    }
                }
                let rate = corrected_rate(source.current_time(), target, tuning);
                if (rate - source.playback_rate()).abs() > 1e-9 {
                    source.set_playback_rate(rate);
                    report.rate_changes += 1;
                }
                lease.record(*clip_id, target, true);
            }
            SlotRole::Live { target } => {
                pause(source, &mut report);
                if (source.current_time() - target).abs() > tuning.paused_seek_threshold {
                    seek(source, target, &mut report);
                }
                lease.record(*clip_id, target, false);
            }
            SlotRole::Held { target } => {
                pause(source, &mut report);
                let tolerance = if target <= f64::EPSILON {
                    tuning.frame_zero_tolerance
                } else {
                    tuning.hold_tolerance
                };
                if (source.current_time() - target).abs() > tolerance {
                    seek(source, target, &mut report);
                }
                lease.record(*clip_id, target, false);
            }
            SlotRole::Idle => {
                pause(source, &mut report);
                lease.record(*clip_id, source.current_time(), false);
            }
        }
    }
    if report != SyncReport::default() {
        debug!(?report, playing, "sources synced");
    }
    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        effects::EffectId,
        media::{clock::ManualClock, synthetic::SyntheticSource},
        playback::ownership::{Owner, SourcePool},
        timeline::{TransitionAnchor, resolve, Transition},
    };

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn rate_is_exactly_one_inside_threshold() {
        let t = SyncTuning::default();
        assert_eq!(corrected_rate(1.0, 1.05, &t), 1.0);
        assert_eq!(corrected_rate(1.0, 0.9, &t), 1.0);
    }

    #[test]
    fn rate_correction_is_proportional_and_capped() {
        let t = SyncTuning::default();
        assert!(approx(corrected_rate(1.0, 1.4, &t), 1.2));
        assert!(approx(corrected_rate(1.4, 1.0, &t), 0.8));
        assert!(approx(corrected_rate(0.0, 5.0, &t), 1.5));
        assert!(approx(corrected_rate(5.0, 0.0, &t), 0.5));
    }

    fn setup(durations: &[f64]) -> (Arc<ManualClock>, Vec<Clip>) {
        let clock = Arc::new(ManualClock::new());
        let clips = durations
            .iter()
            .map(|d| {
                let src = SyntheticSource::with_clock(*d, 2, 2, [0; 4], clock.clone());
                Clip::new("c", Arc::new(src)).unwrap()
            })
            .collect();
        (clock, clips)
    }

    #[test]
    fn first_half_of_transition_holds_b_on_frame_zero() {
        let (_, clips) = setup(&[5.0, 3.0]);
        let tr = [Transition::new(EffectId::Fade, 2.0, TransitionAnchor::Between(0)).unwrap()];
        let plan = plan_for_state(&resolve(&clips, &tr, 4.5), &clips);
        assert!(matches!(plan.role_of(clips[0].id()), Some(SlotRole::Live { .. })));
        assert_eq!(plan.role_of(clips[1].id()), Some(SlotRole::Held { target: 0.0 }));

        let plan = plan_for_state(&resolve(&clips, &tr, 5.5), &clips);
        assert_eq!(plan.role_of(clips[0].id()), Some(SlotRole::Held { target: 5.0 }));
        assert!(matches!(plan.role_of(clips[1].id()), Some(SlotRole::Live { .. })));
    }

    #[test]
    fn apply_starts_live_and_parks_others() {
        let (clock, clips) = setup(&[2.0, 2.0]);
        let pool = SourcePool::from_clips(&clips);
        let lease = pool.acquire(Owner::Playback).unwrap();
        clips[1].source().play().unwrap();

        let plan = plan_for_state(&resolve(&clips, &[], 1.0), &clips);
        let report = apply_plan(&lease, &plan, true, &*clock, &SyncTuning::default());

        assert_eq!(report.started, 1);
        assert_eq!(report.paused, 1);
        // Restart far from target seeks and waits for the settle delay.
        assert_eq!(report.seeks, 1);
        assert_eq!(clock.now(), Duration::from_millis(50));
        assert!(!clips[0].source().is_paused());
        assert!(clips[1].source().is_paused());
    }

    #[test]
    fn drifting_live_source_gets_rate_correction() {
        let (clock, clips) = setup(&[10.0]);
        let pool = SourcePool::from_clips(&clips);
        let lease = pool.acquire(Owner::Playback).unwrap();
        let tuning = SyncTuning::default();
        let src = clips[0].source();
        src.play().unwrap();
        clock.advance_secs(1.0);

        let plan = plan_for_state(&resolve(&clips, &[], 1.6), &clips);
        let report = apply_plan(&lease, &plan, true, &*clock, &tuning);
        assert_eq!(report.rate_changes, 1);
        assert!(approx(src.playback_rate(), 1.3));

        let plan = plan_for_state(&resolve(&clips, &[], 1.0), &clips);
        apply_plan(&lease, &plan, true, &*clock, &tuning);
        assert_eq!(src.playback_rate(), 1.0);
    }

    #[test]
    fn held_source_only_reseeks_past_tolerance() {
        let (clock, clips) = setup(&[5.0, 3.0]);
        let pool = SourcePool::from_clips(&clips);
        let lease = pool.acquire(Owner::Playback).unwrap();
        let tuning = SyncTuning::default();
        let held = clips[0].source();

        held.seek(4.95);
        let plan = SyncPlan {
            roles: vec![(clips[0].id(), SlotRole::Held { target: 5.0 })],
        };
        let r = apply_plan(&lease, &plan, true, &*clock, &tuning);
        assert_eq!(r.seeks, 0);

        held.seek(4.5);
        let r = apply_plan(&lease, &plan, true, &*clock, &tuning);
        assert_eq!(r.seeks, 1);
        assert_eq!(held.current_time(), 5.0);

        let frame_zero = SyncPlan {
            roles: vec![(clips[1].id(), SlotRole::Held { target: 0.0 })],
        };
        clips[1].source().seek(0.05);
        let r = apply_plan(&lease, &frame_zero, true, &*clock, &tuning);
        assert_eq!(r.seeks, 1);
    }
}
