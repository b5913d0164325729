//! The live playback loop.
//!
//! The caller pumps [`PlaybackDriver::tick`] (for example from a display-refresh callback).
//! Each tick derives the global time from the wall clock anchor set by `play`, resolves the
//! timeline, realizes source timing and draws one frame.

use std::{fmt, sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    foundation::{core::PLAYBACK_END_EPSILON, error::SegueResult},
    media::clock::Clock,
    playback::{
        ownership::{Owner, PoolLease},
        sync::{SyncTuning, apply_plan, plan_for_state},
    },
    render::{BackendKind, Compositor, CompositorOptions},
    timeline::{PlaybackState, Timeline},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Playing,
    /// Transient while an explicit seek positions sources on a stopped driver.
    Seeking,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriverState::Stopped => "stopped",
            DriverState::Playing => "playing",
            DriverState::Seeking => "seeking",
        })
    }
}

/// Result of one tick or seek.
#[derive(Clone, Debug, PartialEq)]
pub struct TickOutcome {
    pub time: f64,
    pub state: PlaybackState,
    pub driver: DriverState,
    /// The tick reached the end of the timeline and stopped playback.
    pub finished: bool,
}

#[derive(Debug, Default)]
struct FpsCounter {
    window_start: Option<Duration>,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    fn frame(&mut self, now: Duration) {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_sub(start);
        if elapsed >= Duration::from_secs(1) {
            self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = Some(now);
        }
    }

    fn reset(&mut self) {
        self.window_start = None;
        self.frames = 0;
    }
}

pub struct PlaybackDriver {
    clock: Arc<dyn Clock>,
    tuning: SyncTuning,
    compositor: Compositor,
    lease: Option<PoolLease>,
    state: DriverState,
    current_time: f64,
    /// Wall time and global time captured by the last `play` or seek.
    anchor: Option<(Duration, f64)>,
    fps: FpsCounter,
}

impl PlaybackDriver {
    pub fn new(compositor: Compositor, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tuning: SyncTuning::default(),
            compositor,
            lease: None,
            state: DriverState::Stopped,
            current_time: 0.0,
            anchor: None,
            fps: FpsCounter::default(),
        }
    }

    /// Driver with a compositor sized to the timeline's first clip.
    pub fn for_timeline(
        timeline: &Timeline,
        backend: BackendKind,
        clock: Arc<dyn Clock>,
    ) -> SegueResult<Self> {
        let resolution = timeline.output_resolution()?;
        let compositor = Compositor::new(CompositorOptions {
            backend,
            resolution,
        })?;
        Ok(Self::new(compositor, clock))
    }

    pub fn with_tuning(mut self, tuning: SyncTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == DriverState::Playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Frames per second measured over the last complete one-second window.
    pub fn fps(&self) -> f64 {
        self.fps.fps
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    /// Whether this driver currently owns the timeline's sources.
    pub fn holds_sources(&self) -> bool {
        self.lease.is_some()
    }

    fn ensure_lease(&mut self, timeline: &Timeline) -> SegueResult<()> {
        let stale = self
            .lease
            .as_ref()
            .is_none_or(|l| !l.pool().same_pool(timeline.pool()));
        if stale {
            self.lease = None;
            self.lease = Some(timeline.pool().acquire(Owner::Playback)?);
        }
        Ok(())
    }

    /// Start (or resume) playback from the current time.
    ///
    /// Playing from the end restarts at 0. An empty timeline is a no-op.
    pub fn play(&mut self, timeline: &Timeline) -> SegueResult<()> {
        if timeline.is_empty() {
            info!("play requested on an empty timeline");
            return Ok(());
        }
        if self.current_time >= timeline.total_duration() - PLAYBACK_END_EPSILON {
            self.current_time = 0.0;
        }
        self.ensure_lease(timeline)?;
        self.anchor = Some((self.clock.now(), self.current_time));
        self.state = DriverState::Playing;
        self.fps.reset();
        info!(time = self.current_time, "playback started");
        Ok(())
    }

    /// Stop advancing time and pause every owned source. Ownership is kept for a quick resume.
    pub fn pause(&mut self) {
        if let Some((wall, t0)) = self.anchor.take() {
            self.current_time = t0 + self.clock.now().saturating_sub(wall).as_secs_f64();
        }
        if let Some(lease) = &self.lease {
            lease.pause_all();
        }
        self.state = DriverState::Stopped;
        debug!(time = self.current_time, "playback paused");
    }

    /// Pause and give up ownership of the sources.
    pub fn stop(&mut self) {
        self.pause();
        self.lease = None;
        info!(time = self.current_time, "playback stopped");
    }

    /// Jump to `t`. While playing the anchor moves; while stopped the frame at `t` is drawn.
    pub fn seek(&mut self, timeline: &Timeline, t: f64) -> TickOutcome {
        let total = timeline.total_duration();
        let t = if t.is_finite() { t.clamp(0.0, total) } else { 0.0 };
        self.current_time = t;

        if self.state == DriverState::Playing {
            self.anchor = Some((self.clock.now(), t));
            return self.tick(timeline);
        }

        self.state = DriverState::Seeking;
        let state = timeline.resolve(t);
        if let Err(e) = self.ensure_lease(timeline) {
            warn!(error = %e, "seek without source ownership; sources left untouched");
        }
        if let Some(lease) = &self.lease {
            let plan = plan_for_state(&state, timeline.clips());
            apply_plan(lease, &plan, false, &*self.clock, &self.tuning);
        }
        self.compositor.render_state(&state, timeline.clips());
        self.state = DriverState::Stopped;
        debug!(time = t, "seeked");
        TickOutcome {
            time: t,
            state,
            driver: self.state,
            finished: false,
        }
    }

    /// Advance one frame.
    pub fn tick(&mut self, timeline: &Timeline) -> TickOutcome {
        let Some((wall, t0)) = self.anchor.filter(|_| self.state == DriverState::Playing) else {
            return TickOutcome {
                time: self.current_time,
                state: timeline.resolve(self.current_time),
                driver: self.state,
                finished: false,
            };
        };

        let now = self.clock.now();
        let t = t0 + now.saturating_sub(wall).as_secs_f64();
        let total = timeline.total_duration();

        if t >= total - PLAYBACK_END_EPSILON {
            self.current_time = total;
            self.anchor = None;
            self.state = DriverState::Stopped;
            if let Some(lease) = &self.lease {
                lease.pause_all();
            }
            let state = timeline.resolve(total);
            self.compositor.render_state(&state, timeline.clips());
            info!(time = total, "playback reached the end");
            return TickOutcome {
                time: total,
                state,
                driver: self.state,
                finished: true,
            };
        }

        self.current_time = t;
        let state = timeline.resolve(t);
        if let Some(lease) = &self.lease {
            let plan = plan_for_state(&state, timeline.clips());
            apply_plan(lease, &plan, true, &*self.clock, &self.tuning);
        }
        self.compositor.render_state(&state, timeline.clips());
        self.fps.frame(now);

        TickOutcome {
            time: t,
            state,
            driver: self.state,
            finished: false,
        }
    }
}

impl fmt::Debug for PlaybackDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackDriver")
            .field("state", &self.state)
            .field("current_time", &self.current_time)
            .field("holds_sources", &self.lease.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effects::EffectId,
        foundation::core::Resolution,
        media::{clock::ManualClock, synthetic::SyntheticSource},
        timeline::{Clip, TransitionAnchor},
    };

    fn setup(durations: &[f64]) -> (Arc<ManualClock>, Timeline, PlaybackDriver) {
        let clock = Arc::new(ManualClock::new());
        let mut tl = Timeline::new();
        for (i, d) in durations.iter().enumerate() {
            let src = SyntheticSource::with_clock(*d, 4, 4, [i as u8 * 100, 0, 0, 255], clock.clone());
            tl.add_clip(Clip::new(format!("c{i}"), Arc::new(src)).unwrap());
        }
        let compositor = Compositor::new(CompositorOptions {
            backend: BackendKind::Cpu,
            resolution: Resolution {
                width: 4,
                height: 4,
            },
        })
        .unwrap();
        let driver = PlaybackDriver::new(compositor, clock.clone());
        (clock, tl, driver)
    }

    #[test]
    fn fps_counter_reports_after_a_full_window() {
        let mut c = FpsCounter::default();
        for i in 0..=30 {
            c.frame(Duration::from_millis(i * 1000 / 30));
        }
        assert!((c.fps - 31.0).abs() < 1e-9);
    }

    #[test]
    fn tick_time_comes_from_the_anchor() {
        let (clock, tl, mut d) = setup(&[5.0]);
        d.play(&tl).unwrap();
        clock.advance_secs(1.25);
        let out = d.tick(&tl);
        assert!((out.time - 1.25).abs() < 1e-9);
        assert_eq!(out.driver, DriverState::Playing);
        assert!(!tl.clips()[0].source().is_paused());
    }

    #[test]
    fn reaching_the_end_stops_without_wrapping() {
        let (clock, tl, mut d) = setup(&[2.0]);
        d.play(&tl).unwrap();
        d.tick(&tl);
        clock.advance_secs(1.99);
        let out = d.tick(&tl);
        assert!(out.finished);
        assert_eq!(out.time, 2.0);
        assert_eq!(d.state(), DriverState::Stopped);
        assert!(tl.clips()[0].source().is_paused());

        // Playing again from the end restarts at zero.
        d.play(&tl).unwrap();
        assert_eq!(d.current_time(), 0.0);
    }

    #[test]
    fn pause_keeps_position_and_ownership() {
        let (clock, tl, mut d) = setup(&[5.0]);
        d.play(&tl).unwrap();
        d.tick(&tl);
        clock.advance_secs(2.0);
        d.pause();
        assert!((d.current_time() - 2.0).abs() < 1e-9);
        assert!(d.holds_sources());
        assert!(tl.clips()[0].source().is_paused());

        clock.advance_secs(10.0);
        let out = d.tick(&tl);
        assert!((out.time - 2.0).abs() < 1e-9);

        d.stop();
        assert!(!d.holds_sources());
        assert_eq!(tl.pool().owner(), None);
    }

    #[test]
    fn seek_while_stopped_positions_and_draws() {
        let (_, mut tl, mut d) = setup(&[5.0, 3.0]);
        tl.set_transition(EffectId::Fade, 2.0, TransitionAnchor::Between(0))
            .unwrap();
        let out = d.seek(&tl, 5.5);
        assert_eq!(out.driver, DriverState::Stopped);
        assert!(out.state.is_transition());
        assert!(tl.clips().iter().all(|c| c.source().is_paused()));
        assert!((tl.clips()[1].source().current_time() - 0.5).abs() < 1e-9);
        assert_eq!(d.compositor().draw_count(), 1);
    }

    #[test]
    fn empty_timeline_play_is_a_noop() {
        let (_, tl, mut d) = setup(&[]);
        d.play(&tl).unwrap();
        assert_eq!(d.state(), DriverState::Stopped);
        assert!(!d.holds_sources());
    }
}
