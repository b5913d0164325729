//! The seekable, playable media source abstraction.
//!
//! A source behaves like a media element: it has a transport (position, paused flag,
//! playback rate) advanced by a [`Clock`], a readiness level, and exposes the decoded frame
//! at its current position. All methods take `&self`; implementations guard their state
//! internally so one source can be shared between the timeline and a source pool.

use std::{
    fmt,
    path::PathBuf,
    sync::{
        Arc, mpsc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    foundation::{
        core::{FrameRGBA, clamp_time},
        error::{SegueError, SegueResult},
    },
    media::clock::Clock,
};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src-{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub path: Option<PathBuf>,
    /// Seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Native frame rate; 0 when unknown.
    pub fps: f64,
}

/// How much of the source is decodable, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Nothing,
    Metadata,
    CurrentData,
    EnoughData,
}

impl ReadyState {
    /// A frame can be uploaded from the source.
    pub fn has_frame(self) -> bool {
        self >= ReadyState::CurrentData
    }
}

pub trait MediaSource: Send + Sync + fmt::Debug {
    fn id(&self) -> SourceId;

    fn info(&self) -> &SourceInfo;

    fn ready_state(&self) -> ReadyState;

    /// Block until the first frame is decodable or `timeout` elapses.
    fn wait_ready(&self, timeout: Duration) -> SegueResult<()>;

    fn current_time(&self) -> f64;

    fn seek(&self, t: f64);

    fn is_paused(&self) -> bool;

    fn play(&self) -> SegueResult<()>;

    fn pause(&self);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&self, rate: f64);

    /// Clock the transport runs on; clones share it.
    fn clock(&self) -> Arc<dyn Clock>;

    /// Frame at the current position, `None` when nothing is decodable.
    fn current_frame(&self) -> Option<Arc<FrameRGBA>>;

    /// Independent source over the same media with its own transport.
    fn try_clone(&self) -> SegueResult<Arc<dyn MediaSource>>;

    /// Drop decoded data; the source stops producing frames.
    fn release(&self);

    fn is_released(&self) -> bool;
}

pub const MIN_PLAYBACK_RATE: f64 = 0.0625;
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

/// Position/rate/paused state advanced by a clock.
///
/// Position is derived from an anchor (`anchor_pos` at `anchor_at`) rather than
/// accumulated, and is clamped to `[0, duration]`.
#[derive(Debug)]
pub struct Transport {
    clock: Arc<dyn Clock>,
    duration: f64,
    anchor_pos: f64,
    anchor_at: Duration,
    rate: f64,
    paused: bool,
}

impl Transport {
    pub fn new(clock: Arc<dyn Clock>, duration: f64) -> Self {
        let anchor_at = clock.now();
        Self {
            clock,
            duration: duration.max(0.0),
            anchor_pos: 0.0,
            anchor_at,
            rate: 1.0,
            paused: true,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn position(&self) -> f64 {
        if self.paused {
            return self.anchor_pos;
        }
        let elapsed = self.clock.now().saturating_sub(self.anchor_at).as_secs_f64();
        clamp_time(self.anchor_pos + elapsed * self.rate, self.duration)
    }

    fn reanchor(&mut self) {
        self.anchor_pos = self.position();
        self.anchor_at = self.clock.now();
    }

    pub fn seek(&mut self, t: f64) {
        self.anchor_pos = clamp_time(t, self.duration);
        self.anchor_at = self.clock.now();
    }

    pub fn play(&mut self) {
        if self.paused {
            self.anchor_at = self.clock.now();
            self.paused = false;
        }
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.reanchor();
            self.paused = true;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        if !rate.is_finite() {
            return;
        }
        self.reanchor();
        self.rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
    }

    pub fn ended(&self) -> bool {
        self.position() >= self.duration
    }
}

/// Run `f` on a worker thread and wait at most `timeout` for its result.
///
/// On timeout the worker is detached and its eventual result dropped.
pub(crate) fn run_with_timeout<T: Send + 'static>(
    what: &str,
    timeout: Duration,
    f: impl FnOnce() -> T + Send + 'static,
) -> SegueResult<T> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("segue-ready".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| SegueError::media(format!("failed to spawn readiness worker: {e}")))?;
    rx.recv_timeout(timeout).map_err(|e| match e {
        mpsc::RecvTimeoutError::Timeout => SegueError::timeout(format!(
            "{what} not ready after {:.1}s",
            timeout.as_secs_f64()
        )),
        mpsc::RecvTimeoutError::Disconnected => {
            SegueError::media(format!("{what}: readiness worker exited without a result"))
        }
    })
}
