use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{
    foundation::{
        core::FrameRGBA,
        error::{SegueError, SegueResult},
    },
    media::{
        clock::{Clock, system_clock},
        source::{MediaSource, ReadyState, SourceId, SourceInfo, Transport},
    },
};

/// Solid-color test-pattern source.
///
/// Needs no decoder, so it backs the CLI's `--durations` mode and deterministic tests.
/// Counters record how often the transport was driven.
#[derive(Debug)]
pub struct SyntheticSource {
    id: SourceId,
    info: SourceInfo,
    color: [u8; 4],
    frame: Arc<FrameRGBA>,
    transport: Mutex<Transport>,
    ready: Mutex<ReadyState>,
    released: AtomicBool,
    never_ready: bool,
    fail_clone: bool,
    seeks: AtomicUsize,
    plays: AtomicUsize,
}

impl SyntheticSource {
    pub fn new(duration: f64, width: u32, height: u32, color: [u8; 4]) -> Self {
        Self::with_clock(duration, width, height, color, system_clock())
    }

    pub fn with_clock(
        duration: f64,
        width: u32,
        height: u32,
        color: [u8; 4],
        clock: Arc<dyn Clock>,
    ) -> Self {
        let info = SourceInfo {
            name: format!("synthetic #{:02x}{:02x}{:02x}", color[0], color[1], color[2]),
            path: None,
            duration,
            width,
            height,
            fps: 30.0,
        };
        Self {
            id: SourceId::next(),
            frame: Arc::new(FrameRGBA::solid(width.max(1), height.max(1), color)),
            transport: Mutex::new(Transport::new(clock, duration)),
            ready: Mutex::new(ReadyState::EnoughData),
            released: AtomicBool::new(false),
            never_ready: false,
            fail_clone: false,
            seeks: AtomicUsize::new(0),
            plays: AtomicUsize::new(0),
            info,
            color,
        }
    }

    /// Source whose readiness wait always times out.
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        *self.ready.get_mut().unwrap_or_else(PoisonError::into_inner) = ReadyState::Metadata;
        self
    }

    /// Source whose `try_clone` fails.
    pub fn failing_clone(mut self) -> Self {
        self.fail_clone = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    pub fn color(&self) -> [u8; 4] {
        self.color
    }

    pub fn seek_count(&self) -> usize {
        self.seeks.load(Ordering::Relaxed)
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::Relaxed)
    }

    fn transport(&self) -> std::sync::MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MediaSource for SyntheticSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn ready_state(&self) -> ReadyState {
        if self.is_released() {
            return ReadyState::Nothing;
        }
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_ready(&self, timeout: Duration) -> SegueResult<()> {
        if self.never_ready || self.is_released() {
            return Err(SegueError::timeout(format!(
                "{} not ready after {:.1}s",
                self.info.name,
                timeout.as_secs_f64()
            )));
        }
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.transport().position()
    }

    fn seek(&self, t: f64) {
        self.seeks.fetch_add(1, Ordering::Relaxed);
        self.transport().seek(t);
    }

    fn is_paused(&self) -> bool {
        self.transport().is_paused()
    }

    fn play(&self) -> SegueResult<()> {
        if self.is_released() {
            return Err(SegueError::media(format!("{} was released", self.info.name)));
        }
        self.plays.fetch_add(1, Ordering::Relaxed);
        self.transport().play();
        Ok(())
    }

    fn pause(&self) {
        self.transport().pause();
    }

    fn playback_rate(&self) -> f64 {
        self.transport().rate()
    }

    fn set_playback_rate(&self, rate: f64) {
        self.transport().set_rate(rate);
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.transport().clock().clone()
    }

    fn current_frame(&self) -> Option<Arc<FrameRGBA>> {
        if !self.ready_state().has_frame() {
            return None;
        }
        Some(self.frame.clone())
    }

    fn try_clone(&self) -> SegueResult<Arc<dyn MediaSource>> {
        if self.fail_clone {
            return Err(SegueError::media(format!(
                "{} cannot be cloned",
                self.info.name
            )));
        }
        let clock = self.transport().clock().clone();
        let mut clone = SyntheticSource::with_clock(
            self.info.duration,
            self.info.width,
            self.info.height,
            self.color,
            clock,
        );
        clone.info.name = self.info.name.clone();
        clone.never_ready = self.never_ready;
        Ok(Arc::new(clone))
    }

    fn release(&self) {
        self.transport().pause();
        self.released.store(true, Ordering::Release);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
