//! Real-time re-render of the timeline into a [`FrameSink`].
//!
//! Export drives its own clones of every source so that live playback state is never
//! disturbed. Output frames are paced against absolute deadlines on the [`Clock`]; a slot that
//! is missed entirely repeats the previous frame, so the sink always receives exactly
//! `ceil(window * fps)` frames.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, info, instrument, warn};

use crate::{
    export::{
        ffmpeg::FfmpegSink,
        preset::{CodecChoice, QualityPreset, artifact_file_name, ffmpeg_encoders, negotiate_codec},
        sink::{FrameSink, SinkConfig},
        window::{ExportScope, ExportWindow},
    },
    foundation::{
        core::{FrameRGBA, Resolution},
        error::{SegueError, SegueResult},
    },
    media::clock::{Clock, system_clock},
    playback::{
        ownership::{Owner, PoolLease, SourcePool},
        sync::{SyncTuning, apply_plan, plan_for_state},
    },
    render::{BackendKind, Compositor, CompositorOptions},
    timeline::{Clip, Timeline},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExportOptions {
    pub quality: QualityPreset,
    pub scope: ExportScope,
    pub backend: BackendKind,
    /// Output size; defaults to the first clip's dimensions.
    pub resolution: Option<Resolution>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportReport {
    pub window: ExportWindow,
    pub fps: u32,
    pub resolution: Resolution,
    pub frames: u64,
    /// Frames pushed as repeats because their slot was missed.
    pub repeated: u64,
}

/// A finished export on disk.
#[derive(Clone, Debug)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub codec: CodecChoice,
    pub report: ExportReport,
}

/// Cancels a running export at the next frame boundary.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct ExportPipeline {
    clock: Arc<dyn Clock>,
    tuning: SyncTuning,
    abort: AbortHandle,
}

impl ExportPipeline {
    /// Pipeline paced by `clock`, which must be the clock the timeline's sources run on.
    ///
    /// Prefer [`ExportPipeline::for_timeline`], which takes it from the sources.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tuning: SyncTuning::default(),
            abort: AbortHandle::default(),
        }
    }

    /// Pipeline paced by the clock of the timeline's first source.
    pub fn for_timeline(timeline: &Timeline) -> Self {
        let clock = timeline
            .clips()
            .first()
            .map(|c| c.source().clock())
            .unwrap_or_else(system_clock);
        Self::new(clock)
    }

    pub fn with_tuning(mut self, tuning: SyncTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Render the scoped window of `timeline` into `sink`.
    ///
    /// The timeline's own sources are paused and held for the duration of the export, so a
    /// playing driver must be stopped first. `progress` receives percentages, capped at 99
    /// until the sink has finished.
    #[instrument(skip_all, fields(quality = %opts.quality))]
    pub fn run(
        &self,
        timeline: &Timeline,
        opts: &ExportOptions,
        sink: &mut dyn FrameSink,
        progress: &mut dyn FnMut(f64),
    ) -> SegueResult<ExportReport> {
        let window = ExportWindow::for_scope(timeline, opts.scope)?;
        let resolution = match opts.resolution {
            Some(r) => r.even(),
            None => timeline.output_resolution()?,
        };

        let foreign = timeline
            .clips()
            .iter()
            .filter(|c| !same_clock(&c.source().clock(), &self.clock))
            .count();
        if foreign > 0 {
            warn!(
                clips = foreign,
                "sources run on a different clock than the export; pacing may drift"
            );
        }

        let live = timeline.pool().acquire(Owner::Export)?;
        live.pause_all();

        let clips = clone_clips(timeline.clips())?;
        let pool = SourcePool::from_clips(&clips);
        let lease = pool.acquire(Owner::Export)?;

        let mut compositor = match Compositor::new(CompositorOptions {
            backend: opts.backend,
            resolution,
        }) {
            Ok(c) => c,
            Err(e) => {
                lease.release_all();
                return Err(e);
            }
        };

        info!(
            start = window.start,
            duration = window.duration,
            %resolution,
            "export started"
        );
        let result = self.encode(
            timeline,
            &clips,
            &lease,
            &mut compositor,
            window,
            opts.quality,
            sink,
            progress,
        );

        lease.release_all();
        compositor.dispose();
        drop(live);

        match &result {
            Ok(report) => info!(
                frames = report.frames,
                repeated = report.repeated,
                "export finished"
            ),
            Err(e) => warn!(error = %e, "export failed"),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn encode(
        &self,
        timeline: &Timeline,
        clips: &[Clip],
        lease: &PoolLease,
        compositor: &mut Compositor,
        window: ExportWindow,
        quality: QualityPreset,
        sink: &mut dyn FrameSink,
        progress: &mut dyn FnMut(f64),
    ) -> SegueResult<ExportReport> {
        for slot in lease.slots() {
            prime(&*slot.source);
        }

        let resolution = compositor.resolution();
        let fps = quality.fps();
        let frame_count = window.frame_count(fps);
        sink.begin(SinkConfig {
            width: resolution.width,
            height: resolution.height,
            fps,
            bitrate: quality.bitrate(),
        })?;

        let wall_start = self.clock.now();
        let mut last: Option<FrameRGBA> = None;
        let mut idx = 0u64;
        let mut repeated = 0u64;

        while idx < frame_count {
            if self.abort.is_aborted() {
                return Err(SegueError::export("export aborted"));
            }

            let due = wall_start + Duration::from_secs_f64(idx as f64 / f64::from(fps));
            self.clock.sleep_until(due);
            let elapsed = self.clock.now().saturating_sub(wall_start).as_secs_f64();

            let slot = ((elapsed * f64::from(fps) + 1e-9).floor() as u64).min(frame_count - 1);
            if let Some(frame) = &last {
                while idx < slot {
                    sink.push_frame(idx, frame)?;
                    repeated += 1;
                    idx += 1;
                }
            }

            let t = (window.start + elapsed).min(window.end());
            let state = window.state_at(clips, timeline.transitions(), t);
            let plan = plan_for_state(&state, clips);
            apply_plan(lease, &plan, true, &*self.clock, &self.tuning);
            compositor.render_state(&state, clips);

            let frame = compositor.last_frame().cloned().unwrap_or_else(|| {
                FrameRGBA::solid(resolution.width, resolution.height, [0, 0, 0, 255])
            });
            sink.push_frame(idx, &frame)?;
            last = Some(frame);
            idx += 1;

            debug!(frame = idx, t, "export frame");
            progress((idx as f64 * 100.0 / frame_count as f64).min(99.0));
        }

        sink.end()?;
        progress(100.0);

        Ok(ExportReport {
            window,
            fps,
            resolution,
            frames: idx,
            repeated,
        })
    }

    /// Negotiate a codec, export through ffmpeg and move the result to its final name in
    /// `out_dir`. The partial file is removed on failure.
    #[instrument(skip_all, fields(out_dir = %out_dir.display()))]
    pub fn export_to_file(
        &self,
        timeline: &Timeline,
        opts: &ExportOptions,
        out_dir: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> SegueResult<ExportArtifact> {
        use anyhow::Context as _;

        let encoders = ffmpeg_encoders()?;
        let codec = negotiate_codec(|e| encoders.contains(e))?;

        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create output directory '{}'", out_dir.display()))?;
        let name = artifact_file_name(chrono::Local::now().naive_local(), codec.extension);
        let partial = out_dir.join(format!(".{name}.partial"));
        let path = out_dir.join(&name);

        let mut sink = FfmpegSink::new(&partial, codec);
        let report = match self.run(timeline, opts, &mut sink, progress) {
            Ok(report) => report,
            Err(e) => {
                drop(sink);
                let _ = std::fs::remove_file(&partial);
                return Err(e);
            }
        };

        std::fs::rename(&partial, &path)
            .with_context(|| format!("failed to move export to '{}'", path.display()))?;
        info!(path = %path.display(), codec = %codec, "export written");
        Ok(ExportArtifact {
            path,
            codec,
            report,
        })
    }
}

fn same_clock(a: &Arc<dyn Clock>, b: &Arc<dyn Clock>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Export-only copies of every clip, sharing ids and timing with the originals.
fn clone_clips(clips: &[Clip]) -> SegueResult<Vec<Clip>> {
    let mut out: Vec<Clip> = Vec::with_capacity(clips.len());
    for clip in clips {
        match clip.source().try_clone() {
            Ok(source) => out.push(clip.with_source(source)),
            Err(e) => {
                for c in &out {
                    c.source().release();
                }
                return Err(SegueError::export(format!(
                    "failed to clone source for clip '{}': {e}",
                    clip.name()
                )));
            }
        }
    }
    Ok(out)
}

/// Seek to the first frame and cycle play/pause so the decoder has a frame ready.
fn prime(source: &dyn crate::media::source::MediaSource) {
    source.seek(0.0);
    if let Err(e) = source.play() {
        warn!(source = %source.id(), error = %e, "could not prime source");
    }
    source.pause();
}
