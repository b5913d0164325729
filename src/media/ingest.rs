//! Turning files into ready [`Clip`]s.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{info, instrument, warn};

use crate::{
    foundation::error::{SegueError, SegueResult},
    media::{
        clock::{Clock, system_clock},
        ffmpeg::FfmpegSource,
        source::{MediaSource, run_with_timeout},
    },
    timeline::Clip,
};

/// Readiness budget per file: `base + per_mib * size`, capped at `max`.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub base_timeout: Duration,
    pub per_mib: Duration,
    pub max_timeout: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(10),
            per_mib: Duration::from_millis(500),
            max_timeout: Duration::from_secs(120),
            clock: system_clock(),
        }
    }
}

impl IngestOptions {
    pub fn timeout_for(&self, size_bytes: u64) -> Duration {
        let mib = size_bytes as f64 / (1024.0 * 1024.0);
        let scaled = self.base_timeout.as_secs_f64() + self.per_mib.as_secs_f64() * mib;
        Duration::from_secs_f64(scaled).min(self.max_timeout)
    }
}

/// Probe and open one file, then wait for its first frame.
///
/// Both stages share one budget of [`IngestOptions::timeout_for`] the file size.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn add_clip(path: impl AsRef<Path>, opts: &IngestOptions) -> SegueResult<Clip> {
    let path = path.as_ref();
    let size = std::fs::metadata(path)
        .map_err(|e| SegueError::ingest(path, format!("cannot stat file: {e}")))?
        .len();
    let clock = opts.clock.clone();
    open_within(path, opts.timeout_for(size), move |p| {
        Ok(Arc::new(FfmpegSource::open(p, clock)?) as Arc<dyn MediaSource>)
    })
}

fn open_within<F>(path: &Path, timeout: Duration, open: F) -> SegueResult<Clip>
where
    F: FnOnce(PathBuf) -> SegueResult<Arc<dyn MediaSource>> + Send + 'static,
{
    let fail = |e: SegueError| SegueError::ingest(path, e.to_string());
    let deadline = Instant::now() + timeout;

    let owned = path.to_path_buf();
    let source = run_with_timeout(&path.display().to_string(), timeout, move || open(owned))
        .map_err(fail)?
        .map_err(fail)?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    ingest_source(source.info().name.clone(), source, remaining).map_err(|e| match e {
        SegueError::Ingest { .. } => e,
        other => fail(other),
    })
}

/// Ingest every path; one result per input, failures do not stop the batch.
pub fn add_clips<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
    opts: &IngestOptions,
) -> Vec<SegueResult<Clip>> {
    paths
        .into_iter()
        .map(|p| {
            let r = add_clip(p.as_ref(), opts);
            if let Err(e) = &r {
                warn!(error = %e, "ingest failed");
            }
            r
        })
        .collect()
}

/// Wait for an already-open source to become ready and wrap it in a clip.
///
/// A source that times out is released before the error is returned.
pub fn ingest_source(
    name: impl Into<String>,
    source: Arc<dyn MediaSource>,
    timeout: Duration,
) -> SegueResult<Clip> {
    let name = name.into();
    if let Err(e) = source.wait_ready(timeout) {
        source.release();
        return Err(e);
    }
    source.pause();
    let clip = Clip::new(name, source)?;
    info!(
        clip = %clip.id(),
        duration = clip.duration(),
        resolution = %clip.resolution(),
        "clip ready"
    );
    Ok(clip)
}
