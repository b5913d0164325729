//! Video files decoded through the system `ffmpeg`/`ffprobe` binaries.
//!
//! We shell out instead of linking FFmpeg so the crate builds without native dev headers.

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError, TryLockError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, warn};

use crate::{
    foundation::{
        core::FrameRGBA,
        error::{SegueError, SegueResult},
    },
    media::{
        clock::Clock,
        source::{MediaSource, ReadyState, SourceId, SourceInfo, Transport, run_with_timeout},
    },
};

#[derive(Clone, Debug, PartialEq)]
pub struct VideoProbe {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
}

impl VideoProbe {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

pub fn probe_video(path: &Path) -> SegueResult<VideoProbe> {
    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| SegueError::media(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(SegueError::media(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    parse_probe_json(path, &out.stdout)
}

fn parse_probe_json(path: &Path, json: &[u8]) -> SegueResult<VideoProbe> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| SegueError::media(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| SegueError::media("no video stream found"))?;
    let width = stream
        .width
        .ok_or_else(|| SegueError::media("missing video width from ffprobe"))?;
    let height = stream
        .height
        .ok_or_else(|| SegueError::media("missing video height from ffprobe"))?;
    let (fps_num, fps_den) = parse_ff_ratio(stream.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| SegueError::media("invalid video r_frame_rate"))?;
    // Container duration first; some muxers only report it per stream.
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoProbe {
        path: path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
    })
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}

/// Decodes `frame_count` frames starting at a time, one RGBA8 buffer per frame.
pub(crate) type DecodeFn = fn(&VideoProbe, f64, u32) -> SegueResult<Vec<Vec<u8>>>;

pub(crate) fn decode_video_frames_rgba8(
    probe: &VideoProbe,
    start_time_sec: f64,
    frame_count: u32,
) -> SegueResult<Vec<Vec<u8>>> {
    if frame_count == 0 {
        return Ok(Vec::new());
    }

    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{start_time_sec:.9}")])
        .arg("-i")
        .arg(&probe.path)
        .args([
            "-frames:v",
            &frame_count.to_string(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| SegueError::media(format!("failed to run ffmpeg for video decode: {e}")))?;

    if !out.status.success() {
        return Err(SegueError::media(format!(
            "ffmpeg video decode failed for '{}': {}",
            probe.path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    split_frames(&out.stdout, probe.width, probe.height, frame_count)
}

fn split_frames(
    bytes: &[u8],
    width: u32,
    height: u32,
    frame_count: u32,
) -> SegueResult<Vec<Vec<u8>>> {
    let expected_len = width as usize * height as usize * 4;
    if expected_len == 0 {
        return Err(SegueError::media(
            "decoded video frame size is zero (invalid source dimensions)",
        ));
    }
    if bytes.len() < expected_len || !bytes.len().is_multiple_of(expected_len) {
        return Err(SegueError::media(format!(
            "decoded video batch has invalid size: got {} bytes, expected multiples of {expected_len}",
            bytes.len()
        )));
    }
    let available = (bytes.len() / expected_len).min(frame_count as usize);
    Ok(bytes
        .chunks_exact(expected_len)
        .take(available)
        .map(<[u8]>::to_vec)
        .collect())
}

/// Cache key of the frame displayed at `t`: times snap down to the frame grid.
fn frame_key(probe: &VideoProbe, t: f64) -> u64 {
    let step = frame_step_ms(probe);
    let ms = t.max(0.0) * 1000.0;
    ((ms / step + 1e-6).floor() * step).round() as u64
}

fn frame_step_ms(probe: &VideoProbe) -> f64 {
    let fps = probe.fps();
    if fps.is_finite() && fps > 0.0 {
        1000.0 / fps
    } else {
        1.0
    }
}

fn frame_from(probe: &VideoProbe, rgba: Vec<u8>) -> SegueResult<Arc<FrameRGBA>> {
    Ok(Arc::new(FrameRGBA::new(
        probe.width,
        probe.height,
        rgba,
        false,
    )?))
}

/// Decode the single frame shown at `key_ms` without touching any cache.
fn decode_one(probe: &VideoProbe, decode: DecodeFn, key_ms: u64) -> SegueResult<Arc<FrameRGBA>> {
    let rgba = decode(probe, key_ms as f64 / 1000.0, 1)?
        .pop()
        .ok_or_else(|| {
            SegueError::media(format!(
                "ffmpeg returned no video frames for '{}'",
                probe.path.display()
            ))
        })?;
    frame_from(probe, rgba)
}

/// Millisecond-keyed LRU of decoded frames with batch prefetch.
#[derive(Debug)]
pub(crate) struct FrameCache {
    probe: Arc<VideoProbe>,
    decode: DecodeFn,
    frames: HashMap<u64, Arc<FrameRGBA>>,
    lru: VecDeque<u64>,
    capacity: usize,
    prefetch_frames: u32,
}

impl FrameCache {
    pub(crate) fn new(probe: Arc<VideoProbe>, decode: DecodeFn) -> Self {
        let capacity = std::env::var("SEGUE_VIDEO_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(64);
        let prefetch_frames = std::env::var("SEGUE_VIDEO_PREFETCH_FRAMES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(12);
        Self {
            probe,
            decode,
            frames: HashMap::new(),
            lru: VecDeque::new(),
            capacity,
            prefetch_frames,
        }
    }

    fn step_ms(&self) -> f64 {
        frame_step_ms(&self.probe)
    }

    fn key_for_time(&self, t: f64) -> u64 {
        frame_key(&self.probe, t)
    }

    pub(crate) fn frame_at(&mut self, t: f64) -> SegueResult<Arc<FrameRGBA>> {
        let key = self.key_for_time(t);
        if let Some(f) = self.frames.get(&key).cloned() {
            self.touch(key);
            return Ok(f);
        }

        if self.prefetch_for_key(key).is_ok()
            && let Some(f) = self.frames.get(&key).cloned()
        {
            self.touch(key);
            return Ok(f);
        }

        // Sparse request the batch did not cover (e.g. past the last decodable frame).
        let frame = decode_one(&self.probe, self.decode, key)?;
        self.insert(key, frame.clone());
        Ok(frame)
    }

    /// Insert a frame decoded elsewhere, unless one is already cached under `key`.
    pub(crate) fn store(&mut self, key: u64, frame: Arc<FrameRGBA>) {
        if self.frames.contains_key(&key) {
            self.touch(key);
        } else {
            self.insert(key, frame);
        }
    }

    fn prefetch_for_key(&mut self, key_ms: u64) -> SegueResult<()> {
        let step_ms = self.step_ms();
        let window_ms = (step_ms * self.prefetch_frames as f64).max(step_ms);
        let bucket = ((key_ms as f64) / window_ms).floor();
        let start_key_ms = (bucket * window_ms).round().max(0.0) as u64;
        let frames = (self.decode)(
            &self.probe,
            start_key_ms as f64 / 1000.0,
            self.prefetch_frames,
        )?;
        debug!(
            path = %self.probe.path.display(),
            start_ms = start_key_ms,
            decoded = frames.len(),
            "frame batch prefetched"
        );

        for (offset, rgba) in frames.into_iter().enumerate() {
            let key = self.key_for_time((start_key_ms as f64 + offset as f64 * step_ms) / 1000.0);
            if self.frames.contains_key(&key) {
                self.touch(key);
                continue;
            }
            let frame = frame_from(&self.probe, rgba)?;
            self.insert(key, frame);
        }
        Ok(())
    }

    fn insert(&mut self, key: u64, frame: Arc<FrameRGBA>) {
        self.frames.insert(key, frame);
        self.touch(key);
        while self.lru.len() > self.capacity {
            if let Some(old) = self.lru.pop_front() {
                self.frames.remove(&old);
            }
        }
    }

    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.lru.iter().position(|x| *x == key) {
            self.lru.remove(pos);
        }
        self.lru.push_back(key);
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
        self.lru.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }
}

/// A video file exposed as a [`MediaSource`].
///
/// The transport is purely clock-driven; frames are decoded lazily at the current position and
/// cached. A decode failure during playback is logged and the last good frame is shown again.
#[derive(Debug)]
pub struct FfmpegSource {
    id: SourceId,
    info: SourceInfo,
    probe: Arc<VideoProbe>,
    decode: DecodeFn,
    transport: Mutex<Transport>,
    cache: Arc<Mutex<FrameCache>>,
    last_frame: Mutex<Option<Arc<FrameRGBA>>>,
    ready: Mutex<ReadyState>,
    released: Arc<AtomicBool>,
}

impl FfmpegSource {
    /// Probe `path`; the source starts at [`ReadyState::Metadata`].
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> SegueResult<Self> {
        let path = path.as_ref();
        let probe = probe_video(path)?;
        if !probe.duration_sec.is_finite() || probe.duration_sec <= 0.0 {
            return Err(SegueError::media(format!(
                "'{}' reports no usable duration",
                path.display()
            )));
        }
        Ok(Self::from_probe(
            Arc::new(probe),
            clock,
            decode_video_frames_rgba8,
        ))
    }

    pub(crate) fn from_probe(
        probe: Arc<VideoProbe>,
        clock: Arc<dyn Clock>,
        decode: DecodeFn,
    ) -> Self {
        let name = probe
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| probe.path.display().to_string());
        let info = SourceInfo {
            name,
            path: Some(probe.path.clone()),
            duration: probe.duration_sec,
            width: probe.width,
            height: probe.height,
            fps: probe.fps(),
        };
        Self {
            id: SourceId::next(),
            transport: Mutex::new(Transport::new(clock, probe.duration_sec)),
            cache: Arc::new(Mutex::new(FrameCache::new(probe.clone(), decode))),
            last_frame: Mutex::new(None),
            ready: Mutex::new(ReadyState::Metadata),
            released: Arc::new(AtomicBool::new(false)),
            decode,
            info,
            probe,
        }
    }

    pub fn probe(&self) -> &VideoProbe {
        &self.probe
    }

    fn transport(&self) -> std::sync::MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_ready(&self, state: ReadyState) {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl MediaSource for FfmpegSource {
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
        if self.ready_state() >= ReadyState::EnoughData {
            return Ok(());
        }
        // The worker outlives a timeout, so it never holds the cache lock while decoding.
        let probe = self.probe.clone();
        let decode = self.decode;
        let cache = self.cache.clone();
        let released = self.released.clone();
        let key = frame_key(&probe, self.current_time());
        let frame = run_with_timeout(&self.info.name, timeout, move || {
            let frame = decode_one(&probe, decode, key)?;
            if !released.load(Ordering::Acquire) {
                cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .store(key, frame.clone());
            }
            Ok::<_, SegueError>(frame)
        })??;
        if self.is_released() {
            return Err(SegueError::media(format!("{} was released", self.info.name)));
        }
        *self.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
        self.set_ready(ReadyState::EnoughData);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.transport().position()
    }

    fn seek(&self, t: f64) {
        self.transport().seek(t);
    }

    fn is_paused(&self) -> bool {
        self.transport().is_paused()
    }

    fn play(&self) -> SegueResult<()> {
        if self.is_released() {
            return Err(SegueError::media(format!("{} was released", self.info.name)));
        }
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
        let t = self.current_time();
        let decoded = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame_at(t);
        let mut last = self.last_frame.lock().unwrap_or_else(PoisonError::into_inner);
        match decoded {
            Ok(frame) => {
                *last = Some(frame.clone());
                Some(frame)
            }
            Err(e) => {
                warn!(source = %self.id, t, error = %e, "frame decode failed; reusing last frame");
                last.clone()
            }
        }
    }

    fn try_clone(&self) -> SegueResult<Arc<dyn MediaSource>> {
        if self.is_released() {
            return Err(SegueError::media(format!(
                "cannot clone released source {}",
                self.info.name
            )));
        }
        let clock = self.transport().clock().clone();
        let clone = FfmpegSource::from_probe(self.probe.clone(), clock, self.decode);
        // The clone decodes independently; seed it with our frame so it starts ready.
        let seed = self
            .last_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if seed.is_some() {
            *clone.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = seed;
            clone.set_ready(ReadyState::EnoughData);
        }
        Ok(Arc::new(clone))
    }

    fn release(&self) {
        self.transport().pause();
        self.released.store(true, Ordering::Release);
        // A decode in flight keeps the lock; its frames go away with the source instead.
        match self.cache.try_lock() {
            Ok(mut cache) => {
                debug!(source = %self.id, frames = cache.len(), "releasing decoded frames");
                cache.clear();
            }
            Err(TryLockError::Poisoned(p)) => p.into_inner().clear(),
            Err(TryLockError::WouldBlock) => {
                debug!(source = %self.id, "decode in flight; cache dropped with the source");
            }
        }
        *self.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
