use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    effects::EffectId,
    foundation::{
        core::Resolution,
        error::{SegueError, SegueResult},
    },
    media::source::MediaSource,
};

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique clip identifier.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ClipId(pub u64);

impl ClipId {
    fn next() -> Self {
        Self(NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip-{}", self.0)
    }
}

/// One source video segment on the timeline.
///
/// Duration and dimensions are captured from the source when the clip is created and never
/// change afterwards.
#[derive(Clone, Debug)]
pub struct Clip {
    id: ClipId,
    name: String,
    duration: f64,
    resolution: Resolution,
    source: Arc<dyn MediaSource>,
}

impl Clip {
    pub fn new(name: impl Into<String>, source: Arc<dyn MediaSource>) -> SegueResult<Self> {
        let info = source.info();
        let name = name.into();
        if !info.duration.is_finite() || info.duration <= 0.0 {
            return Err(SegueError::validation(format!(
                "clip '{name}' has invalid duration {}",
                info.duration
            )));
        }
        let resolution = Resolution::new(info.width, info.height)
            .map_err(|e| SegueError::validation(format!("clip '{name}': {e}")))?;
        Ok(Self {
            id: ClipId::next(),
            name,
            duration: info.duration,
            resolution,
            source,
        })
    }

    /// Same clip identity and timing, different source (export clones).
    pub fn with_source(&self, source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn source(&self) -> &Arc<dyn MediaSource> {
        &self.source
    }
}

/// Where a transition sits on the timeline.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAnchor {
    /// Fade-in over the beginning of the first clip.
    Start,
    /// Fade-out over the end of the last clip.
    End,
    /// Boundary between clip `i` and clip `i + 1`.
    Between(usize),
}

impl fmt::Display for TransitionAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionAnchor::Start => f.write_str("start"),
            TransitionAnchor::End => f.write_str("end"),
            TransitionAnchor::Between(i) => write!(f, "between:{i}"),
        }
    }
}

impl FromStr for TransitionAnchor {
    type Err = SegueError;

    /// Accepts `start`, `end`, `between:<i>` and `pair-<i>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "start" => return Ok(TransitionAnchor::Start),
            "end" => return Ok(TransitionAnchor::End),
            _ => {}
        }
        let idx = s
            .strip_prefix("between:")
            .or_else(|| s.strip_prefix("pair-"))
            .ok_or_else(|| SegueError::validation(format!("unknown transition anchor '{s}'")))?;
        idx.parse::<usize>()
            .map(TransitionAnchor::Between)
            .map_err(|_| SegueError::validation(format!("invalid pair index in anchor '{s}'")))
    }
}

/// A blend directive at one anchor.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transition {
    pub effect: EffectId,
    /// Requested duration in seconds; the resolver clamps it to the clips it touches.
    pub duration: f64,
    pub anchor: TransitionAnchor,
}

impl Transition {
    pub fn new(effect: EffectId, duration: f64, anchor: TransitionAnchor) -> SegueResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(SegueError::validation(format!(
                "transition duration must be finite and > 0, got {duration}"
            )));
        }
        Ok(Self {
            effect,
            duration,
            anchor,
        })
    }
}

/// A clip as seen at one instant: its position in the timeline and its local time.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClipRef {
    pub index: usize,
    pub id: ClipId,
    pub local_time: f64,
}

/// Which side of a transition is actively playing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveSide {
    A,
    B,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransitionState {
    pub transition: Transition,
    /// Duration actually used, after clamping to the touched clips.
    pub effective_duration: f64,
    pub clip_a: Option<ClipRef>,
    pub clip_b: Option<ClipRef>,
    pub progress: f64,
    pub live: LiveSide,
}

/// What is visible at one global time.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PlaybackState {
    Empty,
    Clip(ClipRef),
    Transition(TransitionState),
}

impl PlaybackState {
    pub fn progress(&self) -> Option<f64> {
        match self {
            PlaybackState::Transition(t) => Some(t.progress),
            _ => None,
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, PlaybackState::Transition(_))
    }

    /// Clips referenced by this state, A side first.
    pub fn clip_refs(&self) -> Vec<ClipRef> {
        match self {
            PlaybackState::Empty => Vec::new(),
            PlaybackState::Clip(c) => vec![*c],
            PlaybackState::Transition(t) => t.clip_a.into_iter().chain(t.clip_b).collect(),
        }
    }
}
