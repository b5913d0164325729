#![forbid(unsafe_code)]
//! Video clip timelines with shader transitions.
//!
//! `segue` lays clips end to end, blends them at their boundaries with one of 27 transition
//! effects, plays the result back in real time and re-renders it into an encoded file.
//!
//! - [`timeline`] holds the clip/transition model and the pure resolver that maps a global
//!   time to what is visible.
//! - [`effects`] is the effect catalog, its WGSL programs and matching CPU kernels.
//! - [`render`] composites two source frames through a CPU or (feature `gpu`) wgpu backend.
//! - [`media`] defines the [`MediaSource`] abstraction, an ffmpeg-backed source and ingestion.
//! - [`playback`] drives sources and the compositor from a clock.
//! - [`export`] re-renders a timeline into a frame sink, normally `ffmpeg`.

pub mod effects;
pub mod export;
pub mod foundation;
pub mod logging;
pub mod media;
pub mod playback;
pub mod project;
pub mod render;
pub mod timeline;

pub use effects::{EffectCategory, EffectId, shader_source, shader_source_for_id};
pub use export::{
    AbortHandle, ExportOptions, ExportPipeline, ExportReport, ExportScope, FrameSink,
    InMemorySink, QualityPreset,
};
pub use foundation::{
    core::{FrameRGBA, Resolution},
    error::{SegueError, SegueResult},
};
pub use media::{
    Clock, IngestOptions, ManualClock, MediaSource, SyntheticSource, SystemClock, add_clip,
    add_clips, system_clock,
};
pub use playback::{DriverState, PlaybackDriver, SourcePool, SyncTuning, TickOutcome};
pub use project::ProjectFile;
pub use render::{BackendKind, Compositor, CompositorBackend, CompositorOptions};
pub use timeline::{
    Clip, ClipId, ClipRef, LiveSide, PlaybackState, Timeline, Transition, TransitionAnchor,
    TransitionState, resolve,
};
