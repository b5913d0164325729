//! Re-rendering a timeline into an encoded file.

pub mod ffmpeg;
pub mod pipeline;
pub mod preset;
pub mod sink;
pub mod window;

pub use ffmpeg::{FfmpegSink, is_ffmpeg_on_path};
pub use pipeline::{AbortHandle, ExportArtifact, ExportOptions, ExportPipeline, ExportReport};
pub use preset::{
    CODEC_PREFERENCE, CodecChoice, QualityPreset, artifact_file_name, ffmpeg_encoders,
    negotiate_codec,
};
pub use sink::{FrameSink, InMemorySink, SinkConfig};
pub use window::{ExportScope, ExportWindow, Focus, TRANSITION_PAD};
