pub mod clock;
pub mod ffmpeg;
pub mod ingest;
pub mod source;
pub mod synthetic;

pub use clock::{Clock, ManualClock, SystemClock, system_clock};
pub use ffmpeg::{FfmpegSource, VideoProbe, probe_video};
pub use ingest::{IngestOptions, add_clip, add_clips, ingest_source};
pub use source::{MediaSource, ReadyState, SourceId, SourceInfo};
pub use synthetic::SyntheticSource;
