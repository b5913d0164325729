use crate::foundation::{
    core::FrameRGBA,
    error::{SegueError, SegueResult},
};

/// Stream parameters handed to a [`FrameSink`] before the first frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

/// Consumer of paced output frames.
///
/// `push_frame` is called with strictly increasing indices, one per due frame slot.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> SegueResult<()>;
    fn push_frame(&mut self, idx: u64, frame: &FrameRGBA) -> SegueResult<()>;
    /// Flush and close the stream. Blocks until the output is complete.
    fn end(&mut self) -> SegueResult<()>;
}

/// Sink that keeps every frame, for tests and previews.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(u64, FrameRGBA)>,
    ended: bool,
    fail_at: Option<u64>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose `push_frame` fails at index `idx`.
    pub fn failing_at(idx: u64) -> Self {
        Self {
            fail_at: Some(idx),
            ..Self::default()
        }
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[(u64, FrameRGBA)] {
        &self.frames
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> SegueResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &FrameRGBA) -> SegueResult<()> {
        if self.fail_at == Some(idx) {
            return Err(SegueError::export(format!("sink rejected frame {idx}")));
        }
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> SegueResult<()> {
        self.ended = true;
        Ok(())
    }
}
