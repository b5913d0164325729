use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::{
    effects::EffectId,
    foundation::{
        core::{FrameRGBA, Resolution},
        error::SegueResult,
    },
    media::source::{MediaSource, SourceId},
    render::backend::{BackendKind, CompositorBackend, DrawOutcome, Slot, create_backend},
    timeline::{Clip, ClipRef, PlaybackState},
};

#[derive(Clone, Copy, Debug)]
pub struct CompositorOptions {
    pub backend: BackendKind,
    pub resolution: Resolution,
}

/// Draws one output frame per call from up to two sources.
///
/// Failures never reach the caller: they are logged and the previous output stays visible.
pub struct Compositor {
    backend: Option<Box<dyn CompositorBackend>>,
    resolution: Resolution,
    bound: [Option<SourceId>; 2],
    last_frame: Option<FrameRGBA>,
    dirty: bool,
    warned_broken: HashSet<EffectId>,
    draws: u64,
}

impl Compositor {
    pub fn new(opts: CompositorOptions) -> SegueResult<Self> {
        let backend = create_backend(opts.backend, opts.resolution)?;
        Ok(Self::with_backend(backend))
    }

    pub fn with_backend(backend: Box<dyn CompositorBackend>) -> Self {
        info!(
            backend = backend.name(),
            resolution = %backend.resolution(),
            "compositor ready"
        );
        Self {
            resolution: backend.resolution(),
            backend: Some(backend),
            bound: [None, None],
            last_frame: None,
            dirty: false,
            warned_broken: HashSet::new(),
            draws: 0,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    pub fn is_disposed(&self) -> bool {
        self.backend.is_none()
    }

    /// Successful draws since construction.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    pub fn render_single(&mut self, source: &dyn MediaSource) {
        self.render(Some(source), None, 0.0, EffectId::Fade);
    }

    pub fn render(
        &mut self,
        a: Option<&dyn MediaSource>,
        b: Option<&dyn MediaSource>,
        progress: f64,
        effect: EffectId,
    ) {
        let Some(backend) = self.backend.as_mut() else {
            warn!("render called on a disposed compositor");
            return;
        };

        if backend.is_context_lost() {
            warn!(backend = backend.name(), "render context lost; restoring");
            if let Err(e) = backend.restore() {
                warn!(error = %e, "render context restore failed; frame skipped");
                return;
            }
            self.bound = [None, None];
        }

        for (slot, source) in [(Slot::A, a), (Slot::B, b)] {
            if let Err(e) = bind(&mut **backend, &mut self.bound, slot, source) {
                warn!(?slot, error = %e, "texture upload failed; frame skipped");
                return;
            }
        }

        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
        match backend.draw(effect, progress) {
            Ok(DrawOutcome::Drawn) => {
                self.dirty = true;
                self.draws += 1;
            }
            Ok(DrawOutcome::Skipped) => {
                if self.warned_broken.insert(effect) {
                    warn!(%effect, "effect program is broken; draws for it are skipped");
                } else {
                    debug!(%effect, "skipped draw for broken effect");
                }
            }
            Err(e) => warn!(%effect, error = %e, "draw failed"),
        }
    }

    /// Draw whatever `state` shows, looking its clips up in `clips`.
    pub fn render_state(&mut self, state: &PlaybackState, clips: &[Clip]) {
        let source = |r: &ClipRef| {
            clips
                .get(r.index)
                .filter(|c| c.id() == r.id)
                .map(|c| &**c.source())
        };
        match state {
            PlaybackState::Empty => self.render(None, None, 0.0, EffectId::Fade),
            PlaybackState::Clip(c) => self.render(source(c), None, 0.0, EffectId::Fade),
            PlaybackState::Transition(t) => self.render(
                t.clip_a.as_ref().and_then(source),
                t.clip_b.as_ref().and_then(source),
                t.progress,
                t.transition.effect,
            ),
        }
    }

    /// The most recent composited frame, read back lazily.
    pub fn last_frame(&mut self) -> Option<&FrameRGBA> {
        if self.dirty
            && let Some(backend) = self.backend.as_mut()
        {
            match backend.read_frame() {
                Ok(frame) => self.last_frame = Some(frame),
                Err(e) => warn!(error = %e, "frame readback failed"),
            }
            self.dirty = false;
        }
        self.last_frame.as_ref()
    }

    pub fn dispose(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.dispose();
            info!(backend = backend.name(), draws = self.draws, "compositor disposed");
        }
        self.bound = [None, None];
        self.last_frame = None;
        self.dirty = false;
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Upload `source`'s current frame into `slot`.
///
/// A source with no decodable frame keeps the slot's previous texture when it is the source
/// already bound there; switching to a not-ready source clears the slot.
fn bind(
    backend: &mut dyn CompositorBackend,
    bound: &mut [Option<SourceId>; 2],
    slot: Slot,
    source: Option<&dyn MediaSource>,
) -> SegueResult<()> {
    let i = slot.index();
    match source {
        None => {
            backend.upload(slot, None)?;
            bound[i] = None;
        }
        Some(src) => match src.current_frame() {
            Some(frame) => {
                backend.upload(slot, Some(frame))?;
                bound[i] = Some(src.id());
            }
            None if bound[i] == Some(src.id()) => {}
            None => {
                backend.upload(slot, None)?;
                bound[i] = None;
            }
        },
    }
    Ok(())
}
