use std::{fmt, str::FromStr, sync::Arc};

use tracing::info;

use crate::{
    effects::EffectId,
    foundation::{
        core::{FrameRGBA, Resolution},
        error::{SegueError, SegueResult},
    },
};

/// One of the two texture inputs every effect samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub(crate) fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn,
    /// The effect's program is known to be broken; nothing was drawn.
    Skipped,
}

/// A device that can run the effect programs.
///
/// Backends own the two input textures and one output target at a fixed resolution.
/// Program compilation is lazy and per effect.
pub trait CompositorBackend: Send {
    fn name(&self) -> &'static str;

    fn resolution(&self) -> Resolution;

    /// Replace a slot's texture; `None` clears it to transparent.
    fn upload(&mut self, slot: Slot, frame: Option<Arc<FrameRGBA>>) -> SegueResult<()>;

    fn draw(&mut self, effect: EffectId, progress: f32) -> SegueResult<DrawOutcome>;

    /// Copy the output target back to memory (premultiplied RGBA8).
    fn read_frame(&mut self) -> SegueResult<FrameRGBA>;

    fn is_context_lost(&self) -> bool {
        false
    }

    /// Recreate the device after a loss; textures and programs start over.
    fn restore(&mut self) -> SegueResult<()> {
        Ok(())
    }

    fn dispose(&mut self);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// GPU when an adapter is available, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Auto => "auto",
            BackendKind::Cpu => "cpu",
            BackendKind::Gpu => "gpu",
        })
    }
}

impl FromStr for BackendKind {
    type Err = SegueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "cpu" => Ok(BackendKind::Cpu),
            "gpu" => Ok(BackendKind::Gpu),
            other => Err(SegueError::validation(format!(
                "unknown backend '{other}' (expected auto, cpu or gpu)"
            ))),
        }
    }
}

pub fn create_backend(
    kind: BackendKind,
    resolution: Resolution,
) -> SegueResult<Box<dyn CompositorBackend>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(crate::render::cpu::CpuBackend::new(resolution))),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(crate::render::gpu::GpuBackend::new(resolution)?)),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => Err(SegueError::render(
            "gpu backend requested but segue was built without the 'gpu' feature",
        )),
        BackendKind::Auto => {
            #[cfg(feature = "gpu")]
            match crate::render::gpu::GpuBackend::new(resolution) {
                Ok(gpu) => return Ok(Box::new(gpu)),
                Err(e) => info!(error = %e, "no usable gpu; falling back to cpu compositor"),
            }
            #[cfg(not(feature = "gpu"))]
            info!("built without gpu support; using cpu compositor");
            Ok(Box::new(crate::render::cpu::CpuBackend::new(resolution)))
        }
    }
}
