use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    effects::{
        EffectId,
        cpu::{Kernel, composite_into, kernel_for},
    },
    foundation::{
        core::{FrameRGBA, Resolution},
        error::{SegueError, SegueResult},
    },
    render::backend::{CompositorBackend, DrawOutcome, Slot},
};

/// Software compositor: runs the effect kernels over the output with rayon.
///
/// Slot textures are shared `Arc` frames, so an upload never copies pixels.
pub struct CpuBackend {
    resolution: Resolution,
    slots: [Option<Arc<FrameRGBA>>; 2],
    kernels: HashMap<EffectId, Kernel>,
    output: Vec<u8>,
    disposed: bool,
}

impl CpuBackend {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            slots: [None, None],
            kernels: HashMap::new(),
            output: vec![0u8; resolution.byte_len()],
            disposed: false,
        }
    }

    fn kernel(&mut self, effect: EffectId) -> Kernel {
        *self.kernels.entry(effect).or_insert_with(|| {
            debug!(%effect, "cpu kernel prepared");
            kernel_for(effect)
        })
    }
}

impl CompositorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn upload(&mut self, slot: Slot, frame: Option<Arc<FrameRGBA>>) -> SegueResult<()> {
        if self.disposed {
            return Err(SegueError::render("cpu backend was disposed"));
        }
        self.slots[slot.index()] = frame;
        Ok(())
    }

    fn draw(&mut self, effect: EffectId, progress: f32) -> SegueResult<DrawOutcome> {
        if self.disposed {
            return Err(SegueError::render("cpu backend was disposed"));
        }
        let kernel = self.kernel(effect);
        let [a, b] = &self.slots;
        composite_into(
            &mut self.output,
            self.resolution,
            kernel,
            a.as_deref(),
            b.as_deref(),
            progress,
        );
        Ok(DrawOutcome::Drawn)
    }

    fn read_frame(&mut self) -> SegueResult<FrameRGBA> {
        if self.disposed {
            return Err(SegueError::render("cpu backend was disposed"));
        }
        Ok(FrameRGBA {
            width: self.resolution.width,
            height: self.resolution.height,
            data: self.output.clone(),
            premultiplied: true,
        })
    }

    fn dispose(&mut self) {
        self.slots = [None, None];
        self.kernels.clear();
        self.output = Vec::new();
        self.disposed = true;
    }
}
