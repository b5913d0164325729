//! Compositing: effect programs applied to two source frames.

pub mod backend;
pub mod compositor;
pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;

pub use backend::{BackendKind, CompositorBackend, DrawOutcome, Slot, create_backend};
pub use compositor::{Compositor, CompositorOptions};
pub use cpu::CpuBackend;
#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;
