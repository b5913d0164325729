pub mod catalog;
pub mod cpu;
pub mod shaders;

pub use catalog::{EffectCategory, EffectId};
pub use shaders::{shader_source, shader_source_for_id};
