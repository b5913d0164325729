use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, warn};
use wgpu::util::DeviceExt as _;

use crate::{
    effects::{EffectId, shader_source, shaders},
    foundation::{
        core::{FrameRGBA, Resolution},
        error::{SegueError, SegueResult},
    },
    render::backend::{CompositorBackend, DrawOutcome, Slot},
};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Full-viewport quad as a triangle strip: `(x, y, u, v)` per vertex.
const QUAD: [[f32; 4]; 4] = [
    [-1.0, -1.0, 0.0, 1.0],
    [1.0, -1.0, 1.0, 1.0],
    [-1.0, 1.0, 0.0, 0.0],
    [1.0, 1.0, 1.0, 0.0],
];

struct SlotTexture {
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct Gpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    readback_bytes_per_row: u32,
    quad: wgpu::Buffer,
    uniforms: wgpu::Buffer,
    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    slots: [SlotTexture; 2],
}

/// wgpu compositor. One render pipeline per effect, compiled on first use.
pub struct GpuBackend {
    resolution: Resolution,
    gpu: Option<Gpu>,
    init: fn(Resolution) -> SegueResult<Gpu>,
    disposed: bool,
    pipelines: HashMap<EffectId, wgpu::RenderPipeline>,
    broken: HashMap<EffectId, String>,
}

impl GpuBackend {
    pub fn new(resolution: Resolution) -> SegueResult<Self> {
        let gpu = Gpu::init(resolution)?;
        Ok(Self {
            resolution,
            gpu: Some(gpu),
            init: Gpu::init,
            disposed: false,
            pipelines: HashMap::new(),
            broken: HashMap::new(),
        })
    }

    /// Effects whose programs failed validation, with the reported error.
    pub fn broken_effects(&self) -> impl Iterator<Item = (&EffectId, &String)> {
        self.broken.iter()
    }

    fn gpu(&self) -> SegueResult<&Gpu> {
        self.gpu
            .as_ref()
            .ok_or_else(|| SegueError::render("gpu backend not initialized"))
    }

    fn ensure_pipeline(&mut self, effect: EffectId) -> SegueResult<bool> {
        if self.broken.contains_key(&effect) {
            return Ok(false);
        }
        if self.pipelines.contains_key(&effect) {
            return Ok(true);
        }
        let gpu = self.gpu()?;
        match gpu.build_pipeline(effect) {
            Ok(pipeline) => {
                debug!(%effect, "gpu pipeline compiled");
                self.pipelines.insert(effect, pipeline);
                Ok(true)
            }
            Err(msg) => {
                warn!(%effect, error = %msg, "effect program failed to compile");
                self.broken.insert(effect, msg);
                Ok(false)
            }
        }
    }
}

impl Gpu {
    fn init(resolution: Resolution) -> SegueResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                SegueError::render("no gpu adapter available")
            }
            other => SegueError::render(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("segue_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| SegueError::render(format!("wgpu request_device failed: {e:?}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        {
            let lost = lost.clone();
            device.set_device_lost_callback(move |reason, msg| {
                warn!(?reason, %msg, "gpu device lost");
                lost.store(true, Ordering::Release);
            });
        }

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("segue_target"),
            size: wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let bytes_per_row_unpadded = resolution
            .width
            .checked_mul(4)
            .ok_or_else(|| SegueError::render("render target width overflow"))?;
        let readback_bytes_per_row =
            align_to(bytes_per_row_unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer_size = u64::from(readback_bytes_per_row)
            .checked_mul(u64::from(resolution.height))
            .ok_or_else(|| SegueError::render("readback buffer size overflow"))?;
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("segue_readback"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let quad_bytes: Vec<u8> = QUAD
            .iter()
            .flatten()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("segue_quad"),
            contents: &quad_bytes,
            usage: wgpu::BufferUsages::VERTEX,
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("segue_uniforms"),
            size: shaders::UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("segue_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("segue_bgl"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(shaders::UNIFORM_SIZE),
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("segue_pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let slots = [
            clear_texture(&device, &queue, "segue_slot_a"),
            clear_texture(&device, &queue, "segue_slot_b"),
        ];

        Ok(Self {
            device,
            queue,
            lost,
            target,
            target_view,
            readback,
            readback_bytes_per_row,
            quad,
            uniforms,
            sampler,
            bind_group_layout,
            pipeline_layout,
            slots,
        })
    }

    /// Compile `effect` inside a validation error scope; errors come back as text.
    fn build_pipeline(&self, effect: EffectId) -> Result<wgpu::RenderPipeline, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(effect.id()),
                source: wgpu::ShaderSource::Wgsl(shader_source(effect).into()),
            });
        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: 16,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: 0,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 8,
                    shader_location: 1,
                },
            ],
        };
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(effect.id()),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(shaders::VERTEX_ENTRY),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[vertex_layout],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(shaders::FRAGMENT_ENTRY),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(pipeline),
        }
    }

    fn upload(&mut self, slot: Slot, frame: Option<&FrameRGBA>) {
        let Some(frame) = frame else {
            self.slots[slot.index()] = clear_texture(&self.device, &self.queue, "segue_slot");
            return;
        };
        let current = &self.slots[slot.index()];
        if current.width != frame.width || current.height != frame.height {
            self.slots[slot.index()] =
                new_slot_texture(&self.device, frame.width, frame.height, "segue_slot");
        }
        write_slot(&self.queue, &self.slots[slot.index()], &frame.data);
    }

    fn draw(&self, pipeline: &wgpu::RenderPipeline, progress: f32, resolution: Resolution) {
        let mut params = [0u8; 16];
        params[0..4].copy_from_slice(&progress.to_le_bytes());
        params[8..12].copy_from_slice(&(resolution.width as f32).to_le_bytes());
        params[12..16].copy_from_slice(&(resolution.height as f32).to_le_bytes());
        self.queue.write_buffer(&self.uniforms, 0, &params);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("segue_bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.slots[0].view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.slots[1].view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.uniforms.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("segue_draw_encoder"),
            });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("segue_draw_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(pipeline);
            rp.set_bind_group(0, &bind_group, &[]);
            rp.set_vertex_buffer(0, self.quad.slice(..));
            rp.draw(0..4, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn read_frame(&self, resolution: Resolution) -> SegueResult<FrameRGBA> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("segue_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.readback_bytes_per_row),
                    rows_per_image: Some(resolution.height),
                },
            },
            wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| SegueError::render(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| SegueError::render("readback channel closed"))?
            .map_err(|e| SegueError::render(format!("readback map failed: {e:?}")))?;

        let mapped = buffer_slice.get_mapped_range();
        let row_bytes = resolution.width as usize * 4;
        let padded_row_bytes = self.readback_bytes_per_row as usize;
        let mut out = Vec::with_capacity(row_bytes * resolution.height as usize);
        for row in 0..resolution.height as usize {
            let start = row * padded_row_bytes;
            out.extend_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        self.readback.unmap();

        Ok(FrameRGBA {
            width: resolution.width,
            height: resolution.height,
            data: out,
            premultiplied: true,
        })
    }
}

fn new_slot_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> SlotTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    SlotTexture {
        width,
        height,
        texture,
        view,
    }
}

fn write_slot(queue: &wgpu::Queue, slot: &SlotTexture, data: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &slot.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(slot.width * 4),
            rows_per_image: Some(slot.height),
        },
        wgpu::Extent3d {
            width: slot.width,
            height: slot.height,
            depth_or_array_layers: 1,
        },
    );
}

/// 1x1 transparent texture standing in for an empty slot.
fn clear_texture(device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> SlotTexture {
    let slot = new_slot_texture(device, 1, 1, label);
    write_slot(queue, &slot, &[0, 0, 0, 0]);
    slot
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

impl CompositorBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn upload(&mut self, slot: Slot, frame: Option<Arc<FrameRGBA>>) -> SegueResult<()> {
        let gpu = self
            .gpu
            .as_mut()
            .ok_or_else(|| SegueError::render("gpu backend not initialized"))?;
        gpu.upload(slot, frame.as_deref());
        Ok(())
    }

    fn draw(&mut self, effect: EffectId, progress: f32) -> SegueResult<DrawOutcome> {
        if !self.ensure_pipeline(effect)? {
            return Ok(DrawOutcome::Skipped);
        }
        let gpu = self.gpu()?;
        let pipeline = self
            .pipelines
            .get(&effect)
            .ok_or_else(|| SegueError::render(format!("pipeline for {effect} missing")))?;
        gpu.draw(pipeline, progress, self.resolution);
        Ok(DrawOutcome::Drawn)
    }

    fn read_frame(&mut self) -> SegueResult<FrameRGBA> {
        self.gpu()?.read_frame(self.resolution)
    }

    /// A backend left without a device by a failed restore stays lost until one succeeds.
    fn is_context_lost(&self) -> bool {
        match &self.gpu {
            Some(g) => g.lost.load(Ordering::Acquire),
            None => !self.disposed,
        }
    }

    fn restore(&mut self) -> SegueResult<()> {
        if self.disposed {
            return Err(SegueError::render("gpu backend was disposed"));
        }
        let fresh = (self.init)(self.resolution);
        self.pipelines.clear();
        self.broken.clear();
        match fresh {
            Ok(gpu) => {
                self.gpu = Some(gpu);
                debug!("gpu context restored");
                Ok(())
            }
            Err(e) => {
                self.gpu = None;
                Err(e)
            }
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.pipelines.clear();
        self.broken.clear();
        if let Some(gpu) = self.gpu.take() {
            gpu.device.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_rounds_up_to_copy_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
    }

    fn no_adapter(_: Resolution) -> SegueResult<Gpu> {
        Err(SegueError::render("no adapter"))
    }

    fn deviceless(init: fn(Resolution) -> SegueResult<Gpu>) -> GpuBackend {
        GpuBackend {
            resolution: Resolution {
                width: 4,
                height: 4,
            },
            gpu: None,
            init,
            disposed: false,
            pipelines: HashMap::new(),
            broken: HashMap::new(),
        }
    }

    #[test]
    fn failed_restore_stays_lost_so_it_is_retried() {
        let mut be = deviceless(no_adapter);
        assert!(be.is_context_lost());
        assert!(be.restore().is_err());
        assert!(be.is_context_lost());
        assert!(be.restore().is_err());
        assert!(be.is_context_lost());

        be.dispose();
        assert!(!be.is_context_lost());
        assert!(be.restore().is_err());
    }

    #[test]
    fn restore_after_a_failed_attempt_recovers_when_an_adapter_exists() {
        let mut be = deviceless(no_adapter);
        assert!(be.restore().is_err());
        be.init = Gpu::init;
        if be.restore().is_err() {
            eprintln!("skipping: no gpu adapter");
            return;
        }
        assert!(!be.is_context_lost());
        assert_eq!(be.draw(EffectId::Fade, 0.5).unwrap(), DrawOutcome::Drawn);
    }

    #[test]
    fn every_effect_compiles_when_an_adapter_exists() {
        let res = Resolution {
            width: 4,
            height: 4,
        };
        let Ok(mut be) = GpuBackend::new(res) else {
            eprintln!("skipping: no gpu adapter");
            return;
        };
        for effect in EffectId::ALL {
            assert_eq!(be.draw(effect, 0.5).unwrap(), DrawOutcome::Drawn, "{effect}");
        }
        let frame = be.read_frame().unwrap();
        assert_eq!(frame.data.len(), res.byte_len());
    }
}
