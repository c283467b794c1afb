//! Frame orchestration on the GPU.
//!
//! Each frame runs, in order:
//! 1. CPU particle step, then upload of the active particles
//! 2. Fractal compute pass into a storage texture
//! 3. Background pass (feedback, noise distortion, waves, fractal)
//! 4. Additive particle pass on top
//! 5. Copy of the frame into the feedback texture
//! 6. Optional blit to a caller-supplied target view

use std::sync::Arc;

use super::uniforms::FrameUniforms;
use super::{FrameError, GpuContext, GpuError, check_limits};
use crate::compute::noise::NoiseField;
use crate::compute::particles::{Particle, ParticleSimulator, SimulatorSettings};
use crate::compute::snapshot::{ArtSnapshot, ArtSummary};
use crate::schema::EngineConfig;

const FRACTAL_SHADER: &str = include_str!("shaders/fractal.wgsl");
const BACKGROUND_SHADER: &str = include_str!("shaders/background.wgsl");
const PARTICLE_SHADER: &str = include_str!("shaders/particles.wgsl");
const PRESENT_SHADER: &str = include_str!("shaders/present.wgsl");

/// Format of the internal frame, feedback and fractal textures.
const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const NOISE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
const WORKGROUP_SIZE: u32 = 16;

const PARTICLE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: std::mem::offset_of!(Particle, position) as u64,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: std::mem::offset_of!(Particle, color) as u64,
        shader_location: 1,
    },
    // size and life are adjacent and read as one vec2
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: std::mem::offset_of!(Particle, size) as u64,
        shader_location: 2,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Uint32,
        offset: std::mem::offset_of!(Particle, archetype) as u64,
        shader_location: 3,
    },
];

const ADDITIVE_BLENDING: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// What a frame did, for host-side pacing and logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub delta_time: f32,
    pub elapsed: f32,
    pub active_particles: usize,
}

/// Viewport-sized textures plus the bind groups that reference them.
struct FrameTargets {
    frame_texture: wgpu::Texture,
    frame_view: wgpu::TextureView,
    feedback_texture: wgpu::Texture,
    fractal_bind_group: wgpu::BindGroup,
    background_bind_group: wgpu::BindGroup,
    present_bind_group: wgpu::BindGroup,
}

/// Owns every GPU resource and the CPU-side particle pool.
pub struct RenderPipeline {
    context: GpuContext,
    config: EngineConfig,
    present_format: wgpu::TextureFormat,

    simulator: ParticleSimulator,
    noise: NoiseField,
    snapshot: Arc<ArtSnapshot>,
    elapsed: f32,
    frame_index: u64,

    // Pipelines
    fractal_pipeline: wgpu::ComputePipeline,
    background_pipeline: wgpu::RenderPipeline,
    particle_pipeline: wgpu::RenderPipeline,
    present_pipeline: wgpu::RenderPipeline,

    // Bind group layouts, kept for rebuilding targets on resize
    fractal_layout: wgpu::BindGroupLayout,
    background_layout: wgpu::BindGroupLayout,
    present_layout: wgpu::BindGroupLayout,

    // Resources
    uniform_buffer: wgpu::Buffer,
    particle_buffer: wgpu::Buffer,
    particle_bind_group: wgpu::BindGroup,
    noise_texture: wgpu::Texture,
    noise_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    targets: FrameTargets,
}

impl RenderPipeline {
    /// Create a headless pipeline on a freshly acquired device.
    pub async fn new(config: EngineConfig, snapshot: Arc<ArtSnapshot>) -> Result<Self, GpuError> {
        config.validate()?;
        let context = GpuContext::headless().await?;
        Self::with_context(context, config, snapshot, FRAME_FORMAT)
    }

    /// Create a pipeline on an existing device. `present_format` is the format
    /// of the views later passed to [`render_frame`](Self::render_frame).
    pub fn with_context(
        context: GpuContext,
        config: EngineConfig,
        snapshot: Arc<ArtSnapshot>,
        present_format: wgpu::TextureFormat,
    ) -> Result<Self, GpuError> {
        config.validate()?;
        check_limits(&config, &context.device.limits())?;
        let device = &context.device;

        // 1. Shader modules
        let fractal_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fractal Shader"),
            source: wgpu::ShaderSource::Wgsl(FRACTAL_SHADER.into()),
        });
        let background_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Background Shader"),
            source: wgpu::ShaderSource::Wgsl(BACKGROUND_SHADER.into()),
        });
        let particle_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(PARTICLE_SHADER.into()),
        });
        let present_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Present Shader"),
            source: wgpu::ShaderSource::Wgsl(PRESENT_SHADER.into()),
        });

        // 2. Buffers
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let particle_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Instances"),
            size: (config.particle_capacity * std::mem::size_of::<Particle>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // 3. Noise texture, filled once here and again on regenerate
        let noise = NoiseField::generate(
            config.noise_resolution,
            config.noise_octaves,
            config.noise_seed,
        );
        let noise_texture = create_noise_texture(device, config.noise_resolution as u32);
        write_noise(&context.queue, &noise_texture, &noise);
        let noise_view = noise_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // 4. Bind group layouts
        let fractal_layout = create_fractal_bind_group_layout(device);
        let background_layout = create_background_bind_group_layout(device);
        let particle_layout = create_uniform_bind_group_layout(device);
        let present_layout = create_present_bind_group_layout(device);

        // 5. Pipelines
        let fractal_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Fractal Pipeline Layout"),
                bind_group_layouts: &[&fractal_layout],
                ..Default::default()
            });
        let fractal_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Fractal Pipeline"),
            layout: Some(&fractal_pipeline_layout),
            module: &fractal_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let background_pipeline = create_render_pipeline(
            device,
            "Background",
            &background_layout,
            &background_shader,
            &[],
            wgpu::PrimitiveTopology::TriangleList,
            FRAME_FORMAT,
            None,
        );
        let particle_pipeline = create_render_pipeline(
            device,
            "Particle",
            &particle_layout,
            &particle_shader,
            &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Particle>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &PARTICLE_ATTRIBUTES,
            }],
            wgpu::PrimitiveTopology::TriangleStrip,
            FRAME_FORMAT,
            Some(ADDITIVE_BLENDING),
        );
        let present_pipeline = create_render_pipeline(
            device,
            "Present",
            &present_layout,
            &present_shader,
            &[],
            wgpu::PrimitiveTopology::TriangleList,
            present_format,
            None,
        );

        // 6. Bind groups
        let particle_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Bind Group"),
            layout: &particle_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let targets = FrameTargets::new(
            device,
            (config.width, config.height),
            &uniform_buffer,
            &noise_view,
            &sampler,
            [&fractal_layout, &background_layout, &present_layout],
        );

        // 7. Particle pool, seeded from the initial snapshot
        let mut simulator = ParticleSimulator::new(SimulatorSettings::from(&config));
        simulator.reseed(
            &snapshot.simulation,
            &snapshot.shading,
            &snapshot.dna.sequence,
        );

        log::info!(
            "Render pipeline ready: {}x{}, capacity {}, noise {}^2",
            config.width,
            config.height,
            config.particle_capacity,
            config.noise_resolution
        );

        let errors = context.take_errors();
        if !errors.is_empty() {
            return Err(GpuError::Validation(errors.join("; ")));
        }

        Ok(Self {
            context,
            config,
            present_format,
            simulator,
            noise,
            snapshot,
            elapsed: 0.0,
            frame_index: 0,
            fractal_pipeline,
            background_pipeline,
            particle_pipeline,
            present_pipeline,
            fractal_layout,
            background_layout,
            present_layout,
            uniform_buffer,
            particle_buffer,
            particle_bind_group,
            noise_texture,
            noise_view,
            sampler,
            targets,
        })
    }

    /// Swap in a new snapshot and reseed the particle pool from it.
    pub fn apply_snapshot(&mut self, snapshot: Arc<ArtSnapshot>) {
        if snapshot.generation < self.snapshot.generation {
            log::debug!(
                "Ignoring snapshot generation {} older than current {}",
                snapshot.generation,
                self.snapshot.generation
            );
            return;
        }
        self.simulator.reseed(
            &snapshot.simulation,
            &snapshot.shading,
            &snapshot.dna.sequence,
        );
        log::info!(
            "Applied snapshot generation {} ({} particles)",
            snapshot.generation,
            self.simulator.active_count()
        );
        self.snapshot = snapshot;
    }

    /// Advance the simulation and draw one frame.
    ///
    /// `measured_dt` is used unless the config fixes the time step. When
    /// `target` is given the finished frame is also drawn onto it; its format
    /// must match the pipeline's present format.
    ///
    /// A device error during the frame is returned after the frame is counted,
    /// so the caller can log it and carry on with the next one.
    pub fn render_frame(
        &mut self,
        measured_dt: f32,
        target: Option<&wgpu::TextureView>,
    ) -> Result<FrameStats, FrameError> {
        let dt = self.config.fixed_dt.unwrap_or(measured_dt).max(0.0);
        self.elapsed += dt;

        // 1. CPU step and upload
        self.simulator.step(
            dt,
            self.elapsed,
            &self.snapshot.dna.sequence,
            &self.snapshot.shading,
        );
        let active = self.simulator.active_count();
        if active > 0 {
            self.context.queue.write_buffer(
                &self.particle_buffer,
                0,
                bytemuck::cast_slice(self.simulator.particles()),
            );
        }

        let uniforms = FrameUniforms::new(
            (self.config.width, self.config.height),
            self.elapsed,
            dt,
            &self.snapshot,
            active,
            self.config.feedback_decay,
        );
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                });

        // 2. Fractal
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Fractal Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.fractal_pipeline);
            pass.set_bind_group(0, &self.targets.fractal_bind_group, &[]);
            pass.dispatch_workgroups(
                self.config.width.div_ceil(WORKGROUP_SIZE),
                self.config.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }

        // 3. Background
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Background Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.frame_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            pass.set_pipeline(&self.background_pipeline);
            pass.set_bind_group(0, &self.targets.background_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        // 4. Particles
        if active > 0 {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particle Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.frame_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            let bytes = (active * std::mem::size_of::<Particle>()) as u64;
            pass.set_pipeline(&self.particle_pipeline);
            pass.set_bind_group(0, &self.particle_bind_group, &[]);
            pass.set_vertex_buffer(0, self.particle_buffer.slice(0..bytes));
            pass.draw(0..4, 0..active as u32);
        }

        // 5. Feedback
        encoder.copy_texture_to_texture(
            self.targets.frame_texture.as_image_copy(),
            self.targets.feedback_texture.as_image_copy(),
            self.extent(),
        );

        // 6. Present
        if let Some(view) = target {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            pass.set_pipeline(&self.present_pipeline);
            pass.set_bind_group(0, &self.targets.present_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));

        let stats = FrameStats {
            frame_index: self.frame_index,
            delta_time: dt,
            elapsed: self.elapsed,
            active_particles: active,
        };
        self.frame_index += 1;

        let errors = self.context.take_errors();
        if !errors.is_empty() {
            return Err(FrameError::Device(errors.join("; ")));
        }
        Ok(stats)
    }

    /// Read the last composed frame back as tightly packed RGBA8 rows.
    pub fn read_frame(&self) -> Result<Vec<u8>, FrameError> {
        let device = &self.context.device;
        let (width, height) = (self.config.width, self.config.height);
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            self.targets.frame_texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            self.extent(),
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        if let Err(e) = device.poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("Device poll during readback failed: {:?}", e);
        }
        rx.recv().map_err(|_| FrameError::ReadbackLost)??;

        let errors = self.context.take_errors();
        if !errors.is_empty() {
            staging.unmap();
            return Err(FrameError::Device(errors.join("; ")));
        }

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        staging.unmap();
        Ok(pixels)
    }

    /// Rebuild the noise texture with a new seed.
    pub fn regenerate_noise(&mut self, seed: u32) {
        self.noise = NoiseField::generate(
            self.config.noise_resolution,
            self.config.noise_octaves,
            seed,
        );
        self.config.noise_seed = seed;
        write_noise(&self.context.queue, &self.noise_texture, &self.noise);
        log::info!("Regenerated noise field with seed {}", seed);
    }

    /// Resize the viewport. Feedback history is cleared.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        let mut config = self.config.clone();
        config.width = width;
        config.height = height;
        config.validate()?;
        check_limits(&config, &self.context.device.limits())?;
        self.config = config;

        self.targets = FrameTargets::new(
            &self.context.device,
            (width, height),
            &self.uniform_buffer,
            &self.noise_view,
            &self.sampler,
            [
                &self.fractal_layout,
                &self.background_layout,
                &self.present_layout,
            ],
        );
        log::info!("Resized render targets to {}x{}", width, height);

        let errors = self.context.take_errors();
        if !errors.is_empty() {
            return Err(GpuError::Validation(errors.join("; ")));
        }
        Ok(())
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ArtSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Serializable view of the current parameters.
    pub fn summary(&self) -> ArtSummary {
        self.snapshot.summary()
    }

    pub fn simulator(&self) -> &ParticleSimulator {
        &self.simulator
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn present_format(&self) -> wgpu::TextureFormat {
        self.present_format
    }

    /// Accumulated simulation time in seconds.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.config.width,
            height: self.config.height,
            depth_or_array_layers: 1,
        }
    }
}

impl FrameTargets {
    fn new(
        device: &wgpu::Device,
        (width, height): (u32, u32),
        uniform_buffer: &wgpu::Buffer,
        noise_view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        [fractal_layout, background_layout, present_layout]: [&wgpu::BindGroupLayout; 3],
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let make = |label: &str, usage: wgpu::TextureUsages| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FRAME_FORMAT,
                usage,
                view_formats: &[],
            })
        };

        let frame_texture = make(
            "Frame Texture",
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let feedback_texture = make(
            "Feedback Texture",
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let fractal_texture = make(
            "Fractal Texture",
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        let frame_view = frame_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let feedback_view = feedback_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let fractal_view = fractal_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let fractal_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fractal Bind Group"),
            layout: fractal_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&fractal_view),
                },
            ],
        });
        let background_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Background Bind Group"),
            layout: background_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(noise_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&feedback_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&fractal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        let present_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Present Bind Group"),
            layout: present_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&frame_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Self {
            frame_texture,
            frame_view,
            feedback_texture,
            fractal_bind_group,
            background_bind_group,
            present_bind_group,
        }
    }
}

fn create_noise_texture(device: &wgpu::Device, resolution: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Noise Texture"),
        size: wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: NOISE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn write_noise(queue: &wgpu::Queue, texture: &wgpu::Texture, noise: &NoiseField) {
    let resolution = noise.resolution() as u32;
    queue.write_texture(
        texture.as_image_copy(),
        bytemuck::cast_slice(noise.data()),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(resolution * 4),
            rows_per_image: Some(resolution),
        },
        wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
    );
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE
            | wgpu::ShaderStages::VERTEX
            | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn create_uniform_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Uniform Bind Group Layout"),
        entries: &[uniform_entry(0)],
    })
}

fn create_fractal_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Fractal Bind Group Layout"),
        entries: &[
            uniform_entry(0),
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: FRAME_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
        ],
    })
}

fn create_background_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Background Bind Group Layout"),
        entries: &[
            uniform_entry(0),
            // R32Float is not filterable without an optional feature; it is
            // only read with textureLoad.
            texture_entry(1, false),
            texture_entry(2, true),
            texture_entry(3, true),
            sampler_entry(4),
        ],
    })
}

fn create_present_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Present Bind Group Layout"),
        entries: &[texture_entry(0, true), sampler_entry(1)],
    })
}

#[allow(clippy::too_many_arguments)]
fn create_render_pipeline(
    device: &wgpu::Device,
    name: &str,
    bind_group_layout: &wgpu::BindGroupLayout,
    shader: &wgpu::ShaderModule,
    buffers: &[wgpu::VertexBufferLayout<'_>],
    topology: wgpu::PrimitiveTopology,
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{} Pipeline Layout", name)),
        bind_group_layouts: &[bind_group_layout],
        ..Default::default()
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{} Pipeline", name)),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BehaviorCategory, BehaviorRecord};
    use chrono::{TimeZone, Utc};

    fn test_config() -> EngineConfig {
        EngineConfig {
            width: 96,
            height: 64,
            particle_capacity: 2_000,
            noise_resolution: 32,
            noise_octaves: 3,
            ..Default::default()
        }
    }

    fn test_snapshot(generation: u64) -> Arc<ArtSnapshot> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = BehaviorRecord {
            completion_rate: 0.8,
            streak_days: 9,
            intensity: 0.7,
            growth_rate: 0.5,
            history: (0..30).map(|i| i % 3 != 0).collect(),
            ..BehaviorRecord::new("yoga", BehaviorCategory::Mindfulness, start)
        };
        let as_of = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Arc::new(ArtSnapshot::from_record(&record, as_of, generation))
    }

    fn pipeline_or_skip() -> Option<RenderPipeline> {
        pipeline_with_config(test_config())
    }

    fn pipeline_with_config(config: EngineConfig) -> Option<RenderPipeline> {
        match pollster::block_on(RenderPipeline::new(config, test_snapshot(1))) {
            Ok(p) => Some(p),
            Err(GpuError::NoAdapter) => {
                eprintln!("Skipping GPU test: no adapter available");
                None
            }
            Err(e) => panic!("Failed to create render pipeline: {:?}", e),
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            width: 0,
            ..test_config()
        };
        let result = pollster::block_on(RenderPipeline::new(config, test_snapshot(1)));
        assert!(matches!(result, Err(GpuError::Config(_))));
    }

    #[test]
    fn test_rejects_capacity_beyond_device_limits() {
        let config = EngineConfig {
            particle_capacity: 10_000_000,
            ..test_config()
        };
        match pollster::block_on(RenderPipeline::new(config, test_snapshot(1))) {
            Err(GpuError::NoAdapter) => eprintln!("Skipping GPU test: no adapter available"),
            Err(GpuError::Limits { resource, .. }) => assert_eq!(resource, "Particle buffer"),
            Err(e) => panic!("Unexpected error: {:?}", e),
            Ok(_) => panic!("Oversized particle buffer was accepted"),
        }
    }

    #[test]
    fn test_render_and_read_frame() {
        let Some(mut pipeline) = pipeline_or_skip() else {
            return;
        };

        let mut last = None;
        for _ in 0..4 {
            last = Some(pipeline.render_frame(0.5, None).unwrap());
        }
        let stats = last.unwrap();
        assert_eq!(stats.frame_index, 3);
        // Fixed step overrides the measured delta
        assert!((stats.delta_time - 1.0 / 60.0).abs() < 1e-6);
        assert!(stats.active_particles > 0);
        assert!(stats.active_particles <= 2_000);

        let pixels = pipeline.read_frame().unwrap();
        assert_eq!(pixels.len(), 96 * 64 * 4);
        assert!(pixels.chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_render_to_target_view() {
        let Some(mut pipeline) = pipeline_or_skip() else {
            return;
        };
        let target = pipeline
            .context
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Test Target"),
                size: pipeline.extent(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: pipeline.present_format(),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let stats = pipeline.render_frame(1.0 / 60.0, Some(&view)).unwrap();
        assert_eq!(stats.frame_index, 0);
    }

    #[test]
    fn test_mismatched_target_is_reported_not_fatal() {
        let Some(mut pipeline) = pipeline_or_skip() else {
            return;
        };
        let target = pipeline
            .context
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Wrong Format Target"),
                size: pipeline.extent(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Bgra8Unorm,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let result = pipeline.render_frame(1.0 / 60.0, Some(&view));
        assert!(matches!(result, Err(FrameError::Device(_))));
        assert_eq!(pipeline.frame_index(), 1);

        // The loop keeps going once the bad target is gone
        let stats = pipeline.render_frame(1.0 / 60.0, None).unwrap();
        assert_eq!(stats.frame_index, 1);
    }

    #[test]
    fn test_feedback_carries_previous_frame() {
        let with_feedback = pipeline_with_config(EngineConfig {
            feedback_decay: 0.96,
            ..test_config()
        });
        let without_feedback = pipeline_with_config(EngineConfig {
            feedback_decay: 0.0,
            ..test_config()
        });
        let (Some(mut a), Some(mut b)) = (with_feedback, without_feedback) else {
            return;
        };

        // First frame: the feedback texture is still empty, so decay has no effect
        a.render_frame(1.0 / 60.0, None).unwrap();
        b.render_frame(1.0 / 60.0, None).unwrap();
        let first_a = a.read_frame().unwrap();
        let first_b = b.read_frame().unwrap();
        assert_eq!(first_a, first_b);

        // Second frame: only the decaying pipeline sees frame one underneath
        a.render_frame(1.0 / 60.0, None).unwrap();
        b.render_frame(1.0 / 60.0, None).unwrap();
        let second_a = a.read_frame().unwrap();
        let second_b = b.read_frame().unwrap();
        assert_ne!(second_a, second_b);

        let brightness = |pixels: &[u8]| -> u64 {
            pixels
                .chunks(4)
                .map(|p| p[0] as u64 + p[1] as u64 + p[2] as u64)
                .sum()
        };
        assert!(brightness(&second_a) > brightness(&second_b));
    }

    #[test]
    fn test_apply_snapshot_is_last_write_wins() {
        let Some(mut pipeline) = pipeline_or_skip() else {
            return;
        };
        pipeline.apply_snapshot(test_snapshot(5));
        assert_eq!(pipeline.snapshot().generation, 5);

        pipeline.apply_snapshot(test_snapshot(3));
        assert_eq!(pipeline.snapshot().generation, 5);
        assert_eq!(pipeline.summary().generation, 5);
    }

    #[test]
    fn test_regenerate_noise_and_resize() {
        let Some(mut pipeline) = pipeline_or_skip() else {
            return;
        };
        let before = pipeline.noise().data().to_vec();
        pipeline.regenerate_noise(99);
        assert_eq!(pipeline.noise().seed(), 99);
        assert_ne!(pipeline.noise().data(), &before[..]);

        pipeline.resize(48, 40).unwrap();
        pipeline.render_frame(1.0 / 60.0, None).unwrap();
        assert_eq!(pipeline.read_frame().unwrap().len(), 48 * 40 * 4);
        assert!(pipeline.resize(0, 40).is_err());
    }
}
