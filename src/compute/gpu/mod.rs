//! GPU render backend.
//!
//! Draws the art each frame with wgpu: a fractal compute pass, a fullscreen
//! background pass with feedback, additive particles, and a final blit.

mod pipeline;
mod uniforms;

pub use pipeline::{FrameStats, RenderPipeline};
pub use uniforms::FrameUniforms;

use std::sync::{Arc, Mutex};

use crate::compute::Particle;
use crate::schema::{ConfigError, EngineConfig};

/// Error type for GPU setup.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{resource} needs {requested}, device limit is {limit}")]
    Limits {
        resource: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("GPU validation failed: {0}")]
    Validation(String),
}

/// Per-frame failures. These are reported, never fatal to the render loop.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Readback channel closed before mapping completed")]
    ReadbackLost,

    #[error("GPU error during frame: {0}")]
    Device(String),
}

/// Device and queue shared by every GPU resource of the pipeline.
///
/// Device errors are collected instead of panicking; the pipeline drains them
/// after construction and after every submit. All resources are released when
/// the owning pipeline drops.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    errors: Arc<Mutex<Vec<String>>>,
}

impl GpuContext {
    /// Acquire a device without a presentation surface.
    pub async fn headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Behavior Art GPU"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        Ok(Self::from_parts(device, queue))
    }

    /// Wrap a device the host already owns, e.g. one tied to a window surface.
    ///
    /// Replaces the device's uncaptured-error handler.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            let message = error.to_string();
            log::warn!("GPU error: {}", message);
            if let Ok(mut pending) = sink.lock() {
                pending.push(message);
            }
        }));

        Self {
            device,
            queue,
            errors,
        }
    }

    /// Take every device error reported since the last call.
    pub fn take_errors(&self) -> Vec<String> {
        match self.errors.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Check that every allocation `config` implies fits within `limits`.
pub fn check_limits(config: &EngineConfig, limits: &wgpu::Limits) -> Result<(), GpuError> {
    let max_dimension = limits.max_texture_dimension_2d as u64;
    let textures = [
        ("Viewport width", config.width as u64),
        ("Viewport height", config.height as u64),
        ("Noise resolution", config.noise_resolution as u64),
    ];
    for (resource, requested) in textures {
        if requested > max_dimension {
            return Err(GpuError::Limits {
                resource,
                requested,
                limit: max_dimension,
            });
        }
    }

    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64;
    let padded_row = (config.width as u64 * 4).div_ceil(align) * align;
    let buffers = [
        (
            "Particle buffer",
            (config.particle_capacity as u64).saturating_mul(std::mem::size_of::<Particle>() as u64),
        ),
        ("Readback buffer", padded_row * config.height as u64),
    ];
    for (resource, requested) in buffers {
        if requested > limits.max_buffer_size {
            return Err(GpuError::Limits {
                resource,
                requested,
                limit: limits.max_buffer_size,
            });
        }
    }
    Ok(())
}
