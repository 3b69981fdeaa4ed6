//! Headless wgpu device bootstrap.
//!
//! The downsample kernel binds eight storage mip views at once; the default
//! `max_storage_textures_per_shader_stage` is 4, so the device is requested
//! with the raised limit and adapters that cannot provide it are rejected.

use std::sync::Arc;

use thiserror::Error;

/// Storage textures bound by the downsample kernel.
pub const REQUIRED_STORAGE_TEXTURES: u32 = 8;

/// Errors from creating a GPU context.
#[derive(Error, Debug)]
pub enum GpuInitError {
    /// No adapter matched the request.
    #[error("no GPU adapter found")]
    NoAdapter,

    /// The adapter cannot bind what the kernel needs.
    #[error(
        "adapter {adapter} supports {available} storage textures per stage, {required} required"
    )]
    InsufficientLimits {
        /// Adapter name.
        adapter: String,
        /// Adapter limit.
        available: u32,
        /// Kernel requirement.
        required: u32,
    },

    /// Device request failed.
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

/// Device and queue shared by every GPU pyramid resource.
#[derive(Debug, Clone)]
pub struct GpuContext {
    /// Logical device.
    pub device: Arc<wgpu::Device>,
    /// Submission queue.
    pub queue: Arc<wgpu::Queue>,
    /// Adapter description.
    pub info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Requests a high-performance headless device.
    ///
    /// # Errors
    ///
    /// See [`GpuInitError`].
    pub fn new() -> Result<Self, GpuInitError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuInitError::NoAdapter)?;
        Self::from_adapter(&adapter)
    }

    /// Requests a device from an existing adapter.
    ///
    /// # Errors
    ///
    /// See [`GpuInitError`].
    pub fn from_adapter(adapter: &wgpu::Adapter) -> Result<Self, GpuInitError> {
        let info = adapter.get_info();
        let supported = adapter.limits();
        if supported.max_storage_textures_per_shader_stage < REQUIRED_STORAGE_TEXTURES {
            return Err(GpuInitError::InsufficientLimits {
                adapter: info.name,
                available: supported.max_storage_textures_per_shader_stage,
                required: REQUIRED_STORAGE_TEXTURES,
            });
        }

        let limits = wgpu::Limits {
            max_storage_textures_per_shader_stage: REQUIRED_STORAGE_TEXTURES,
            ..wgpu::Limits::default()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("HIZ"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
            },
            None,
        ))?;

        tracing::info!(adapter = %info.name, backend = ?info.backend, "GPU context created");
        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
        })
    }

    /// Wraps a device the application already owns.
    ///
    /// The device must have been created with at least
    /// [`REQUIRED_STORAGE_TEXTURES`] storage textures per stage.
    #[must_use]
    pub fn from_parts(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        info: wgpu::AdapterInfo,
    ) -> Self {
        Self { device, queue, info }
    }
}
