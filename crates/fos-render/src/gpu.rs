//! GPU context
//!
//! One context is shared by the video pipeline and the host compositor.
//! Device and queue are reference counted so render targets can hold them
//! past the lifetime of the borrow that created them.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use wgpu::{
    Adapter, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits, MemoryHints,
    PowerPreference, Queue, RequestAdapterOptions, Surface,
};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("Surface error: {0}")]
    Surface(String),
}

#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Prefer the integrated GPU
    pub low_power: bool,
    /// Largest frame edge a render target accepts
    pub max_texture_dimension: u32,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            low_power: true,
            max_texture_dimension: 4096,
        }
    }
}

impl GpuConfig {
    fn power_preference(&self) -> PowerPreference {
        if self.low_power {
            PowerPreference::LowPower
        } else {
            PowerPreference::HighPerformance
        }
    }

    /// WebGL2-class limits with the frame size cap raised or lowered
    fn limits(&self) -> Limits {
        Limits {
            max_texture_dimension_2d: self.max_texture_dimension,
            ..Limits::downlevel_webgl2_defaults()
        }
    }
}

/// Shared wgpu device and queue
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub config: GpuConfig,
}

impl GpuContext {
    /// Create a new GPU context.
    ///
    /// When `surface` is given the adapter is required to be able to
    /// present to it.
    pub async fn new(config: GpuConfig, instance: Instance, surface: Option<&Surface<'_>>) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: config.power_preference(),
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        info!("GPU adapter: {} ({:?})", info.name, info.backend);
        debug!("GPU driver: {} {}", info.driver, info.driver_info);

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("fOS Player Device"),
                    required_features: Features::empty(),
                    required_limits: config.limits(),
                    memory_hints: MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        // Errors outside a pushed error scope would otherwise panic
        device.on_uncaptured_error(Box::new(|error| {
            warn!("Uncaptured wgpu error: {}", error);
        }));

        debug!("Max frame dimension: {}", config.max_texture_dimension);

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
        })
    }

    /// Offscreen context on any backend, used by tests and tools
    pub async fn headless() -> Result<Self, GpuError> {
        let instance = Instance::new(&InstanceDescriptor::default());
        Self::new(GpuConfig::default(), instance, None).await
    }

    /// Drive completion callbacks without blocking.
    ///
    /// Hosts call this once per event-loop turn so that
    /// `on_submitted_work_done` notifications reach the uploader.
    pub fn poll(&self) {
        let _ = self.device.poll(wgpu::Maintain::Poll);
    }
}
