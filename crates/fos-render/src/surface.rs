//! Render Surface - window presentation
//!
//! Stacks the video layer and the overlay layer onto the window surface.
//! The video layer is drawn first, the overlay is alpha blended on top.

use crate::gpu::{GpuContext, GpuError};
use crate::overlay::{OverlayLayer, OverlaySurface};
use crate::pipeline::{FrameTexture, QuadProgram, ShaderSource, VideoLayer};
use crate::{Color, RenderError};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wgpu::{BindGroup, Device, Instance, Queue, Surface, SurfaceConfiguration, TextureFormat, TextureUsages};
use winit::window::Window;

/// Surface configuration
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// VSync enabled
    pub vsync: bool,
}

impl SurfaceConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vsync: true,
        }
    }
}

/// One cached value, rebuilt only when its key changes
struct KeyedSlot<T> {
    entry: Option<(u64, T)>,
}

impl<T> KeyedSlot<T> {
    fn new() -> Self {
        Self { entry: None }
    }

    fn get_or_insert_with(&mut self, key: u64, build: impl FnOnce() -> T) -> &T {
        if self.entry.as_ref().is_some_and(|(k, _)| *k != key) {
            self.entry = None;
        }
        let (_, value) = self.entry.get_or_insert_with(|| (key, build()));
        value
    }

    fn clear(&mut self) {
        self.entry = None;
    }
}

/// Window compositor for one player
pub struct RenderSurface {
    surface: Surface<'static>,
    config: SurfaceConfiguration,
    format: TextureFormat,
    device: Arc<Device>,
    queue: Arc<Queue>,
    program: QuadProgram,
    overlay: Option<FrameTexture>,
    overlay_revision: Option<u64>,
    video_bind: KeyedSlot<BindGroup>,
    background: Color,
}

impl RenderSurface {
    /// Create the wgpu surface for a window.
    ///
    /// Done before the GPU context exists so the adapter can be matched
    /// against it.
    pub fn create_surface(instance: &Instance, window: Arc<Window>) -> Result<Surface<'static>, GpuError> {
        instance
            .create_surface(window)
            .map_err(|e| GpuError::Surface(e.to_string()))
    }

    pub fn new(gpu: &GpuContext, surface: Surface<'static>, config: SurfaceConfig) -> Result<Self, RenderError> {
        info!("Creating render surface ({}x{})", config.width, config.height);

        let caps = surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| GpuError::Surface("surface reports no formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        debug!("Surface format: {:?}", format);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: config.width.max(1),
            height: config.height.max(1),
            present_mode: if config.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&gpu.device, &surface_config);

        let source = ShaderSource {
            label: "Layer Compositor",
            ..ShaderSource::default()
        };
        let program = QuadProgram::build(
            &gpu.device,
            &source,
            format,
            Some(wgpu::BlendState::ALPHA_BLENDING),
        )?;

        Ok(Self {
            surface,
            config: surface_config,
            format,
            device: gpu.device.clone(),
            queue: gpu.queue.clone(),
            program,
            overlay: None,
            overlay_revision: None,
            video_bind: KeyedSlot::new(),
            background: Color::BLACK,
        })
    }

    /// Resize the surface
    pub fn resize(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.config.width && height == self.config.height {
            return;
        }

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        debug!("Surface resized to {}x{}", width, height);
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    fn sync_overlay(&mut self, layer: &OverlayLayer) {
        let (width, height) = layer.size();
        let stale_size = self
            .overlay
            .as_ref()
            .is_none_or(|t| t.width != width || t.height != height);

        if stale_size {
            if let Some(old) = self.overlay.take() {
                old.texture.destroy();
            }
            self.overlay = Some(FrameTexture::new(&self.device, &self.program, width, height, "Overlay Texture"));
            self.overlay_revision = None;
        }

        if self.overlay_revision != Some(layer.revision()) {
            if let Some(texture) = &self.overlay {
                texture.write(&self.queue, layer.pixels());
            }
            self.overlay_revision = Some(layer.revision());
        }
    }

    /// Compose both layers and present.
    ///
    /// `video` is `None` before the first draw or after unmount; only the
    /// overlay is shown then.
    pub fn present(&mut self, video: Option<VideoLayer<'_>>, overlay: Option<&OverlayLayer>) -> Result<(), GpuError> {
        if let Some(layer) = overlay {
            self.sync_overlay(layer);
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(e) => return Err(GpuError::Surface(e.to_string())),
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let video_bind = match video {
            Some(layer) => {
                let (program, device) = (&self.program, &self.device);
                Some(self.video_bind.get_or_insert_with(layer.id, || {
                    program.bind(device, layer.view, "Video Layer Bind Group")
                }))
            }
            None => {
                self.video_bind.clear();
                None
            }
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Compositor Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Compositor Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.background.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(bind_group) = video_bind {
                self.program.draw(&mut pass, bind_group);
            }
            if let (Some(texture), Some(_)) = (&self.overlay, overlay) {
                self.program.draw(&mut pass, &texture.bind_group);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        if let Some(texture) = self.overlay.take() {
            texture.texture.destroy();
        }
    }
}
