//! Viewer shell
//!
//! Owns the window, the GPU surface and one mounted player. Redraws are
//! on demand: the render loop asks for them through the host, and the
//! overlay refreshes at the configured tick rate.

use anyhow::{anyhow, Result};
use fos_media::{DecodedVideoSource, FfmpegMedia, FrameSource, SocketFrameSource};
use fos_player::{FrameScheduler, Host, Player, PlayerConfig, SourceSettings};
use fos_render::{GpuConfig, GpuContext, RenderSurface, SurfaceConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

const SEEK_STEP: f64 = 5.0;

/// Window-backed host: ticks are redraw requests
struct WindowHost {
    window: Arc<Window>,
}

impl FrameScheduler for WindowHost {
    fn request_tick(&mut self) {
        self.window.request_redraw();
    }
}

impl Host for WindowHost {
    fn request_fullscreen(&mut self) {
        self.window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    }

    fn exit_fullscreen(&mut self) {
        self.window.set_fullscreen(None);
    }

    fn is_fullscreen(&self) -> bool {
        self.window.fullscreen().is_some()
    }
}

/// Keyboard controls
#[derive(Debug, Clone, Copy, PartialEq)]
enum Control {
    TogglePlay,
    ToggleMute,
    ToggleFullscreen,
    SeekBy(f64),
}

fn control_for(key: &Key) -> Option<Control> {
    match key {
        Key::Named(NamedKey::Space) => Some(Control::TogglePlay),
        Key::Named(NamedKey::ArrowLeft) => Some(Control::SeekBy(-SEEK_STEP)),
        Key::Named(NamedKey::ArrowRight) => Some(Control::SeekBy(SEEK_STEP)),
        Key::Character(c) => match c.as_str() {
            "k" => Some(Control::TogglePlay),
            "m" => Some(Control::ToggleMute),
            "f" => Some(Control::ToggleFullscreen),
            _ => None,
        },
        _ => None,
    }
}

fn open_source(config: &PlayerConfig, runtime: &Runtime) -> Result<FrameSource> {
    let source = match &config.source {
        SourceSettings::Video { url } => {
            let media = FfmpegMedia::new(url.as_str(), config.surface.width, config.surface.height);
            FrameSource::Video(DecodedVideoSource::new(Box::new(media), config.playback.poster_time))
        }
        SourceSettings::Socket { url } => FrameSource::Socket(SocketFrameSource::new(
            url,
            config.playback.frame_channel_capacity,
            runtime.handle().clone(),
        )?),
    };
    Ok(source)
}

struct Viewer {
    config: PlayerConfig,
    runtime: Runtime,
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    surface: Option<RenderSurface>,
    player: Option<Player<WindowHost>>,
    overlay_period: Duration,
    next_overlay: Instant,
}

impl Viewer {
    fn new(config: PlayerConfig, runtime: Runtime) -> Self {
        let overlay_period = Duration::from_secs_f64(1.0 / f64::from(config.playback.tick_rate));
        Self {
            config,
            runtime,
            window: None,
            gpu: None,
            surface: None,
            player: None,
            overlay_period,
            next_overlay: Instant::now(),
        }
    }

    /// Create the surface and GPU context, then mount the player
    fn init(&mut self, window: Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = RenderSurface::create_surface(&instance, window.clone())?;
        let gpu = pollster::block_on(GpuContext::new(GpuConfig::default(), instance, Some(&surface)))?;

        let size = window.inner_size();
        let surface_config = SurfaceConfig {
            vsync: self.config.surface.vsync,
            ..SurfaceConfig::new(size.width.max(1), size.height.max(1))
        };
        let surface = RenderSurface::new(&gpu, surface, surface_config)?;

        let source = open_source(&self.config, &self.runtime)?;
        let host = WindowHost { window: window.clone() };
        let player = match Player::mount(&gpu, host, source, &self.config) {
            Ok(player) => player,
            Err(e) if e.is_shader_failure() => {
                error!("Video layer shader rejected by the driver");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        info!("Player mounted: {}x{}", size.width, size.height);
        self.gpu = Some(gpu);
        self.surface = Some(surface);
        self.player = Some(player);
        self.window = Some(window);
        Ok(())
    }

    fn control(&mut self, control: Control) {
        let Some(player) = &mut self.player else {
            return;
        };

        let result = match control {
            Control::TogglePlay => player.toggle_play(),
            Control::ToggleMute => {
                let muted = player.toggle_mute();
                debug!("Muted: {}", muted);
                Ok(())
            }
            Control::ToggleFullscreen => {
                player.toggle_fullscreen();
                Ok(())
            }
            Control::SeekBy(delta) => player.seek(player.position() + delta).map(|_| ()),
        };

        if let Err(e) = result {
            warn!("{:?} ignored: {}", control, e);
        }
    }

    fn render(&mut self) {
        let (Some(gpu), Some(surface), Some(player)) = (&self.gpu, &mut self.surface, &mut self.player) else {
            return;
        };

        gpu.poll();
        player.pump();
        player.on_tick();

        let overlay = player.overlay().surface();
        if let Err(e) = surface.present(player.sink().layer(), Some(overlay)) {
            warn!("Failed to present: {}", e);
        }
    }

    fn shutdown(&mut self) {
        if let Some(player) = &mut self.player {
            player.unmount();
        }
        self.player = None;
        self.surface = None;
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = WindowAttributes::default()
            .with_title("fOS View")
            .with_inner_size(LogicalSize::new(self.config.surface.width, self.config.surface.height));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init(window) {
            error!("Failed to start player: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if width > 0 && height > 0 {
                    debug!("Window resized: {}x{}", width, height);
                    if let Some(surface) = &mut self.surface {
                        surface.resize(width, height);
                    }
                }

                if let (Some(window), Some(player)) = (&self.window, &mut self.player) {
                    let fullscreen = window.fullscreen().is_some();
                    if fullscreen != player.is_fullscreen() {
                        player.on_fullscreen_change(fullscreen);
                    }
                }
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(control) = control_for(&logical_key) {
                    self.control(control);
                }
            }

            WindowEvent::RedrawRequested => self.render(),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(player) = &mut self.player else {
            return;
        };

        player.pump();

        let now = Instant::now();
        if now >= self.next_overlay {
            player.redraw_overlay();
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_overlay = now + self.overlay_period;
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_overlay));
    }
}

/// Open the window and run until it closes
pub fn run(config: PlayerConfig, runtime: Runtime) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut viewer = Viewer::new(config, runtime);
    event_loop.run_app(&mut viewer).map_err(|e| anyhow!("event loop: {}", e))?;
    viewer.shutdown();

    Ok(())
}
