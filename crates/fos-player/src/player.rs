//! Player - mounts the frame pipeline into a host
//!
//! Owns one source, one render target (through its frame sink), the
//! overlay and the playback controller. The host drives it from its event
//! loop: `pump()` drains source events, `on_tick()` runs a scheduled
//! render tick, `redraw_overlay()` refreshes the text layer.

use crate::config::{OverlaySettings, PlaybackSettings, PlayerConfig};
use crate::controller::{PlayRequest, PlaybackController, PlaybackState, PlayerStatus};
use crate::error::PlayerError;
use crate::host::Host;
use crate::render_loop::{LoopStats, PictureSource, RenderLoop, TickOutcome};
use fos_media::{DecodedVideoSource, FrameSource, SocketEvent, SourceEvent, VideoEvent};
use fos_render::{
    Color, Frame, FrameSink, FrameUploader, GlyphRasterizer, GpuContext, OverlayCompositor, OverlayLayer,
    ShaderPipeline, ShaderSource, TextStyle,
};
use tracing::{debug, error, info, warn};

impl PictureSource for DecodedVideoSource {
    fn is_playing(&self) -> bool {
        DecodedVideoSource::is_playing(self)
    }

    fn current_picture(&self) -> Option<Frame> {
        DecodedVideoSource::current_picture(self)
    }
}

/// Build the overlay layer for a `width`x`height` player
pub fn build_overlay(settings: &OverlaySettings, width: u32, height: u32) -> OverlayCompositor {
    let glyphs = settings.font_path.as_deref().and_then(|path| match GlyphRasterizer::load(path) {
        Ok(glyphs) => Some(glyphs),
        Err(e) => {
            warn!("Overlay font unavailable: {}", e);
            None
        }
    });

    let style = TextStyle::new(settings.size).with_color(Color::from_hex(settings.color));
    let mut overlay = OverlayCompositor::new(
        OverlayLayer::new(width, height, glyphs),
        style,
        (settings.anchor[0], settings.anchor[1]),
    );
    overlay.set_text(settings.text.clone());
    overlay
}

pub struct Player<H: Host, S: FrameSink = FrameUploader> {
    host: H,
    sink: S,
    source: FrameSource,
    controller: PlaybackController,
    render_loop: RenderLoop,
    overlay: OverlayCompositor,
    status_size: f32,
    poster: Option<Frame>,
    autoplay: bool,
    mounted: bool,
}

impl<H: Host> Player<H> {
    /// Mount with the built-in quad shader
    pub fn mount(gpu: &GpuContext, host: H, source: FrameSource, config: &PlayerConfig) -> Result<Self, PlayerError> {
        Self::mount_with_shader(gpu, host, source, config, &ShaderSource::default())
    }

    /// Compile the shader, allocate the render target and start loading.
    ///
    /// Shader compile or link failures abort the mount; nothing renders.
    pub fn mount_with_shader(
        gpu: &GpuContext,
        host: H,
        source: FrameSource,
        config: &PlayerConfig,
        shader: &ShaderSource<'_>,
    ) -> Result<Self, PlayerError> {
        config.validate()?;

        let (width, height) = (config.surface.width, config.surface.height);
        let pipeline = ShaderPipeline::new(gpu);
        let target = pipeline.initialize(width, height, shader).map_err(|e| {
            error!("Player mount failed: {}", e);
            e
        })?;

        let uploader = FrameUploader::new(pipeline, target);
        let overlay = build_overlay(&config.overlay, width, height);
        Ok(Self::with_sink(host, uploader, source, overlay, &config.playback))
    }
}

impl<H: Host, S: FrameSink> Player<H, S> {
    /// Assemble a player around an existing sink and start loading
    pub fn with_sink(
        host: H,
        sink: S,
        source: FrameSource,
        overlay: OverlayCompositor,
        playback: &PlaybackSettings,
    ) -> Self {
        let seekable = source.is_seekable();
        let mut player = Self {
            host,
            sink,
            source,
            controller: PlaybackController::new(seekable),
            render_loop: RenderLoop::new(),
            overlay,
            status_size: 14.0,
            poster: None,
            autoplay: playback.autoplay,
            mounted: true,
        };
        player.load();
        player
    }

    fn load(&mut self) {
        info!("Loading {} source", self.source.kind());
        self.poster = None;
        self.controller.begin_load();
        self.source.start();
        if self.autoplay {
            let _ = self.play();
        }
        self.refresh_status();
    }

    /// Stop everything and start a fresh load on the same source
    pub fn reload(&mut self) {
        self.render_loop.stop();
        self.source.stop();
        self.mounted = true;
        self.load();
    }

    /// Tear down: cancel the pending tick, close the source, release the
    /// render target. Idempotent.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.render_loop.stop();
        self.source.stop();
        self.sink.release();
        info!("Player unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Drain source events without blocking
    pub fn pump(&mut self) {
        if !self.mounted {
            return;
        }
        for event in self.source.poll() {
            let before = self.controller.state();
            self.apply(event);
            self.sync(before);
        }
    }

    fn apply(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Video(event) => match event {
                VideoEvent::Duration(duration) => self.controller.on_duration(duration),
                VideoEvent::Ready => {
                    self.controller.on_ready();
                }
                VideoEvent::Playing => {
                    self.controller.on_playing();
                }
                VideoEvent::Paused => {
                    self.controller.on_paused();
                }
                VideoEvent::TimeUpdate(t) => self.controller.on_time_update(t),
                VideoEvent::Ended => {
                    self.controller.on_ended();
                }
                VideoEvent::Poster(frame) => self.show_poster(frame),
                VideoEvent::Failed(e) => {
                    error!("Video failed: {}", e);
                    self.controller.on_error();
                }
            },
            SourceEvent::Socket(event) => match event {
                SocketEvent::State(state) => {
                    self.controller.on_connection(state);
                }
                SocketEvent::Frame(frame) => {
                    if self.controller.state() == PlaybackState::Playing {
                        self.render_loop.offer(frame, &mut self.sink, &mut self.host);
                    } else {
                        debug!("Discarding frame while {:?}", self.controller.state());
                    }
                }
                // Already logged by the connection task
                SocketEvent::DecodeFailed(_) => {}
                SocketEvent::Failure(e) => error!("Stream failed: {}", e),
            },
        }
    }

    fn show_poster(&mut self, frame: Frame) {
        if self.controller.state() != PlaybackState::Playing && !self.sink.is_busy() {
            if let Err(e) = self.sink.draw(frame.clone()) {
                warn!("Failed to draw poster: {}", e);
            }
        }
        self.poster = Some(frame);
    }

    /// Apply the loop side of a state change
    fn sync(&mut self, before: PlaybackState) {
        let after = self.controller.state();
        if before == after {
            return;
        }

        match (after, &self.source) {
            (PlaybackState::Playing, FrameSource::Video(_)) => self.render_loop.start_video(&mut self.host),
            (PlaybackState::Playing, FrameSource::Socket(_)) => self.render_loop.start_socket(),
            // Video halts on its next tick; a paused stream drops what arrives
            (PlaybackState::Paused, FrameSource::Socket(_)) => self.render_loop.stop(),
            (PlaybackState::Ended | PlaybackState::Error, _) => self.render_loop.stop(),
            _ => {}
        }

        self.refresh_status();
    }

    fn refresh_status(&mut self) {
        let status = self.controller.status().map(|status| {
            let color = if status.is_error() {
                Color::STATUS_ERROR
            } else {
                Color::STATUS_MUTED
            };
            (status.text().to_string(), TextStyle::new(self.status_size).with_color(color))
        });
        self.overlay.set_status(status);
    }

    /// Run the scheduled render tick, if any
    pub fn on_tick(&mut self) -> TickOutcome {
        match &self.source {
            FrameSource::Video(video) => self.render_loop.tick_video(video, &mut self.sink, &mut self.host),
            FrameSource::Socket(_) => self.render_loop.tick_socket(&mut self.sink, &mut self.host),
        }
    }

    /// One overlay cycle, independent of the video layer
    pub fn redraw_overlay(&mut self) {
        self.overlay.redraw();
    }

    pub fn play(&mut self) -> Result<(), PlayerError> {
        let before = self.controller.state();
        let request = self.controller.request_play()?;

        if let FrameSource::Video(video) = &mut self.source {
            if request != PlayRequest::Unchanged {
                video.play();
            }
        }

        self.sync(before);
        Ok(())
    }

    /// Pause; a no-op unless playing
    pub fn pause(&mut self) {
        let before = self.controller.state();
        let stopped = self.controller.pause();

        if let FrameSource::Video(video) = &mut self.source {
            if stopped || before == PlaybackState::Loading {
                video.pause();
            }
        }

        self.sync(before);
    }

    pub fn toggle_play(&mut self) -> Result<(), PlayerError> {
        if self.controller.state() == PlaybackState::Playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    pub fn toggle_mute(&mut self) -> bool {
        let muted = self.controller.toggle_mute();
        if let FrameSource::Video(video) = &mut self.source {
            video.set_muted(muted);
        }
        muted
    }

    /// Seek to `seconds`, clamped to `[0, duration]`; returns the target
    pub fn seek(&mut self, seconds: f64) -> Result<f64, PlayerError> {
        let target = self.controller.seek(seconds)?;
        if let FrameSource::Video(video) = &mut self.source {
            video.seek(target);
        }
        Ok(target)
    }

    pub fn toggle_fullscreen(&mut self) {
        self.controller.toggle_fullscreen(&mut self.host);
    }

    /// The host's fullscreen-change notification
    pub fn on_fullscreen_change(&mut self, fullscreen: bool) {
        debug!("Fullscreen changed: {}", fullscreen);
        self.controller.on_fullscreen_change(fullscreen);
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn position(&self) -> f64 {
        self.controller.position()
    }

    pub fn duration(&self) -> Option<f64> {
        self.controller.duration()
    }

    pub fn is_muted(&self) -> bool {
        self.controller.is_muted()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.controller.is_fullscreen()
    }

    pub fn status(&self) -> Option<PlayerStatus> {
        self.controller.status()
    }

    pub fn poster(&self) -> Option<&Frame> {
        self.poster.as_ref()
    }

    pub fn render_stats(&self) -> LoopStats {
        self.render_loop.stats()
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn overlay(&self) -> &OverlayCompositor {
        &self.overlay
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: Host, S: FrameSink> Drop for Player<H, S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_loop::FrameScheduler;
    use fos_media::{ConnectionState, EventBus, MediaElement, MediaEvent, SocketFrameSource, Subscription};
    use fos_render::PipelineError;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSink {
        drawn: Vec<[u8; 4]>,
        busy: bool,
        released: bool,
    }

    impl FrameSink for FakeSink {
        fn draw(&mut self, frame: Frame) -> Result<(), PipelineError> {
            if self.released {
                return Err(PipelineError::Disposed);
            }
            let p = frame.pixels();
            self.drawn.push([p[0], p[1], p[2], p[3]]);
            Ok(())
        }

        fn is_busy(&self) -> bool {
            self.busy
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    #[derive(Default)]
    struct FakeHost {
        ticks_requested: u32,
        fullscreen: bool,
        fullscreen_requests: Vec<bool>,
    }

    impl FrameScheduler for FakeHost {
        fn request_tick(&mut self) {
            self.ticks_requested += 1;
        }
    }

    impl Host for FakeHost {
        fn request_fullscreen(&mut self) {
            self.fullscreen_requests.push(true);
        }

        fn exit_fullscreen(&mut self) {
            self.fullscreen_requests.push(false);
        }

        fn is_fullscreen(&self) -> bool {
            self.fullscreen
        }
    }

    #[derive(Default)]
    struct Transport {
        paused: bool,
        ended: bool,
        muted: bool,
        time: f64,
        loads: u32,
        closed: bool,
    }

    struct ScriptedMedia {
        transport: Rc<RefCell<Transport>>,
        bus: EventBus<MediaEvent>,
        duration: f64,
    }

    impl MediaElement for ScriptedMedia {
        fn load(&mut self) {
            let mut transport = self.transport.borrow_mut();
            transport.loads += 1;
            transport.closed = false;
        }

        fn play(&mut self) {
            self.transport.borrow_mut().paused = false;
        }

        fn pause(&mut self) {
            self.transport.borrow_mut().paused = true;
        }

        fn is_paused(&self) -> bool {
            self.transport.borrow().paused
        }

        fn is_ended(&self) -> bool {
            self.transport.borrow().ended
        }

        fn set_muted(&mut self, muted: bool) {
            self.transport.borrow_mut().muted = muted;
        }

        fn is_muted(&self) -> bool {
            self.transport.borrow().muted
        }

        fn current_time(&self) -> f64 {
            self.transport.borrow().time
        }

        fn duration(&self) -> Option<f64> {
            Some(self.duration)
        }

        fn seek(&mut self, seconds: f64) {
            self.transport.borrow_mut().time = seconds;
            self.bus.emit(MediaEvent::Seeked);
        }

        fn current_picture(&self) -> Option<Frame> {
            let shade = (self.transport.borrow().time * 10.0).round() as u8;
            Some(Frame::solid(2, 2, [shade, 0, 0, 255]))
        }

        fn subscribe(&self) -> Subscription<MediaEvent> {
            self.bus.subscribe()
        }

        fn close(&mut self) {
            let mut transport = self.transport.borrow_mut();
            transport.closed = true;
            transport.paused = true;
            transport.ended = false;
            transport.time = 0.0;
        }
    }

    fn video_player(duration: f64) -> (Player<FakeHost, FakeSink>, Rc<RefCell<Transport>>, EventBus<MediaEvent>) {
        let transport = Rc::new(RefCell::new(Transport {
            paused: true,
            ..Default::default()
        }));
        let bus = EventBus::new();
        let media = ScriptedMedia {
            transport: transport.clone(),
            bus: bus.clone(),
            duration,
        };
        let source = FrameSource::Video(DecodedVideoSource::new(Box::new(media), 0.1));
        let overlay = build_overlay(&OverlaySettings::default(), 64, 36);
        let player = Player::with_sink(
            FakeHost::default(),
            FakeSink::default(),
            source,
            overlay,
            &PlaybackSettings::default(),
        );
        (player, transport, bus)
    }

    fn load_video(player: &mut Player<FakeHost, FakeSink>, bus: &EventBus<MediaEvent>, duration: f64) {
        bus.emit(MediaEvent::LoadedMetadata {
            duration,
            width: 64,
            height: 36,
        });
        bus.emit(MediaEvent::LoadedData);
        bus.emit(MediaEvent::CanPlay);
        player.pump();
    }

    #[test]
    fn test_video_load_shows_status_then_poster() {
        let (mut player, transport, bus) = video_player(10.0);
        assert_eq!(player.state(), PlaybackState::Loading);
        assert_eq!(player.overlay().status(), Some("Loading video..."));

        load_video(&mut player, &bus, 10.0);

        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.duration(), Some(10.0));
        assert_eq!(player.overlay().status(), None);
        assert_eq!(transport.borrow().time, 0.1);
        assert!(player.poster().is_some());
        // Poster drawn once since playback has not started
        assert_eq!(player.sink().drawn, vec![[1, 0, 0, 255]]);
    }

    #[test]
    fn test_seek_then_pause_keeps_position() {
        let (mut player, _transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);

        player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.seek(4.0).unwrap(), 4.0);
        player.pause();

        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.position(), 4.0);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (mut player, transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);

        for (t, expected) in [(-1.0, 0.0), (3.25, 3.25), (11.0, 10.0)] {
            assert_eq!(player.seek(t).unwrap(), expected);
            assert_eq!(player.position(), expected);
            assert_eq!(transport.borrow().time, expected);
        }
        assert_eq!(player.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_video_loop_draws_while_playing_only() {
        let (mut player, transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);
        let after_poster = player.sink().drawn.len();

        player.play().unwrap();
        assert_eq!(player.on_tick(), TickOutcome::Drawn);
        assert_eq!(player.on_tick(), TickOutcome::Drawn);

        player.pause();
        assert!(transport.borrow().paused);
        assert_eq!(player.on_tick(), TickOutcome::Idle);
        assert_eq!(player.on_tick(), TickOutcome::Cancelled);
        assert_eq!(player.sink().drawn.len(), after_poster + 2);
    }

    #[test]
    fn test_pause_while_paused_is_noop() {
        let (mut player, _transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);

        player.pause();
        player.pause();
        assert_eq!(player.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_media_error_stops_loop_and_shows_status() {
        let (mut player, _transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);
        player.play().unwrap();

        bus.emit(MediaEvent::Error("decode error".to_string()));
        player.pump();

        assert_eq!(player.state(), PlaybackState::Error);
        assert_eq!(player.overlay().status(), Some("Error loading video."));
        assert_eq!(player.on_tick(), TickOutcome::Cancelled);
        assert!(player.play().is_err());
    }

    #[test]
    fn test_ended_is_terminal_until_reload() {
        let (mut player, transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);
        player.play().unwrap();

        transport.borrow_mut().ended = true;
        bus.emit(MediaEvent::Ended);
        player.pump();
        assert_eq!(player.state(), PlaybackState::Ended);
        assert_eq!(player.position(), 10.0);

        player.reload();
        assert_eq!(player.state(), PlaybackState::Loading);
    }

    #[test]
    fn test_reload_after_end_plays_again() {
        let (mut player, transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);
        player.play().unwrap();
        transport.borrow_mut().ended = true;
        bus.emit(MediaEvent::Ended);
        player.pump();
        assert_eq!(player.state(), PlaybackState::Ended);

        player.reload();
        assert_eq!(transport.borrow().loads, 2);
        assert!(!transport.borrow().closed);
        assert!(player.poster().is_none());
        assert_eq!(player.overlay().status(), Some("Loading video..."));

        load_video(&mut player, &bus, 10.0);
        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(player.poster().is_some());
        assert_eq!(transport.borrow().time, 0.1);

        let drawn = player.sink().drawn.len();
        player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.on_tick(), TickOutcome::Drawn);
        assert_eq!(player.sink().drawn.len(), drawn + 1);
    }

    #[test]
    fn test_mute_reaches_transport() {
        let (mut player, transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);

        assert!(player.toggle_mute());
        assert!(transport.borrow().muted);
        assert_eq!(player.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_fullscreen_reported_after_host_notification() {
        let (mut player, _transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);

        player.toggle_fullscreen();
        assert_eq!(player.host().fullscreen_requests, vec![true]);
        assert!(!player.is_fullscreen());

        player.host_mut().fullscreen = true;
        player.on_fullscreen_change(true);
        assert!(player.is_fullscreen());

        player.toggle_fullscreen();
        assert_eq!(player.host().fullscreen_requests, vec![true, false]);
        player.host_mut().fullscreen = false;
        player.on_fullscreen_change(false);
        assert!(!player.is_fullscreen());
    }

    #[test]
    fn test_unmount_is_idempotent_and_stops_draws() {
        let (mut player, transport, bus) = video_player(10.0);
        load_video(&mut player, &bus, 10.0);
        player.play().unwrap();

        player.unmount();
        player.unmount();

        assert!(!player.is_mounted());
        assert!(transport.borrow().closed);
        assert!(player.sink().released);
        assert_eq!(player.on_tick(), TickOutcome::Cancelled);
    }

    mod socket {
        use super::*;
        use futures_util::SinkExt;
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        fn png(shade: u8) -> Vec<u8> {
            let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([shade, 0, 0, 255]));
            let mut out = std::io::Cursor::new(Vec::new());
            image.write_to(&mut out, image::ImageFormat::Png).unwrap();
            out.into_inner()
        }

        async fn serve(messages: Vec<Vec<u8>>) -> (String, tokio::sync::oneshot::Sender<()>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();

            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                for data in messages {
                    ws.send(Message::Binary(data.into())).await.unwrap();
                }
                let _ = done_rx.await;
                let _ = ws.close(None).await;
            });

            (format!("ws://{}", addr), done_tx)
        }

        fn socket_player(url: &str) -> Player<FakeHost, FakeSink> {
            let source = SocketFrameSource::new(url, 8, tokio::runtime::Handle::current()).unwrap();
            let config = PlayerConfig::socket_stream(url);
            let overlay = build_overlay(&config.overlay, 64, 36);
            Player::with_sink(
                FakeHost::default(),
                FakeSink::default(),
                FrameSource::Socket(source),
                overlay,
                &config.playback,
            )
        }

        async fn pump_until(player: &mut Player<FakeHost, FakeSink>, done: impl Fn(&Player<FakeHost, FakeSink>) -> bool) {
            for _ in 0..300 {
                player.pump();
                if done(player) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        fn connection(player: &Player<FakeHost, FakeSink>) -> Option<ConnectionState> {
            player.source().connection_state()
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_stream_draws_valid_frames_in_order() {
            let messages = vec![png(1), png(2), png(3), b"garbage".to_vec(), png(5)];
            let (url, _done) = serve(messages).await;
            let mut player = socket_player(&url);
            assert_eq!(player.overlay().status(), Some("Connecting..."));

            pump_until(&mut player, |p| p.sink().drawn.len() == 4).await;

            let shades: Vec<u8> = player.sink().drawn.iter().map(|p| p[0]).collect();
            assert_eq!(shades, vec![1, 2, 3, 5]);
            assert_eq!(player.render_stats().draws, 4);
            assert_eq!(connection(&player), Some(ConnectionState::Open));
            assert_eq!(player.state(), PlaybackState::Playing);
            match player.source() {
                FrameSource::Socket(socket) => assert_eq!(socket.decode_failures(), 1),
                FrameSource::Video(_) => unreachable!(),
            }
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_paused_stream_discards_frames() {
            let (url, _done) = serve(vec![png(1), png(2)]).await;
            let mut player = socket_player(&url);

            pump_until(&mut player, |p| p.state() == PlaybackState::Playing).await;
            player.pause();
            let drawn = player.sink().drawn.len();
            for _ in 0..20 {
                player.pump();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            assert_eq!(player.sink().drawn.len(), drawn);
            assert_eq!(player.state(), PlaybackState::Paused);
            assert!(player.seek(1.0).is_err());
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_server_close_reports_connection_lost() {
            let (url, done) = serve(vec![png(1)]).await;
            let mut player = socket_player(&url);

            pump_until(&mut player, |p| p.sink().drawn.len() == 1).await;
            done.send(()).unwrap();
            pump_until(&mut player, |p| p.state() == PlaybackState::Ended).await;

            assert_eq!(player.state(), PlaybackState::Ended);
            assert_eq!(player.overlay().status(), Some("Connection lost"));
            assert_eq!(connection(&player), Some(ConnectionState::Closed));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_unmount_closes_socket() {
            let (url, _done) = serve(Vec::new()).await;
            let mut player = socket_player(&url);
            pump_until(&mut player, |p| p.state() == PlaybackState::Playing).await;

            player.unmount();
            assert_eq!(connection(&player), Some(ConnectionState::Closed));
            assert!(player.sink().released);
        }
    }
}
