//! ffmpeg-backed media element
//!
//! `ffprobe` reads duration, frame rate and size. A reader thread keeps one
//! `ffmpeg` rawvideo stream open while playing and extracts single frames
//! for seeks. Frames are scaled to the layer size on the ffmpeg side.
//!
//! Only video is decoded; mute is tracked as a flag.

use crate::error::MediaError;
use crate::event::{EventBus, Subscription};
use crate::video::{MediaElement, MediaEvent};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use fos_render::Frame;
use serde::Deserialize;
use std::io::Read;
use std::process::{Child, Command as Process, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const DEFAULT_FPS: f64 = 30.0;
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

/// Stream facts reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// Parse an ffprobe rate such as `30/1` or `30000/1001`
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe(json: &[u8]) -> Result<ProbeInfo, MediaError> {
    let output: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| MediaError::MediaDecodeFailure(format!("unreadable probe output: {}", e)))?;

    let duration = output
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MediaError::MediaDecodeFailure("duration not found".to_string()))?;

    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::MediaDecodeFailure("no video stream".to_string()))?;

    Ok(ProbeInfo {
        duration,
        fps: stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .unwrap_or(DEFAULT_FPS)
            .min(120.0),
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

fn probe(source: &str) -> Result<ProbeInfo, MediaError> {
    let output = Process::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams", source])
        .output()
        .map_err(|e| MediaError::MediaDecodeFailure(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(MediaError::MediaDecodeFailure(format!(
            "ffprobe exited with {}",
            output.status
        )));
    }

    parse_probe(&output.stdout)
}

fn extract_frame(source: &str, at: f64, width: u32, height: u32) -> Result<Frame, MediaError> {
    let output = Process::new("ffmpeg")
        .args(["-ss", &format!("{:.6}", at), "-i", source])
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24"])
        .args(["-s", &format!("{}x{}", width, height), "-an", "-v", "quiet", "-"])
        .output()
        .map_err(|e| MediaError::MediaDecodeFailure(format!("failed to run ffmpeg: {}", e)))?;

    if !output.status.success() {
        return Err(MediaError::MediaDecodeFailure(format!(
            "ffmpeg exited with {}",
            output.status
        )));
    }

    Frame::from_rgb(width, height, &output.stdout).ok_or_else(|| {
        MediaError::MediaDecodeFailure(format!(
            "unexpected frame size {} for {}x{}",
            output.stdout.len(),
            width,
            height
        ))
    })
}

fn start_stream(source: &str, from: f64, width: u32, height: u32, fps: f64) -> Result<Child, MediaError> {
    Process::new("ffmpeg")
        .args(["-ss", &format!("{:.6}", from), "-i", source])
        .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
        .args(["-s", &format!("{}x{}", width, height)])
        .args(["-r", &format!("{:.3}", fps), "-an", "-v", "quiet", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| MediaError::MediaDecodeFailure(format!("failed to start ffmpeg: {}", e)))
}

fn kill(stream: &mut Option<Child>) {
    if let Some(mut child) = stream.take() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[derive(Debug)]
enum Command {
    Play,
    Pause,
    Seek(f64),
    Stop,
}

#[derive(Default)]
struct Shared {
    paused: bool,
    ended: bool,
    muted: bool,
    time: f64,
    duration: Option<f64>,
    picture: Option<Frame>,
}

impl Shared {
    /// Transport state before the first load
    fn idle(muted: bool) -> Self {
        Self {
            paused: true,
            muted,
            ..Default::default()
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Media element decoding a file or URL with the ffmpeg CLI
pub struct FfmpegMedia {
    source: String,
    width: u32,
    height: u32,
    shared: Arc<Mutex<Shared>>,
    bus: EventBus<MediaEvent>,
    commands: Sender<Command>,
    pending: Option<Receiver<Command>>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FfmpegMedia {
    /// Decoded pictures are scaled to `width`x`height`
    pub fn new(source: impl Into<String>, width: u32, height: u32) -> Self {
        let (commands, pending) = unbounded();
        Self {
            source: source.into(),
            width: width.max(1),
            height: height.max(1),
            shared: Arc::new(Mutex::new(Shared::idle(false))),
            bus: EventBus::new(),
            commands,
            pending: Some(pending),
            cancelled: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl MediaElement for FfmpegMedia {
    fn load(&mut self) {
        let Some(commands) = self.pending.take() else {
            return;
        };

        let reader = Reader {
            source: self.source.clone(),
            width: self.width,
            height: self.height,
            shared: self.shared.clone(),
            bus: self.bus.clone(),
            commands,
            cancelled: self.cancelled.clone(),
        };

        let spawned = thread::Builder::new()
            .name("fos-ffmpeg-reader".to_string())
            .spawn(move || reader.run());

        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                error!("Failed to spawn decoder thread: {}", e);
                self.bus.emit(MediaEvent::Error(e.to_string()));
            }
        }
    }

    fn play(&mut self) {
        lock(&self.shared).paused = false;
        let _ = self.commands.send(Command::Play);
    }

    fn pause(&mut self) {
        lock(&self.shared).paused = true;
        let _ = self.commands.send(Command::Pause);
    }

    fn is_paused(&self) -> bool {
        lock(&self.shared).paused
    }

    fn is_ended(&self) -> bool {
        lock(&self.shared).ended
    }

    fn set_muted(&mut self, muted: bool) {
        lock(&self.shared).muted = muted;
    }

    fn is_muted(&self) -> bool {
        lock(&self.shared).muted
    }

    fn current_time(&self) -> f64 {
        lock(&self.shared).time
    }

    fn duration(&self) -> Option<f64> {
        lock(&self.shared).duration
    }

    fn seek(&mut self, seconds: f64) {
        {
            let mut shared = lock(&self.shared);
            shared.time = seconds;
            shared.ended = false;
        }
        let _ = self.commands.send(Command::Seek(seconds));
    }

    fn current_picture(&self) -> Option<Frame> {
        lock(&self.shared).picture.clone()
    }

    fn subscribe(&self) -> Subscription<MediaEvent> {
        self.bus.subscribe()
    }

    fn close(&mut self) {
        let _ = self.commands.send(Command::Stop);
        self.cancelled.store(true, Ordering::Relaxed);
        // The reader exits after its current frame read; not joined
        self.worker = None;

        // Fresh channel and state for the next load. A reader still
        // finishing keeps the old ones and can no longer reach the bus.
        let (commands, pending) = unbounded();
        self.commands = commands;
        self.pending = Some(pending);
        self.cancelled = Arc::new(AtomicBool::new(false));
        let muted = lock(&self.shared).muted;
        self.shared = Arc::new(Mutex::new(Shared::idle(muted)));
    }
}

impl Drop for FfmpegMedia {
    fn drop(&mut self) {
        self.close();
    }
}

struct Reader {
    source: String,
    width: u32,
    height: u32,
    shared: Arc<Mutex<Shared>>,
    bus: EventBus<MediaEvent>,
    commands: Receiver<Command>,
    cancelled: Arc<AtomicBool>,
}

impl Reader {
    fn emit(&self, event: MediaEvent) {
        if !self.cancelled.load(Ordering::Relaxed) {
            self.bus.emit(event);
        }
    }

    fn run(self) {
        info!("Probing {}", self.source);

        let info = match probe(&self.source) {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to load {}: {}", self.source, e);
                self.emit(MediaEvent::Error(e.to_string()));
                return;
            }
        };

        info!(
            "Video: {:.2}s, {}x{} at {:.2} fps, scaled to {}x{}",
            info.duration, info.width, info.height, info.fps, self.width, self.height
        );

        lock(&self.shared).duration = Some(info.duration);
        self.emit(MediaEvent::LoadedMetadata {
            duration: info.duration,
            width: info.width,
            height: info.height,
        });

        match extract_frame(&self.source, 0.0, self.width, self.height) {
            Ok(frame) => lock(&self.shared).picture = Some(frame),
            Err(e) => {
                error!("Failed to decode first frame: {}", e);
                self.emit(MediaEvent::Error(e.to_string()));
                return;
            }
        }
        self.emit(MediaEvent::LoadedData);
        self.emit(MediaEvent::CanPlay);

        if let Err(e) = self.pump(&info) {
            error!("Playback of {} failed: {}", self.source, e);
            self.emit(MediaEvent::Error(e.to_string()));
        }
    }

    fn pump(&self, info: &ProbeInfo) -> Result<(), MediaError> {
        let frame_duration = Duration::from_secs_f64(1.0 / info.fps);
        let frame_bytes = (self.width as usize) * (self.height as usize) * 3;
        let mut buffer = vec![0u8; frame_bytes];

        let mut stream: Option<Child> = None;
        let mut stream_start = 0.0;
        let mut frames_read = 0u64;
        let mut playing = false;
        let mut next_deadline = Instant::now();
        let mut last_time_update = Instant::now();

        loop {
            let command = if playing {
                self.commands.try_recv().ok()
            } else {
                match self.commands.recv_timeout(Duration::from_millis(100)) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => Some(Command::Stop),
                }
            };

            match command {
                Some(Command::Play) => {
                    playing = true;
                    next_deadline = Instant::now();
                    self.emit(MediaEvent::Play);
                }
                Some(Command::Pause) => {
                    if playing {
                        playing = false;
                        self.emit(MediaEvent::Pause);
                    }
                }
                Some(Command::Seek(at)) => {
                    kill(&mut stream);
                    let at = at.clamp(0.0, info.duration);
                    let frame = extract_frame(&self.source, at, self.width, self.height)?;
                    {
                        let mut shared = lock(&self.shared);
                        shared.picture = Some(frame);
                        shared.time = at;
                    }
                    debug!("Seeked to {:.3}s", at);
                    self.emit(MediaEvent::Seeked);
                    self.emit(MediaEvent::TimeUpdate(at));
                }
                Some(Command::Stop) => {
                    kill(&mut stream);
                    debug!("Reader for {} stopped", self.source);
                    return Ok(());
                }
                None => {}
            }

            if !playing {
                continue;
            }

            if stream.is_none() {
                stream_start = lock(&self.shared).time;
                frames_read = 0;
                stream = Some(start_stream(&self.source, stream_start, self.width, self.height, info.fps)?);
            }

            let now = Instant::now();
            if now < next_deadline {
                thread::sleep((next_deadline - now).min(Duration::from_millis(5)));
                continue;
            }
            next_deadline += frame_duration;

            let read = stream
                .as_mut()
                .and_then(|child| child.stdout.as_mut())
                .map(|stdout| stdout.read_exact(&mut buffer));

            match read {
                Some(Ok(())) => {
                    frames_read += 1;
                    let time = (stream_start + frames_read as f64 / info.fps).min(info.duration);
                    let Some(frame) = Frame::from_rgb(self.width, self.height, &buffer) else {
                        warn!("Discarding malformed frame");
                        continue;
                    };
                    {
                        let mut shared = lock(&self.shared);
                        shared.picture = Some(frame);
                        shared.time = time;
                    }
                    if last_time_update.elapsed() >= TIME_UPDATE_INTERVAL {
                        last_time_update = Instant::now();
                        self.emit(MediaEvent::TimeUpdate(time));
                    }
                }
                _ => {
                    // End of stream
                    kill(&mut stream);
                    playing = false;
                    {
                        let mut shared = lock(&self.shared);
                        shared.time = info.duration;
                        shared.paused = true;
                        shared.ended = true;
                    }
                    info!("Reached end of {}", self.source);
                    self.emit(MediaEvent::TimeUpdate(info.duration));
                    self.emit(MediaEvent::Pause);
                    self.emit(MediaEvent::Ended);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe() {
        let json = br#"{
            "streams": [
                { "codec_type": "audio", "r_frame_rate": "0/0" },
                { "codec_type": "video", "width": 1280, "height": 720, "r_frame_rate": "24/1" }
            ],
            "format": { "duration": "10.000000" }
        }"#;

        let info = parse_probe(json).unwrap();
        assert_eq!(
            info,
            ProbeInfo {
                duration: 10.0,
                fps: 24.0,
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn test_parse_probe_without_video() {
        let json = br#"{ "streams": [{ "codec_type": "audio" }], "format": { "duration": "3.5" } }"#;
        let err = parse_probe(json).unwrap_err();
        assert!(err.to_string().contains("no video stream"));
    }

    #[test]
    fn test_parse_probe_garbage() {
        assert!(matches!(
            parse_probe(b"<html>"),
            Err(MediaError::MediaDecodeFailure(_))
        ));
    }

    #[test]
    fn test_transport_flags_before_load() {
        let mut media = FfmpegMedia::new("missing.mp4", 64, 36);
        assert!(media.is_paused());
        assert_eq!(media.duration(), None);

        media.set_muted(true);
        media.play();
        assert!(media.is_muted());
        assert!(!media.is_paused());

        media.seek(2.5);
        assert_eq!(media.current_time(), 2.5);
        assert!(media.current_picture().is_none());
    }

    fn wait_for_error(events: &Subscription<MediaEvent>) -> Option<String> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            while let Some(event) = events.try_next() {
                if let MediaEvent::Error(reason) = event {
                    return Some(reason);
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_load_after_close_starts_a_new_reader() {
        let mut media = FfmpegMedia::new("/nonexistent/clip.mp4", 64, 36);
        let events = media.subscribe();

        media.load();
        assert!(wait_for_error(&events).is_some());

        media.set_muted(true);
        media.play();
        media.seek(3.0);
        media.close();
        assert!(media.is_paused());
        assert!(media.is_muted());
        assert_eq!(media.current_time(), 0.0);
        assert_eq!(media.duration(), None);

        media.load();
        assert!(wait_for_error(&events).is_some());
    }
}
