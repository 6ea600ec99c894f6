//! Decoded video source
//!
//! Wraps a host media element. Frames are not pushed: the render loop
//! samples the current picture on every tick while the media is playing.

use crate::error::MediaError;
use crate::event::Subscription;
use fos_render::Frame;
use tracing::{debug, info, warn};

/// Lifecycle notifications from a media element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata { duration: f64, width: u32, height: u32 },
    /// The first frame at the current position is available
    LoadedData,
    CanPlay,
    Play,
    Pause,
    Seeked,
    TimeUpdate(f64),
    Ended,
    Error(String),
}

/// Native decoder for a video URL
pub trait MediaElement {
    /// Begin buffering
    fn load(&mut self);

    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;

    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;

    /// Current position in seconds
    fn current_time(&self) -> f64;
    /// Duration in seconds, `None` until metadata has loaded
    fn duration(&self) -> Option<f64>;
    fn seek(&mut self, seconds: f64);

    /// The decoded picture at the current position
    fn current_picture(&self) -> Option<Frame>;

    fn subscribe(&self) -> Subscription<MediaEvent>;

    /// Stop decoding and release the backend
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PosterState {
    Waiting,
    Seeking,
    Captured,
}

/// What a poll of the video source observed
#[derive(Debug)]
pub enum VideoEvent {
    Duration(f64),
    Ready,
    Playing,
    Paused,
    TimeUpdate(f64),
    Ended,
    Poster(Frame),
    Failed(MediaError),
}

/// Frame source backed by a [`MediaElement`]
pub struct DecodedVideoSource {
    media: Box<dyn MediaElement>,
    events: Subscription<MediaEvent>,
    poster: PosterState,
    poster_time: f64,
    active: bool,
}

impl DecodedVideoSource {
    pub fn new(media: Box<dyn MediaElement>, poster_time: f64) -> Self {
        let events = media.subscribe();
        Self {
            media,
            events,
            poster: PosterState::Waiting,
            poster_time: poster_time.max(0.0),
            active: false,
        }
    }

    pub fn start(&mut self) {
        if self.active {
            return;
        }
        info!("Loading video source");
        // Leftovers from a previous run are stale
        self.events.drain();
        self.poster = PosterState::Waiting;
        self.active = true;
        self.media.load();
    }

    /// Halt playback and decoding. Idempotent.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.media.pause();
        self.media.close();
        debug!("Video source stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Playing and not ended: the window in which the loop samples frames
    pub fn is_playing(&self) -> bool {
        self.active && !self.media.is_paused() && !self.media.is_ended()
    }

    pub fn play(&mut self) {
        self.media.play();
    }

    pub fn pause(&mut self) {
        self.media.pause();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.media.set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.media.is_muted()
    }

    pub fn position(&self) -> f64 {
        self.media.current_time()
    }

    pub fn duration(&self) -> Option<f64> {
        self.media.duration()
    }

    /// Seek to `seconds` clamped to `[0, duration]`; returns the target
    pub fn seek(&mut self, seconds: f64) -> f64 {
        let duration = self.media.duration().unwrap_or(0.0);
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, duration)
        } else {
            0.0
        };
        self.media.seek(target);
        target
    }

    pub fn current_picture(&self) -> Option<Frame> {
        self.media.current_picture()
    }

    /// Drain media events
    pub fn poll(&mut self) -> Vec<VideoEvent> {
        let mut out = Vec::new();
        if !self.active {
            return out;
        }

        while let Some(event) = self.events.try_next() {
            match event {
                MediaEvent::LoadedMetadata { duration, width, height } => {
                    debug!("Video metadata: {:.2}s {}x{}", duration, width, height);
                    out.push(VideoEvent::Duration(duration));
                }
                MediaEvent::LoadedData => {
                    if self.poster == PosterState::Waiting {
                        self.poster = PosterState::Seeking;
                        self.media.seek(self.poster_time);
                    }
                }
                MediaEvent::Seeked => {
                    if self.poster == PosterState::Seeking {
                        self.poster = PosterState::Captured;
                        match self.media.current_picture() {
                            Some(frame) => out.push(VideoEvent::Poster(frame)),
                            None => warn!("No picture available for poster"),
                        }
                    }
                }
                MediaEvent::CanPlay => out.push(VideoEvent::Ready),
                MediaEvent::Play => out.push(VideoEvent::Playing),
                MediaEvent::Pause => out.push(VideoEvent::Paused),
                MediaEvent::TimeUpdate(t) => out.push(VideoEvent::TimeUpdate(t)),
                MediaEvent::Ended => out.push(VideoEvent::Ended),
                MediaEvent::Error(reason) => {
                    out.push(VideoEvent::Failed(MediaError::MediaDecodeFailure(reason)));
                }
            }
        }

        out
    }
}

impl Drop for DecodedVideoSource {
    fn drop(&mut self) {
        self.stop();
    }
}
