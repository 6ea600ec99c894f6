//! Playback state machine
//!
//! `Idle -> Loading -> {Playing <-> Paused} -> (Ended | Error)`
//!
//! The controller only tracks state; the player applies the side effects
//! a transition implies (transport calls, loop start/stop).

use crate::error::PlayerError;
use crate::host::Host;
use fos_media::ConnectionState;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackState {
    /// Ended and Error end the current load
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

/// What a play request resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayRequest {
    /// Transport should start now
    Start,
    /// Still loading; playback begins once ready
    Deferred,
    /// Already playing
    Unchanged,
}

/// User-visible status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    LoadingVideo,
    VideoError,
    Connecting,
    ConnectionLost,
}

impl PlayerStatus {
    pub fn text(self) -> &'static str {
        match self {
            Self::LoadingVideo => "Loading video...",
            Self::VideoError => "Error loading video.",
            Self::Connecting => "Connecting...",
            Self::ConnectionLost => "Connection lost",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::VideoError | Self::ConnectionLost)
    }
}

/// Render seconds as `mm:ss`
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Playback state for one player
#[derive(Debug)]
pub struct PlaybackController {
    state: PlaybackState,
    seekable: bool,
    play_requested: bool,
    muted: bool,
    fullscreen: bool,
    position: f64,
    duration: Option<f64>,
}

impl PlaybackController {
    pub fn new(seekable: bool) -> Self {
        Self {
            state: PlaybackState::Idle,
            seekable,
            play_requested: false,
            muted: false,
            fullscreen: false,
            position: 0.0,
            duration: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Fullscreen as last reported by the host
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn play_requested(&self) -> bool {
        self.play_requested
    }

    fn transition(&mut self, next: PlaybackState) -> bool {
        if self.state == next {
            return false;
        }
        debug!("Playback {:?} -> {:?}", self.state, next);
        self.state = next;
        true
    }

    /// Start a new load: reinitializes to Idle, then Loading
    pub fn begin_load(&mut self) {
        self.state = PlaybackState::Idle;
        self.play_requested = false;
        self.position = 0.0;
        self.duration = None;
        self.transition(PlaybackState::Loading);
    }

    pub fn request_play(&mut self) -> Result<PlayRequest, PlayerError> {
        match self.state {
            PlaybackState::Idle | PlaybackState::Loading => {
                self.play_requested = true;
                Ok(PlayRequest::Deferred)
            }
            PlaybackState::Paused => {
                self.play_requested = true;
                self.transition(PlaybackState::Playing);
                Ok(PlayRequest::Start)
            }
            PlaybackState::Playing => Ok(PlayRequest::Unchanged),
            state @ (PlaybackState::Ended | PlaybackState::Error) => Err(PlayerError::InvalidState {
                action: "play",
                state,
            }),
        }
    }

    /// Returns true when playback actually stopped
    pub fn pause(&mut self) -> bool {
        self.play_requested = false;
        match self.state {
            PlaybackState::Playing => self.transition(PlaybackState::Paused),
            _ => false,
        }
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Clamp and record a seek; play/pause state is unchanged
    pub fn seek(&mut self, seconds: f64) -> Result<f64, PlayerError> {
        if !self.seekable {
            return Err(PlayerError::NotSeekable);
        }
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Err(PlayerError::InvalidState {
                action: "seek",
                state: self.state,
            });
        }

        let duration = self.duration.unwrap_or(0.0);
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, duration)
        } else {
            0.0
        };
        self.position = target;
        Ok(target)
    }

    /// Ask the host to enter or leave fullscreen; state follows the
    /// host's change notification
    pub fn toggle_fullscreen(&self, host: &mut dyn Host) {
        if host.is_fullscreen() {
            host.exit_fullscreen();
        } else {
            host.request_fullscreen();
        }
    }

    pub fn on_fullscreen_change(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    pub fn on_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration >= 0.0 {
            self.duration = Some(duration);
        }
    }

    pub fn on_time_update(&mut self, seconds: f64) {
        if seconds.is_finite() {
            self.position = seconds.max(0.0);
        }
    }

    /// First frame data is available
    pub fn on_ready(&mut self) -> bool {
        if self.state != PlaybackState::Loading {
            return false;
        }
        if self.play_requested {
            self.transition(PlaybackState::Playing)
        } else {
            self.transition(PlaybackState::Paused)
        }
    }

    /// The transport reports it started playing
    pub fn on_playing(&mut self) -> bool {
        match self.state {
            PlaybackState::Loading | PlaybackState::Paused => {
                self.play_requested = true;
                self.transition(PlaybackState::Playing)
            }
            _ => false,
        }
    }

    /// The transport reports it paused on its own
    pub fn on_paused(&mut self) -> bool {
        match self.state {
            PlaybackState::Playing => {
                self.play_requested = false;
                self.transition(PlaybackState::Paused)
            }
            _ => false,
        }
    }

    pub fn on_ended(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if let Some(duration) = self.duration {
            self.position = duration;
        }
        info!("Playback ended");
        self.transition(PlaybackState::Ended)
    }

    pub fn on_error(&mut self) -> bool {
        self.transition(PlaybackState::Error)
    }

    /// Map socket connection state onto playback state
    pub fn on_connection(&mut self, connection: ConnectionState) -> bool {
        match connection {
            ConnectionState::Connecting => match self.state {
                PlaybackState::Idle => self.transition(PlaybackState::Loading),
                _ => false,
            },
            ConnectionState::Open => match self.state {
                PlaybackState::Idle | PlaybackState::Loading => {
                    if self.play_requested {
                        self.transition(PlaybackState::Playing)
                    } else {
                        self.transition(PlaybackState::Paused)
                    }
                }
                _ => false,
            },
            ConnectionState::Closed => match self.state {
                PlaybackState::Error => false,
                _ => self.transition(PlaybackState::Ended),
            },
            ConnectionState::Failed => self.on_error(),
        }
    }

    /// Status line for a video or socket player in the current state
    pub fn status(&self) -> Option<PlayerStatus> {
        match (self.seekable, self.state) {
            (true, PlaybackState::Idle | PlaybackState::Loading) => Some(PlayerStatus::LoadingVideo),
            (true, PlaybackState::Error) => Some(PlayerStatus::VideoError),
            (false, PlaybackState::Idle | PlaybackState::Loading) => Some(PlayerStatus::Connecting),
            (false, PlaybackState::Ended | PlaybackState::Error) => Some(PlayerStatus::ConnectionLost),
            _ => None,
        }
    }
}
