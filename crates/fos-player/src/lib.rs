//! fOS Player - playback on top of the frame pipeline
//!
//! Ties a frame source, the render loop and the overlay together behind
//! a small state machine. The host window owns the event loop and calls
//! into [`Player`].

mod config;
mod controller;
mod error;
mod host;
mod player;
mod render_loop;

pub use config::{
    ConfigError, OverlaySettings, PlaybackSettings, PlayerConfig, SourceSettings, SurfaceSettings,
    DEFAULT_SOCKET_URL, DEFAULT_VIDEO_URL,
};
pub use controller::{format_time, PlayRequest, PlaybackController, PlaybackState, PlayerStatus};
pub use error::PlayerError;
pub use host::Host;
pub use player::{build_overlay, Player};
pub use render_loop::{FrameScheduler, LoopStats, PictureSource, RenderLoop, TickOutcome};
