//! Frame source variants

use crate::socket::{ConnectionState, SocketEvent, SocketFrameSource};
use crate::video::{DecodedVideoSource, VideoEvent};

/// Where a player gets its frames
pub enum FrameSource {
    /// Pull: the loop samples the media element's current picture
    Video(DecodedVideoSource),
    /// Push: frames arrive as decoded socket messages
    Socket(SocketFrameSource),
}

/// A drained source event, tagged by variant
#[derive(Debug)]
pub enum SourceEvent {
    Video(VideoEvent),
    Socket(SocketEvent),
}

impl FrameSource {
    pub fn start(&mut self) {
        match self {
            Self::Video(video) => video.start(),
            Self::Socket(socket) => socket.start(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            Self::Video(video) => video.stop(),
            Self::Socket(socket) => socket.stop(),
        }
    }

    pub fn poll(&mut self) -> Vec<SourceEvent> {
        match self {
            Self::Video(video) => video.poll().into_iter().map(SourceEvent::Video).collect(),
            Self::Socket(socket) => socket.poll().into_iter().map(SourceEvent::Socket).collect(),
        }
    }

    /// Started and not yet stopped, closed or failed
    pub fn is_active(&self) -> bool {
        match self {
            Self::Video(video) => video.is_active(),
            Self::Socket(socket) => socket.state().is_active(),
        }
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        match self {
            Self::Video(_) => None,
            Self::Socket(socket) => Some(socket.state()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Video(_) => "video",
            Self::Socket(_) => "socket",
        }
    }
}
