//! fOS Media - frame sources
//!
//! Two ways frames reach the renderer:
//! - [`DecodedVideoSource`]: a media element decodes a video URL and the
//!   render loop samples its current picture
//! - [`SocketFrameSource`]: still images pushed over a WebSocket, decoded
//!   off the UI thread

mod decode;
mod error;
mod event;
mod ffmpeg;
mod socket;
mod source;
mod video;

pub use decode::{decode_frame, decode_frame_blocking};
pub use error::MediaError;
pub use event::{EventBus, Subscription};
pub use ffmpeg::{parse_frame_rate, parse_probe, FfmpegMedia, ProbeInfo};
pub use socket::{ConnectionState, SocketEvent, SocketFrameSource};
pub use source::{FrameSource, SourceEvent};
pub use video::{DecodedVideoSource, MediaElement, MediaEvent, VideoEvent};
