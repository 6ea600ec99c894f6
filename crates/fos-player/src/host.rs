//! Host container integration

use crate::render_loop::FrameScheduler;

/// The window or container a player is mounted into.
///
/// Fullscreen requests are asynchronous: the host reports the outcome
/// through `Player::on_fullscreen_change`.
pub trait Host: FrameScheduler {
    fn request_fullscreen(&mut self);
    fn exit_fullscreen(&mut self);

    /// Whether the container is currently fullscreen
    fn is_fullscreen(&self) -> bool;
}
