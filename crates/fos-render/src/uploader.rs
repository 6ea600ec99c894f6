//! Frame Uploader
//!
//! Pushes decoded frames into the render target. Frames are moved in and
//! dropped as soon as the draw call returns.

use crate::frame::Frame;
use crate::pipeline::{PipelineError, RenderTarget, ShaderPipeline, VideoLayer};
use tracing::{debug, warn};

/// Destination for decoded frames
pub trait FrameSink {
    /// Upload and draw one frame. The frame is consumed either way.
    fn draw(&mut self, frame: Frame) -> Result<(), PipelineError>;

    /// True while a submitted draw has not finished on the GPU
    fn is_busy(&self) -> bool;

    /// Free GPU objects; further draws fail
    fn release(&mut self) {}
}

/// Uploads frames into a single [`RenderTarget`]
pub struct FrameUploader {
    pipeline: ShaderPipeline,
    target: Option<RenderTarget>,
    frames_drawn: u64,
}

impl FrameUploader {
    pub fn new(pipeline: ShaderPipeline, target: RenderTarget) -> Self {
        Self {
            pipeline,
            target: Some(target),
            frames_drawn: 0,
        }
    }

    /// Upload `frame` and issue the draw
    pub fn push(&mut self, frame: Frame) -> Result<(), PipelineError> {
        let target = self.target.as_mut().ok_or(PipelineError::Disposed)?;
        let result = self.pipeline.upload_and_draw(target, &frame);
        drop(frame);

        if result.is_ok() {
            self.frames_drawn += 1;
        }
        result
    }

    /// Video layer, `None` once disposed
    pub fn layer(&self) -> Option<VideoLayer<'_>> {
        self.target.as_ref().map(RenderTarget::layer)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Release the render target. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(target) = self.target.take() {
            debug!("Disposing frame uploader after {} frames", self.frames_drawn);
            self.pipeline.dispose(target);
        }
    }
}

impl FrameSink for FrameUploader {
    fn draw(&mut self, frame: Frame) -> Result<(), PipelineError> {
        self.push(frame)
    }

    fn is_busy(&self) -> bool {
        self.target.as_ref().is_some_and(RenderTarget::is_busy)
    }

    fn release(&mut self) {
        self.dispose();
    }
}

impl Drop for FrameUploader {
    fn drop(&mut self) {
        if self.target.is_some() {
            warn!("Frame uploader dropped without dispose");
            self.dispose();
        }
    }
}
