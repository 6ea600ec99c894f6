//! fOS Render - GPU frame pipeline
//!
//! Uploads decoded frames into a single texture and draws them as a
//! full-screen quad. A CPU overlay layer carries text above the video, and
//! the render surface stacks both onto a window.

mod color;
mod frame;
mod gpu;
mod overlay;
mod pipeline;
mod surface;
mod text;
mod uploader;

pub use color::Color;
pub use frame::Frame;
pub use gpu::{GpuConfig, GpuContext, GpuError};
pub use overlay::{OverlayCompositor, OverlayLayer, OverlaySurface};
pub use pipeline::{
    compile, link, FrameTexture, PipelineError, QuadProgram, QuadVertex, RenderTarget,
    ShaderPipeline, ShaderSource, VideoLayer, LAYER_FORMAT, QUAD_SHADER,
};
pub use surface::{RenderSurface, SurfaceConfig};
pub use text::{FontError, GlyphRasterizer, PlacedGlyph, TextStyle};
pub use uploader::{FrameSink, FrameUploader};

/// Errors from any stage of the render crate
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Font(#[from] FontError),
}
