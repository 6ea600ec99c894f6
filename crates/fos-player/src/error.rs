//! Player errors

use crate::config::ConfigError;
use crate::controller::PlaybackState;
use fos_media::MediaError;
use fos_render::{PipelineError, RenderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: PlaybackState,
    },

    #[error("Live streams are not seekable")]
    NotSeekable,
}

impl From<PipelineError> for PlayerError {
    fn from(e: PipelineError) -> Self {
        Self::Render(RenderError::Pipeline(e))
    }
}

impl PlayerError {
    /// Shader compile or link failure
    pub fn is_shader_failure(&self) -> bool {
        matches!(
            self,
            Self::Render(RenderError::Pipeline(
                PipelineError::ShaderCompileFailure(_) | PipelineError::ShaderLinkFailure(_)
            ))
        )
    }
}
