//! Player configuration
//!
//! Loaded from TOML. Every section has defaults, so an empty file is a
//! valid configuration for the video endpoint.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

/// Default video endpoint
pub const DEFAULT_VIDEO_URL: &str = "http://localhost:3001/video";

/// Default frame socket endpoint
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:3001";

/// Layer size and presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSettings {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            vsync: true,
        }
    }
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSettings {
    /// Video URL or file path decoded by the media backend
    Video { url: String },
    /// Binary WebSocket pushing still images
    Socket { url: String },
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::Video {
            url: DEFAULT_VIDEO_URL.to_string(),
        }
    }
}

impl SourceSettings {
    pub fn url(&self) -> &str {
        match self {
            Self::Video { url } | Self::Socket { url } => url,
        }
    }
}

/// Overlay text and style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub text: Option<String>,
    /// TTF/OTF font; without one the overlay stays transparent
    pub font_path: Option<PathBuf>,
    pub size: f32,
    /// 0xRRGGBB
    pub color: u32,
    /// Baseline origin of the first line, in layer pixels
    pub anchor: [f32; 2],
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            text: None,
            font_path: None,
            size: 14.0,
            color: 0xFFFFFF,
            anchor: [10.0, 20.0],
        }
    }
}

/// Playback behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Start playing as soon as the source is ready
    pub autoplay: bool,
    /// Position of the poster frame, in seconds
    pub poster_time: f64,
    /// Overlay refresh and source pump rate, in Hz
    pub tick_rate: u32,
    /// Decoded socket frames buffered ahead of the UI
    pub frame_channel_capacity: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            autoplay: false,
            poster_time: 0.1,
            tick_rate: 60,
            frame_channel_capacity: 4,
        }
    }
}

/// Complete player configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub surface: SurfaceSettings,
    pub source: SourceSettings,
    pub overlay: OverlaySettings,
    pub playback: PlaybackSettings,
}

impl PlayerConfig {
    /// Video player with an optional caption
    pub fn video(url: impl Into<String>, overlay_text: Option<String>) -> Self {
        Self {
            source: SourceSettings::Video { url: url.into() },
            overlay: OverlaySettings {
                text: overlay_text,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Live socket stream, labelled and playing on connect
    pub fn socket_stream(url: impl Into<String>) -> Self {
        Self {
            source: SourceSettings::Socket { url: url.into() },
            overlay: OverlaySettings {
                text: Some("Video Stream".to_string()),
                size: 16.0,
                anchor: [10.0, 24.0],
                ..Default::default()
            },
            playback: PlaybackSettings {
                autoplay: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::InvalidSurface);
        }

        match &self.source {
            SourceSettings::Video { url } => {
                if url.trim().is_empty() {
                    return Err(ConfigError::InvalidUrl(url.clone()));
                }
            }
            SourceSettings::Socket { url } => {
                let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
                if parsed.scheme() != "ws" {
                    return Err(ConfigError::InvalidUrl(url.clone()));
                }
            }
        }

        if !(self.overlay.size > 0.0 && self.overlay.size.is_finite()) {
            return Err(ConfigError::InvalidFontSize);
        }
        if !(self.playback.poster_time >= 0.0 && self.playback.poster_time.is_finite()) {
            return Err(ConfigError::InvalidPosterTime);
        }
        if self.playback.tick_rate == 0 || self.playback.tick_rate > 240 {
            return Err(ConfigError::InvalidTickRate);
        }
        if self.playback.frame_channel_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Parse(String),

    #[error("Surface dimensions must be non-zero")]
    InvalidSurface,

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Overlay font size must be positive")]
    InvalidFontSize,

    #[error("Poster time must be a non-negative number of seconds")]
    InvalidPosterTime,

    #[error("Tick rate must be between 1 and 240 Hz")]
    InvalidTickRate,

    #[error("Frame channel capacity must be at least 1")]
    InvalidCapacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PlayerConfig::default();
        assert_eq!(config.surface.width, 640);
        assert_eq!(config.surface.height, 360);
        assert_eq!(config.source.url(), DEFAULT_VIDEO_URL);
        assert_eq!(config.playback.poster_time, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = PlayerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_socket_source_from_toml() {
        let config = PlayerConfig::from_toml_str(
            r#"
            [source]
            kind = "socket"
            url = "ws://127.0.0.1:9000"

            [overlay]
            text = "Live"
            color = 0xFF0000
            "#,
        )
        .unwrap();

        assert_eq!(
            config.source,
            SourceSettings::Socket {
                url: "ws://127.0.0.1:9000".to_string()
            }
        );
        assert_eq!(config.overlay.text.as_deref(), Some("Live"));
        assert_eq!(config.overlay.color, 0xFF0000);
        assert_eq!(config.overlay.size, 14.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PlayerConfig::default();
        config.surface.width = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSurface)));

        let mut config = PlayerConfig::socket_stream("http://localhost:3001");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));
        config.source = SourceSettings::Socket {
            url: DEFAULT_SOCKET_URL.to_string(),
        };
        assert!(config.validate().is_ok());

        config.playback.poster_time = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPosterTime)));
    }

    #[test]
    fn test_unknown_source_kind_is_parse_error() {
        let err = PlayerConfig::from_toml_str("[source]\nkind = \"rtsp\"\nurl = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_socket_preset() {
        let config = PlayerConfig::socket_stream(DEFAULT_SOCKET_URL);
        assert!(config.playback.autoplay);
        assert_eq!(config.overlay.text.as_deref(), Some("Video Stream"));
        assert_eq!(config.overlay.anchor, [10.0, 24.0]);
    }
}
