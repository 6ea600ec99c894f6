//! fOS View: single-window video player
//!
//! Usage: `fos-view [config.toml | ws://host:port | video-url]`
//!
//! The config path may also come from `FOS_VIEW_CONFIG`. With no argument
//! the default video endpoint is played.

mod app;

use anyhow::{Context, Result};
use fos_player::PlayerConfig;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_FILTER: &str = "fos_view=info,fos_player=info,fos_media=info,fos_render=info";

/// Resolve the player configuration from the first argument or the
/// environment
fn resolve_config(arg: Option<&str>, env: Option<&str>) -> Result<PlayerConfig> {
    let config = match arg.or(env) {
        None => PlayerConfig::default(),
        Some(path) if path.ends_with(".toml") => {
            PlayerConfig::load(Path::new(path)).with_context(|| format!("loading {}", path))?
        }
        Some(url) if url.starts_with("ws://") || url.starts_with("wss://") => PlayerConfig::socket_stream(url),
        Some(url) => PlayerConfig::video(url, None),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with_target(false)
        .compact()
        .init();

    let arg = std::env::args().nth(1);
    let env = std::env::var("FOS_VIEW_CONFIG").ok();
    let config = resolve_config(arg.as_deref(), env.as_deref())?;

    info!("fOS View starting ({})", config.source.url());

    let runtime = tokio::runtime::Runtime::new()?;
    app::run(config, runtime)?;

    info!("fOS View shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_player::SourceSettings;

    #[test]
    fn test_default_config_plays_video() {
        let config = resolve_config(None, None).unwrap();
        assert!(matches!(config.source, SourceSettings::Video { .. }));
        assert!(!config.playback.autoplay);
    }

    #[test]
    fn test_ws_argument_selects_stream() {
        let config = resolve_config(Some("ws://localhost:9000"), None).unwrap();
        assert!(matches!(config.source, SourceSettings::Socket { .. }));
        assert_eq!(config.overlay.text.as_deref(), Some("Video Stream"));
    }

    #[test]
    fn test_argument_wins_over_env() {
        let config = resolve_config(Some("clip.mp4"), Some("ws://localhost:9000")).unwrap();
        assert_eq!(config.source.url(), "clip.mp4");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(resolve_config(Some("/nonexistent/fos-view.toml"), None).is_err());
    }
}
