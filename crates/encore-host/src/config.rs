//! Host configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use encore_lastfm::LastfmConfig;
use encore_settings::SettingsConfig;

/// Fallback session secret. Session keys encrypted with it are only as
/// safe as the settings file itself.
pub const DEFAULT_SESSION_SECRET: &str = "encore-dev-secret-change-me";

/// Everything the host reads from the environment at startup.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub settings: SettingsConfig,
    /// Extension manifest (`ENCORE_MANIFEST`).
    pub manifest_path: PathBuf,
    /// Bundled icons and other resources (`ENCORE_RESOURCE_DIR`).
    pub resource_dir: PathBuf,
    /// Upper bound for remote lookups (`ENCORE_LOOKUP_TIMEOUT_SECS`).
    pub lookup_timeout: Duration,
    /// Explicit `fpcalc` location (`ENCORE_FPCALC`); `PATH` otherwise.
    pub fpcalc_path: Option<PathBuf>,
    /// Secret the stored session key is encrypted under
    /// (`ENCORE_SESSION_SECRET`).
    pub session_secret: String,
    /// Last.fm application credentials; `None` disables the remote client.
    pub lastfm: Option<LastfmConfig>,
}

impl HostConfig {
    pub fn from_env() -> Self {
        let session_secret = std::env::var("ENCORE_SESSION_SECRET")
            .unwrap_or_else(|_| DEFAULT_SESSION_SECRET.to_string());
        if session_secret == DEFAULT_SESSION_SECRET {
            tracing::warn!(
                "ENCORE_SESSION_SECRET is not set; the stored Last.fm session key is \
                 encrypted with a well-known default"
            );
        }

        let lastfm = LastfmConfig::from_env();
        if lastfm.is_none() {
            tracing::warn!("LASTFM_API_KEY/LASTFM_API_SECRET not set; Last.fm features stay offline");
        }

        Self {
            settings: SettingsConfig::from_env(),
            manifest_path: std::env::var("ENCORE_MANIFEST")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("extensions.toml")),
            resource_dir: std::env::var("ENCORE_RESOURCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("resources")),
            lookup_timeout: Duration::from_secs(
                std::env::var("ENCORE_LOOKUP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            fpcalc_path: std::env::var("ENCORE_FPCALC")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            session_secret,
            lastfm,
        }
    }
}
