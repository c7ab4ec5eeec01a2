//! Extension system error types.

use thiserror::Error;

use encore_lastfm::LastfmError;
use encore_settings::SettingsError;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("no extension registered under {0:?}")]
    Unresolved(String),

    #[error("failed to construct extension {name}: {reason}")]
    Construction { name: String, reason: String },

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("remote service error: {0}")]
    Remote(#[from] LastfmError),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
