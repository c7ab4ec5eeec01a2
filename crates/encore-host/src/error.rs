use encore_lastfm::LastfmError;
use encore_settings::SettingsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("host task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors from console commands. None of them stop the host.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("last.fm error: {0}")]
    Remote(#[from] LastfmError),

    #[error("host is shutting down")]
    HostGone,
}
