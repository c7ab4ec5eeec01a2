//! Encore host
//!
//! Headless stand-in for the media player: it owns the settings store,
//! the Last.fm connection, the extension registry and the built-in
//! loved-rating and fingerprinting features, all driven from a single
//! [`orchestrator::HostOrchestrator`] loop.

pub mod commands;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod orchestrator;
pub mod session;

pub use config::HostConfig;
pub use error::{CommandError, HostError};
pub use fingerprint::{Companion, Fingerprint, FingerprintError, Fingerprinter, FpcalcFingerprinter};
pub use orchestrator::{FingerprintState, HostEvent, HostOrchestrator, ManifestSource};
pub use session::{LastfmConnector, RemoteConnector};
