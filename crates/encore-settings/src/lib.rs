//! Encore settings store.
//!
//! Holds the nested settings document shared by the host and every
//! extension (connectivity flag, Last.fm session, per-extension toggles,
//! built-in feature flags), persists it as JSON and broadcasts a
//! [`SettingKey`] whenever a top-level value changes.

pub mod error;
pub mod store;

pub use error::SettingsError;
pub use store::{
    ExtensionSettings, Session, SettingKey, Settings, SettingsConfig, SettingsStore,
};
