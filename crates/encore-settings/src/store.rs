//! Settings document, typed accessors and change notifications.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::SettingsError;

/// Buffered change notifications per subscriber before it lags.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Default location of the settings document.
const DEFAULT_SETTINGS_PATH: &str = "data/settings.json";

// ─── Keys ───────────────────────────────────────────────────────────────

/// Top-level settings key. Change notifications carry exactly one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Connected,
    Session,
    Extensions,
    Loved,
    Fingerprinter,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::Connected,
        SettingKey::Session,
        SettingKey::Extensions,
        SettingKey::Loved,
        SettingKey::Fingerprinter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Session => "session",
            Self::Extensions => "extensions",
            Self::Loved => "loved",
            Self::Fingerprinter => "fingerprinter",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Document ───────────────────────────────────────────────────────────

/// Per-extension settings stored under `extensions.<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSettings {
    #[serde(default)]
    pub enabled: bool,
}

/// Stored Last.fm session. `key` is encrypted and opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub key: String,
}

/// The whole settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub extensions: BTreeMap<String, ExtensionSettings>,
    #[serde(default)]
    pub loved: bool,
    #[serde(default)]
    pub fingerprinter: bool,
}

/// Where the settings document lives.
#[derive(Debug, Clone)]
pub struct SettingsConfig {
    pub path: PathBuf,
}

impl SettingsConfig {
    pub fn from_env() -> Self {
        let path = std::env::var("ENCORE_SETTINGS_PATH")
            .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
        Self {
            path: PathBuf::from(path),
        }
    }
}

// ─── Store ──────────────────────────────────────────────────────────────

/// Settings store with a single writer.
///
/// Every mutation (including the read-modify-write of the `extensions`
/// map) runs under one write lock, is persisted while the lock is held,
/// and is announced on the change channel after the lock is released.
/// Writes that leave the document unchanged are not announced.
pub struct SettingsStore {
    current: RwLock<Settings>,
    path: Option<PathBuf>,
    changes: broadcast::Sender<SettingKey>,
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// A store that never touches the disk.
    pub fn in_memory(initial: Settings) -> Self {
        Self::with_path(initial, None)
    }

    /// Open the document at `path`. A missing file yields the defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let initial = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no settings file yet, using defaults");
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::with_path(initial, Some(path)))
    }

    fn with_path(initial: Settings, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(initial),
            path,
            changes,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingKey> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ── Typed accessors ─────────────────────────────────────────────

    pub fn connected(&self) -> bool {
        self.read().connected
    }

    pub fn set_connected(&self, connected: bool) -> Result<(), SettingsError> {
        self.set(SettingKey::Connected, connected, |s| &mut s.connected)
    }

    pub fn session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    pub fn set_session(&self, session: Option<Session>) -> Result<(), SettingsError> {
        self.set(SettingKey::Session, session, |s| &mut s.session)
    }

    pub fn loved(&self) -> bool {
        self.read().loved
    }

    pub fn set_loved(&self, loved: bool) -> Result<(), SettingsError> {
        self.set(SettingKey::Loved, loved, |s| &mut s.loved)
    }

    pub fn fingerprinter(&self) -> bool {
        self.read().fingerprinter
    }

    pub fn set_fingerprinter(&self, enabled: bool) -> Result<(), SettingsError> {
        self.set(SettingKey::Fingerprinter, enabled, |s| &mut s.fingerprinter)
    }

    pub fn extensions(&self) -> BTreeMap<String, ExtensionSettings> {
        self.read().extensions.clone()
    }

    /// Settings of one extension; absent entries read as disabled.
    pub fn extension(&self, name: &str) -> ExtensionSettings {
        self.read()
            .extensions
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Read-modify-write of one extension's entry in the `extensions` map.
    ///
    /// The read, the mutation and the write-back happen under the store's
    /// write lock, so toggles of different extensions never overwrite
    /// each other.
    pub fn update_extension<F>(&self, name: &str, mutate: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut ExtensionSettings),
    {
        self.update(SettingKey::Extensions, |settings| {
            let mut entry = settings.extensions.get(name).cloned().unwrap_or_default();
            mutate(&mut entry);
            if settings.extensions.get(name) == Some(&entry) {
                return false;
            }
            settings.extensions.insert(name.to_string(), entry);
            true
        })
    }

    // ── Internals ───────────────────────────────────────────────────

    fn set<T, F>(&self, key: SettingKey, value: T, field: F) -> Result<(), SettingsError>
    where
        T: PartialEq,
        F: FnOnce(&mut Settings) -> &mut T,
    {
        self.update(key, |settings| {
            let slot = field(settings);
            if *slot == value {
                return false;
            }
            *slot = value;
            true
        })
    }

    /// Apply `apply` under the write lock and persist the result.
    ///
    /// If persisting fails the previous document is restored and nothing
    /// is announced, so memory, disk and subscribers stay in agreement.
    fn update<F>(&self, key: SettingKey, apply: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Settings) -> bool,
    {
        {
            let mut guard = self.write();
            let previous = guard.clone();
            if !apply(&mut *guard) {
                return Ok(());
            }
            if let Err(e) = self.persist(&*guard) {
                tracing::error!(key = %key, "failed to persist settings, change reverted: {e}");
                *guard = previous;
                return Err(e);
            }
        }

        // A send error only means nobody is listening right now.
        let _ = self.changes.send(key);
        tracing::debug!(key = %key, "setting changed");
        Ok(())
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(settings)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
