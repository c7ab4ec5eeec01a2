//! Host collaborator interfaces and the shared [`HostContext`].
//!
//! The host player provides UI action/markup registration, a
//! now-playing notification, a track database and an error surface.
//! Extensions only ever see these traits.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use encore_lastfm::RemoteService;
use encore_settings::SettingsStore;
use serde::{Deserialize, Serialize};

// ─── Entries ────────────────────────────────────────────────────────────

/// Identity of a library entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A library entry as the player knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_secs: Option<u64>,
    pub location: Option<PathBuf>,
}

impl Entry {
    pub fn new(id: impl Into<EntryId>, artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration_secs: None,
            location: None,
        }
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }
}

// ─── Handles ────────────────────────────────────────────────────────────

/// Handle of an inserted action group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionGroupId(pub u64);

/// Handle of a merged UI markup block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UiMergeId(pub u64);

/// Handle of a player signal subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandlerId(pub u64);

/// A user-triggerable action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    pub label: String,
    pub tooltip: String,
    pub icon: Option<PathBuf>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            tooltip: String::new(),
            icon: None,
        }
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = tooltip.into();
        self
    }

    pub fn with_icon(mut self, icon: Option<PathBuf>) -> Self {
        self.icon = icon;
        self
    }
}

// ─── Collaborators ──────────────────────────────────────────────────────

/// UI action and markup registration.
///
/// Removal returns `false` for handles that are unknown or already
/// removed; callers treat that as a no-op.
pub trait UiManager: Send + Sync {
    fn insert_action_group(&self, group: &str, actions: Vec<ActionSpec>) -> ActionGroupId;
    fn remove_action_group(&self, id: ActionGroupId) -> bool;
    fn add_ui(&self, markup: &str) -> UiMergeId;
    fn remove_ui(&self, id: UiMergeId) -> bool;
    /// Flush pending UI changes.
    fn ensure_update(&self) {}
    /// Entries currently selected in the library view.
    fn selected_entries(&self) -> Vec<Entry>;
}

pub trait Player: Send + Sync {
    /// The entry loaded in the player, playing or paused.
    fn playing_entry(&self) -> Option<Entry>;
    fn connect_playing_changed(&self) -> SignalHandlerId;
    fn disconnect(&self, id: SignalHandlerId) -> bool;
}

pub trait TrackDatabase: Send + Sync {
    fn set_rating(&self, id: &EntryId, rating: u8) -> bool;
    fn set_fingerprint(&self, id: &EntryId, fingerprint: &str) -> bool;
    fn commit(&self);
}

pub trait Notifier: Send + Sync {
    fn show_error(&self, title: &str, message: &str);
}

// ─── Context ────────────────────────────────────────────────────────────

/// Everything an extension may touch, shared by the host and every
/// extension instance.
#[derive(Clone)]
pub struct HostContext {
    pub settings: Arc<SettingsStore>,
    pub ui: Arc<dyn UiManager>,
    pub player: Arc<dyn Player>,
    pub db: Arc<dyn TrackDatabase>,
    pub notifier: Arc<dyn Notifier>,
    resource_dir: PathBuf,
    remote: Arc<RwLock<Option<Arc<dyn RemoteService>>>>,
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("resource_dir", &self.resource_dir)
            .field("has_remote", &self.remote().is_some())
            .finish_non_exhaustive()
    }
}

impl HostContext {
    pub fn new(
        settings: Arc<SettingsStore>,
        ui: Arc<dyn UiManager>,
        player: Arc<dyn Player>,
        db: Arc<dyn TrackDatabase>,
        notifier: Arc<dyn Notifier>,
        resource_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            ui,
            player,
            db,
            notifier,
            resource_dir: resource_dir.into(),
            remote: Arc::new(RwLock::new(None)),
        }
    }

    /// Resolve a bundled resource; `None` when the file does not exist.
    pub fn find_resource(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        let path = self.resource_dir.join(relative);
        path.is_file().then_some(path)
    }

    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    /// The current remote client, if one is connected.
    pub fn remote(&self) -> Option<Arc<dyn RemoteService>> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_remote(&self, remote: Option<Arc<dyn RemoteService>>) {
        *self.remote.write().unwrap_or_else(PoisonError::into_inner) = remote;
    }

    /// The global connectivity signal.
    pub fn connected(&self) -> bool {
        self.settings.connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::Headless;
    use encore_settings::Settings;

    #[test]
    fn test_entry_builder() {
        let entry = Entry::new("e1", "Boards of Canada", "Roygbiv")
            .with_duration(151)
            .with_location("/music/roygbiv.flac");
        assert_eq!(entry.id, EntryId::from("e1"));
        assert_eq!(entry.duration_secs, Some(151));
        assert_eq!(entry.location.as_deref(), Some(Path::new("/music/roygbiv.flac")));
    }

    #[test]
    fn test_find_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/love.png"), b"png").unwrap();

        let headless = Headless::new();
        let ctx = headless.context(Arc::new(SettingsStore::in_memory(Settings::default())), dir.path());

        assert_eq!(ctx.find_resource("img/love.png"), Some(dir.path().join("img/love.png")));
        assert_eq!(ctx.find_resource("img/ban.png"), None);
    }

    #[test]
    fn test_remote_shared_between_clones() {
        let headless = Headless::new();
        let ctx = headless.context(Arc::new(SettingsStore::in_memory(Settings::default())), "res");
        let clone = ctx.clone();
        assert!(clone.remote().is_none());

        ctx.set_remote(Some(Arc::new(crate::testing::RecordingRemote::default())));
        assert!(clone.remote().is_some());

        clone.set_remote(None);
        assert!(ctx.remote().is_none());
    }
}
