//! In-memory host collaborators.
//!
//! Used by the console host and by tests. They keep just enough state to
//! answer the collaborator traits and to let callers inspect what was
//! registered.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use encore_settings::SettingsStore;

use crate::host::{
    ActionGroupId, ActionSpec, Entry, EntryId, HostContext, Notifier, Player, SignalHandlerId,
    TrackDatabase, UiManager, UiMergeId,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── UI ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct UiState {
    next_id: u64,
    groups: BTreeMap<u64, (String, Vec<ActionSpec>)>,
    merges: BTreeMap<u64, String>,
    selection: Vec<Entry>,
    updates: usize,
}

#[derive(Default)]
pub struct MemoryUi {
    state: Mutex<UiState>,
}

impl MemoryUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_count(&self) -> usize {
        lock(&self.state).groups.len()
    }

    pub fn merge_count(&self) -> usize {
        lock(&self.state).merges.len()
    }

    /// Names of every registered action, across all groups.
    pub fn action_names(&self) -> Vec<String> {
        lock(&self.state)
            .groups
            .values()
            .flat_map(|(_, actions)| actions.iter().map(|a| a.name.clone()))
            .collect()
    }

    pub fn action(&self, name: &str) -> Option<ActionSpec> {
        lock(&self.state)
            .groups
            .values()
            .flat_map(|(_, actions)| actions.iter())
            .find(|a| a.name == name)
            .cloned()
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.action(name).is_some()
    }

    pub fn markup(&self) -> Vec<String> {
        lock(&self.state).merges.values().cloned().collect()
    }

    pub fn set_selection(&self, entries: Vec<Entry>) {
        lock(&self.state).selection = entries;
    }

    pub fn update_count(&self) -> usize {
        lock(&self.state).updates
    }
}

impl UiManager for MemoryUi {
    fn insert_action_group(&self, group: &str, actions: Vec<ActionSpec>) -> ActionGroupId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state.groups.insert(id, (group.to_string(), actions));
        tracing::debug!(group, id, "action group inserted");
        ActionGroupId(id)
    }

    fn remove_action_group(&self, id: ActionGroupId) -> bool {
        lock(&self.state).groups.remove(&id.0).is_some()
    }

    fn add_ui(&self, markup: &str) -> UiMergeId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state.merges.insert(id, markup.to_string());
        UiMergeId(id)
    }

    fn remove_ui(&self, id: UiMergeId) -> bool {
        lock(&self.state).merges.remove(&id.0).is_some()
    }

    fn ensure_update(&self) {
        lock(&self.state).updates += 1;
    }

    fn selected_entries(&self) -> Vec<Entry> {
        lock(&self.state).selection.clone()
    }
}

// ─── Player ─────────────────────────────────────────────────────────────

type PlayingListener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct PlayerState {
    entry: Option<Entry>,
    playing: bool,
    next_id: u64,
    subscribers: HashSet<u64>,
}

/// A player that only tracks what is loaded and who listens.
///
/// State changes are announced through the listener installed with
/// [`MemoryPlayer::on_change`], and only while at least one subscription
/// is connected.
#[derive(Default)]
pub struct MemoryPlayer {
    state: Mutex<PlayerState>,
    listener: Mutex<Option<PlayingListener>>,
}

impl MemoryPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        *lock(&self.listener) = Some(Arc::new(listener));
    }

    pub fn play(&self, entry: Entry) {
        {
            let mut state = lock(&self.state);
            state.entry = Some(entry);
            state.playing = true;
        }
        self.emit(true);
    }

    pub fn pause(&self) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.entry.is_some() && state.playing;
            state.playing = false;
            changed
        };
        if changed {
            self.emit(false);
        }
    }

    pub fn resume(&self) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.entry.is_some() && !state.playing;
            if changed {
                state.playing = true;
            }
            changed
        };
        if changed {
            self.emit(true);
        }
    }

    pub fn stop(&self) {
        let changed = {
            let mut state = lock(&self.state);
            state.playing = false;
            state.entry.take().is_some()
        };
        if changed {
            self.emit(false);
        }
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    fn emit(&self, playing: bool) {
        if self.subscriber_count() == 0 {
            return;
        }
        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener(playing);
        }
    }
}

impl Player for MemoryPlayer {
    fn playing_entry(&self) -> Option<Entry> {
        lock(&self.state).entry.clone()
    }

    fn connect_playing_changed(&self) -> SignalHandlerId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(id);
        SignalHandlerId(id)
    }

    fn disconnect(&self, id: SignalHandlerId) -> bool {
        lock(&self.state).subscribers.remove(&id.0)
    }
}

// ─── Track database ─────────────────────────────────────────────────────

#[derive(Default)]
struct DbState {
    ratings: HashMap<EntryId, u8>,
    fingerprints: HashMap<EntryId, String>,
    commits: usize,
}

#[derive(Default)]
pub struct MemoryTrackDb {
    state: Mutex<DbState>,
}

impl MemoryTrackDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rating(&self, id: &EntryId) -> Option<u8> {
        lock(&self.state).ratings.get(id).copied()
    }

    pub fn fingerprint(&self, id: &EntryId) -> Option<String> {
        lock(&self.state).fingerprints.get(id).cloned()
    }

    pub fn commit_count(&self) -> usize {
        lock(&self.state).commits
    }

    /// Number of entries touched in any way.
    pub fn mutation_count(&self) -> usize {
        let state = lock(&self.state);
        state.ratings.len() + state.fingerprints.len()
    }
}

impl TrackDatabase for MemoryTrackDb {
    fn set_rating(&self, id: &EntryId, rating: u8) -> bool {
        lock(&self.state).ratings.insert(id.clone(), rating.min(5));
        true
    }

    fn set_fingerprint(&self, id: &EntryId, fingerprint: &str) -> bool {
        lock(&self.state)
            .fingerprints
            .insert(id.clone(), fingerprint.to_string());
        true
    }

    fn commit(&self) {
        lock(&self.state).commits += 1;
    }
}

// ─── Notifier ───────────────────────────────────────────────────────────

/// Records user-facing errors and writes them to the log.
#[derive(Default)]
pub struct MemoryNotifier {
    errors: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        lock(&self.errors).clone()
    }

    pub fn error_count(&self) -> usize {
        lock(&self.errors).len()
    }
}

impl Notifier for MemoryNotifier {
    fn show_error(&self, title: &str, message: &str) {
        tracing::error!(title, "{message}");
        lock(&self.errors).push((title.to_string(), message.to_string()));
    }
}

// ─── Bundle ─────────────────────────────────────────────────────────────

/// One of each in-memory collaborator, kept concrete so callers can
/// inspect them after handing a [`HostContext`] to the extensions.
#[derive(Clone, Default)]
pub struct Headless {
    pub ui: Arc<MemoryUi>,
    pub player: Arc<MemoryPlayer>,
    pub db: Arc<MemoryTrackDb>,
    pub notifier: Arc<MemoryNotifier>,
}

impl Headless {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self, settings: Arc<SettingsStore>, resource_dir: impl Into<PathBuf>) -> HostContext {
        HostContext::new(
            settings,
            self.ui.clone(),
            self.player.clone(),
            self.db.clone(),
            self.notifier.clone(),
            resource_dir,
        )
    }
}
