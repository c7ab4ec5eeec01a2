//! Test doubles shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use encore_lastfm::{LastfmError, RemoteService, TrackHandle};

use crate::error::ExtensionError;
use crate::host::{ActionSpec, HostContext};
use crate::lifecycle::Extension;
use crate::player::PlayerAware;

// ─── Remote ─────────────────────────────────────────────────────────────

/// Remote service that records every call as `"<method> <artist> - <title>"`.
#[derive(Default)]
pub struct RecordingRemote {
    calls: Mutex<Vec<String>>,
    pub loved: bool,
}

impl RecordingRemote {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &str, track: &TrackHandle) {
        self.calls.lock().unwrap().push(format!("{method} {track}"));
    }
}

#[async_trait]
impl RemoteService for RecordingRemote {
    fn username(&self) -> &str {
        "tester"
    }

    async fn is_loved(&self, track: &TrackHandle) -> Result<bool, LastfmError> {
        self.record("is_loved", track);
        Ok(self.loved)
    }

    async fn update_now_playing(
        &self,
        track: &TrackHandle,
        _duration_secs: Option<u64>,
    ) -> Result<(), LastfmError> {
        self.record("now_playing", track);
        Ok(())
    }

    async fn scrobble(
        &self,
        track: &TrackHandle,
        _timestamp: i64,
        _duration_secs: Option<u64>,
    ) -> Result<(), LastfmError> {
        self.record("scrobble", track);
        Ok(())
    }

    async fn love(&self, track: &TrackHandle) -> Result<(), LastfmError> {
        self.record("love", track);
        Ok(())
    }

    async fn unlove(&self, track: &TrackHandle) -> Result<(), LastfmError> {
        self.record("unlove", track);
        Ok(())
    }
}

/// Let spawned tasks on the test runtime run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ─── Extension ──────────────────────────────────────────────────────────

#[derive(Default)]
struct CounterState {
    initialised: AtomicUsize,
    dismantled: AtomicUsize,
    actions: AtomicUsize,
    plays: AtomicUsize,
    fail_next: AtomicBool,
}

/// Shared view of what a [`CountingExtension`] went through.
#[derive(Clone, Default)]
pub struct Counters(Arc<CounterState>);

impl Counters {
    pub fn initialised(&self) -> usize {
        self.0.initialised.load(Ordering::SeqCst)
    }

    pub fn dismantled(&self) -> usize {
        self.0.dismantled.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> usize {
        self.0.actions.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> usize {
        self.0.plays.load(Ordering::SeqCst)
    }

    pub fn fail_next_initialise(&self) {
        self.0.fail_next.store(true, Ordering::SeqCst);
    }
}

/// Player-aware extension with one action and a markup block, counting
/// every hook call.
pub struct CountingExtension {
    name: String,
    markup: String,
    counters: Counters,
}

impl CountingExtension {
    pub fn new(name: &str, counters: &Counters) -> Self {
        Self {
            name: name.to_string(),
            markup: format!("<ui><toolbar><toolitem action=\"{name}Ping\"/></toolbar></ui>"),
            counters: counters.clone(),
        }
    }
}

impl Extension for CountingExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn ui_markup(&self) -> Option<&str> {
        Some(&self.markup)
    }

    fn actions(&self, _ctx: &HostContext) -> Vec<ActionSpec> {
        vec![ActionSpec::new(format!("{}Ping", self.name), "Ping")]
    }

    fn initialise(&mut self, _ctx: &HostContext) -> Result<(), ExtensionError> {
        if self.counters.0.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ExtensionError::Construction {
                name: self.name.clone(),
                reason: "refused to start".into(),
            });
        }
        self.counters.0.initialised.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dismantle(&mut self, _ctx: &HostContext) {
        self.counters.0.dismantled.fetch_add(1, Ordering::SeqCst);
    }

    fn activate_action(&mut self, _action: &str, _ctx: &HostContext) {
        self.counters.0.actions.fetch_add(1, Ordering::SeqCst);
    }

    fn as_player_aware(&mut self) -> Option<&mut dyn PlayerAware> {
        Some(self)
    }
}

impl PlayerAware for CountingExtension {
    fn playing_changed(&mut self, _playing: bool, _ctx: &HostContext) {
        self.counters.0.plays.fetch_add(1, Ordering::SeqCst);
    }
}
