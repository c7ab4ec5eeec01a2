// Shared test utilities for the orchestrator integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use encore_extension::{Entry, Headless};
use encore_host::{
    Companion, Fingerprint, FingerprintError, Fingerprinter, HostEvent, HostOrchestrator,
    ManifestSource, RemoteConnector,
};
use encore_lastfm::{LastfmError, RemoteService, TrackHandle};
use encore_settings::{Session, Settings, SettingsStore};
use tokio::sync::mpsc;

// ─── Remote ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum LovedReply {
    Loved(bool),
    Malformed,
    Hang,
}

/// Remote whose `is_loved` answer is configured per track title.
#[derive(Default)]
pub struct MockRemote {
    replies: Mutex<HashMap<String, LovedReply>>,
    pub lookups: AtomicUsize,
}

impl MockRemote {
    pub fn reply(&self, title: &str, reply: LovedReply) {
        self.replies.lock().unwrap().insert(title.to_string(), reply);
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    fn username(&self) -> &str {
        "tester"
    }

    async fn is_loved(&self, track: &TrackHandle) -> Result<bool, LastfmError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&track.title)
            .copied()
            .unwrap_or(LovedReply::Loved(false));
        match reply {
            LovedReply::Loved(loved) => Ok(loved),
            LovedReply::Malformed => Err(LastfmError::MalformedResponse("userloved".into())),
            LovedReply::Hang => std::future::pending().await,
        }
    }

    async fn update_now_playing(&self, _: &TrackHandle, _: Option<u64>) -> Result<(), LastfmError> {
        Ok(())
    }

    async fn scrobble(&self, _: &TrackHandle, _: i64, _: Option<u64>) -> Result<(), LastfmError> {
        Ok(())
    }

    async fn love(&self, _: &TrackHandle) -> Result<(), LastfmError> {
        Ok(())
    }

    async fn unlove(&self, _: &TrackHandle) -> Result<(), LastfmError> {
        Ok(())
    }
}

/// Hands out the shared [`MockRemote`] whenever a session is stored.
pub struct MockConnector {
    pub remote: Arc<MockRemote>,
    pub connects: AtomicUsize,
}

impl RemoteConnector for MockConnector {
    fn connect(&self, settings: &Settings) -> Result<Arc<dyn RemoteService>, LastfmError> {
        if settings.session.is_none() {
            return Err(LastfmError::Session("no stored session".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote.clone())
    }
}

// ─── Fingerprinter ──────────────────────────────────────────────────────

pub struct MockFingerprinter;

#[async_trait]
impl Fingerprinter for MockFingerprinter {
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        Ok(Fingerprint {
            duration: 180.0,
            fingerprint: format!("AQAD:{}", path.display()),
        })
    }
}

// ─── Harness ────────────────────────────────────────────────────────────

pub fn session() -> Session {
    Session {
        username: "tester".into(),
        key: "opaque".into(),
    }
}

/// Settings of a connected user with the given built-in features.
pub fn connected_settings(loved: bool, fingerprinter: bool) -> Settings {
    Settings {
        connected: true,
        session: Some(session()),
        loved,
        fingerprinter,
        ..Settings::default()
    }
}

pub fn entry(id: &str, title: &str) -> Entry {
    Entry::new(id, "Boards of Canada", title).with_location(format!("/music/{id}.flac"))
}

pub struct Harness {
    pub settings: Arc<SettingsStore>,
    pub headless: Headless,
    pub remote: Arc<MockRemote>,
    pub connector: Arc<MockConnector>,
    pub orchestrator: HostOrchestrator,
    pub inbox: mpsc::UnboundedReceiver<HostEvent>,
}

impl Harness {
    pub fn new(settings: Settings, companion: Companion, manifest: &str) -> Self {
        let settings = Arc::new(SettingsStore::in_memory(settings));
        let headless = Headless::new();
        let remote = Arc::new(MockRemote::default());
        let connector = Arc::new(MockConnector {
            remote: remote.clone(),
            connects: AtomicUsize::new(0),
        });
        let ctx = headless.context(settings.clone(), "/nonexistent/resources");

        let (orchestrator, inbox) = HostOrchestrator::new(
            ctx,
            connector.clone(),
            companion,
            ManifestSource::Inline(manifest.to_string()),
        );
        let events = orchestrator.sender();
        headless.player.on_change(move |playing| {
            let _ = events.send(HostEvent::PlayingChanged { playing });
        });

        Self {
            settings,
            headless,
            remote,
            connector,
            orchestrator,
            inbox,
        }
    }

    pub fn fingerprinting(settings: Settings) -> Self {
        Self::new(settings, Companion::Loaded(Arc::new(MockFingerprinter)), "")
    }

    /// Wait for the next event and hand it to the orchestrator. Returns
    /// a short label naming the event.
    pub async fn step(&mut self) -> &'static str {
        let event = tokio::time::timeout(Duration::from_secs(5), self.inbox.recv())
            .await
            .expect("no host event within 5s")
            .expect("inbox closed");
        let label = match &event {
            HostEvent::Setting(_) => "setting",
            HostEvent::PlayingChanged { .. } => "playing",
            HostEvent::ActionActivated(_) => "action",
            HostEvent::LovedResolved(_) => "loved",
            HostEvent::FingerprintResolved(_) => "fingerprint",
            HostEvent::Describe(_) => "describe",
            HostEvent::Shutdown => "shutdown",
        };
        self.orchestrator.handle(event);
        label
    }
}

/// Poll `cond` until it holds or a second has passed.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
