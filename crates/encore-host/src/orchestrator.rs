//! Host orchestrator: the single owner of every state transition.
//!
//! Settings changes drive the remote client and the extension registry.
//! Two built-in features follow the same enable/connect pattern without
//! being loaded from the manifest:
//!
//! - loved auto-rating: while `loved ∧ connected`, every newly playing
//!   entry is looked up on Last.fm and rated 5 stars if the user loved it;
//! - fingerprinting: while `fingerprinter ∧ connected` and the `fpcalc`
//!   companion is available, a `FingerprintSong` action fingerprints the
//!   selected entries.
//!
//! Remote lookups run on spawned tasks and come back as [`HostEvent`]s,
//! so the track database and the UI are only touched from the owner.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use encore_extension::{
    current_track, run_lookup, ActionGroupId, ActionSpec, AsyncLookupResult, ExtensionCatalog,
    ExtensionRegistry, ExtensionSummary, HostContext, LookupError, PlayerObservation, UiMergeId,
};
use encore_settings::SettingKey;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::fingerprint::{Companion, Fingerprint, Fingerprinter};
use crate::session::RemoteConnector;

pub const FINGERPRINT_ACTION: &str = "FingerprintSong";
const FINGERPRINT_GROUP: &str = "EncoreFingerprinter";
const FINGERPRINT_ICON: &str = "img/as.png";
const FINGERPRINT_UI: &str = r#"<ui>
  <popup name="BrowserSourceViewPopup">
    <menuitem name="FingerprintSongPopup" action="FingerprintSong"/>
  </popup>
  <popup name="PlaylistViewPopup">
    <menuitem name="FingerprintSongPopup" action="FingerprintSong"/>
  </popup>
  <popup name="QueuePlaylistViewPopup">
    <menuitem name="FingerprintSongPopup" action="FingerprintSong"/>
  </popup>
</ui>"#;

/// Rating written for tracks the user loved on Last.fm.
pub const LOVED_RATING: u8 = 5;

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Events ─────────────────────────────────────────────────────────────

/// Input of the owner loop.
#[derive(Debug)]
pub enum HostEvent {
    Setting(SettingKey),
    PlayingChanged { playing: bool },
    ActionActivated(String),
    LovedResolved(AsyncLookupResult<bool>),
    FingerprintResolved(AsyncLookupResult<Fingerprint>),
    /// Reply with a summary of every loaded extension.
    Describe(oneshot::Sender<Vec<ExtensionSummary>>),
    Shutdown,
}

/// Where the extension manifest comes from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    Path(PathBuf),
    Inline(String),
}

// ─── Fingerprinting feature ─────────────────────────────────────────────

enum FingerprintFeature {
    /// The companion failed to load at startup. Terminal.
    Unavailable { reason: String },
    Inactive {
        fingerprinter: Arc<dyn Fingerprinter>,
    },
    Active {
        fingerprinter: Arc<dyn Fingerprinter>,
        action_group: ActionGroupId,
        ui_merge: UiMergeId,
    },
}

/// Observable state of the fingerprinting feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintState {
    Unavailable,
    Inactive,
    Active,
}

// ─── Orchestrator ───────────────────────────────────────────────────────

pub struct HostOrchestrator {
    ctx: HostContext,
    connector: Arc<dyn RemoteConnector>,
    catalog: ExtensionCatalog,
    manifest: ManifestSource,
    registry: Option<ExtensionRegistry>,
    loved: PlayerObservation,
    fingerprint: FingerprintFeature,
    lookup_timeout: Duration,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl HostOrchestrator {
    /// Build the orchestrator and the inbox its [`Self::run`] loop reads.
    pub fn new(
        ctx: HostContext,
        connector: Arc<dyn RemoteConnector>,
        companion: Companion,
        manifest: ManifestSource,
    ) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (events, inbox) = mpsc::unbounded_channel();
        let fingerprint = match companion {
            Companion::Loaded(fingerprinter) => FingerprintFeature::Inactive { fingerprinter },
            Companion::Failed(reason) => FingerprintFeature::Unavailable { reason },
        };

        let orchestrator = Self {
            ctx,
            connector,
            catalog: ExtensionCatalog::with_builtins(),
            manifest,
            registry: None,
            loved: PlayerObservation::new(),
            fingerprint,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            events,
        };
        (orchestrator, inbox)
    }

    pub fn with_catalog(mut self, catalog: ExtensionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Sender feeding this orchestrator's inbox.
    pub fn sender(&self) -> mpsc::UnboundedSender<HostEvent> {
        self.events.clone()
    }

    pub fn context(&self) -> &HostContext {
        &self.ctx
    }

    pub fn registry(&self) -> Option<&ExtensionRegistry> {
        self.registry.as_ref()
    }

    pub fn loved_active(&self) -> bool {
        self.loved.is_connected()
    }

    pub fn fingerprint_state(&self) -> FingerprintState {
        match self.fingerprint {
            FingerprintFeature::Unavailable { .. } => FingerprintState::Unavailable,
            FingerprintFeature::Inactive { .. } => FingerprintState::Inactive,
            FingerprintFeature::Active { .. } => FingerprintState::Active,
        }
    }

    // ── Activation ──────────────────────────────────────────────────

    /// Reconcile connectivity and the built-in features, then load the
    /// extensions.
    pub fn activate(&mut self) {
        self.connection_changed();

        if self.registry.is_none() {
            let loaded = match &self.manifest {
                ManifestSource::Path(path) => {
                    ExtensionRegistry::load_path(path, &self.catalog, &self.ctx)
                }
                ManifestSource::Inline(source) => {
                    ExtensionRegistry::load(source, &self.catalog, &self.ctx)
                }
            };
            self.registry = Some(loaded.unwrap_or_else(|e| {
                tracing::error!("failed to load extension manifest: {e}");
                ExtensionRegistry::default()
            }));
        }
        tracing::info!("host activated");
    }

    /// Tear everything down: extensions, built-in features, remote client.
    pub fn deactivate(&mut self) {
        if let Some(mut registry) = self.registry.take() {
            registry.destroy(&self.ctx);
        }
        self.loved.disconnect(&self.ctx);
        self.release_fingerprinter();
        self.ctx.set_remote(None);
        tracing::info!("host deactivated");
    }

    /// Re-derive every piece of state from the settings. Used when
    /// change notifications were lost.
    pub fn resync(&mut self) {
        self.connection_changed();
        if let Some(registry) = self.registry.as_mut() {
            registry.setting_changed(SettingKey::Connected, &self.ctx);
            registry.setting_changed(SettingKey::Extensions, &self.ctx);
        }
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// Handle one event. Returns `false` on [`HostEvent::Shutdown`].
    pub fn handle(&mut self, event: HostEvent) -> bool {
        match event {
            HostEvent::Setting(key) => self.setting_changed(key),
            HostEvent::PlayingChanged { playing } => {
                if let Some(registry) = self.registry.as_mut() {
                    registry.playing_changed(playing, &self.ctx);
                }
                if playing && self.loved.is_connected() {
                    self.loved_updater();
                }
            }
            HostEvent::ActionActivated(action) => self.action_activated(&action),
            HostEvent::LovedResolved(result) => self.apply_loved(result),
            HostEvent::FingerprintResolved(result) => self.apply_fingerprint(result),
            HostEvent::Describe(reply) => {
                let summaries = self
                    .registry
                    .as_ref()
                    .map(ExtensionRegistry::summaries)
                    .unwrap_or_default();
                let _ = reply.send(summaries);
            }
            HostEvent::Shutdown => return false,
        }
        true
    }

    /// Activate, then process settings changes and inbox events until
    /// [`HostEvent::Shutdown`]; deactivate on the way out.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<HostEvent>) {
        let mut changes = self.ctx.settings.subscribe();
        self.activate();

        loop {
            let event = tokio::select! {
                event = inbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                change = changes.recv() => match change {
                    Ok(key) => HostEvent::Setting(key),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "settings notifications lagged, resyncing");
                        self.resync();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if !self.handle(event) {
                break;
            }
        }

        self.deactivate();
    }

    fn setting_changed(&mut self, key: SettingKey) {
        tracing::debug!(key = %key, "setting changed");
        match key {
            SettingKey::Connected => {
                self.connection_changed();
                if let Some(registry) = self.registry.as_mut() {
                    registry.setting_changed(key, &self.ctx);
                }
            }
            SettingKey::Session => {
                if self.ctx.connected() {
                    self.connect_remote();
                }
            }
            SettingKey::Extensions => {
                if let Some(registry) = self.registry.as_mut() {
                    registry.setting_changed(key, &self.ctx);
                }
            }
            SettingKey::Loved => self.reconcile_loved(),
            SettingKey::Fingerprinter => self.reconcile_fingerprinter(),
        }
    }

    fn action_activated(&mut self, action: &str) {
        if action == FINGERPRINT_ACTION {
            if matches!(self.fingerprint, FingerprintFeature::Active { .. }) {
                self.fingerprint_selection();
            }
            return;
        }
        let handled = self
            .registry
            .as_mut()
            .is_some_and(|registry| registry.activate_action(action, &self.ctx));
        if !handled {
            tracing::debug!(action, "no active extension handles this action");
        }
    }

    // ── Connectivity ────────────────────────────────────────────────

    /// Build or drop the remote client, then reconcile the built-in
    /// features that depend on it.
    pub fn connection_changed(&mut self) {
        if self.ctx.connected() {
            self.connect_remote();
        } else if self.ctx.remote().is_some() {
            self.ctx.set_remote(None);
            tracing::info!("disconnected from Last.fm");
        }

        self.reconcile_loved();
        self.reconcile_fingerprinter();
    }

    fn connect_remote(&mut self) {
        match self.connector.connect(&self.ctx.settings.snapshot()) {
            Ok(remote) => {
                tracing::info!(username = %remote.username(), "connected to Last.fm");
                self.ctx.set_remote(Some(remote));
            }
            Err(e) => {
                tracing::warn!("cannot build Last.fm client: {e}");
                self.ctx.set_remote(None);
            }
        }
    }

    // ── Loved auto-rating ───────────────────────────────────────────

    /// Hold the player subscription exactly while `loved ∧ connected`.
    pub fn reconcile_loved(&mut self) {
        let wanted = self.ctx.settings.loved() && self.ctx.connected();
        if wanted {
            if self.loved.connect(&self.ctx) {
                tracing::info!("loved auto-rating enabled");
            }
        } else if self.loved.disconnect(&self.ctx) {
            tracing::info!("loved auto-rating disabled");
        }
    }

    /// Look up the loved status of the entry playing now.
    fn loved_updater(&mut self) {
        let (entry, track) = current_track(&self.ctx);
        let (Some(entry), Some(track), Some(remote)) = (entry, track, self.ctx.remote()) else {
            return;
        };

        let events = self.events.clone();
        let timeout = self.lookup_timeout;
        tracing::debug!(entry = %entry.id, track = %track, "checking loved status");
        spawn_lookup(async move {
            let result = run_lookup(entry.id, timeout, async move {
                remote.is_loved(&track).await
            })
            .await;
            let _ = events.send(HostEvent::LovedResolved(result));
        });
    }

    /// Rate the entry if it is still playing, auto-rating is still on and
    /// the user loved it.
    fn apply_loved(&mut self, result: AsyncLookupResult<bool>) {
        if !self.loved.is_connected() {
            tracing::debug!(entry = %result.requested_for, "auto-rating off, discarding loved result");
            return;
        }

        let entry = result.requested_for.clone();
        let playing = self.ctx.player.playing_entry().map(|e| e.id);
        match result.into_relevant(playing.as_ref()) {
            Some(true) => {
                if self.ctx.db.set_rating(&entry, LOVED_RATING) {
                    self.ctx.db.commit();
                    tracing::info!(entry = %entry, "loved track rated");
                }
            }
            Some(false) => tracing::debug!(entry = %entry, "track is not loved"),
            None => {}
        }
    }

    // ── Fingerprinting ──────────────────────────────────────────────

    /// Bring the fingerprinting feature in line with
    /// `fingerprinter ∧ connected`.
    pub fn reconcile_fingerprinter(&mut self) {
        let requested = self.ctx.settings.fingerprinter();
        let wanted = requested && self.ctx.connected();

        match &self.fingerprint {
            FingerprintFeature::Unavailable { reason } => {
                if requested {
                    let message = format!("Fingerprinting is not available: {reason}");
                    if let Err(e) = self.ctx.settings.set_fingerprinter(false) {
                        tracing::error!("failed to revert fingerprinter setting: {e}");
                    }
                    self.ctx.notifier.show_error("Last.fm fingerprinter", &message);
                }
            }
            FingerprintFeature::Active { .. } if !wanted => self.release_fingerprinter(),
            FingerprintFeature::Inactive { fingerprinter } if wanted => {
                let fingerprinter = fingerprinter.clone();
                self.activate_fingerprinter(fingerprinter);
            }
            _ => {}
        }
    }

    fn activate_fingerprinter(&mut self, fingerprinter: Arc<dyn Fingerprinter>) {
        let action = ActionSpec::new(FINGERPRINT_ACTION, "_Fingerprint Song")
            .with_tooltip("Get this song fingerprinted.")
            .with_icon(self.ctx.find_resource(FINGERPRINT_ICON));
        let action_group = self
            .ctx
            .ui
            .insert_action_group(FINGERPRINT_GROUP, vec![action]);
        let ui_merge = self.ctx.ui.add_ui(FINGERPRINT_UI);
        self.ctx.ui.ensure_update();

        self.fingerprint = FingerprintFeature::Active {
            fingerprinter,
            action_group,
            ui_merge,
        };
        tracing::info!("fingerprinting enabled");
    }

    fn release_fingerprinter(&mut self) {
        let FingerprintFeature::Active {
            fingerprinter,
            action_group,
            ui_merge,
        } = &self.fingerprint
        else {
            return;
        };
        let (fingerprinter, action_group, ui_merge) =
            (fingerprinter.clone(), *action_group, *ui_merge);

        if !self.ctx.ui.remove_ui(ui_merge) {
            tracing::debug!("fingerprint menu was already removed");
        }
        if !self.ctx.ui.remove_action_group(action_group) {
            tracing::debug!("fingerprint actions were already removed");
        }
        self.ctx.ui.ensure_update();

        self.fingerprint = FingerprintFeature::Inactive { fingerprinter };
        tracing::info!("fingerprinting disabled");
    }

    /// Request a fingerprint for every selected entry with a file.
    fn fingerprint_selection(&mut self) {
        let FingerprintFeature::Active { fingerprinter, .. } = &self.fingerprint else {
            return;
        };

        for entry in self.ctx.ui.selected_entries() {
            let Some(location) = entry.location.clone() else {
                tracing::debug!(entry = %entry.id, "entry has no file, skipping fingerprint");
                continue;
            };
            let fingerprinter = fingerprinter.clone();
            let events = self.events.clone();
            let timeout = self.lookup_timeout;
            tracing::debug!(entry = %entry.id, "fingerprint requested");
            spawn_lookup(async move {
                let result = run_lookup(entry.id, timeout, async move {
                    fingerprinter
                        .fingerprint(&location)
                        .await
                        .map_err(|e| LookupError::Failed(e.to_string()))
                })
                .await;
                let _ = events.send(HostEvent::FingerprintResolved(result));
            });
        }
    }

    /// Store a fingerprint if the feature is still active.
    fn apply_fingerprint(&mut self, result: AsyncLookupResult<Fingerprint>) {
        if !matches!(self.fingerprint, FingerprintFeature::Active { .. }) {
            tracing::debug!(entry = %result.requested_for, "fingerprinting off, discarding result");
            return;
        }
        let entry = result.requested_for;
        match result.value {
            Ok(fp) => {
                if self.ctx.db.set_fingerprint(&entry, &fp.fingerprint) {
                    self.ctx.db.commit();
                    tracing::info!(entry = %entry, "fingerprint stored");
                }
            }
            Err(e) => tracing::warn!(entry = %entry, "fingerprinting failed: {e}"),
        }
    }
}

fn spawn_lookup<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(_) => tracing::warn!("no async runtime, lookup dropped"),
    }
}
