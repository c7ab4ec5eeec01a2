//! Extension lifecycle: the [`Extension`] trait and the per-instance
//! [`LifecycleController`] state machine.
//!
//! A controller is `Active` exactly when its extension is enabled in the
//! settings and the host is connected. Every transition goes through
//! [`LifecycleController::initialise`] or [`LifecycleController::dismantle`],
//! both idempotent relative to the current state, so overlapping
//! notifications never acquire or release twice.

use std::fmt;

use crate::error::ExtensionError;
use crate::host::{ActionGroupId, ActionSpec, HostContext, UiMergeId};
use crate::player::{PlayerAware, PlayerObservation};

/// A feature unit with its own enable flag and resource lifecycle.
///
/// The controller acquires the declared UI resources and the player
/// subscription before calling [`Extension::initialise`], and releases
/// them after [`Extension::dismantle`].
pub trait Extension: Send {
    fn name(&self) -> &str;

    /// One-line summary for configuration UIs.
    fn description(&self) -> &str {
        ""
    }

    /// Markup merged into the host UI while active.
    fn ui_markup(&self) -> Option<&str> {
        None
    }

    /// Actions registered while active.
    fn actions(&self, _ctx: &HostContext) -> Vec<ActionSpec> {
        Vec::new()
    }

    /// Extension-specific setup. An error aborts the transition and
    /// releases everything acquired for it.
    fn initialise(&mut self, _ctx: &HostContext) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn dismantle(&mut self, _ctx: &HostContext) {}

    /// One of this extension's actions was triggered.
    fn activate_action(&mut self, _action: &str, _ctx: &HostContext) {}

    fn as_player_aware(&mut self) -> Option<&mut dyn PlayerAware> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Dismantled,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dismantled => f.write_str("dismantled"),
            Self::Active => f.write_str("active"),
        }
    }
}

// ─── Controller ─────────────────────────────────────────────────────────

/// Drives one extension between `Dismantled` and `Active` and owns the
/// resources it holds while active.
pub struct LifecycleController {
    extension: Box<dyn Extension>,
    name: String,
    state: LifecycleState,
    attached: bool,
    action_group: Option<ActionGroupId>,
    action_names: Vec<String>,
    ui_merge: Option<UiMergeId>,
    observation: PlayerObservation,
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("attached", &self.attached)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// Take ownership of an extension. Initialises it right away when it
    /// is enabled and the host is connected.
    pub fn attach(extension: Box<dyn Extension>, ctx: &HostContext) -> Self {
        let mut controller = Self {
            name: extension.name().to_string(),
            extension,
            state: LifecycleState::Dismantled,
            attached: true,
            action_group: None,
            action_names: Vec::new(),
            ui_merge: None,
            observation: PlayerObservation::new(),
        };
        if ctx.connected() && controller.enabled(ctx) {
            controller.initialise(ctx);
        }
        controller
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        self.extension.description()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_initialised(&self) -> bool {
        self.state == LifecycleState::Active
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // ── Enabled flag ────────────────────────────────────────────────

    /// `extensions.<name>.enabled`, `false` when absent.
    pub fn enabled(&self, ctx: &HostContext) -> bool {
        ctx.settings.extension(&self.name).enabled
    }

    /// Write `extensions.<name>.enabled`. The transition happens when the
    /// resulting change notification reaches [`Self::settings_changed`].
    pub fn set_enabled(&self, ctx: &HostContext, enabled: bool) -> Result<(), ExtensionError> {
        ctx.settings
            .update_extension(&self.name, |entry| entry.enabled = enabled)?;
        Ok(())
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Acquire resources and run the extension's setup. No-op when
    /// already active or detached. Returns whether a transition happened.
    pub fn initialise(&mut self, ctx: &HostContext) -> bool {
        if !self.attached || self.state == LifecycleState::Active {
            return false;
        }

        let actions = self.extension.actions(ctx);
        if !actions.is_empty() {
            self.action_names = actions.iter().map(|a| a.name.clone()).collect();
            let group = format!("Encore{}Actions", self.name);
            self.action_group = Some(ctx.ui.insert_action_group(&group, actions));
        }
        if let Some(markup) = self.extension.ui_markup() {
            self.ui_merge = Some(ctx.ui.add_ui(markup));
            ctx.ui.ensure_update();
        }
        if self.extension.as_player_aware().is_some() {
            self.observation.connect(ctx);
        }

        if let Err(e) = self.extension.initialise(ctx) {
            tracing::error!(extension = %self.name, "failed to initialise extension: {e}");
            self.release(ctx);
            return false;
        }

        self.state = LifecycleState::Active;
        tracing::info!(extension = %self.name, "extension initialised");
        true
    }

    /// Run the extension's teardown and release its resources. No-op
    /// when already dismantled. Returns whether a transition happened.
    pub fn dismantle(&mut self, ctx: &HostContext) -> bool {
        if self.state != LifecycleState::Active {
            return false;
        }

        self.extension.dismantle(ctx);
        self.release(ctx);
        self.state = LifecycleState::Dismantled;
        tracing::info!(extension = %self.name, "extension dismantled");
        true
    }

    fn release(&mut self, ctx: &HostContext) {
        self.observation.disconnect(ctx);

        if let Some(id) = self.ui_merge.take() {
            if !ctx.ui.remove_ui(id) {
                tracing::debug!(extension = %self.name, "UI merge was already removed");
            }
            ctx.ui.ensure_update();
        }
        if let Some(id) = self.action_group.take() {
            if !ctx.ui.remove_action_group(id) {
                tracing::debug!(extension = %self.name, "action group was already removed");
            }
        }
        self.action_names.clear();
    }

    /// The `connected` setting changed.
    pub fn connectivity_changed(&mut self, ctx: &HostContext) {
        if !self.attached {
            return;
        }
        if !ctx.connected() {
            self.dismantle(ctx);
        } else if self.enabled(ctx) {
            self.initialise(ctx);
        }
    }

    /// The `extensions` setting changed; re-read this extension's flag.
    pub fn settings_changed(&mut self, ctx: &HostContext) {
        if !self.attached {
            return;
        }
        if !self.enabled(ctx) {
            self.dismantle(ctx);
        } else if ctx.connected() {
            self.initialise(ctx);
        }
    }

    /// Dismantle if active and stop reacting to notifications.
    pub fn destroy(&mut self, ctx: &HostContext) {
        self.dismantle(ctx);
        self.attached = false;
        tracing::debug!(extension = %self.name, "extension detached");
    }

    // ── Routing ─────────────────────────────────────────────────────

    pub fn playing_changed(&mut self, playing: bool, ctx: &HostContext) {
        if self.state != LifecycleState::Active || !self.observation.is_connected() {
            return;
        }
        if let Some(aware) = self.extension.as_player_aware() {
            aware.playing_changed(playing, ctx);
        }
    }

    /// Forward an action if this extension registered it and is active.
    pub fn activate_action(&mut self, action: &str, ctx: &HostContext) -> bool {
        if self.state != LifecycleState::Active || !self.action_names.iter().any(|a| a == action) {
            return false;
        }
        tracing::debug!(extension = %self.name, action, "action activated");
        self.extension.activate_action(action, ctx);
        true
    }

    pub fn action_names(&self) -> &[String] {
        &self.action_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::Headless;
    use crate::testing::{CountingExtension, Counters};
    use encore_settings::{Settings, SettingsStore};
    use std::sync::Arc;

    fn setup(connected: bool) -> (Headless, HostContext) {
        let headless = Headless::new();
        let settings = Settings {
            connected,
            ..Settings::default()
        };
        let ctx = headless.context(Arc::new(SettingsStore::in_memory(settings)), "res");
        (headless, ctx)
    }

    fn enable(ctx: &HostContext, name: &str, enabled: bool) {
        ctx.settings
            .update_extension(name, |e| e.enabled = enabled)
            .unwrap();
    }

    #[test]
    fn test_connectivity_then_enable_scenario() {
        let (headless, ctx) = setup(false);
        enable(&ctx, "Counting", true);
        let counters = Counters::default();
        let mut c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);
        assert_eq!(c.state(), LifecycleState::Dismantled);

        ctx.settings.set_connected(true).unwrap();
        c.connectivity_changed(&ctx);
        assert_eq!(c.state(), LifecycleState::Active);
        assert_eq!(headless.ui.group_count(), 1);
        assert_eq!(headless.player.subscriber_count(), 1);

        c.set_enabled(&ctx, false).unwrap();
        c.settings_changed(&ctx);
        assert_eq!(c.state(), LifecycleState::Dismantled);

        ctx.settings.set_connected(false).unwrap();
        c.connectivity_changed(&ctx);
        assert_eq!(c.state(), LifecycleState::Dismantled);

        assert_eq!(counters.initialised(), 1);
        assert_eq!(counters.dismantled(), 1);
        assert_eq!(headless.ui.group_count(), 0);
        assert_eq!(headless.ui.merge_count(), 0);
        assert_eq!(headless.player.subscriber_count(), 0);
    }

    #[test]
    fn test_attach_initialises_when_ready() {
        let (_headless, ctx) = setup(true);
        enable(&ctx, "Counting", true);
        let counters = Counters::default();
        let c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);
        assert!(c.is_initialised());
        assert_eq!(counters.initialised(), 1);
    }

    #[test]
    fn test_absent_extension_reads_disabled() {
        let (_headless, ctx) = setup(true);
        let counters = Counters::default();
        let c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);
        assert!(!c.enabled(&ctx));
        assert!(!c.is_initialised());
    }

    #[test]
    fn test_initialise_and_dismantle_are_idempotent() {
        let (headless, ctx) = setup(true);
        let counters = Counters::default();
        let mut c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);

        assert!(c.initialise(&ctx));
        assert!(!c.initialise(&ctx));
        assert_eq!(counters.initialised(), 1);
        assert_eq!(headless.ui.group_count(), 1);
        assert_eq!(headless.player.subscriber_count(), 1);

        assert!(c.dismantle(&ctx));
        assert!(!c.dismantle(&ctx));
        assert_eq!(counters.dismantled(), 1);
        assert_eq!(headless.ui.group_count(), 0);
    }

    #[test]
    fn test_failed_hook_releases_acquired_resources() {
        let (headless, ctx) = setup(true);
        enable(&ctx, "Counting", true);
        let counters = Counters::default();
        counters.fail_next_initialise();
        let mut c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);

        assert_eq!(c.state(), LifecycleState::Dismantled);
        assert_eq!(headless.ui.group_count(), 0);
        assert_eq!(headless.ui.merge_count(), 0);
        assert_eq!(headless.player.subscriber_count(), 0);

        // A later notification retries.
        c.settings_changed(&ctx);
        assert!(c.is_initialised());
    }

    #[test]
    fn test_destroy_detaches() {
        let (headless, ctx) = setup(true);
        enable(&ctx, "Counting", true);
        let counters = Counters::default();
        let mut c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);
        assert!(c.is_initialised());

        c.destroy(&ctx);
        assert!(!c.is_attached());
        assert_eq!(c.state(), LifecycleState::Dismantled);

        c.connectivity_changed(&ctx);
        c.settings_changed(&ctx);
        assert!(!c.initialise(&ctx));
        assert_eq!(counters.initialised(), 1);
        assert_eq!(counters.dismantled(), 1);
        assert_eq!(headless.player.subscriber_count(), 0);
    }

    #[test]
    fn test_external_removal_is_tolerated() {
        let (headless, ctx) = setup(true);
        let counters = Counters::default();
        let mut c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);
        c.initialise(&ctx);

        assert_eq!(headless.ui.action_names(), ["CountingPing"]);

        // Something else tore the action group down first.
        {
            use crate::host::UiManager;
            for id in 1..=10 {
                headless.ui.remove_action_group(ActionGroupId(id));
            }
        }
        assert_eq!(headless.ui.group_count(), 0);

        assert!(c.dismantle(&ctx));
        assert_eq!(headless.ui.merge_count(), 0);
        assert!(!c.is_initialised());
    }

    #[test]
    fn test_actions_only_route_while_active() {
        let (_headless, ctx) = setup(true);
        let counters = Counters::default();
        let mut c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);

        assert!(!c.activate_action("CountingPing", &ctx));
        c.initialise(&ctx);
        assert!(c.activate_action("CountingPing", &ctx));
        assert!(!c.activate_action("Unknown", &ctx));
        assert_eq!(counters.actions(), 1);

        c.dismantle(&ctx);
        assert!(!c.activate_action("CountingPing", &ctx));
        assert!(c.action_names().is_empty());
    }

    #[test]
    fn test_playing_changed_only_while_active() {
        let (_headless, ctx) = setup(true);
        let counters = Counters::default();
        let mut c = LifecycleController::attach(Box::new(CountingExtension::new("Counting", &counters)), &ctx);

        c.playing_changed(true, &ctx);
        assert_eq!(counters.plays(), 0);

        c.initialise(&ctx);
        c.playing_changed(true, &ctx);
        assert_eq!(counters.plays(), 1);
    }

    /// Deterministic pseudo-random toggles; the invariant must hold after
    /// every settled step.
    #[test]
    fn test_invariant_over_toggle_sequences() {
        let (headless, ctx) = setup(false);
        let names = ["A", "B", "C"];
        let counters: Vec<Counters> = names.iter().map(|_| Counters::default()).collect();
        let mut controllers: Vec<_> = names
            .iter()
            .zip(&counters)
            .map(|(n, c)| LifecycleController::attach(Box::new(CountingExtension::new(n, c)), &ctx))
            .collect();

        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;

            match seed % 4 {
                0 => {
                    ctx.settings.set_connected(!ctx.connected()).unwrap();
                    for c in &mut controllers {
                        c.connectivity_changed(&ctx);
                    }
                }
                _ => {
                    let name = names[(seed >> 8) as usize % names.len()];
                    let current = ctx.settings.extension(name).enabled;
                    enable(&ctx, name, !current);
                    for c in &mut controllers {
                        c.settings_changed(&ctx);
                    }
                }
            }

            let mut active = 0;
            for c in &controllers {
                assert_eq!(c.is_initialised(), c.enabled(&ctx) && ctx.connected());
                if c.is_initialised() {
                    active += 1;
                }
            }
            assert_eq!(headless.player.subscriber_count(), active);
            assert_eq!(headless.ui.group_count(), active);
            assert_eq!(headless.ui.merge_count(), active);
        }

        for (c, n) in controllers.iter_mut().zip(&counters) {
            c.destroy(&ctx);
            assert_eq!(n.initialised(), n.dismantled());
        }
        assert_eq!(headless.player.subscriber_count(), 0);
    }
}
