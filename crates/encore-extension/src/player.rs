//! Player observation capability.
//!
//! Extensions that react to the playing entry implement [`PlayerAware`]
//! and expose it through [`Extension::as_player_aware`]. The lifecycle
//! controller then holds a [`PlayerObservation`] for them while active.
//!
//! [`Extension::as_player_aware`]: crate::lifecycle::Extension::as_player_aware

use encore_lastfm::TrackHandle;

use crate::host::{Entry, HostContext, SignalHandlerId};

/// Capability of extensions that follow the player.
pub trait PlayerAware {
    /// The player started (`true`) or stopped/paused (`false`).
    fn playing_changed(&mut self, playing: bool, ctx: &HostContext);
}

/// A player subscription slot.
#[derive(Debug, Default)]
pub struct PlayerObservation {
    handler: Option<SignalHandlerId>,
}

impl PlayerObservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to playing-changed. Returns `false` if already connected.
    pub fn connect(&mut self, ctx: &HostContext) -> bool {
        if self.handler.is_some() {
            return false;
        }
        self.handler = Some(ctx.player.connect_playing_changed());
        true
    }

    /// Drop the subscription. Returns `false` if there was none.
    pub fn disconnect(&mut self, ctx: &HostContext) -> bool {
        let Some(id) = self.handler.take() else {
            return false;
        };
        if !ctx.player.disconnect(id) {
            tracing::debug!(handler = id.0, "player handler was already disconnected");
        }
        true
    }

    pub fn is_connected(&self) -> bool {
        self.handler.is_some()
    }
}

/// The entry loaded in the player and its remote track handle.
///
/// `(None, None)` when nothing is loaded. The handle is `None` without a
/// remote client or when the entry has no artist or title.
pub fn current_track(ctx: &HostContext) -> (Option<Entry>, Option<TrackHandle>) {
    let Some(entry) = ctx.player.playing_entry() else {
        return (None, None);
    };

    let artist = entry.artist.trim();
    let title = entry.title.trim();
    let track = match ctx.remote() {
        Some(remote) if !artist.is_empty() && !title.is_empty() => {
            Some(remote.get_track(artist, title))
        }
        _ => None,
    };

    (Some(entry), track)
}
