//! Scrobbler: reports the playing track to Last.fm.
//!
//! Sends "now playing" whenever a new entry starts and scrobbles the
//! previous entry when playback moves on, provided it was listened to
//! for at least 30 seconds or half its duration.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use encore_lastfm::TrackHandle;

use crate::error::ExtensionError;
use crate::host::{Entry, HostContext};
use crate::lifecycle::Extension;
use crate::lookup::spawn_detached;
use crate::player::{current_track, PlayerAware};

pub const NAME: &str = "Scrobbler";

const MIN_LISTEN: Duration = Duration::from_secs(30);

pub fn create(_ctx: &HostContext) -> Result<Box<dyn Extension>, ExtensionError> {
    Ok(Box::new(Scrobbler::default()))
}

/// Whether a listen of `listened` counts as a scrobble.
pub fn should_scrobble(listened: Duration, duration_secs: Option<u64>) -> bool {
    if listened >= MIN_LISTEN {
        return true;
    }
    match duration_secs {
        Some(d) if d > 0 => listened >= Duration::from_secs(d) / 2,
        _ => false,
    }
}

struct Listen {
    entry: Entry,
    track: Option<TrackHandle>,
    started_at: DateTime<Utc>,
    listened: Duration,
    resumed_at: Option<Instant>,
}

impl Listen {
    fn total(&self) -> Duration {
        self.listened + self.resumed_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn pause(&mut self) {
        if let Some(t) = self.resumed_at.take() {
            self.listened += t.elapsed();
        }
    }
}

#[derive(Default)]
pub struct Scrobbler {
    current: Option<Listen>,
}

impl Scrobbler {
    fn finish(&mut self, ctx: &HostContext) {
        let Some(listen) = self.current.take() else {
            return;
        };
        let listened = listen.total();
        if !should_scrobble(listened, listen.entry.duration_secs) {
            tracing::debug!(
                entry = %listen.entry.id,
                listened_secs = listened.as_secs(),
                "listen too short to scrobble"
            );
            return;
        }
        let (Some(track), Some(remote)) = (listen.track, ctx.remote()) else {
            return;
        };
        let timestamp = listen.started_at.timestamp();
        let duration = listen.entry.duration_secs;
        spawn_detached("track.scrobble", async move {
            remote.scrobble(&track, timestamp, duration).await
        });
    }

    fn start(&mut self, entry: Entry, track: Option<TrackHandle>, ctx: &HostContext) {
        if let (Some(track), Some(remote)) = (track.clone(), ctx.remote()) {
            let duration = entry.duration_secs;
            spawn_detached("track.updateNowPlaying", async move {
                remote.update_now_playing(&track, duration).await
            });
        }
        self.current = Some(Listen {
            entry,
            track,
            started_at: Utc::now(),
            listened: Duration::ZERO,
            resumed_at: Some(Instant::now()),
        });
    }
}

impl Extension for Scrobbler {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Scrobble played tracks to Last.fm"
    }

    fn initialise(&mut self, ctx: &HostContext) -> Result<(), ExtensionError> {
        // Pick up an entry that was already playing when we came up.
        let (entry, track) = current_track(ctx);
        if let Some(entry) = entry {
            self.start(entry, track, ctx);
        }
        Ok(())
    }

    fn dismantle(&mut self, _ctx: &HostContext) {
        self.current = None;
    }

    fn as_player_aware(&mut self) -> Option<&mut dyn PlayerAware> {
        Some(self)
    }
}

impl PlayerAware for Scrobbler {
    fn playing_changed(&mut self, playing: bool, ctx: &HostContext) {
        let (entry, track) = current_track(ctx);

        let same_entry = matches!(
            (&entry, &self.current),
            (Some(e), Some(listen)) if listen.entry.id == e.id
        );
        if same_entry {
            if let Some(listen) = self.current.as_mut() {
                if playing {
                    listen.resumed_at.get_or_insert_with(Instant::now);
                } else {
                    listen.pause();
                }
            }
            return;
        }

        self.finish(ctx);
        if let (Some(entry), true) = (entry, playing) {
            self.start(entry, track, ctx);
        }
    }
}
