//! Loves: toolbar buttons that love or unlove the playing track.

use crate::error::ExtensionError;
use crate::host::{ActionSpec, HostContext};
use crate::lifecycle::Extension;
use crate::lookup::spawn_detached;
use crate::player::current_track;

pub const NAME: &str = "Loves";

pub const LOVE_ACTION: &str = "LoveTrack";
pub const UNLOVE_ACTION: &str = "UnloveTrack";

const UI_MARKUP: &str = r#"<ui>
  <toolbar name="ToolBar">
    <toolitem name="Love" action="LoveTrack"/>
    <toolitem name="Unlove" action="UnloveTrack"/>
  </toolbar>
</ui>"#;

pub fn create(_ctx: &HostContext) -> Result<Box<dyn Extension>, ExtensionError> {
    Ok(Box::new(LoveTrack))
}

pub struct LoveTrack;

impl Extension for LoveTrack {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Love or unlove the playing track on Last.fm"
    }

    fn ui_markup(&self) -> Option<&str> {
        Some(UI_MARKUP)
    }

    fn actions(&self, ctx: &HostContext) -> Vec<ActionSpec> {
        vec![
            ActionSpec::new(LOVE_ACTION, "Love Track")
                .with_tooltip("Love this track")
                .with_icon(ctx.find_resource("img/love.png")),
            ActionSpec::new(UNLOVE_ACTION, "Unlove Track")
                .with_tooltip("Remove this track from your loved tracks")
                .with_icon(ctx.find_resource("img/ban.png")),
        ]
    }

    fn activate_action(&mut self, action: &str, ctx: &HostContext) {
        let (_, track) = current_track(ctx);
        let (Some(track), Some(remote)) = (track, ctx.remote()) else {
            tracing::debug!(action, "no track to act on");
            return;
        };

        match action {
            LOVE_ACTION => {
                tracing::info!(track = %track, "loving track");
                spawn_detached("track.love", async move { remote.love(&track).await });
            }
            UNLOVE_ACTION => {
                tracing::info!(track = %track, "unloving track");
                spawn_detached("track.unlove", async move { remote.unlove(&track).await });
            }
            _ => {}
        }
    }
}
