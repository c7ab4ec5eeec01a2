//! Encore extension system
//!
//! Optional feature modules attached to the host player. Each extension
//! is active exactly while it is enabled in the settings and the host is
//! connected to Last.fm; the [`LifecycleController`] drives that and owns
//! the UI actions, UI markup and player subscription the extension holds
//! while active. The [`ExtensionRegistry`] instantiates extensions from a
//! manifest through a name → factory [`ExtensionCatalog`].

pub mod builtin;
pub mod error;
pub mod headless;
pub mod host;
pub mod lifecycle;
pub mod lookup;
pub mod manifest;
pub mod player;
pub mod registry;

#[cfg(test)]
mod testing;

pub use error::ExtensionError;
pub use headless::{Headless, MemoryNotifier, MemoryPlayer, MemoryTrackDb, MemoryUi};
pub use host::{
    ActionGroupId, ActionSpec, Entry, EntryId, HostContext, Notifier, Player, SignalHandlerId,
    TrackDatabase, UiManager, UiMergeId,
};
pub use lifecycle::{Extension, LifecycleController, LifecycleState};
pub use lookup::{run_lookup, spawn_detached, AsyncLookupResult, LookupError};
pub use manifest::{ExtensionDescriptor, ExtensionManifest, RejectedSection};
pub use player::{current_track, PlayerAware, PlayerObservation};
pub use registry::{
    ExtensionCatalog, ExtensionFactory, ExtensionRegistry, ExtensionSummary, LoadFailure,
};
