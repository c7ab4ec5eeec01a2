//! Extensions shipped with the host and registered by
//! [`ExtensionCatalog::with_builtins`](crate::registry::ExtensionCatalog::with_builtins).

pub mod love_track;
pub mod scrobbler;
