//! Last.fm client used by the Encore host and its extensions.
//!
//! Exposes the [`RemoteService`] capability (track handles, loved status,
//! now playing, scrobbling, love/unlove) and its HTTP implementation
//! [`LastfmClient`], plus the session helpers needed to authenticate a
//! user and keep the session key encrypted at rest.

pub mod client;
pub mod error;
pub mod session;

pub use client::{
    build_api_sig, get_session, parse_userloved, LastfmClient, LastfmConfig, RemoteService, SessionGrant,
    TrackHandle,
};
pub use error::LastfmError;
pub use session::{auth_url, decrypt_session_key, encrypt_session_key};
