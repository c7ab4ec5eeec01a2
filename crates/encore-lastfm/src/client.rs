//! Last.fm web service client.
//!
//! All write calls are signed form POSTs against the 2.0 endpoint. Reads
//! (`track.getInfo`) are plain GETs. Both go through [`read_response`],
//! which turns Last.fm's `{"error": n, "message": ".."}` bodies into
//! [`LastfmError::Api`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LastfmError;

/// Default Last.fm web service endpoint.
pub const DEFAULT_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

// ─── Configuration ──────────────────────────────────────────────────────

/// Application credentials and endpoint for the Last.fm API.
#[derive(Debug, Clone)]
pub struct LastfmConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl LastfmConfig {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load from environment variables. Returns `None` when `LASTFM_API_KEY`
    /// or `LASTFM_API_SECRET` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("LASTFM_API_KEY").ok().filter(|k| !k.is_empty())?;
        let api_secret = std::env::var("LASTFM_API_SECRET")
            .ok()
            .filter(|s| !s.is_empty())?;

        Some(Self {
            api_key,
            api_secret,
            base_url: std::env::var("LASTFM_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            timeout_secs: std::env::var("LASTFM_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    fn http_client(&self) -> Result<reqwest::Client, LastfmError> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(concat!("encore/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}

// ─── Capability ─────────────────────────────────────────────────────────

/// Remote identity of a track: what Last.fm keys its data on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackHandle {
    pub artist: String,
    pub title: String,
}

impl TrackHandle {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

impl std::fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// An authenticated remote music service.
///
/// Extensions and the host only see this trait; the concrete client is
/// swapped out in tests.
#[async_trait]
pub trait RemoteService: Send + Sync + 'static {
    /// Name of the authenticated user.
    fn username(&self) -> &str;

    /// Build a track handle. No network round trip.
    fn get_track(&self, artist: &str, title: &str) -> TrackHandle {
        TrackHandle::new(artist, title)
    }

    /// Whether the authenticated user has loved the track.
    async fn is_loved(&self, track: &TrackHandle) -> Result<bool, LastfmError>;

    async fn update_now_playing(
        &self,
        track: &TrackHandle,
        duration_secs: Option<u64>,
    ) -> Result<(), LastfmError>;

    /// Record a completed listen that started at `timestamp` (unix seconds).
    async fn scrobble(
        &self,
        track: &TrackHandle,
        timestamp: i64,
        duration_secs: Option<u64>,
    ) -> Result<(), LastfmError>;

    async fn love(&self, track: &TrackHandle) -> Result<(), LastfmError>;

    async fn unlove(&self, track: &TrackHandle) -> Result<(), LastfmError>;
}

// ─── Helpers ────────────────────────────────────────────────────────────

/// Build the `api_sig` required by the Last.fm API protocol: MD5 over the
/// sorted `key value` pairs followed by the shared secret.
///
/// MD5 is a protocol requirement here, not a choice.
pub fn build_api_sig(params: &BTreeMap<&str, &str>, secret: &str) -> String {
    let mut sig_input = String::new();
    for (k, v) in params {
        sig_input.push_str(k);
        sig_input.push_str(v);
    }
    sig_input.push_str(secret);
    format!("{:x}", md5::compute(sig_input.as_bytes()))
}

/// Interpret a `userloved` field. Last.fm sends `"0"`/`"1"` strings, but
/// numeric and boolean forms are accepted too. Anything else is malformed.
pub fn parse_userloved(value: &serde_json::Value) -> Result<bool, LastfmError> {
    match value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::String(s) => match s.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(LastfmError::MalformedResponse(format!(
                "unexpected userloved value: {other:?}"
            ))),
        },
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(LastfmError::MalformedResponse(format!(
                "unexpected userloved value: {n}"
            ))),
        },
        other => Err(LastfmError::MalformedResponse(format!(
            "unexpected userloved value: {other}"
        ))),
    }
}

async fn read_response(resp: reqwest::Response) -> Result<serde_json::Value, LastfmError> {
    let status = resp.status();
    let body = resp.text().await?;

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => {
            if let Some(code) = json.get("error").and_then(|c| c.as_i64()) {
                let message = json
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string();
                return Err(LastfmError::Api { code, message });
            }
            if !status.is_success() {
                return Err(LastfmError::Status(status.as_u16()));
            }
            Ok(json)
        }
        Err(_) if !status.is_success() => Err(LastfmError::Status(status.as_u16())),
        Err(e) => Err(LastfmError::MalformedResponse(format!(
            "response is not JSON: {e}"
        ))),
    }
}

async fn signed_post<'a>(
    http: &reqwest::Client,
    config: &'a LastfmConfig,
    mut params: BTreeMap<&'a str, &'a str>,
) -> Result<serde_json::Value, LastfmError> {
    params.insert("api_key", config.api_key.as_str());
    let api_sig = build_api_sig(&params, &config.api_secret);

    let mut form_params: Vec<(&str, &str)> = params.into_iter().collect();
    form_params.push(("api_sig", api_sig.as_str()));
    form_params.push(("format", "json"));

    let resp = http.post(&config.base_url).form(&form_params).send().await?;
    read_response(resp).await
}

// ─── Authentication ─────────────────────────────────────────────────────

/// Result of exchanging an authorization token for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub username: String,
    pub key: String,
}

/// Exchange a token obtained through the web auth flow for a session key.
pub async fn get_session(config: &LastfmConfig, token: &str) -> Result<SessionGrant, LastfmError> {
    let http = config.http_client()?;

    let mut params = BTreeMap::new();
    params.insert("method", "auth.getSession");
    params.insert("token", token);

    let json = signed_post(&http, config, params).await.inspect_err(|e| {
        tracing::warn!(error = %e, "Last.fm auth.getSession failed");
    })?;

    let session = json
        .get("session")
        .ok_or_else(|| LastfmError::MalformedResponse("no session in response".into()))?;
    let key = session
        .get("key")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LastfmError::MalformedResponse("no session key in response".into()))?;
    let username = session
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LastfmError::MalformedResponse("no username in response".into()))?;

    tracing::info!(username = %username, "Last.fm session granted");
    Ok(SessionGrant {
        username: username.to_string(),
        key: key.to_string(),
    })
}

// ─── Client ─────────────────────────────────────────────────────────────

/// [`RemoteService`] backed by the Last.fm HTTP API.
pub struct LastfmClient {
    http: reqwest::Client,
    config: LastfmConfig,
    username: String,
    session_key: String,
}

impl std::fmt::Debug for LastfmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastfmClient")
            .field("base_url", &self.config.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl LastfmClient {
    pub fn new(
        config: LastfmConfig,
        username: impl Into<String>,
        session_key: impl Into<String>,
    ) -> Result<Self, LastfmError> {
        Ok(Self {
            http: config.http_client()?,
            config,
            username: username.into(),
            session_key: session_key.into(),
        })
    }

    async fn track_call(
        &self,
        method: &str,
        track: &TrackHandle,
        extra: &[(&str, &str)],
    ) -> Result<(), LastfmError> {
        let mut params = BTreeMap::new();
        params.insert("method", method);
        params.insert("sk", self.session_key.as_str());
        params.insert("artist", track.artist.as_str());
        params.insert("track", track.title.as_str());
        for &(k, v) in extra {
            params.insert(k, v);
        }

        signed_post(&self.http, &self.config, params)
            .await
            .inspect_err(|e| {
                tracing::warn!(method, track = %track, error = %e, "Last.fm request failed");
            })?;
        tracing::debug!(method, track = %track, "Last.fm request succeeded");
        Ok(())
    }
}

#[async_trait]
impl RemoteService for LastfmClient {
    fn username(&self) -> &str {
        &self.username
    }

    async fn is_loved(&self, track: &TrackHandle) -> Result<bool, LastfmError> {
        let resp = self
            .http
            .get(&self.config.base_url)
            .query(&[
                ("method", "track.getInfo"),
                ("api_key", self.config.api_key.as_str()),
                ("artist", track.artist.as_str()),
                ("track", track.title.as_str()),
                ("username", self.username.as_str()),
                ("autocorrect", "1"),
                ("format", "json"),
            ])
            .send()
            .await?;
        let json = read_response(resp).await?;

        let loved = json
            .get("track")
            .and_then(|t| t.get("userloved"))
            .ok_or_else(|| LastfmError::MalformedResponse("track.userloved is missing".into()))?;
        parse_userloved(loved)
    }

    async fn update_now_playing(
        &self,
        track: &TrackHandle,
        duration_secs: Option<u64>,
    ) -> Result<(), LastfmError> {
        let duration = duration_secs.map(|d| d.to_string());
        let mut extra = Vec::new();
        if let Some(ref d) = duration {
            extra.push(("duration", d.as_str()));
        }
        self.track_call("track.updateNowPlaying", track, &extra).await
    }

    async fn scrobble(
        &self,
        track: &TrackHandle,
        timestamp: i64,
        duration_secs: Option<u64>,
    ) -> Result<(), LastfmError> {
        let timestamp = timestamp.to_string();
        let duration = duration_secs.map(|d| d.to_string());
        let mut extra = vec![("timestamp", timestamp.as_str())];
        if let Some(ref d) = duration {
            extra.push(("duration", d.as_str()));
        }
        self.track_call("track.scrobble", track, &extra).await?;
        tracing::info!(track = %track, "Scrobbled to Last.fm");
        Ok(())
    }

    async fn love(&self, track: &TrackHandle) -> Result<(), LastfmError> {
        self.track_call("track.love", track, &[]).await
    }

    async fn unlove(&self, track: &TrackHandle) -> Result<(), LastfmError> {
        self.track_call("track.unlove", track, &[]).await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
