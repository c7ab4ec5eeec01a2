//! Asynchronous remote lookups tagged with the entry they were issued for.
//!
//! A lookup runs on a spawned task and its result travels back to the
//! owner as an [`AsyncLookupResult`]. The owner applies it only if
//! [`AsyncLookupResult::is_relevant`] still holds for the entry it cares
//! about at that moment.

use std::future::Future;
use std::time::Duration;

use encore_lastfm::LastfmError;
use thiserror::Error;

use crate::host::EntryId;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("lookup timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Remote(#[from] LastfmError),

    #[error("lookup failed: {0}")]
    Failed(String),
}

/// Result of a lookup, tagged with the entry it was requested for.
#[derive(Debug)]
pub struct AsyncLookupResult<T> {
    pub requested_for: EntryId,
    pub value: Result<T, LookupError>,
}

impl<T> AsyncLookupResult<T> {
    pub fn new(requested_for: EntryId, value: Result<T, LookupError>) -> Self {
        Self {
            requested_for,
            value,
        }
    }

    /// Whether the result still concerns `current`.
    pub fn is_relevant(&self, current: Option<&EntryId>) -> bool {
        current == Some(&self.requested_for)
    }

    /// The value, if the result is relevant and succeeded. Stale and
    /// failed results are logged and dropped.
    pub fn into_relevant(self, current: Option<&EntryId>) -> Option<T> {
        if !self.is_relevant(current) {
            tracing::debug!(entry = %self.requested_for, "discarding stale lookup result");
            return None;
        }
        match self.value {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(entry = %self.requested_for, "discarding failed lookup: {e}");
                None
            }
        }
    }
}

/// Await `fut` for at most `timeout` and tag the outcome.
pub async fn run_lookup<T, E, F>(
    requested_for: EntryId,
    timeout: Duration,
    fut: F,
) -> AsyncLookupResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<LookupError>,
{
    let value = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(LookupError::TimedOut(timeout)),
    };
    AsyncLookupResult::new(requested_for, value)
}

/// Spawn a fire-and-forget remote request on the current runtime.
///
/// Failures are logged. Outside a runtime the request is dropped.
pub fn spawn_detached<F>(label: &'static str, fut: F)
where
    F: Future<Output = Result<(), LastfmError>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = fut.await {
                    tracing::warn!(request = label, "remote request failed: {e}");
                }
            });
        }
        Err(_) => {
            tracing::debug!(request = label, "no async runtime, dropping remote request");
        }
    }
}
