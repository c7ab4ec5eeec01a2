//! Turning the stored session into a remote client.

use std::sync::Arc;

use encore_lastfm::{
    decrypt_session_key, encrypt_session_key, get_session, LastfmClient, LastfmConfig,
    LastfmError, RemoteService,
};
use encore_settings::{Session, Settings};

/// Builds a remote client from the settings when the host connects.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, settings: &Settings) -> Result<Arc<dyn RemoteService>, LastfmError>;
}

/// [`RemoteConnector`] for the Last.fm API. Session keys are stored
/// encrypted under `secret`.
pub struct LastfmConnector {
    config: Option<LastfmConfig>,
    secret: String,
}

impl LastfmConnector {
    pub fn new(config: Option<LastfmConfig>, secret: impl Into<String>) -> Self {
        Self {
            config,
            secret: secret.into(),
        }
    }

    fn config(&self) -> Result<&LastfmConfig, LastfmError> {
        self.config.as_ref().ok_or(LastfmError::NotConfigured)
    }

    /// URL where the user grants this application access.
    pub fn auth_url(&self, callback: Option<&str>) -> Result<String, LastfmError> {
        Ok(encore_lastfm::auth_url(&self.config()?.api_key, callback))
    }

    /// Exchange a web-auth token for a session ready to be stored.
    pub async fn authenticate(&self, token: &str) -> Result<Session, LastfmError> {
        let grant = get_session(self.config()?, token).await?;
        Ok(Session {
            username: grant.username,
            key: encrypt_session_key(&grant.key, &self.secret)?,
        })
    }
}

impl RemoteConnector for LastfmConnector {
    fn connect(&self, settings: &Settings) -> Result<Arc<dyn RemoteService>, LastfmError> {
        let config = self.config()?;
        let session = settings
            .session
            .as_ref()
            .ok_or_else(|| LastfmError::Session("no stored session; authenticate first".into()))?;
        let key = decrypt_session_key(&session.key, &self.secret)?;
        let client = LastfmClient::new(config.clone(), session.username.clone(), key)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(secret: &str) -> Settings {
        Settings {
            connected: true,
            session: Some(Session {
                username: "alice".into(),
                key: encrypt_session_key("sk-1", secret).unwrap(),
            }),
            ..Settings::default()
        }
    }

    #[test]
    fn test_connect_decrypts_session() {
        let connector = LastfmConnector::new(Some(LastfmConfig::new("k", "s")), "secret");
        let remote = connector.connect(&stored("secret")).unwrap();
        assert_eq!(remote.username(), "alice");
    }

    #[test]
    fn test_connect_without_config() {
        let connector = LastfmConnector::new(None, "secret");
        assert!(matches!(
            connector.connect(&stored("secret")),
            Err(LastfmError::NotConfigured)
        ));
        assert!(connector.auth_url(None).is_err());
    }

    #[test]
    fn test_connect_without_session() {
        let connector = LastfmConnector::new(Some(LastfmConfig::new("k", "s")), "secret");
        assert!(matches!(
            connector.connect(&Settings::default()),
            Err(LastfmError::Session(_))
        ));
    }

    #[test]
    fn test_connect_with_other_secret_fails() {
        let connector = LastfmConnector::new(Some(LastfmConfig::new("k", "s")), "rotated");
        assert!(connector.connect(&stored("secret")).is_err());
    }
}
