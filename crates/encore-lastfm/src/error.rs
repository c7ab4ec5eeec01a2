//! Last.fm error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LastfmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Last.fm API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("unexpected HTTP status: {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("Last.fm integration is not configured")]
    NotConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_api() {
        let err = LastfmError::Api {
            code: 9,
            message: "Invalid session key".into(),
        };
        assert_eq!(err.to_string(), "Last.fm API error 9: Invalid session key");
    }

    #[test]
    fn test_display_malformed() {
        let err = LastfmError::MalformedResponse("userloved is missing".into());
        assert_eq!(err.to_string(), "malformed response: userloved is missing");
    }

    #[test]
    fn test_display_not_configured() {
        assert_eq!(
            LastfmError::NotConfigured.to_string(),
            "Last.fm integration is not configured"
        );
    }

    #[test]
    fn test_display_status() {
        assert_eq!(LastfmError::Status(503).to_string(), "unexpected HTTP status: 503");
    }
}
