//! Session helpers: the web authorization URL and at-rest encryption of
//! session keys.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::LastfmError;

/// Last.fm web authorization endpoint.
pub const LASTFM_AUTH_URL: &str = "https://www.last.fm/api/auth/";

// HKDF domain-separation parameters, not secrets. The secret input is the
// host's session secret.
const HKDF_SALT: &[u8] = b"encore-lastfm";
const HKDF_INFO: &[u8] = b"lastfm-session-key";

const NONCE_LEN: usize = 12;

/// URL the user visits to grant access; Last.fm redirects back with a token.
pub fn auth_url(api_key: &str, callback: Option<&str>) -> String {
    match callback {
        Some(cb) => format!(
            "{LASTFM_AUTH_URL}?api_key={}&cb={}",
            api_key,
            urlencoding::encode(cb)
        ),
        None => format!("{LASTFM_AUTH_URL}?api_key={api_key}"),
    }
}

fn cipher_for(secret: &str) -> Result<Aes256Gcm, LastfmError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret.as_bytes());
    let mut derived = [0u8; 32];
    hk.expand(HKDF_INFO, &mut derived)
        .map_err(|e| LastfmError::Session(format!("HKDF expand failed: {e}")))?;
    Aes256Gcm::new_from_slice(&derived)
        .map_err(|e| LastfmError::Session(format!("AES-GCM key init failed: {e}")))
}

/// Encrypt a session key for storage. Returns base64 `nonce || ciphertext`.
pub fn encrypt_session_key(key: &str, secret: &str) -> Result<String, LastfmError> {
    let cipher = cipher_for(secret)?;

    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    #[allow(deprecated)]
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, key.as_bytes())
        .map_err(|e| LastfmError::Session(format!("encryption failed: {e}")))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
}

/// Decrypt a session key produced by [`encrypt_session_key`].
pub fn decrypt_session_key(encrypted: &str, secret: &str) -> Result<String, LastfmError> {
    let cipher = cipher_for(secret)?;

    let combined = base64::engine::general_purpose::STANDARD
        .decode(encrypted)
        .map_err(|e| LastfmError::Session(format!("base64 decode failed: {e}")))?;
    if combined.len() < NONCE_LEN {
        return Err(LastfmError::Session("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    #[allow(deprecated)]
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| LastfmError::Session(format!("decryption failed: {e}")))?;
    String::from_utf8(plaintext)
        .map_err(|e| LastfmError::Session(format!("UTF-8 decode failed: {e}")))
}
