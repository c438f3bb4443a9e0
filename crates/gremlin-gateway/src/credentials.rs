//! Password encryption for session tokens, and recovery of engine
//! credentials from a caller's session.
//!
//! The session carries the caller's password only as an AES-256-GCM token
//! keyed by the shared secret. It is decrypted just before a connection is
//! opened and dropped with the request.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;
use crate::connection::Credentials;
use crate::error::GatewayError;

/// Identity carried by an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub username: String,
    /// Encrypted password, see [`encrypt`].
    pub pwtoken: String,
}

fn key_for(secret: &[u8]) -> Result<LessSafeKey, GatewayError> {
    let digest = Sha256::digest(secret);
    let unbound = UnboundKey::new(&AES_256_GCM, &digest)
        .map_err(|_| GatewayError::CredentialRecovery("invalid key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `secret`.
///
/// The token is base64url(nonce || ciphertext || tag).
pub fn encrypt(secret: &[u8], plaintext: &str) -> Result<String, GatewayError> {
    let key = key_for(secret)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| GatewayError::CredentialRecovery("no randomness available".into()))?;

    let mut sealed = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut sealed,
    )
    .map_err(|_| GatewayError::CredentialRecovery("encryption failed".into()))?;

    let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
    token.extend_from_slice(&nonce_bytes);
    token.extend_from_slice(&sealed);
    Ok(URL_SAFE_NO_PAD.encode(token))
}

/// Decrypt a token produced by [`encrypt`].
pub fn decrypt(secret: &[u8], token: &str) -> Result<String, GatewayError> {
    let raw = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| GatewayError::CredentialRecovery(format!("token is not base64: {}", e)))?;
    if raw.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(GatewayError::CredentialRecovery("token too short".into()));
    }

    let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| GatewayError::CredentialRecovery("bad nonce".into()))?;

    let key = key_for(secret)?;
    let mut buffer = sealed.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut buffer)
        .map_err(|_| GatewayError::CredentialRecovery("token authentication failed".into()))?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| GatewayError::CredentialRecovery("password is not valid UTF-8".into()))
}

/// Engine credentials for a session.
///
/// `None` when engine authentication is disabled. Fails before any network
/// activity when the password token cannot be decrypted.
pub fn resolve(
    auth: &AuthConfig,
    identity: &SessionIdentity,
) -> Result<Option<Credentials>, GatewayError> {
    if !auth.gremlin_auth {
        return Ok(None);
    }
    let password = decrypt(auth.jwt_secret.as_bytes(), &identity.pwtoken).inspect_err(|e| {
        tracing::warn!(username = %identity.username, error = ?e, "credential recovery failed");
    })?;
    Ok(Some(Credentials::new(identity.username.clone(), password)))
}
