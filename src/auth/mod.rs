//! Credential handling.
//!
//! Every request proves possession of the caller's secret with a keyed
//! SHA-256 digest over (timestamp, endpoint, user, secret), base64-encoded
//! for transport. The secret itself never crosses the wire: it is the
//! deterministic digest of the user's password, stored at registration and
//! recomputed by the client at sign time.
//!
//! Both signer and verifier use wall-clock milliseconds; the verifier
//! tolerates bounded skew in either direction and rejects anything older
//! (or newer) than the freshness window even when the digest matches.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default freshness window in milliseconds.
pub const DEFAULT_AUTH_WINDOW_MS: i64 = 60_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential timestamp outside freshness window")]
    Stale,
    #[error("credential digest mismatch")]
    BadDigest,
}

/// Per-request credential triple presented by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    /// Wall-clock milliseconds at sign time.
    pub timestamp: i64,
    pub token: String,
}

impl Credentials {
    /// Sign a request for `endpoint` on behalf of `user`, using the user's
    /// password digest as the shared secret. Clients call this; tests call
    /// it to build valid requests.
    pub fn sign(endpoint: &str, user: &str, secret: &str) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        Self {
            user: user.to_string(),
            timestamp,
            token: CredentialService::digest(endpoint, user, secret, timestamp),
        }
    }
}

/// Computes and verifies request digests.
pub struct CredentialService {
    window_ms: i64,
}

impl Default for CredentialService {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_WINDOW_MS)
    }
}

impl CredentialService {
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms }
    }

    /// Deterministic digest of a password, stored as the user's secret.
    pub fn hash_password(password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        BASE64.encode(hasher.finalize())
    }

    /// Keyed digest binding a request to an endpoint, user and timestamp.
    pub fn digest(endpoint: &str, user: &str, secret: &str, timestamp: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{timestamp}{endpoint}{user}:{secret}").as_bytes());
        BASE64.encode(hasher.finalize())
    }

    /// Check a presented credential against the stored secret. The freshness
    /// check runs first so a stale-but-correct digest is still rejected.
    pub fn verify(
        &self,
        endpoint: &str,
        creds: &Credentials,
        secret: &str,
    ) -> Result<(), AuthError> {
        // The timestamp is caller-supplied; the skew computation must not
        // panic on extreme values, it must reject them.
        let now = Utc::now().timestamp_millis();
        let fresh = now
            .checked_sub(creds.timestamp)
            .and_then(i64::checked_abs)
            .map(|skew| skew <= self.window_ms)
            .unwrap_or(false);
        if !fresh {
            return Err(AuthError::Stale);
        }

        let expected = Self::digest(endpoint, &creds.user, secret, creds.timestamp);
        if expected != creds.token {
            return Err(AuthError::BadDigest);
        }
        Ok(())
    }
}
