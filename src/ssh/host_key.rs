//! Host key verification against a pinned fingerprint
//!
//! The fingerprint format is the one operators copy out of an
//! `authorized_keys`/`known_hosts` line: `"<key-type> <base64-of-wire-key>"`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::keys::{PublicKey, PublicKeyBase64};
use tracing::{debug, error};

use super::error::TrustError;

/// How the server's host key is checked during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept any key, logging its fingerprint so it can be pinned later.
    ///
    /// Insecure: offers no protection against a man-in-the-middle.
    AcceptAny,
    /// Accept only the key with exactly this fingerprint
    Pinned(String),
}

impl HostKeyPolicy {
    /// Policy for a configured trusted key; empty means [`HostKeyPolicy::AcceptAny`]
    pub fn from_trusted_key(trusted_key: &str) -> Self {
        if trusted_key.is_empty() {
            HostKeyPolicy::AcceptAny
        } else {
            HostKeyPolicy::Pinned(trusted_key.to_string())
        }
    }

    /// Check an observed fingerprint
    pub fn verify_fingerprint(&self, observed: &str) -> Result<(), TrustError> {
        match self {
            HostKeyPolicy::AcceptAny => {
                error!(
                    "WARNING: SSH-key verification is *NOT* in effect: to fix, add this trusted key: {:?}",
                    observed
                );
                Ok(())
            }
            HostKeyPolicy::Pinned(expected) if expected == observed => {
                debug!("Host key matches pinned fingerprint");
                Ok(())
            }
            HostKeyPolicy::Pinned(expected) => Err(TrustError {
                expected: expected.clone(),
                got: observed.to_string(),
            }),
        }
    }

    pub fn verify(&self, key: &PublicKey) -> Result<(), TrustError> {
        self.verify_fingerprint(&key_string(key))
    }
}

/// Verify `observed` against `trusted_key` (empty accepts anything)
pub fn verify(trusted_key: &str, observed: &PublicKey) -> Result<(), TrustError> {
    HostKeyPolicy::from_trusted_key(trusted_key).verify(observed)
}

/// Render a key as `"<key-type> <base64>"`
pub fn key_string(key: &PublicKey) -> String {
    format!(
        "{} {}",
        key.algorithm().as_str(),
        BASE64.encode(key.public_key_bytes())
    )
}
