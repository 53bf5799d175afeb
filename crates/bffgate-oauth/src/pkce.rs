//! PKCE (RFC 7636) and random token helpers.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind every generated verifier, state and opaque token.
const RANDOM_BYTES: usize = 32;

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair.
    ///
    /// The verifier is 32 random bytes encoded as unpadded URL-safe base64
    /// (43 characters, inside the 43..=128 range RFC 7636 allows).
    pub fn generate() -> Self {
        let verifier = random_token();
        let challenge = challenge_for(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    /// The transform method sent alongside the challenge.
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

/// Compute the S256 challenge for a verifier: `BASE64URL(SHA256(verifier))`.
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state string for CSRF protection of the redirect.
pub fn generate_state() -> String {
    random_token()
}

/// Generate an opaque, unguessable URL-safe token.
pub fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
