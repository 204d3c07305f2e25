//! PKCE challenge/verifier pairs (RFC 7636, S256 method).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// A PKCE code verifier and its derived challenge.
///
/// The verifier stays server-side (bound to the flow's state token) and is
/// only sent in the token exchange; the challenge travels in the
/// authorization redirect.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generates a fresh pair: 32 random bytes, base64url-encoded as the
    /// verifier; challenge is base64url(SHA-256(verifier)).
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.gen();

        let verifier = URL_SAFE_NO_PAD.encode(random_bytes);

        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        Self {
            verifier,
            challenge,
        }
    }

    /// Recomputes the challenge for a verifier (used by tests and any
    /// future server-side verification).
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}
