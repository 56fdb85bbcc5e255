//! PKCE (Proof Key for Code Exchange) generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// A PKCE verifier/challenge pair.
#[derive(Clone, Debug)]
pub struct PkcePair {
    /// Random verifier string (base64url, no padding).
    pub verifier: String,
    /// S256 challenge of the verifier (base64url, no padding).
    pub challenge: String,
}

/// Generate a new S256 pair from 32 random bytes.
pub fn generate_pkce() -> PkcePair {
    let random_bytes: [u8; 32] = rand::random();
    let verifier = URL_SAFE_NO_PAD.encode(random_bytes);
    let challenge = challenge_for(&verifier);

    PkcePair {
        verifier,
        challenge,
    }
}

/// base64url(SHA-256(verifier))
pub fn challenge_for(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Opaque value for `state` and `nonce`.
pub fn random_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
