// PKCE verifier/challenge pair and the anti-CSRF state token.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes behind the code verifier. Base64url expands 64 bytes to
/// 86 characters, inside RFC 7636's 43-128 bound.
const VERIFIER_BYTES: usize = 64;
/// Random bytes behind the anti-CSRF state token
const STATE_BYTES: usize = 32;

/// Fresh code verifier: 64 random bytes, base64url without padding.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `code_challenge` for the S256 method: base64url(SHA-256(verifier)).
pub fn challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Opaque state token correlating the redirect with this attempt:
/// 32 random bytes, standard base64.
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
