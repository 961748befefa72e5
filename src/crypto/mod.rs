//! Authenticated-encryption envelope for sensitive cells.
//!
//! Wraps arbitrary bytes in a self-describing record:
//!
//! ```text
//! [iv_len: u32 LE][iv][tag_len: u32 LE][ct_len: u32 LE][ciphertext + tag]
//! ```
//!
//! `ct_len` counts the appended GCM tag; `tag_len` records the tag size so
//! the decrypt path can split tag from data. Decryption reconstructs the
//! parameters from the stored fields and fails closed on any mismatch - it
//! never returns partial plaintext.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// IV length for AES-256-GCM (96-bit, GCM standard)
const IV_LEN: usize = 12;
/// GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

/// Errors from sealing/unsealing an envelope
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Record is truncated or its length fields disagree with the buffer
    #[error("envelope truncated or malformed")]
    Malformed,
    /// Stored IV length is not the one this cipher produces
    #[error("unsupported IV length: {0}")]
    UnsupportedIvLength(u32),
    /// Stored tag length is not the one this cipher produces
    #[error("unsupported auth tag length: {0}")]
    UnsupportedTagLength(u32),
    /// Tag verification failed: tampered data or wrong key
    #[error("ciphertext rejected")]
    Rejected,
    /// The cipher refused to seal (should not happen with a 256-bit key)
    #[error("encryption failed")]
    SealFailed,
}

/// Source of the 256-bit envelope key.
///
/// The platform shell backs this with the hardware keystore; the core never
/// serializes the key itself.
pub trait KeyProvider: Send + Sync {
    fn key(&self) -> Zeroizing<[u8; 32]>;
}

/// Key provider over bytes the shell already fetched from its keystore.
pub struct FixedKey(Zeroizing<[u8; 32]>);

impl FixedKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }
}

impl KeyProvider for FixedKey {
    fn key(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.0)
    }
}

/// AES-256-GCM envelope codec bound to one key provider.
#[derive(Clone)]
pub struct Envelope {
    keys: Arc<dyn KeyProvider>,
}

impl Envelope {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self { keys }
    }

    /// Seal plaintext into an envelope record with a fresh random IV.
    ///
    /// Empty plaintext is valid and round-trips to an empty byte sequence;
    /// callers distinguish "cell absent" from "cell empty" a layer above.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let key = self.keys.key();
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| EnvelopeError::SealFailed)?;

        let mut record = Vec::with_capacity(4 + IV_LEN + 4 + 4 + ciphertext.len());
        record.extend_from_slice(&(IV_LEN as u32).to_le_bytes());
        record.extend_from_slice(&iv);
        record.extend_from_slice(&(TAG_LEN as u32).to_le_bytes());
        record.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    /// Unseal an envelope record, verifying the authentication tag.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let (iv_len, rest) = split_u32(envelope).ok_or(EnvelopeError::Malformed)?;
        if iv_len as usize != IV_LEN {
            return Err(EnvelopeError::UnsupportedIvLength(iv_len));
        }
        let (iv, rest) = rest
            .split_at_checked(IV_LEN)
            .ok_or(EnvelopeError::Malformed)?;

        let (tag_len, rest) = split_u32(rest).ok_or(EnvelopeError::Malformed)?;
        if tag_len as usize != TAG_LEN {
            return Err(EnvelopeError::UnsupportedTagLength(tag_len));
        }

        let (ct_len, ciphertext) = split_u32(rest).ok_or(EnvelopeError::Malformed)?;
        // The record owns the whole buffer; trailing or missing bytes mean
        // the length fields cannot be trusted.
        if ciphertext.len() != ct_len as usize || (ct_len as usize) < TAG_LEN {
            return Err(EnvelopeError::Malformed);
        }

        let key = self.keys.key();
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| EnvelopeError::Rejected)
    }
}

fn split_u32(input: &[u8]) -> Option<(u32, &[u8])> {
    let (head, rest) = input.split_first_chunk::<4>()?;
    Some((u32::from_le_bytes(*head), rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_with_key(byte: u8) -> Envelope {
        Envelope::new(Arc::new(FixedKey::new([byte; 32])))
    }

    #[test]
    fn test_roundtrip() {
        let envelope = envelope_with_key(7);
        let plaintext = b"emergency contact list";
        let sealed = envelope.encrypt(plaintext).unwrap();
        assert_eq!(envelope.decrypt(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrips_to_empty() {
        let envelope = envelope_with_key(7);
        let sealed = envelope.encrypt(b"").unwrap();
        let opened = envelope.decrypt(&sealed).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_record_layout() {
        let envelope = envelope_with_key(7);
        let sealed = envelope.encrypt(b"x").unwrap();

        let (iv_len, rest) = split_u32(&sealed).unwrap();
        assert_eq!(iv_len as usize, IV_LEN);
        let (_iv, rest) = rest.split_at(IV_LEN);
        let (tag_len, rest) = split_u32(rest).unwrap();
        assert_eq!(tag_len as usize, TAG_LEN);
        let (ct_len, ct) = split_u32(rest).unwrap();
        // ct_len includes the tag appended after the single plaintext byte
        assert_eq!(ct_len as usize, 1 + TAG_LEN);
        assert_eq!(ct.len(), ct_len as usize);
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let envelope = envelope_with_key(7);
        let mut sealed = envelope.encrypt(b"sensitive").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(envelope.decrypt(&sealed), Err(EnvelopeError::Rejected));
    }

    #[test]
    fn test_tampered_iv_is_rejected() {
        let envelope = envelope_with_key(7);
        let mut sealed = envelope.encrypt(b"sensitive").unwrap();
        // First IV byte sits right after the 4-byte length prefix
        sealed[4] ^= 0x01;
        assert_eq!(envelope.decrypt(&sealed), Err(EnvelopeError::Rejected));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let sealed = envelope_with_key(7).encrypt(b"sensitive").unwrap();
        let other = envelope_with_key(8);
        assert_eq!(other.decrypt(&sealed), Err(EnvelopeError::Rejected));
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let envelope = envelope_with_key(7);
        let sealed = envelope.encrypt(b"sensitive").unwrap();
        for cut in [0, 3, 4, 10, sealed.len() - 1] {
            assert_eq!(
                envelope.decrypt(&sealed[..cut]),
                Err(EnvelopeError::Malformed),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_unsupported_tag_length_is_refused() {
        let envelope = envelope_with_key(7);
        let mut sealed = envelope.encrypt(b"sensitive").unwrap();
        // tag_len field follows the IV
        let at = 4 + IV_LEN;
        sealed[at..at + 4].copy_from_slice(&8u32.to_le_bytes());
        assert_eq!(
            envelope.decrypt(&sealed),
            Err(EnvelopeError::UnsupportedTagLength(8))
        );
    }
}
