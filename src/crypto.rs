//! Credential encryption using AES-256-GCM.
//!
//! Provider tokens are sealed with the provider id as associated data, so a
//! ciphertext copied onto another provider's row fails to open.
//!
//! Envelope layout: `version (1) | nonce (12) | ciphertext + tag`.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const ENVELOPE_VERSION: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENVELOPE_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("unsupported envelope version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("invalid ciphertext format")]
    InvalidFormat,
}

/// AES-256 key wiped from memory on drop.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(CryptoKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.as_bytes()))
    }
}

/// Encrypts `token` for `provider_id`.
pub fn seal_token(key: &CryptoKey, provider_id: &str, token: &str) -> Result<Vec<u8>, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = key
        .cipher()
        .encrypt(
            &nonce,
            Payload {
                msg: token.as_bytes(),
                aad: provider_id.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut envelope = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&nonce);
    envelope.append(&mut ciphertext);
    Ok(envelope)
}

/// Decrypts a token previously sealed for `provider_id`.
pub fn open_token(
    key: &CryptoKey,
    provider_id: &str,
    envelope: &[u8],
) -> Result<Zeroizing<String>, CryptoError> {
    let Some(&version) = envelope.first() else {
        return Err(CryptoError::InvalidFormat);
    };
    if version != ENVELOPE_VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&envelope[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let plaintext = key
        .cipher()
        .decrypt(
            nonce,
            Payload {
                msg: &envelope[VERSION_FIELD_LEN + NONCE_LEN..],
                aad: provider_id.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![7u8; 32]).expect("valid test key")
    }

    #[test]
    fn sealed_token_opens_for_same_provider() {
        let key = test_key();
        let sealed = seal_token(&key, "github", "ghp_abc").expect("seals");

        assert_eq!(sealed[0], ENVELOPE_VERSION);
        assert_eq!(open_token(&key, "github", &sealed).expect("opens").as_str(), "ghp_abc");
    }

    #[test]
    fn sealed_token_does_not_open_for_other_provider() {
        let key = test_key();
        let sealed = seal_token(&key, "github", "ghp_abc").expect("seals");

        assert!(matches!(
            open_token(&key, "gitlab", &sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn tampered_envelope_is_rejected() {
        let key = test_key();
        let mut sealed = seal_token(&key, "github", "ghp_abc").expect("seals");
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(open_token(&key, "github", &sealed).is_err());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = test_key();
        let first = seal_token(&key, "github", "same").expect("seals");
        let second = seal_token(&key, "github", "same").expect("seals");

        assert_ne!(first[1..13], second[1..13]);
    }

    #[test]
    fn short_or_unversioned_envelopes_are_rejected() {
        let key = test_key();
        assert!(matches!(
            open_token(&key, "github", &[]),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            open_token(&key, "github", &[ENVELOPE_VERSION, 1, 2]),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            open_token(&key, "github", b"plaintext"),
            Err(CryptoError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }
}
