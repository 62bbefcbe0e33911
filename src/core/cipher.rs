//! Authenticated encryption of embedding vectors at rest.
//!
//! Vectors are serialized as the little-endian bytes of their `f32`
//! components and sealed with AES-256-GCM under a server-held key. Every seal
//! draws a fresh 96-bit nonce from the OS RNG.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::common::error::{FaceAuthError, Result};

pub const KEY_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 12;
pub const TAG_BYTES: usize = 16;

/// 256-bit symmetric key. Wiped from memory on drop.
#[derive(Clone)]
pub struct EmbeddingKey {
    bytes: Zeroizing<[u8; KEY_BYTES]>,
}

impl EmbeddingKey {
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_BYTES]);
        OsRng.fill_bytes(&mut *bytes);
        Self { bytes }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != KEY_BYTES {
            return Err(FaceAuthError::InvalidKeyConfiguration(format!(
                "expected {KEY_BYTES} key bytes but found {}",
                raw.len()
            )));
        }
        let mut bytes = Zeroizing::new([0u8; KEY_BYTES]);
        bytes.copy_from_slice(raw);
        Ok(Self { bytes })
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|err| {
                    FaceAuthError::InvalidKeyConfiguration(format!("invalid base64 key: {err}"))
                })?,
        );
        Self::from_bytes(&decoded)
    }

    pub fn from_env(var: &str) -> Result<Self> {
        let value = Zeroizing::new(std::env::var(var).map_err(|_| {
            FaceAuthError::InvalidKeyConfiguration(format!("{var} is not set"))
        })?);
        Self::from_base64(&value)
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes[..])
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl fmt::Debug for EmbeddingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EmbeddingKey(<redacted>)")
    }
}

/// Ciphertext, nonce and tag of one sealed vector. The three fields are only
/// meaningful together and are always stored and loaded as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEmbedding {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
}

#[derive(Clone)]
pub struct EmbeddingCipher {
    cipher: Aes256Gcm,
}

impl EmbeddingCipher {
    pub fn new(key: &EmbeddingKey) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
            FaceAuthError::InvalidKeyConfiguration("invalid AES-GCM key length".into())
        })?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, vector: &[f32]) -> Result<SealedEmbedding> {
        let mut buffer: Vec<u8> = vector.iter().flat_map(|x| x.to_le_bytes()).collect();

        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|err| {
                FaceAuthError::EncryptionConfiguration(format!("failed to seal embedding: {err}"))
            })?;

        Ok(SealedEmbedding {
            ciphertext: buffer,
            nonce: nonce.to_vec(),
            tag: tag.to_vec(),
        })
    }

    /// Verify and decrypt. Nothing is returned unless the tag checks out.
    pub fn open(&self, sealed: &SealedEmbedding) -> Result<Vec<f32>> {
        if sealed.nonce.len() != NONCE_BYTES || sealed.tag.len() != TAG_BYTES {
            return Err(FaceAuthError::AuthenticationFailed);
        }

        let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&sealed.nonce),
                b"",
                &mut *buffer,
                GenericArray::from_slice(&sealed.tag),
            )
            .map_err(|_| FaceAuthError::AuthenticationFailed)?;

        if buffer.len() % 4 != 0 {
            return Err(FaceAuthError::MalformedEmbedding(format!(
                "decrypted length {} is not a whole number of f32 components",
                buffer.len()
            )));
        }

        Ok(buffer
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

impl fmt::Debug for EmbeddingCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EmbeddingCipher { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher_with(byte: u8) -> EmbeddingCipher {
        EmbeddingCipher::new(&EmbeddingKey::from_bytes(&[byte; KEY_BYTES]).unwrap()).unwrap()
    }

    fn sample() -> Vec<f32> {
        vec![0.125, -0.5, 0.75, 1e-7, -3.25, 0.0]
    }

    #[test]
    fn open_recovers_sealed_vector() {
        let cipher = cipher_with(0x22);
        let sealed = cipher.seal(&sample()).unwrap();
        assert_eq!(sealed.nonce.len(), NONCE_BYTES);
        assert_eq!(sealed.tag.len(), TAG_BYTES);
        assert_eq!(sealed.ciphertext.len(), sample().len() * 4);

        let opened = cipher.open(&sealed).unwrap();
        assert_eq!(opened, sample());
    }

    #[test]
    fn every_seal_uses_a_fresh_nonce() {
        let cipher = cipher_with(0x01);
        let a = cipher.seal(&sample()).unwrap();
        let b = cipher.seal(&sample()).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tampering_any_field_fails_authentication() {
        let cipher = cipher_with(0x33);
        let sealed = cipher.seal(&sample()).unwrap();

        let mut bad_ct = sealed.clone();
        bad_ct.ciphertext[0] ^= 0x01;
        let mut bad_nonce = sealed.clone();
        bad_nonce.nonce[5] ^= 0x80;
        let mut bad_tag = sealed.clone();
        bad_tag.tag[15] ^= 0xff;

        for tampered in [bad_ct, bad_nonce, bad_tag] {
            assert!(matches!(
                cipher.open(&tampered),
                Err(FaceAuthError::AuthenticationFailed)
            ));
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = cipher_with(0x44).seal(&sample()).unwrap();
        assert!(matches!(
            cipher_with(0x45).open(&sealed),
            Err(FaceAuthError::AuthenticationFailed)
        ));
    }

    #[test]
    fn truncated_nonce_or_tag_fails_authentication() {
        let cipher = cipher_with(0x55);
        let mut sealed = cipher.seal(&sample()).unwrap();
        sealed.tag.truncate(8);
        assert!(matches!(cipher.open(&sealed), Err(FaceAuthError::AuthenticationFailed)));
    }

    #[test]
    fn key_must_be_exactly_32_bytes() {
        for len in [0usize, 16, 31, 33, 64] {
            let err = EmbeddingKey::from_bytes(&vec![7u8; len]).unwrap_err();
            assert!(matches!(err, FaceAuthError::InvalidKeyConfiguration(_)));
        }
    }

    #[test]
    fn base64_key_round_trips_and_rejects_garbage() {
        let key = EmbeddingKey::generate();
        let restored = EmbeddingKey::from_base64(&key.to_base64()).unwrap();
        let sealed = EmbeddingCipher::new(&key).unwrap().seal(&sample()).unwrap();
        assert_eq!(EmbeddingCipher::new(&restored).unwrap().open(&sealed).unwrap(), sample());

        assert!(matches!(
            EmbeddingKey::from_base64("not base64!!"),
            Err(FaceAuthError::InvalidKeyConfiguration(_))
        ));
        assert!(matches!(
            EmbeddingKey::from_base64(&general_purpose::STANDARD.encode([1u8; 16])),
            Err(FaceAuthError::InvalidKeyConfiguration(_))
        ));
    }

    #[test]
    fn missing_env_key_is_a_configuration_error() {
        let err = EmbeddingKey::from_env("FACEGATE_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, FaceAuthError::InvalidKeyConfiguration(_)));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = EmbeddingKey::from_bytes(&[0xAB; KEY_BYTES]).unwrap();
        assert!(!format!("{:?}", key).contains("171"));
        assert!(format!("{:?}", key).contains("redacted"));
    }
}
