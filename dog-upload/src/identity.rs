//! Opaque, tamper-evident identities for session paths.
//!
//! A storage path is sealed with AES-256-GCM under a process-wide key and
//! handed to the client as URL-safe base64 of `nonce || ciphertext || tag`.
//! Decoding either authenticates the whole token or rejects it; there is no
//! partially trusted result.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

use crate::EncodedIdentity;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Binds tokens to this use so a ciphertext sealed elsewhere under the same key is rejected.
const IDENTITY_AAD: &[u8] = b"dog-upload/session-path/v1";

/// Errors produced by [`IdentityCodec`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity key must be {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("identity key is not valid base64")]
    KeyEncoding,

    #[error("identity is malformed")]
    Malformed,

    #[error("identity failed authentication")]
    Authentication,

    #[error("identity could not be sealed")]
    Seal,
}

/// Authenticated encryption of storage paths
#[derive(Clone)]
pub struct IdentityCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for IdentityCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCodec").finish_non_exhaustive()
    }
}

impl IdentityCodec {
    /// Create a codec from a raw 32-byte key
    pub fn new(key: &[u8]) -> Result<Self, IdentityError> {
        if key.len() != KEY_LEN {
            return Err(IdentityError::InvalidKey {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }

        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Create a codec from a standard base64 encoded 32-byte key
    pub fn from_base64_key(encoded: &str) -> Result<Self, IdentityError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| IdentityError::KeyEncoding)?;
        Self::new(&key)
    }

    /// Seal a storage path into an opaque identity
    pub fn encode(&self, path: &str) -> Result<EncodedIdentity, IdentityError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: path.as_bytes(),
                    aad: IDENTITY_AAD,
                },
            )
            .map_err(|_| IdentityError::Seal)?;

        let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&sealed);

        Ok(EncodedIdentity::from_string(URL_SAFE_NO_PAD.encode(token)))
    }

    /// Open an identity back into its storage path
    pub fn decode(&self, identity: &str) -> Result<String, IdentityError> {
        let token = URL_SAFE_NO_PAD
            .decode(identity.trim())
            .map_err(|_| IdentityError::Malformed)?;

        if token.len() < NONCE_LEN + TAG_LEN {
            return Err(IdentityError::Malformed);
        }

        let (nonce, sealed) = token.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: IDENTITY_AAD,
                },
            )
            .map_err(|_| IdentityError::Authentication)?;

        String::from_utf8(plain).map_err(|_| IdentityError::Malformed)
    }
}
