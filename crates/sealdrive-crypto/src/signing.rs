//! Ed25519 signatures
//!
//! The account identity signs node passphrases, content-key packets, block
//! plaintexts and revision manifests. Verification always uses the
//! identity's [`VerifyingKey`].

use crate::{CryptoError, Result, keys::base64_serde};
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// A detached Ed25519 signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "base64_serde")]
    bytes: Vec<u8>,
}

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(CryptoError::SignatureVerification(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Get the signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn to_dalek(&self) -> Result<ed25519_dalek::Signature> {
        ed25519_dalek::Signature::from_slice(&self.bytes)
            .map_err(|e| CryptoError::SignatureVerification(e.to_string()))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.bytes[..8.min(self.bytes.len())]))
    }
}

/// Public half of a signing identity
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    bytes: [u8; 32],
}

impl VerifyingKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "verifying key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        // Reject points that are not valid curve points up front
        ed25519_dalek::VerifyingKey::from_bytes(&arr)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { bytes: arr })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verify a detached signature over `message`
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        key.verify(message, &signature.to_dalek()?)
            .map_err(|e| CryptoError::SignatureVerification(e.to_string()))
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.bytes))
    }
}

/// An Ed25519 signing key pair
#[derive(Clone)]
pub struct SigningKeyPair {
    signing: ed25519_dalek::SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing key
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::RngCore::fill_bytes(&mut OsRng, &mut seed);
        let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing }
    }

    /// Create from a 32-byte seed
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = seed.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("signing seed must be 32 bytes, got {}", seed.len()))
        })?;
        Ok(Self {
            signing: ed25519_dalek::SigningKey::from_bytes(&arr),
        })
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            bytes: self.signing.sign(message).to_bytes().to_vec(),
        }
    }

    /// Get the verifying key
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            bytes: self.signing.verifying_key().to_bytes(),
        }
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("verifying", &self.verifying_key())
            .field("signing", &"[REDACTED]")
            .finish()
    }
}
