//! Symmetric encryption using AES-GCM and ChaCha20-Poly1305
//!
//! Block contents, sealed node secrets and wrapped payloads all go through the
//! [`Aead`] type. Block ciphertexts are framed as `nonce || ciphertext` so a
//! block can be decrypted from its bytes alone.

use crate::{
    CryptoError, Result,
    keys::{DekKey, KEY_SIZE, NONCE_SIZE},
};
use aes_gcm::{Aes256Gcm, KeyInit, aead::Aead as AeadTrait};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// A nonce for AEAD encryption
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

/// Supported AEAD ciphers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AeadCipher {
    /// AES-256-GCM
    #[default]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl AeadCipher {
    /// Get the algorithm identifier string
    pub fn algorithm_id(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }
}

/// AEAD encryption/decryption interface
pub struct Aead {
    cipher: AeadCipher,
    key: [u8; KEY_SIZE],
}

impl Drop for Aead {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl Aead {
    /// Create a new AEAD instance with the given key and cipher
    pub fn new(key: &DekKey, cipher: AeadCipher) -> Self {
        Self {
            cipher,
            key: *key.as_bytes(),
        }
    }

    /// Create with the default cipher (AES-256-GCM)
    pub fn new_default(key: &DekKey) -> Self {
        Self::new(key, AeadCipher::default())
    }

    /// Encrypt data with the given nonce
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(nonce, plaintext, &[])
    }

    /// Encrypt data with the given nonce and associated data
    pub fn encrypt_with_aad(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        match self.cipher {
            AeadCipher::Aes256Gcm => {
                let nonce_arr = aes_gcm::Nonce::from_slice(nonce.as_bytes());
                let payload = aes_gcm::aead::Payload { msg: plaintext, aad };
                let cipher = Aes256Gcm::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .encrypt(nonce_arr, payload)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))
            }
            AeadCipher::ChaCha20Poly1305 => {
                let nonce_arr = chacha20poly1305::Nonce::from_slice(nonce.as_bytes());
                let payload = chacha20poly1305::aead::Payload { msg: plaintext, aad };
                let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .encrypt(nonce_arr, payload)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))
            }
        }
    }

    /// Decrypt data with the given nonce
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_aad(nonce, ciphertext, &[])
    }

    /// Decrypt data with the given nonce and associated data
    pub fn decrypt_with_aad(
        &self,
        nonce: &Nonce,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        match self.cipher {
            AeadCipher::Aes256Gcm => {
                let nonce_arr = aes_gcm::Nonce::from_slice(nonce.as_bytes());
                let payload = aes_gcm::aead::Payload { msg: ciphertext, aad };
                let cipher = Aes256Gcm::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Decryption(e.to_string()))?;
                cipher
                    .decrypt(nonce_arr, payload)
                    .map_err(|e| CryptoError::Decryption(e.to_string()))
            }
            AeadCipher::ChaCha20Poly1305 => {
                let nonce_arr = chacha20poly1305::Nonce::from_slice(nonce.as_bytes());
                let payload = chacha20poly1305::aead::Payload { msg: ciphertext, aad };
                let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Decryption(e.to_string()))?;
                cipher
                    .decrypt(nonce_arr, payload)
                    .map_err(|e| CryptoError::Decryption(e.to_string()))
            }
        }
    }

    /// Encrypt with a fresh nonce and frame the output as `nonce || ciphertext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::generate();
        let ciphertext = self.encrypt(&nonce, plaintext)?;
        let mut framed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        framed.extend_from_slice(nonce.as_bytes());
        framed.extend_from_slice(&ciphertext);
        Ok(framed)
    }

    /// Decrypt a `nonce || ciphertext` frame produced by [`Aead::seal`]
    pub fn open(&self, framed: &[u8]) -> Result<Vec<u8>> {
        if framed.len() < NONCE_SIZE {
            return Err(CryptoError::InvalidCiphertext(format!(
                "frame of {} bytes is shorter than a nonce",
                framed.len()
            )));
        }
        let (nonce, ciphertext) = framed.split_at(NONCE_SIZE);
        self.decrypt(&Nonce::from_bytes(nonce)?, ciphertext)
    }

    /// Get the cipher type
    pub fn cipher(&self) -> AeadCipher {
        self.cipher
    }
}
