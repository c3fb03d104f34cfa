//! Key types for the node key hierarchy
//!
//! Every node in the drive owns an X25519 key pair. The node's secret key is
//! stored remotely in a [`LockedKey`], sealed under a random [`Passphrase`];
//! the passphrase itself is wrapped to the parent's public key. Content is
//! encrypted with a per-file [`DekKey`] (the content session key).
//!
//! All secret types zeroize their bytes on drop.

use crate::{CryptoError, Result};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96 bits for AES-GCM/ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of a node passphrase in bytes
pub const PASSPHRASE_SIZE: usize = 32;

/// A Data Encryption Key (DEK) for symmetric encryption
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DekKey {
    key: [u8; KEY_SIZE],
}

impl DekKey {
    /// Generate a new random DEK
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut key);
        Self { key }
    }

    /// Create a DEK from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "DEK must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    pub(crate) fn from_array(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for DekKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DekKey([REDACTED])")
    }
}

/// The random secret that unlocks a node's private key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase {
    bytes: [u8; PASSPHRASE_SIZE],
}

impl Passphrase {
    /// Generate a fresh random passphrase
    pub fn generate() -> Self {
        let mut bytes = [0u8; PASSPHRASE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PASSPHRASE_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "passphrase must be {} bytes, got {}",
                PASSPHRASE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; PASSPHRASE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the passphrase bytes
    pub fn as_bytes(&self) -> &[u8; PASSPHRASE_SIZE] {
        &self.bytes
    }

    /// Derive the symmetric key that seals the node's secret key
    pub fn lock_key(&self) -> DekKey {
        let derived = crate::hashing::derive_key("sealdrive-node-lock-v1", &self.bytes);
        DekKey::from_array(*derived.as_bytes())
    }
}

/// A public key for asymmetric encryption (X25519)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; 32],
}

impl PublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "public key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    /// Decode from base64
    pub fn from_base64(s: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

/// A secret key for asymmetric encryption (X25519)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; 32],
}

impl SecretKey {
    /// Generate a new random secret key
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "secret key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Derive the public key from this secret key
    pub fn public_key(&self) -> PublicKey {
        use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
        let secret = StaticSecret::from(self.bytes);
        let public = X25519Public::from(&secret);
        PublicKey {
            bytes: *public.as_bytes(),
        }
    }
}

/// A key pair for asymmetric encryption
#[derive(Clone)]
pub struct KekKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KekKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Create from an existing secret key
    pub fn from_secret_key(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Get the secret key
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl std::fmt::Debug for KekKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KekKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Key used to compute keyed lookup hashes of child names in one folder
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HashKey {
    bytes: [u8; KEY_SIZE],
}

impl HashKey {
    /// Generate a new random hash key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "hash key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for HashKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HashKey([REDACTED])")
    }
}

/// A node's key pair as stored remotely: the public half in the clear, the
/// secret half sealed under the node passphrase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedKey {
    /// The node's public key
    pub public_key: PublicKey,
    /// Nonce used to seal the secret key
    #[serde(with = "base64_serde")]
    pub nonce: Vec<u8>,
    /// The sealed secret key
    #[serde(with = "base64_serde")]
    pub sealed_secret: Vec<u8>,
}

impl LockedKey {
    /// Seal a key pair's secret half under a passphrase
    pub fn lock(keypair: &KekKeyPair, passphrase: &Passphrase) -> Result<Self> {
        use crate::symmetric::{Aead, Nonce};

        let nonce = Nonce::generate();
        let aead = Aead::new_default(&passphrase.lock_key());
        let sealed_secret = aead.encrypt_with_aad(
            &nonce,
            keypair.secret_key().as_bytes(),
            keypair.public_key().as_bytes(),
        )?;

        Ok(Self {
            public_key: keypair.public_key().clone(),
            nonce: nonce.as_bytes().to_vec(),
            sealed_secret,
        })
    }

    /// Unlock the secret half with the passphrase and rebuild the key pair
    pub fn unlock(&self, passphrase: &Passphrase) -> Result<KekKeyPair> {
        use crate::symmetric::{Aead, Nonce};

        let nonce = Nonce::from_bytes(&self.nonce)?;
        let aead = Aead::new_default(&passphrase.lock_key());
        let mut plaintext =
            aead.decrypt_with_aad(&nonce, &self.sealed_secret, self.public_key.as_bytes())?;
        let secret = SecretKey::from_bytes(&plaintext);
        plaintext.zeroize();
        let keypair = KekKeyPair::from_secret_key(secret?);

        if keypair.public_key() != &self.public_key {
            return Err(CryptoError::InvalidKey(
                "unlocked secret does not match the stored public key".to_string(),
            ));
        }
        Ok(keypair)
    }
}

/// Serde helpers that encode byte vectors as base64 strings
pub mod base64_serde {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dek_generation() {
        let dek1 = DekKey::generate();
        let dek2 = DekKey::generate();
        assert_ne!(dek1.as_bytes(), dek2.as_bytes());
    }

    #[test]
    fn test_keypair_generation() {
        let kp1 = KekKeyPair::generate();
        let kp2 = KekKeyPair::generate();
        assert_ne!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_public_key_derivation() {
        let kp = KekKeyPair::generate();
        let derived_public = kp.secret_key().public_key();
        assert_eq!(kp.public_key(), &derived_public);
    }

    #[test]
    fn test_locked_key_unlock() {
        let kp = KekKeyPair::generate();
        let passphrase = Passphrase::generate();
        let locked = LockedKey::lock(&kp, &passphrase).unwrap();

        let unlocked = locked.unlock(&passphrase).unwrap();
        assert_eq!(unlocked.public_key(), kp.public_key());
        assert_eq!(unlocked.secret_key().as_bytes(), kp.secret_key().as_bytes());
    }

    #[test]
    fn test_locked_key_wrong_passphrase() {
        let kp = KekKeyPair::generate();
        let locked = LockedKey::lock(&kp, &Passphrase::generate()).unwrap();
        assert!(locked.unlock(&Passphrase::generate()).is_err());
    }

    #[test]
    fn test_locked_key_json_roundtrip() {
        let kp = KekKeyPair::generate();
        let passphrase = Passphrase::generate();
        let locked = LockedKey::lock(&kp, &passphrase).unwrap();

        let json = serde_json::to_string(&locked).unwrap();
        let parsed: LockedKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, locked);
        assert!(parsed.unlock(&passphrase).is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let dek = DekKey::generate();
        assert_eq!(format!("{:?}", dek), "DekKey([REDACTED])");
        let kp = KekKeyPair::generate();
        assert!(format!("{:?}", kp).contains("[REDACTED]"));
    }
}
