//! Public-key wrapping (X25519 + BLAKE3 KDF + AEAD)
//!
//! Used for everything that must be readable only by the holder of a node's
//! secret key: wrapped passphrases, content-key packets, hash keys, encrypted
//! names, extended attributes and block signatures.

use crate::{
    CryptoError, Result, CRYPTO_VERSION,
    keys::{DekKey, KekKeyPair, PublicKey, SecretKey, base64_serde},
    symmetric::{Aead, AeadCipher, Nonce},
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

/// Size of encapsulated key
pub const ENCAPSULATED_KEY_SIZE: usize = 32;

/// Key derivation context for wrapping
const WRAP_CONTEXT: &str = "sealdrive-wrap-v1";

/// Encapsulated key from HPKE encryption
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncapsulatedKey {
    /// The ephemeral public key
    pub ephemeral_public: [u8; ENCAPSULATED_KEY_SIZE],
}

impl std::fmt::Debug for EncapsulatedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use base64::Engine;
        write!(
            f,
            "EncapsulatedKey({})",
            base64::engine::general_purpose::STANDARD.encode(self.ephemeral_public)
        )
    }
}

/// Encrypted data with all metadata needed for decryption
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    /// Version of the encryption format
    pub version: u8,
    /// The encapsulated key
    pub encapsulated_key: EncapsulatedKey,
    /// The nonce used for AEAD
    pub nonce: Nonce,
    /// The AEAD cipher used
    pub cipher: AeadCipher,
    /// The encrypted ciphertext
    #[serde(with = "base64_serde")]
    pub ciphertext: Vec<u8>,
}

/// Encryptor for wrapping data to a recipient's public key
pub struct Encryptor {
    recipient_public: PublicKey,
    cipher: AeadCipher,
}

impl Encryptor {
    /// Create a new encryptor for the given recipient
    pub fn new(recipient_public: &PublicKey) -> Self {
        Self::with_cipher(recipient_public, AeadCipher::default())
    }

    /// Create with a specific AEAD cipher
    pub fn with_cipher(recipient_public: &PublicKey, cipher: AeadCipher) -> Self {
        Self {
            recipient_public: recipient_public.clone(),
            cipher,
        }
    }

    /// Encrypt data for the recipient
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData> {
        let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral_secret);

        let recipient_x25519 = X25519Public::from(*self.recipient_public.as_bytes());
        let shared_secret = ephemeral_secret.diffie_hellman(&recipient_x25519);

        let dek = derive_dek(shared_secret.as_bytes());

        // Bind the ciphertext to both ends of the exchange
        let aad = binding(ephemeral_public.as_bytes(), self.recipient_public.as_bytes());
        let nonce = Nonce::generate();
        let aead = Aead::new(&dek, self.cipher);
        let ciphertext = aead.encrypt_with_aad(&nonce, plaintext, &aad)?;

        Ok(EncryptedData {
            version: CRYPTO_VERSION,
            encapsulated_key: EncapsulatedKey {
                ephemeral_public: *ephemeral_public.as_bytes(),
            },
            nonce,
            cipher: self.cipher,
            ciphertext,
        })
    }

    /// Encrypt a DEK for the recipient (for key wrapping)
    pub fn encrypt_dek(&self, dek: &DekKey) -> Result<EncryptedData> {
        self.encrypt(dek.as_bytes())
    }
}

/// Decryptor for data wrapped to our key pair
pub struct Decryptor {
    secret: SecretKey,
    public: PublicKey,
}

impl Decryptor {
    /// Create a new decryptor with the recipient's key pair
    pub fn new(keypair: &KekKeyPair) -> Self {
        Self {
            secret: keypair.secret_key().clone(),
            public: keypair.public_key().clone(),
        }
    }

    /// Decrypt data
    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>> {
        if encrypted.version != CRYPTO_VERSION {
            return Err(CryptoError::InvalidCiphertext(format!(
                "unsupported wrap version {}",
                encrypted.version
            )));
        }

        let recipient_secret = StaticSecret::from(*self.secret.as_bytes());
        let ephemeral_public = X25519Public::from(encrypted.encapsulated_key.ephemeral_public);
        let shared_secret = recipient_secret.diffie_hellman(&ephemeral_public);

        let dek = derive_dek(shared_secret.as_bytes());

        let aad = binding(
            &encrypted.encapsulated_key.ephemeral_public,
            self.public.as_bytes(),
        );
        let aead = Aead::new(&dek, encrypted.cipher);
        aead.decrypt_with_aad(&encrypted.nonce, &encrypted.ciphertext, &aad)
    }

    /// Decrypt a wrapped DEK
    pub fn decrypt_dek(&self, encrypted: &EncryptedData) -> Result<DekKey> {
        let bytes = self.decrypt(encrypted)?;
        DekKey::from_bytes(&bytes)
    }
}

fn derive_dek(shared_secret: &[u8]) -> DekKey {
    let derived = crate::hashing::derive_key(WRAP_CONTEXT, shared_secret);
    DekKey::from_array(*derived.as_bytes())
}

fn binding(ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 64] {
    let mut aad = [0u8; 64];
    aad[..32].copy_from_slice(ephemeral);
    aad[32..].copy_from_slice(recipient);
    aad
}
