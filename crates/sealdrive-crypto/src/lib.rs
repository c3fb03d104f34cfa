//! # SealDrive Crypto
//!
//! Cryptographic primitives for the SealDrive encrypted drive engine.
//!
//! This crate provides:
//! - **Node keys**: X25519 key pairs sealed under random passphrases
//! - **Key wrapping**: X25519 + BLAKE3 KDF + AEAD, for passphrases, names and content keys
//! - **Signatures**: Ed25519 detached signatures from the account identity
//! - **Hashing**: keyed BLAKE3 lookup hashes and SHA-256 block hashes
//! - **Provider**: the [`CryptoProvider`] trait the engine consumes
//!
//! Every secret type is scrubbed from memory when dropped.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sealdrive_crypto::{CryptoProvider, DefaultCryptoProvider, KekKeyPair, SigningKeyPair};
//!
//! let provider = DefaultCryptoProvider::new();
//! let signer = SigningKeyPair::generate();
//! let parent = KekKeyPair::generate();
//!
//! let (name, sig) = provider.encrypt_name("notes.txt", parent.public_key(), &signer)?;
//! let plain = provider.decrypt_name(&name, &sig, &parent, &signer.verifying_key())?;
//! ```

pub mod error;
pub mod hashing;
pub mod hpke;
pub mod keys;
pub mod provider;
pub mod signing;
pub mod symmetric;

pub use error::{CryptoError, Result};
pub use hashing::{Blake3Hash, CONTENT_HASH_SIZE};
pub use hpke::{Decryptor, EncapsulatedKey, EncryptedData, Encryptor};
pub use keys::{DekKey, HashKey, KekKeyPair, LockedKey, Passphrase, PublicKey, SecretKey};
pub use provider::{
    CryptoProvider, DefaultCryptoProvider, EncryptedBlock, GeneratedContentKey, GeneratedNodeKeys,
};
pub use signing::{Signature, SigningKeyPair, VerifyingKey};
pub use symmetric::{Aead, AeadCipher, Nonce};

/// The version of the cryptographic format
pub const CRYPTO_VERSION: u8 = 1;
