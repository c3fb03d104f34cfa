//! The cryptographic provider consumed by the drive engine
//!
//! [`CryptoProvider`] bundles every primitive operation the engine needs on
//! node keys, names, content keys and blocks. [`DefaultCryptoProvider`] builds
//! them from the wrapping, AEAD, signing and hashing modules of this crate.

use crate::{
    CryptoError, Result,
    hashing,
    hpke::{Decryptor, EncryptedData, Encryptor},
    keys::{DekKey, HashKey, KekKeyPair, LockedKey, Passphrase, PublicKey},
    signing::{Signature, SigningKeyPair, VerifyingKey},
    symmetric::{Aead, AeadCipher},
};
use rand::rngs::OsRng;

/// Keys produced when a new node is created
pub struct GeneratedNodeKeys {
    /// The node's key pair
    pub keypair: KekKeyPair,
    /// The node's secret key, sealed under the passphrase
    pub locked_key: LockedKey,
    /// The passphrase wrapped to the parent's public key
    pub encrypted_passphrase: EncryptedData,
    /// Signature over the passphrase
    pub passphrase_signature: Signature,
}

/// A freshly generated content key with its wrapped packet
pub struct GeneratedContentKey {
    /// The content session key
    pub key: DekKey,
    /// The key wrapped to the file node's public key
    pub packet: EncryptedData,
    /// Signature over the content key
    pub signature: Signature,
}

/// One encrypted block ready for upload
#[derive(Debug, Clone)]
pub struct EncryptedBlock {
    /// `nonce || ciphertext` under the content key
    pub ciphertext: Vec<u8>,
    /// Signature of the plaintext, wrapped to the node key
    pub encrypted_signature: EncryptedData,
    /// SHA-256 of `ciphertext`
    pub hash: [u8; hashing::CONTENT_HASH_SIZE],
}

/// Cryptographic operations on the node key hierarchy
pub trait CryptoProvider: Send + Sync + 'static {
    /// Generate a key pair and passphrase for a new node under `parent`
    fn generate_node_keys(
        &self,
        parent: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<GeneratedNodeKeys>;

    /// Unwrap a node's passphrase with the parent key, verify it, and unlock
    /// the node key pair
    fn unlock_node_key(
        &self,
        locked_key: &LockedKey,
        encrypted_passphrase: &EncryptedData,
        passphrase_signature: &Signature,
        parent: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<KekKeyPair>;

    /// Re-encrypt a node passphrase from the old parent key to a new one
    fn rewrap_passphrase(
        &self,
        encrypted_passphrase: &EncryptedData,
        old_parent: &KekKeyPair,
        new_parent: &PublicKey,
    ) -> Result<EncryptedData>;

    /// Encrypt and sign a node name under the parent key
    fn encrypt_name(
        &self,
        name: &str,
        parent: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<(EncryptedData, Signature)>;

    /// Decrypt a node name and verify its signature
    fn decrypt_name(
        &self,
        encrypted: &EncryptedData,
        signature: &Signature,
        parent: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<String>;

    /// Generate a folder hash key encrypted to the folder's own key
    fn generate_hash_key(&self, node: &PublicKey) -> Result<(HashKey, EncryptedData)>;

    /// Decrypt a folder hash key
    fn decrypt_hash_key(&self, encrypted: &EncryptedData, node: &KekKeyPair) -> Result<HashKey>;

    /// Keyed lookup hash of a child name
    fn lookup_hash(&self, key: &HashKey, name: &str) -> String;

    /// Generate a content key wrapped to a file node's key
    fn generate_content_key(
        &self,
        node: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<GeneratedContentKey>;

    /// Unwrap a content key packet and verify its signature
    fn unwrap_content_key(
        &self,
        packet: &EncryptedData,
        signature: &Signature,
        node: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<DekKey>;

    /// Encrypt one block and produce its wrapped detached signature and hash
    fn encrypt_block(
        &self,
        plaintext: &[u8],
        content_key: &DekKey,
        node: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<EncryptedBlock>;

    /// Decrypt one block and verify its wrapped detached signature
    fn decrypt_block(
        &self,
        ciphertext: &[u8],
        encrypted_signature: &EncryptedData,
        content_key: &DekKey,
        node: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<Vec<u8>>;

    /// Detached signature
    fn sign(&self, signer: &SigningKeyPair, message: &[u8]) -> Signature;

    /// Verify a detached signature
    fn verify(&self, verifier: &VerifyingKey, message: &[u8], signature: &Signature) -> Result<()>;

    /// Encrypt a small payload to a node key
    fn seal(&self, plaintext: &[u8], recipient: &PublicKey) -> Result<EncryptedData>;

    /// Decrypt a payload sealed to a node key
    fn open(&self, sealed: &EncryptedData, recipient: &KekKeyPair) -> Result<Vec<u8>>;

    /// SHA-256 content hash
    fn content_hash(&self, data: &[u8]) -> [u8; hashing::CONTENT_HASH_SIZE] {
        hashing::content_hash(data)
    }

    /// A random opaque token, hex encoded
    fn random_token(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        hex::encode(bytes)
    }
}

/// Provider backed by X25519 wrapping, Ed25519 signatures, AEAD and BLAKE3
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCryptoProvider {
    cipher: AeadCipher,
}

impl DefaultCryptoProvider {
    /// Create a provider using the default AEAD cipher
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific AEAD cipher for wrapping and block encryption
    pub fn with_cipher(cipher: AeadCipher) -> Self {
        Self { cipher }
    }

    fn encryptor(&self, recipient: &PublicKey) -> Encryptor {
        Encryptor::with_cipher(recipient, self.cipher)
    }
}

impl CryptoProvider for DefaultCryptoProvider {
    fn generate_node_keys(
        &self,
        parent: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<GeneratedNodeKeys> {
        let keypair = KekKeyPair::generate();
        let passphrase = Passphrase::generate();
        let locked_key = LockedKey::lock(&keypair, &passphrase)?;
        let encrypted_passphrase = self.encryptor(parent).encrypt(passphrase.as_bytes())?;
        let passphrase_signature = signer.sign(passphrase.as_bytes());

        Ok(GeneratedNodeKeys {
            keypair,
            locked_key,
            encrypted_passphrase,
            passphrase_signature,
        })
    }

    fn unlock_node_key(
        &self,
        locked_key: &LockedKey,
        encrypted_passphrase: &EncryptedData,
        passphrase_signature: &Signature,
        parent: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<KekKeyPair> {
        let mut raw = Decryptor::new(parent).decrypt(encrypted_passphrase)?;
        let passphrase = Passphrase::from_bytes(&raw);
        zeroize::Zeroize::zeroize(&mut raw);
        let passphrase = passphrase?;

        verifier.verify(passphrase.as_bytes(), passphrase_signature)?;
        locked_key.unlock(&passphrase)
    }

    fn rewrap_passphrase(
        &self,
        encrypted_passphrase: &EncryptedData,
        old_parent: &KekKeyPair,
        new_parent: &PublicKey,
    ) -> Result<EncryptedData> {
        let mut raw = Decryptor::new(old_parent).decrypt(encrypted_passphrase)?;
        let passphrase = Passphrase::from_bytes(&raw);
        zeroize::Zeroize::zeroize(&mut raw);
        self.encryptor(new_parent).encrypt(passphrase?.as_bytes())
    }

    fn encrypt_name(
        &self,
        name: &str,
        parent: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<(EncryptedData, Signature)> {
        let encrypted = self.encryptor(parent).encrypt(name.as_bytes())?;
        Ok((encrypted, signer.sign(name.as_bytes())))
    }

    fn decrypt_name(
        &self,
        encrypted: &EncryptedData,
        signature: &Signature,
        parent: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<String> {
        let bytes = Decryptor::new(parent).decrypt(encrypted)?;
        verifier.verify(&bytes, signature)?;
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::Decryption(format!("name is not valid UTF-8: {}", e)))
    }

    fn generate_hash_key(&self, node: &PublicKey) -> Result<(HashKey, EncryptedData)> {
        let key = HashKey::generate();
        let encrypted = self.encryptor(node).encrypt(key.as_bytes())?;
        Ok((key, encrypted))
    }

    fn decrypt_hash_key(&self, encrypted: &EncryptedData, node: &KekKeyPair) -> Result<HashKey> {
        let mut raw = Decryptor::new(node).decrypt(encrypted)?;
        let key = HashKey::from_bytes(&raw);
        zeroize::Zeroize::zeroize(&mut raw);
        key
    }

    fn lookup_hash(&self, key: &HashKey, name: &str) -> String {
        hashing::lookup_hash(key, name)
    }

    fn generate_content_key(
        &self,
        node: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<GeneratedContentKey> {
        let key = DekKey::generate();
        let packet = self.encryptor(node).encrypt_dek(&key)?;
        let signature = signer.sign(key.as_bytes());
        Ok(GeneratedContentKey {
            key,
            packet,
            signature,
        })
    }

    fn unwrap_content_key(
        &self,
        packet: &EncryptedData,
        signature: &Signature,
        node: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<DekKey> {
        let key = Decryptor::new(node).decrypt_dek(packet)?;
        verifier.verify(key.as_bytes(), signature)?;
        Ok(key)
    }

    fn encrypt_block(
        &self,
        plaintext: &[u8],
        content_key: &DekKey,
        node: &PublicKey,
        signer: &SigningKeyPair,
    ) -> Result<EncryptedBlock> {
        let ciphertext = Aead::new(content_key, self.cipher).seal(plaintext)?;
        let signature = signer.sign(plaintext);
        let encrypted_signature = self.encryptor(node).encrypt(signature.as_bytes())?;
        let hash = hashing::content_hash(&ciphertext);

        Ok(EncryptedBlock {
            ciphertext,
            encrypted_signature,
            hash,
        })
    }

    fn decrypt_block(
        &self,
        ciphertext: &[u8],
        encrypted_signature: &EncryptedData,
        content_key: &DekKey,
        node: &KekKeyPair,
        verifier: &VerifyingKey,
    ) -> Result<Vec<u8>> {
        let plaintext = Aead::new(content_key, self.cipher).open(ciphertext)?;
        let signature = Signature::from_bytes(&Decryptor::new(node).decrypt(encrypted_signature)?)?;
        verifier.verify(&plaintext, &signature)?;
        Ok(plaintext)
    }

    fn sign(&self, signer: &SigningKeyPair, message: &[u8]) -> Signature {
        signer.sign(message)
    }

    fn verify(&self, verifier: &VerifyingKey, message: &[u8], signature: &Signature) -> Result<()> {
        verifier.verify(message, signature)
    }

    fn seal(&self, plaintext: &[u8], recipient: &PublicKey) -> Result<EncryptedData> {
        self.encryptor(recipient).encrypt(plaintext)
    }

    fn open(&self, sealed: &EncryptedData, recipient: &KekKeyPair) -> Result<Vec<u8>> {
        Decryptor::new(recipient).decrypt(sealed)
    }
}
