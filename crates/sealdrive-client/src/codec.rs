//! Node name encryption and lookup hashes

use crate::{Drive, DriveError, Result, cache::KeyBundle};
use sealdrive_crypto::{EncryptedData, Signature};
use sealdrive_store::Link;

/// A name encrypted for one parent folder
#[derive(Clone, Debug)]
pub(crate) struct EncodedName {
    pub(crate) name: EncryptedData,
    pub(crate) signature: Signature,
    pub(crate) hash: String,
}

/// Reject names that cannot be stored as a single path segment
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(DriveError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Drive {
    /// Encrypt `name` to the parent folder and hash it with the folder's hash key
    pub(crate) fn encode_name(
        &self,
        name: &str,
        parent: &Link,
        parent_keys: &KeyBundle,
    ) -> Result<EncodedName> {
        validate_name(name)?;
        let hash_key = parent_keys
            .hash_key()
            .ok_or_else(|| DriveError::NotAFolder(parent.id.clone()))?;

        let crypto = &self.inner.crypto;
        let (encrypted, signature) = crypto.encrypt_name(
            name,
            parent_keys.public_key(),
            self.inner.identity.signer(),
        )?;
        Ok(EncodedName {
            name: encrypted,
            signature,
            hash: crypto.lookup_hash(hash_key, name),
        })
    }

    /// Decrypt a node's name with its parent's keys
    pub(crate) fn decode_name(&self, link: &Link, parent_keys: &KeyBundle) -> Result<String> {
        Ok(self.inner.crypto.decrypt_name(
            &link.name,
            &link.name_signature,
            parent_keys.keypair(),
            &self.inner.identity.verifying_key(),
        )?)
    }
}
