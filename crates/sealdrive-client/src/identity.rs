//! The authenticated account identity

use crate::Result;
use sealdrive_crypto::{CryptoProvider, KekKeyPair, SigningKeyPair, VerifyingKey};
use sealdrive_store::CreateFolderRequest;

/// Keys of the account the drive operates as
///
/// The share key pair unwraps the root folder's passphrase. The signing key
/// signs names, passphrases, content keys, blocks and manifests, and its
/// verifying half checks them on the way back.
#[derive(Clone)]
pub struct Identity {
    share_keys: KekKeyPair,
    signer: SigningKeyPair,
    address: String,
}

impl Identity {
    /// Create an identity from existing keys
    pub fn new(share_keys: KekKeyPair, signer: SigningKeyPair, address: impl Into<String>) -> Self {
        Self {
            share_keys,
            signer,
            address: address.into(),
        }
    }

    /// Generate fresh keys for `address`
    pub fn generate(address: impl Into<String>) -> Self {
        Self::new(KekKeyPair::generate(), SigningKeyPair::generate(), address)
    }

    /// The share key pair
    pub fn share_keys(&self) -> &KekKeyPair {
        &self.share_keys
    }

    /// The signing key pair
    pub fn signer(&self) -> &SigningKeyPair {
        &self.signer
    }

    /// The verifying key matching [`Identity::signer`]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    /// The signature address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Build the request that creates a share root folder owned by this identity
    pub fn root_folder_request(
        &self,
        crypto: &dyn CryptoProvider,
        root_name: &str,
    ) -> Result<CreateFolderRequest> {
        let generated = crypto.generate_node_keys(self.share_keys.public_key(), &self.signer)?;
        let (name, name_signature) =
            crypto.encrypt_name(root_name, self.share_keys.public_key(), &self.signer)?;
        let (_, node_hash_key) = crypto.generate_hash_key(generated.keypair.public_key())?;

        Ok(CreateFolderRequest {
            parent_id: String::new(),
            name,
            name_signature,
            // The root has no siblings to collide with
            hash: String::new(),
            node_key: generated.locked_key,
            node_passphrase: generated.encrypted_passphrase,
            node_passphrase_signature: generated.passphrase_signature,
            signature_address: self.address.clone(),
            node_hash_key,
        })
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .field("share_keys", &self.share_keys)
            .field("signer", &self.signer)
            .finish()
    }
}
