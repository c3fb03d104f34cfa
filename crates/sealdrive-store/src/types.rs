//! Remote data model: links, revisions, blocks and request payloads

use chrono::{DateTime, Utc};
use sealdrive_crypto::{EncryptedData, LockedKey, Signature, keys::base64_serde};
use serde::{Deserialize, Serialize};

/// The drive share the account works in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Share ID
    pub share_id: String,
    /// ID of the root folder link
    pub root_link_id: String,
}

/// Node type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    File,
    Folder,
}

/// Node lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Created but no revision committed yet
    Draft,
    Active,
    Trashed,
    Deleted,
}

/// File-only link properties
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    /// Content session key, wrapped to the node key
    pub content_key_packet: EncryptedData,
    /// Signature over the content session key
    pub content_key_signature: Signature,
    /// MIME type
    pub mime_type: String,
}

/// Folder-only link properties
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderProperties {
    /// Hash key for child lookup hashes, encrypted to the folder's own key
    pub node_hash_key: EncryptedData,
}

/// A node in the drive tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link ID
    pub id: String,
    /// Parent link ID, `None` only for the share root
    pub parent_id: Option<String>,
    /// File or folder
    pub link_type: LinkType,
    /// Lifecycle state
    pub state: LinkState,
    /// Name encrypted to the parent key
    pub name: EncryptedData,
    /// Signature over the plaintext name
    pub name_signature: Signature,
    /// Keyed lookup hash of the name under the parent's hash key
    pub hash: String,
    /// Node key pair with the secret half sealed under the passphrase
    pub node_key: LockedKey,
    /// Passphrase wrapped to the parent key
    pub node_passphrase: EncryptedData,
    /// Signature over the passphrase
    pub node_passphrase_signature: Signature,
    /// Address of the identity that signed this node
    pub signature_address: String,
    /// Changes on every mutation of this link
    pub etag: String,
    /// Creation time
    pub create_time: DateTime<Utc>,
    /// Last modification time
    pub modify_time: DateTime<Utc>,
    /// Present for files
    pub file_properties: Option<FileProperties>,
    /// Present for folders
    pub folder_properties: Option<FolderProperties>,
}

impl Link {
    /// Whether this link is a file
    pub fn is_file(&self) -> bool {
        self.link_type == LinkType::File
    }

    /// Whether this link is a folder
    pub fn is_folder(&self) -> bool {
        self.link_type == LinkType::Folder
    }

    /// Whether this link is the share root
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Revision lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionState {
    Draft,
    Active,
    Obsolete,
}

/// Revision metadata without blocks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMetadata {
    /// Revision ID
    pub id: String,
    /// Lifecycle state
    pub state: RevisionState,
    /// Total encrypted size in bytes
    pub size: u64,
    /// Signature over the manifest digest, set on commit
    pub manifest_signature: Option<Signature>,
    /// Extended attributes encrypted to the node key, set on commit
    pub xattr: Option<EncryptedData>,
    /// Signature over the plaintext extended attributes, set on commit
    pub xattr_signature: Option<Signature>,
    /// Signer address, set on commit
    pub signature_address: Option<String>,
    /// Creation time
    pub create_time: DateTime<Utc>,
}

/// A stored block of a revision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based block index
    pub index: u32,
    /// SHA-256 of the block ciphertext
    #[serde(with = "base64_serde")]
    pub hash: Vec<u8>,
    /// Plaintext signature, encrypted to the node key
    pub encrypted_signature: EncryptedData,
    /// Ciphertext size in bytes
    pub size: u64,
    /// Token to fetch the block with
    pub token: String,
}

/// A revision with its ordered blocks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Revision metadata
    pub metadata: RevisionMetadata,
    /// Blocks in index order
    pub blocks: Vec<Block>,
}

/// Request to create a file link with a draft revision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub parent_id: String,
    pub name: EncryptedData,
    pub name_signature: Signature,
    pub hash: String,
    pub mime_type: String,
    pub node_key: LockedKey,
    pub node_passphrase: EncryptedData,
    pub node_passphrase_signature: Signature,
    pub signature_address: String,
    pub content_key_packet: EncryptedData,
    pub content_key_signature: Signature,
}

/// IDs returned when a file is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFileResponse {
    pub link_id: String,
    pub revision_id: String,
}

/// Request to create a folder link
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    pub parent_id: String,
    pub name: EncryptedData,
    pub name_signature: Signature,
    pub hash: String,
    pub node_key: LockedKey,
    pub node_passphrase: EncryptedData,
    pub node_passphrase_signature: Signature,
    pub signature_address: String,
    pub node_hash_key: EncryptedData,
}

/// Metadata for one block about to be uploaded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUploadInfo {
    /// 1-based block index
    pub index: u32,
    /// Ciphertext size
    pub size: u64,
    /// Plaintext signature, encrypted to the node key
    pub encrypted_signature: EncryptedData,
    /// SHA-256 of the ciphertext
    #[serde(with = "base64_serde")]
    pub hash: Vec<u8>,
}

/// Request for upload tokens for a batch of blocks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockUploadRequest {
    pub link_id: String,
    pub revision_id: String,
    pub blocks: Vec<BlockUploadInfo>,
}

/// Upload token for one block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUploadLink {
    pub index: u32,
    pub token: String,
}

/// Request to commit a draft revision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitRevisionRequest {
    /// Signature over the ordered concatenation of block hashes
    pub manifest_signature: Signature,
    pub signature_address: String,
    /// Extended attributes encrypted to the node key
    pub xattr: EncryptedData,
    /// Signature over the plaintext extended attributes
    pub xattr_signature: Signature,
}

/// Request to move and/or rename a link
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveLinkRequest {
    /// Destination folder
    pub parent_id: String,
    pub name: EncryptedData,
    pub name_signature: Signature,
    pub hash: String,
    /// Lookup hash under the old parent
    pub original_hash: String,
    /// Passphrase re-wrapped to the destination folder key
    pub node_passphrase: EncryptedData,
    /// Unchanged passphrase signature
    pub node_passphrase_signature: Signature,
    pub signature_address: String,
    /// Last etag observed by the caller
    pub etag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&LinkState::Trashed).unwrap(), "\"trashed\"");
        assert_eq!(serde_json::to_string(&LinkType::Folder).unwrap(), "\"folder\"");
        let state: RevisionState = serde_json::from_str("\"obsolete\"").unwrap();
        assert_eq!(state, RevisionState::Obsolete);
    }

    #[test]
    fn test_upload_link_wire_format() {
        let link = BlockUploadLink {
            index: 3,
            token: "tok".into(),
        };
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json, serde_json::json!({ "index": 3, "token": "tok" }));
    }
}
