//! Block pipeline
//!
//! Upload reads the input in `chunk_size` pieces and encrypts them on the
//! blocking pool, bounded by the drive-wide encryption semaphore. Chunks
//! travel in batches of `upload_batch_size`: a batch is fully encrypted,
//! then registered with one upload-token request, then uploaded in index
//! order. Download is a pull-based stream that fetches, verifies and
//! decrypts `download_batch_size` blocks each time its buffer drains.

use crate::{
    Drive, DriveError, Result,
    cache::KeyBundle,
    cancel::{ensure_active, guarded},
};
use bytes::Bytes;
use futures::stream::{BoxStream, FuturesUnordered};
use futures::{Stream, StreamExt, TryStreamExt};
use sealdrive_crypto::{
    CryptoError, CryptoProvider, DekKey, EncryptedBlock, PublicKey, VerifyingKey,
};
use sealdrive_store::{Block, BlockUploadInfo, BlockUploadRequest, DriveApi};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Where encrypted blocks go
pub(crate) struct BlockTarget {
    pub(crate) link_id: String,
    pub(crate) revision_id: String,
    pub(crate) content_key: Arc<DekKey>,
    pub(crate) node_public: PublicKey,
}

/// Result of uploading all blocks of one revision
#[derive(Debug, Default)]
pub(crate) struct UploadedBlocks {
    /// Concatenated block hashes in index order
    pub(crate) manifest: Vec<u8>,
    /// Plaintext bytes read
    pub(crate) size: u64,
    pub(crate) block_count: usize,
}

/// Read up to `size` bytes, short only at end of input
async fn read_chunk<R>(reader: &mut R, size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

impl Drive {
    /// Encrypt and upload `reader` as the blocks of a draft revision
    pub(crate) async fn upload_blocks<R>(
        &self,
        reader: &mut R,
        target: &BlockTarget,
        cancel: &CancellationToken,
    ) -> Result<UploadedBlocks>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let config = &self.inner.config;
        let mut uploaded = UploadedBlocks::default();
        let mut next_index: u32 = 1;
        let mut eof = false;

        while !eof {
            ensure_active(cancel)?;
            let first_index = next_index;
            let mut tasks = Vec::with_capacity(config.upload_batch_size);

            while tasks.len() < config.upload_batch_size {
                let data = read_chunk(reader, config.chunk_size).await?;
                if data.is_empty() {
                    eof = true;
                    break;
                }
                if data.len() < config.chunk_size {
                    eof = true;
                }
                uploaded.size += data.len() as u64;
                next_index += 1;

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DriveError::Cancelled),
                    permit = self.inner.encryption_permits.clone().acquire_owned() => {
                        permit.map_err(|_| DriveError::Cancelled)?
                    }
                };
                let slot = tasks.len();
                let crypto = self.inner.crypto.clone();
                let identity = self.inner.identity.clone();
                let key = target.content_key.clone();
                let node = target.node_public.clone();
                tasks.push(tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    (slot, crypto.encrypt_block(&data, &key, &node, identity.signer()))
                }));

                if eof {
                    break;
                }
            }

            if tasks.is_empty() {
                break;
            }
            let encrypted = collect_batch(tasks).await?;
            self.upload_batch(target, first_index, encrypted, &mut uploaded, cancel)
                .await?;
        }

        Ok(uploaded)
    }

    async fn upload_batch(
        &self,
        target: &BlockTarget,
        first_index: u32,
        encrypted: Vec<EncryptedBlock>,
        uploaded: &mut UploadedBlocks,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = BlockUploadRequest {
            link_id: target.link_id.clone(),
            revision_id: target.revision_id.clone(),
            blocks: encrypted
                .iter()
                .zip(first_index..)
                .map(|(block, index)| BlockUploadInfo {
                    index,
                    size: block.ciphertext.len() as u64,
                    encrypted_signature: block.encrypted_signature.clone(),
                    hash: block.hash.to_vec(),
                })
                .collect(),
        };
        let mut links = guarded(cancel, self.inner.api.request_block_upload(request)).await?;
        if links.len() != encrypted.len() {
            return Err(DriveError::BlockCountMismatch {
                expected: encrypted.len(),
                actual: links.len(),
            });
        }
        links.sort_by_key(|l| l.index);
        for (link, index) in links.iter().zip(first_index..) {
            if link.index != index {
                return Err(DriveError::BlockCountMismatch {
                    expected: index as usize,
                    actual: link.index as usize,
                });
            }
        }

        for (link, block) in links.iter().zip(encrypted) {
            trace!(index = link.index, size = block.ciphertext.len(), "Uploading block");
            guarded(
                cancel,
                self.inner
                    .api
                    .upload_block(&link.token, Bytes::from(block.ciphertext)),
            )
            .await?;
            uploaded.manifest.extend_from_slice(&block.hash);
            uploaded.block_count += 1;
        }

        debug!(
            link_id = %target.link_id,
            first_index,
            blocks = links.len(),
            "Uploaded block batch"
        );
        Ok(())
    }
}

/// Wait for a batch of encryption tasks, placing results by slot
async fn collect_batch(
    tasks: Vec<tokio::task::JoinHandle<(usize, sealdrive_crypto::Result<EncryptedBlock>)>>,
) -> Result<Vec<EncryptedBlock>> {
    let mut slots: Vec<Option<EncryptedBlock>> = (0..tasks.len()).map(|_| None).collect();
    let mut pending: FuturesUnordered<_> = tasks.into_iter().collect();

    while let Some(joined) = pending.next().await {
        let (slot, result) = joined.map_err(|e| DriveError::Io(std::io::Error::other(e)))?;
        slots[slot] = Some(result?);
    }

    let expected = slots.len();
    let encrypted: Vec<EncryptedBlock> = slots.into_iter().flatten().collect();
    if encrypted.len() != expected {
        return Err(DriveError::BlockCountMismatch {
            expected,
            actual: encrypted.len(),
        });
    }
    Ok(encrypted)
}

pub(crate) struct DownloadState {
    pub(crate) api: Arc<dyn DriveApi>,
    pub(crate) crypto: Arc<dyn CryptoProvider>,
    pub(crate) verifier: VerifyingKey,
    pub(crate) content_key: Arc<DekKey>,
    pub(crate) node: Arc<KeyBundle>,
    pub(crate) pending: VecDeque<Block>,
    pub(crate) batch_size: usize,
    pub(crate) cancel: CancellationToken,
    pub(crate) ready: VecDeque<Bytes>,
}

impl DownloadState {
    async fn fill(&mut self) -> Result<()> {
        for _ in 0..self.batch_size {
            let Some(block) = self.pending.pop_front() else {
                break;
            };
            let data = guarded(&self.cancel, self.api.get_block(&block.token)).await?;

            let actual = self.crypto.content_hash(&data);
            if actual.as_slice() != block.hash.as_slice() {
                return Err(CryptoError::HashMismatch {
                    expected: hex::encode(&block.hash),
                    actual: hex::encode(actual),
                }
                .into());
            }

            let plaintext = self.crypto.decrypt_block(
                &data,
                &block.encrypted_signature,
                &self.content_key,
                self.node.keypair(),
                &self.verifier,
            )?;
            trace!(index = block.index, size = plaintext.len(), "Decrypted block");
            self.ready.push_back(Bytes::from(plaintext));
        }
        Ok(())
    }
}

/// Plaintext of a file revision, block by block
///
/// Blocks are fetched lazily as the stream is polled. The first hash,
/// decryption or signature failure ends the stream with an error.
pub struct DownloadStream {
    inner: BoxStream<'static, Result<Bytes>>,
}

impl DownloadStream {
    pub(crate) fn new(state: DownloadState) -> Self {
        let stream = futures::stream::try_unfold(state, |mut state| async move {
            if state.ready.is_empty() {
                state.fill().await?;
            }
            Ok::<_, DriveError>(state.ready.pop_front().map(|bytes| (bytes, state)))
        });
        Self {
            inner: stream.boxed(),
        }
    }

    /// Read the whole plaintext into memory
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.inner.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    /// Adapt into an [`AsyncRead`]
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self.map_err(std::io::Error::other))
    }
}

impl Stream for DownloadStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DownloadStream")
    }
}
