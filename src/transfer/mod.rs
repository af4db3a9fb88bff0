//! Chunked file upload and download.
//!
//! Upload is client-streaming: every chunk's bytes are accumulated and the
//! whole object is committed once the stream ends. Download is
//! server-streaming in fixed [`CHUNK_SIZE`] pieces.

pub mod codec;

pub use codec::{Chunk, ChunkCodec, MAX_FRAME_DATA};

use crate::auth::Identity;
use crate::storage::{ObjectReader, ObjectStore, StorageError};
use crate::sync::{ChangeEvent, ChangeNotifier, ResourceKind};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Download chunk size in bytes. The last chunk may be shorter.
pub const CHUNK_SIZE: usize = 1024;

const UPLOAD_OK: &str = "File uploaded successfully";

/// Outbound download frames.
pub type ChunkStream = BoxStream<'static, Result<Chunk, TransferError>>;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("upload stream carried no filename")]
    MissingFilename,
    #[error("chunk frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("stream ended inside a chunk frame")]
    TruncatedFrame,
    #[error("chunk filename is not valid")]
    InvalidFilename,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub success: bool,
}

/// Per-call upload buffer.
///
/// The first non-empty filename fixes the object name; later chunks naming
/// something else are ignored for naming but their bytes are kept.
#[derive(Debug, Default)]
pub struct UploadAccumulator {
    filename: Option<String>,
    buffer: BytesMut,
    chunks: usize,
}

impl UploadAccumulator {
    pub fn push(&mut self, chunk: Chunk) {
        self.chunks += 1;
        if !chunk.filename.is_empty() {
            match &self.filename {
                None => self.filename = Some(chunk.filename),
                Some(name) if *name != chunk.filename => tracing::debug!(
                    kept = name.as_str(),
                    ignored = chunk.filename.as_str(),
                    "Ignoring filename change mid-upload"
                ),
                Some(_) => {}
            }
        }
        self.buffer.extend_from_slice(&chunk.data);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// The object name and its full contents.
    pub fn finish(self) -> Result<(String, Bytes), TransferError> {
        let name = self.filename.ok_or(TransferError::MissingFilename)?;
        Ok((name, self.buffer.freeze()))
    }
}

pub struct FileTransferService {
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<ChangeNotifier>,
}

impl FileTransferService {
    pub fn new(objects: Arc<dyn ObjectStore>, notifier: Arc<ChangeNotifier>) -> Self {
        Self { objects, notifier }
    }

    /// Drain `chunks`, commit one object, then tell the user's other sessions.
    pub async fn upload<S>(&self, identity: &Identity, chunks: S) -> Result<UploadResponse, TransferError>
    where
        S: Stream<Item = Result<Chunk, TransferError>> + Send,
    {
        let mut chunks = std::pin::pin!(chunks);
        let mut upload = UploadAccumulator::default();
        while let Some(chunk) = chunks.next().await {
            upload.push(chunk?);
        }

        let received = upload.chunk_count();
        let (name, data) = upload.finish()?;
        let meta = match self.objects.put(&identity.user_id, &name, data).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::error!(
                    user_id = identity.user_id.as_str(),
                    name = name.as_str(),
                    "Upload commit failed: {e}"
                );
                return Err(e.into());
            }
        };
        tracing::info!(
            user_id = identity.user_id.as_str(),
            name = name.as_str(),
            size = meta.size,
            chunks = received,
            "File uploaded"
        );

        let event = ChangeEvent::new(ResourceKind::File, name, identity.session_id.as_str());
        self.notifier
            .broadcast(&identity.user_id, &identity.session_id, &event)
            .await;

        Ok(UploadResponse {
            message: UPLOAD_OK.to_owned(),
            success: true,
        })
    }

    /// Open `name` and stream it back in [`CHUNK_SIZE`] pieces.
    pub async fn download(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<ChunkStream, TransferError> {
        let reader = self.objects.get(&identity.user_id, name).await?;
        tracing::debug!(user_id = identity.user_id.as_str(), name, "Download started");
        Ok(fixed_chunks(reader, CHUNK_SIZE).boxed())
    }
}

/// Split `reader` into chunks of exactly `size` bytes, except the last.
pub fn fixed_chunks(
    reader: ObjectReader,
    size: usize,
) -> impl Stream<Item = Result<Chunk, TransferError>> + Send + 'static {
    stream::try_unfold(reader, move |reader| next_chunk(reader, size))
}

async fn next_chunk(
    mut reader: ObjectReader,
    size: usize,
) -> Result<Option<(Chunk, ObjectReader)>, TransferError> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled == 0 {
        return Ok(None);
    }
    buf.truncate(filled);
    Ok(Some((Chunk::data(buf), reader)))
}
