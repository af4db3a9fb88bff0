//! Streaming file endpoints: the request body of `UploadFile` and the
//! response body of `DownloadFile` are sequences of chunk frames.

use super::status::Status;
use super::AppState;
use crate::auth::Identity;
use crate::storage::StorageError;
use crate::transfer::{ChunkCodec, TransferError, UploadResponse};
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::io::StreamReader;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub name: String,
}

fn upload_status(err: &TransferError) -> Status {
    tracing::warn!("Upload failed: {err}");
    match err {
        TransferError::MissingFilename => Status::invalid_argument("filename is required"),
        TransferError::Storage(StorageError::InvalidName(_)) | TransferError::InvalidFilename => {
            Status::invalid_argument("invalid file name")
        }
        TransferError::Storage(_) => Status::invalid_argument("file can not be uploaded"),
        TransferError::FrameTooLarge(_) | TransferError::TruncatedFrame | TransferError::Io(_) => {
            Status::invalid_argument("upload stream is not valid")
        }
    }
}

/// POST /rpc/UploadFile: the body is a stream of chunk frames.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Body,
) -> Result<Json<UploadResponse>, Status> {
    let bytes = body.into_data_stream().map_err(std::io::Error::other);
    let chunks = FramedRead::new(StreamReader::new(bytes), ChunkCodec);

    state
        .files
        .upload(&identity, chunks)
        .await
        .map(Json)
        .map_err(|e| upload_status(&e))
}

fn encode_frame(chunk: crate::transfer::Chunk) -> Result<Bytes, TransferError> {
    let mut buf = BytesMut::with_capacity(chunk.data.len() + 6);
    ChunkCodec.encode(chunk, &mut buf)?;
    Ok(buf.freeze())
}

/// GET /rpc/DownloadFile?name=<object>: the response body is a stream of chunk frames.
pub async fn download_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, Status> {
    let Query(query) = query.map_err(|_| Status::invalid_argument("file name is required"))?;

    let chunks = state
        .files
        .download(&identity, &query.name)
        .await
        .map_err(|e| {
            tracing::warn!(name = query.name.as_str(), "Download failed to open: {e}");
            Status::invalid_argument("file can not be downloaded")
        })?;

    let user_id = identity.user_id;
    let frames = chunks
        .map(|chunk| chunk.and_then(encode_frame))
        .inspect_err(move |e| {
            tracing::warn!(user_id = user_id.as_str(), "Download aborted mid-stream: {e}");
        });

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(frames),
    )
        .into_response())
}
