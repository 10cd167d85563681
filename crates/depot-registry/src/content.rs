//! Streamed artifact content.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{RegistryError, Result, StorageError};

/// Chunk size used when streaming from readers.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A stream of content chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// A lazily produced byte stream with an optional declared size.
///
/// Content is consumed exactly once, either by polling it as a [`Stream`]
/// or through [`Content::into_bytes`].
pub struct Content {
    size: Option<u64>,
    stream: ByteStream,
}

impl Content {
    pub fn new(size: Option<u64>, stream: ByteStream) -> Self {
        Content { size, stream }
    }

    /// Zero-length content.
    pub fn empty() -> Self {
        Content::new(Some(0), stream::empty().boxed())
    }

    /// Content backed by a single in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let size = Some(bytes.len() as u64);
        if bytes.is_empty() {
            return Content::new(size, stream::empty().boxed());
        }
        Content::new(size, stream::once(async move { Ok(bytes) }).boxed())
    }

    /// Content read from an async reader in [`CHUNK_SIZE`] chunks.
    ///
    /// `origin` names the source in I/O errors.
    pub fn from_reader<R>(reader: R, size: Option<u64>, origin: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let origin = origin.into();
        let chunks = stream::try_unfold(reader, move |mut reader| {
            let origin = origin.clone();
            async move {
                let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
                let read = match reader.read_buf(&mut buf).await {
                    Ok(read) => read,
                    Err(e) => return Err(RegistryError::from(StorageError::io(&origin, e))),
                };
                if read == 0 {
                    Ok(None)
                } else {
                    Ok(Some((buf.freeze(), reader)))
                }
            }
        });
        Content::new(size, chunks.boxed())
    }

    /// Declared size in bytes, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    /// Collect the whole stream into memory.
    pub async fn into_bytes(self) -> Result<Bytes> {
        let buf = self
            .stream
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }
}

impl Stream for Content {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content").field("size", &self.size).finish_non_exhaustive()
    }
}
