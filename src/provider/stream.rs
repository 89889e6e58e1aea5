//! Streamed archive bodies.
//!
//! Archives move between the local filesystem and the object stores chunk by
//! chunk. An [`ArchiveStream`] carries the chunks together with the total
//! length when the source knows it, since S3 uploads need a content length up
//! front.

use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// Boxed stream of archive chunks.
pub type ArchiveChunks = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Archive bytes read chunk by chunk.
pub struct ArchiveStream {
    chunks: ArchiveChunks,
    length: Option<u64>,
}

impl fmt::Debug for ArchiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveStream")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl ArchiveStream {
    /// Wraps a stream of chunks.
    #[must_use]
    pub fn new<S>(chunks: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            chunks: Box::pin(chunks),
            length,
        }
    }

    /// Streams the contents of an async reader.
    #[must_use]
    pub fn from_reader<R>(reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::new(ReaderStream::new(reader), length)
    }

    /// Opens a local file for streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its size read.
    pub async fn from_path(path: &Path) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        Ok(Self::from_reader(file, Some(length)))
    }

    /// Total length in bytes, if known.
    #[must_use]
    pub const fn length(&self) -> Option<u64> {
        self.length
    }

    /// Returns the chunk stream.
    #[must_use]
    pub fn into_chunks(self) -> ArchiveChunks {
        self.chunks
    }
}

#[cfg(test)]
impl ArchiveStream {
    /// Drains the stream, returning the chunks read.
    pub(crate) async fn read_chunks(self) -> io::Result<Vec<Bytes>> {
        use futures::TryStreamExt;
        self.chunks.try_collect().await
    }

    /// Drains the stream into one buffer.
    pub(crate) async fn read_all(self) -> io::Result<Bytes> {
        Ok(self.read_chunks().await?.concat().into())
    }
}
