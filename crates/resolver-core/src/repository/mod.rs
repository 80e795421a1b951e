use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

use crate::coordinate::Coordinate;
use crate::error::ResolverResult;

mod application;
mod local;
mod remote;

pub use application::{ApplicationRepository, ApplicationRepositoryBuilder};
pub use local::{LocalRepository, LocalRepositoryBuilder};
pub use remote::{RemoteRepository, RemoteRepositoryBuilder};

/// Chunked artifact payload. Errors are typed so a failing remote body stays
/// a transport failure when it reaches the cache writer.
pub type ByteStream = BoxStream<'static, ResolverResult<Bytes>>;

/// What a repository can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub readable: bool,
    pub writable: bool,
    pub remote: bool,
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.readable {
            flags.push("readable");
        }
        if self.writable {
            flags.push("writable");
        }
        if self.remote {
            flags.push("remote");
        }
        write!(f, "{}", flags.join("+"))
    }
}

/// Where bytes for a coordinate may be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Http(Url),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Http(url) => write!(f, "{url}"),
        }
    }
}

/// Candidate location computed by [`Repository::resolve`]. Existence is only
/// checked by [`Repository::retrieve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    pub location: Location,
}

impl ResolutionResult {
    pub fn file(path: PathBuf) -> Self {
        Self {
            location: Location::File(path),
        }
    }

    pub fn http(url: Url) -> Self {
        Self {
            location: Location::Http(url),
        }
    }
}

/// Successful retrieval. Local hits keep the path so callers can use the
/// file in place; remote hits carry the body stream.
pub enum ArtifactBody {
    File {
        path: PathBuf,
        file: tokio::fs::File,
        content_length: Option<u64>,
    },
    Stream {
        stream: ByteStream,
        content_length: Option<u64>,
    },
}

impl ArtifactBody {
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::File { content_length, .. } | Self::Stream { content_length, .. } => {
                *content_length
            }
        }
    }

    /// Converts any body into a chunk stream.
    pub fn into_stream(self) -> ByteStream {
        match self {
            Self::File { path, file, .. } => file_stream(path, file),
            Self::Stream { stream, .. } => stream,
        }
    }
}

impl fmt::Debug for ArtifactBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File {
                path,
                content_length,
                ..
            } => f
                .debug_struct("File")
                .field("path", path)
                .field("content_length", content_length)
                .finish(),
            Self::Stream { content_length, .. } => f
                .debug_struct("Stream")
                .field("content_length", content_length)
                .finish(),
        }
    }
}

pub(crate) fn file_stream(path: PathBuf, file: tokio::fs::File) -> ByteStream {
    use futures::StreamExt;
    use tokio_util::io::ReaderStream;

    Box::pin(
        ReaderStream::new(file)
            .map(move |chunk| chunk.map_err(|err| crate::ResolverError::io(path.clone(), err))),
    )
}

/// A source (and optionally sink) of artifact bytes.
#[async_trait]
pub trait Repository: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Cheap pre-filter: honours the coordinate's repository pin.
    fn supported(&self, coord: &Coordinate) -> bool {
        coord.repository().is_none_or(|pin| pin == self.id())
    }

    fn resolve(&self, coord: &Coordinate) -> Option<ResolutionResult>;

    async fn retrieve(
        &self,
        coord: &Coordinate,
        result: &ResolutionResult,
    ) -> ResolverResult<ArtifactBody>;

    /// Write capability, present on writable repositories.
    fn as_store(&self) -> Option<&dyn ArtifactStore> {
        None
    }
}

/// Write side of a writable repository.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Streams `body` to the layout path of `coord` and returns the final
    /// path with the number of bytes written. The final path is replaced
    /// atomically; nothing is left behind if the stream fails or the future
    /// is dropped.
    async fn store_stream(
        &self,
        coord: &Coordinate,
        body: ByteStream,
    ) -> ResolverResult<(PathBuf, u64)>;

    async fn store(&self, coord: &Coordinate, bytes: Bytes) -> ResolverResult<PathBuf> {
        let body: ByteStream = Box::pin(futures::stream::once(async move { Ok(bytes) }));
        let (path, _) = self.store_stream(coord, body).await?;
        Ok(path)
    }

    /// Final path for `coord` under this store.
    fn path_for(&self, coord: &Coordinate) -> PathBuf;
}

pub(crate) fn require_non_empty(kind: &str, field: &str, value: &str) -> ResolverResult<()> {
    if value.trim().is_empty() {
        return Err(crate::ResolverError::Configuration(format!(
            "{kind} repository {field} must not be empty"
        )));
    }
    Ok(())
}
