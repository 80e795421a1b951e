use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info_span};

use crate::coordinate::Coordinate;
use crate::error::{ResolverError, ResolverResult};
use crate::monitor::{NoopMonitor, ResolutionMonitor, notify};
use crate::repository::{ArtifactBody, ArtifactStore, Location, Repository};

mod inflight;

use inflight::InFlight;

/// Bytes for a resolved coordinate.
#[derive(Debug, Clone)]
pub enum ArtifactContent {
    /// Served from, or cached into, a filesystem repository.
    File(PathBuf),
    /// Remote hit with no writable repository configured.
    Memory(Bytes),
}

/// Successful resolution. Cheap to clone; concurrent waiters on the same
/// coordinate receive the same value.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    coordinate: Coordinate,
    repository: Arc<str>,
    location: Location,
    content: ArtifactContent,
}

impl ResolvedArtifact {
    pub(crate) fn on_disk(
        coordinate: Coordinate,
        repository: &str,
        location: Location,
        path: PathBuf,
    ) -> Self {
        Self {
            coordinate,
            repository: Arc::from(repository),
            location,
            content: ArtifactContent::File(path),
        }
    }

    pub(crate) fn in_memory(
        coordinate: Coordinate,
        repository: &str,
        location: Location,
        bytes: Bytes,
    ) -> Self {
        Self {
            coordinate,
            repository: Arc::from(repository),
            location,
            content: ArtifactContent::Memory(bytes),
        }
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    /// Id of the repository that served the bytes.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Where the serving repository found the artifact.
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn content(&self) -> &ArtifactContent {
        &self.content
    }

    /// Local file holding the artifact, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            ArtifactContent::File(path) => Some(path),
            ArtifactContent::Memory(_) => None,
        }
    }

    pub async fn open(&self) -> ResolverResult<Pin<Box<dyn AsyncRead + Send>>> {
        match &self.content {
            ArtifactContent::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|err| ResolverError::io(path, err))?;
                Ok(Box::pin(file))
            }
            ArtifactContent::Memory(bytes) => Ok(Box::pin(std::io::Cursor::new(bytes.clone()))),
        }
    }

    pub async fn bytes(&self) -> ResolverResult<Bytes> {
        match &self.content {
            ArtifactContent::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|err| ResolverError::io(path, err)),
            ArtifactContent::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Resolves coordinates against an ordered, immutable repository list.
pub struct ResolutionEngine {
    repositories: Vec<Arc<dyn Repository>>,
    inflight: InFlight,
    span: Span,
}

impl ResolutionEngine {
    pub fn builder() -> ResolutionEngineBuilder {
        ResolutionEngineBuilder::default()
    }

    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    /// First writable repository in configured order.
    fn cache_store(&self) -> Option<(&str, &dyn ArtifactStore)> {
        self.repositories
            .iter()
            .find_map(|repo| repo.as_store().map(|store| (repo.id(), store)))
    }

    pub async fn resolve(&self, coord: &Coordinate) -> ResolverResult<ResolvedArtifact> {
        self.resolve_with_monitor(coord, &NoopMonitor).await
    }

    pub async fn resolve_with_monitor(
        &self,
        coord: &Coordinate,
        monitor: &dyn ResolutionMonitor,
    ) -> ResolverResult<ResolvedArtifact> {
        let span = info_span!(parent: &self.span, "resolve", coordinate = %coord);
        self.resolve_inner(coord, monitor).instrument(span).await
    }

    /// Like [`Self::resolve_with_monitor`], but gives up with
    /// [`ResolverError::Interrupted`] once `cancel` fires. Open connections,
    /// file handles and partial cache files are released on the way out.
    pub async fn resolve_with_cancel(
        &self,
        coord: &Coordinate,
        monitor: &dyn ResolutionMonitor,
        cancel: &CancellationToken,
    ) -> ResolverResult<ResolvedArtifact> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResolverError::Interrupted {
                coordinate: coord.to_string(),
            }),
            result = self.resolve_with_monitor(coord, monitor) => result,
        }
    }

    async fn resolve_inner(
        &self,
        coord: &Coordinate,
        monitor: &dyn ResolutionMonitor,
    ) -> ResolverResult<ResolvedArtifact> {
        let candidates: Vec<&Arc<dyn Repository>> = self
            .repositories
            .iter()
            .filter(|repo| repo.supported(coord))
            .collect();
        if candidates.is_empty() {
            debug!(pin = ?coord.repository(), "no repository accepts coordinate");
            return Err(ResolverError::AggregateNotFound {
                coordinate: coord.to_string(),
                attempted: Vec::new(),
            });
        }

        let mut guard = self.inflight.acquire(coord).await;
        if let Some(outcome) = guard.completed() {
            match &outcome {
                Ok(done) => debug!(repository = done.repository(), "reusing concurrent resolution"),
                Err(err) => debug!(error = %err, "reusing concurrent failure"),
            }
            return outcome;
        }

        let outcome = self.search(coord, candidates, monitor).await;
        guard.publish(&outcome);
        outcome
    }

    /// Walks the candidates in order. Absence falls through to the next
    /// repository; any other failure ends the search.
    async fn search(
        &self,
        coord: &Coordinate,
        candidates: Vec<&Arc<dyn Repository>>,
        monitor: &dyn ResolutionMonitor,
    ) -> ResolverResult<ResolvedArtifact> {
        let mut attempted = Vec::with_capacity(candidates.len());
        for repo in candidates {
            attempted.push(repo.id().to_string());
            let Some(result) = repo.resolve(coord) else {
                debug!(repository = repo.id(), "repository produced no candidate");
                continue;
            };
            debug!(repository = repo.id(), location = %result.location, "trying repository");

            let outcome = match repo.retrieve(coord, &result).await {
                Ok(body) => {
                    notify("found", || {
                        monitor.found(coord, &result.location, repo.id(), body.content_length())
                    });
                    self.materialize(coord, repo.as_ref(), result.location, body, monitor)
                        .await
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(artifact) => return Ok(artifact),
                Err(err) if err.is_not_found() => {
                    debug!(repository = repo.id(), error = %err, "not found, falling back");
                    notify("failed", || monitor.failed(coord, repo.id(), &err));
                }
                Err(err) => {
                    notify("failed", || monitor.failed(coord, repo.id(), &err));
                    return Err(err);
                }
            }
        }

        Err(ResolverError::AggregateNotFound {
            coordinate: coord.to_string(),
            attempted,
        })
    }

    /// Turns a retrieved body into the caller-facing artifact, writing remote
    /// bytes through to the first writable repository.
    async fn materialize(
        &self,
        coord: &Coordinate,
        repo: &dyn Repository,
        location: Location,
        body: ArtifactBody,
        monitor: &dyn ResolutionMonitor,
    ) -> ResolverResult<ResolvedArtifact> {
        if !repo.capabilities().remote {
            return match body {
                ArtifactBody::File { path, .. } => Ok(ResolvedArtifact::on_disk(
                    coord.clone(),
                    repo.id(),
                    location,
                    path,
                )),
                ArtifactBody::Stream { stream, .. } => {
                    let (bytes, _) = collect(stream).await?;
                    Ok(ResolvedArtifact::in_memory(coord.clone(), repo.id(), location, bytes))
                }
            };
        }

        match self.cache_store() {
            Some((store_id, store)) => {
                let (path, written) = store.store_stream(coord, body.into_stream()).await?;
                debug!(store = store_id, path = %path.display(), "cached remote artifact");
                notify("downloaded", || monitor.downloaded(coord, written));
                Ok(ResolvedArtifact::on_disk(coord.clone(), repo.id(), location, path))
            }
            None => {
                let (bytes, written) = collect(body.into_stream()).await?;
                notify("downloaded", || monitor.downloaded(coord, written));
                Ok(ResolvedArtifact::in_memory(coord.clone(), repo.id(), location, bytes))
            }
        }
    }
}

impl fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.repositories.iter().map(|repo| repo.id()).collect();
        f.debug_struct("ResolutionEngine")
            .field("repositories", &ids)
            .finish()
    }
}

async fn collect(mut stream: crate::repository::ByteStream) -> ResolverResult<(Bytes, u64)> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    let len = buf.len() as u64;
    Ok((buf.freeze(), len))
}

#[derive(Default)]
pub struct ResolutionEngineBuilder {
    repositories: Vec<Arc<dyn Repository>>,
    span: Option<Span>,
}

impl ResolutionEngineBuilder {
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn repositories(mut self, repositories: impl IntoIterator<Item = Arc<dyn Repository>>) -> Self {
        self.repositories.extend(repositories);
        self
    }

    /// Parent span for every resolution. Defaults to the span current at
    /// build time.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> ResolverResult<ResolutionEngine> {
        if self.repositories.is_empty() {
            return Err(ResolverError::Configuration(
                "at least one repository is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if !seen.insert(repo.id().to_string()) {
                return Err(ResolverError::Configuration(format!(
                    "duplicate repository id '{}'",
                    repo.id()
                )));
            }
        }
        Ok(ResolutionEngine {
            repositories: self.repositories,
            inflight: InFlight::default(),
            span: self.span.unwrap_or_else(Span::current),
        })
    }
}
