use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{ArtifactBody, Capabilities, Location, Repository, ResolutionResult, require_non_empty};
use crate::coordinate::Coordinate;
use crate::error::{ResolverError, ResolverResult};
use crate::layout;

/// Read-only repository rooted at a directory using the hierarchical layout.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    id: String,
    name: String,
    root: PathBuf,
}

impl LocalRepository {
    pub fn builder(id: impl Into<String>) -> LocalRepositoryBuilder {
        LocalRepositoryBuilder::new(id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, coord: &Coordinate) -> PathBuf {
        layout::local_path(&self.root, coord)
    }

    pub(crate) async fn open(&self, coord: &Coordinate, path: &Path) -> ResolverResult<ArtifactBody> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(repository = %self.id, path = %path.display(), "artifact not present");
                return Err(ResolverError::NotFound {
                    repository: self.id.clone(),
                    coordinate: coord.to_string(),
                    location: path.display().to_string(),
                });
            }
            Err(err) => return Err(ResolverError::io(path, err)),
        };
        let metadata = file
            .metadata()
            .await
            .map_err(|err| ResolverError::io(path, err))?;
        if !metadata.is_file() {
            return Err(ResolverError::NotFound {
                repository: self.id.clone(),
                coordinate: coord.to_string(),
                location: path.display().to_string(),
            });
        }
        Ok(ArtifactBody::File {
            path: path.to_path_buf(),
            file,
            content_length: Some(metadata.len()),
        })
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            ..Capabilities::default()
        }
    }

    fn resolve(&self, coord: &Coordinate) -> Option<ResolutionResult> {
        Some(ResolutionResult::file(self.path_for(coord)))
    }

    async fn retrieve(
        &self,
        coord: &Coordinate,
        result: &ResolutionResult,
    ) -> ResolverResult<ArtifactBody> {
        match &result.location {
            Location::File(path) => self.open(coord, path).await,
            Location::Http(url) => Err(ResolverError::Configuration(format!(
                "local repository '{}' cannot retrieve {url}",
                self.id
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalRepositoryBuilder {
    id: String,
    name: Option<String>,
    root: Option<PathBuf>,
}

impl LocalRepositoryBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            root: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn build(self) -> ResolverResult<LocalRepository> {
        self.build_as("local")
    }

    pub(crate) fn build_as(self, kind: &str) -> ResolverResult<LocalRepository> {
        require_non_empty(kind, "id", &self.id)?;
        let root = self.root.ok_or_else(|| {
            ResolverError::Configuration(format!("{kind} repository '{}' has no root", self.id))
        })?;
        Ok(LocalRepository {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            root,
        })
    }
}
