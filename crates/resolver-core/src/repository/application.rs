use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{
    ArtifactBody, ArtifactStore, ByteStream, Capabilities, LocalRepository, LocalRepositoryBuilder,
    Repository, ResolutionResult,
};
use crate::coordinate::Coordinate;
use crate::error::{ResolverError, ResolverResult};

/// Writable store: a [`LocalRepository`] plus atomic writes into its layout.
#[derive(Debug, Clone)]
pub struct ApplicationRepository {
    local: LocalRepository,
}

impl ApplicationRepository {
    pub fn builder(id: impl Into<String>) -> ApplicationRepositoryBuilder {
        ApplicationRepositoryBuilder::new(id)
    }

    pub fn root(&self) -> &Path {
        self.local.root()
    }
}

#[async_trait]
impl Repository for ApplicationRepository {
    fn id(&self) -> &str {
        self.local.id()
    }

    fn name(&self) -> &str {
        self.local.name()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            writable: true,
            remote: false,
        }
    }

    fn resolve(&self, coord: &Coordinate) -> Option<ResolutionResult> {
        self.local.resolve(coord)
    }

    async fn retrieve(
        &self,
        coord: &Coordinate,
        result: &ResolutionResult,
    ) -> ResolverResult<ArtifactBody> {
        self.local.retrieve(coord, result).await
    }

    fn as_store(&self) -> Option<&dyn ArtifactStore> {
        Some(self)
    }
}

#[async_trait]
impl ArtifactStore for ApplicationRepository {
    async fn store_stream(
        &self,
        coord: &Coordinate,
        mut body: ByteStream,
    ) -> ResolverResult<(PathBuf, u64)> {
        let dest = self.path_for(coord);
        let dir = dest
            .parent()
            .ok_or_else(|| {
                ResolverError::Configuration(format!("{} has no parent directory", dest.display()))
            })?
            .to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| ResolverError::io(&dir, err))?;

        // The temp file lives next to the destination so the final rename
        // never crosses filesystems. Dropping `temp_path` deletes it.
        let prefix = format!(".{}.", coord.file_name());
        let temp = {
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || {
                tempfile::Builder::new()
                    .prefix(&prefix)
                    .suffix(".part")
                    .tempfile_in(&dir)
            })
        }
        .await
        .map_err(|err| ResolverError::io(&dir, std::io::Error::other(err)))?
        .map_err(|err| ResolverError::io(&dir, err))?;
        let (file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|err| ResolverError::io(&*temp_path, err))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|err| ResolverError::io(&*temp_path, err))?;
        file.sync_all()
            .await
            .map_err(|err| ResolverError::io(&*temp_path, err))?;
        drop(file);

        temp_path
            .persist(&dest)
            .map_err(|err| ResolverError::io(&dest, err.error))?;

        info!(
            repository = %self.id(),
            path = %dest.display(),
            bytes = written,
            "stored artifact"
        );
        debug!(coordinate = %coord, "store complete");
        Ok((dest, written))
    }

    fn path_for(&self, coord: &Coordinate) -> PathBuf {
        self.local.path_for(coord)
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationRepositoryBuilder {
    inner: LocalRepositoryBuilder,
}

impl ApplicationRepositoryBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: LocalRepositoryBuilder::new(id),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            inner: self.inner.with_name(name),
        }
    }

    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        Self {
            inner: self.inner.with_root(root),
        }
    }

    pub fn build(self) -> ResolverResult<ApplicationRepository> {
        Ok(ApplicationRepository {
            local: self.inner.build_as("application")?,
        })
    }
}
