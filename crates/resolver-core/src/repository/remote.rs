use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use super::{ArtifactBody, Capabilities, Location, Repository, ResolutionResult, require_non_empty};
use crate::coordinate::Coordinate;
use crate::error::{ResolverError, ResolverResult};
use crate::http::HttpClientFactory;
use crate::layout;

/// HTTP(S) repository. Never retries; every failure other than 404 is a
/// transport failure.
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    id: String,
    name: String,
    base: Url,
    client: Client,
}

impl RemoteRepository {
    pub fn builder(id: impl Into<String>) -> RemoteRepositoryBuilder {
        RemoteRepositoryBuilder::new(id)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn transport(&self, url: &Url, status: Option<u16>, source: Option<reqwest::Error>) -> ResolverError {
        ResolverError::transport(&self.id, url.as_str(), status, source)
    }
}

#[async_trait]
impl Repository for RemoteRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            writable: false,
            remote: true,
        }
    }

    fn resolve(&self, coord: &Coordinate) -> Option<ResolutionResult> {
        // The base is validated at build time, so joining only fails for
        // coordinates that cannot form a URL path.
        match layout::remote_url(&self.base, coord) {
            Ok(url) => Some(ResolutionResult::http(url)),
            Err(err) => {
                debug!(repository = %self.id, error = %err, "cannot form remote location");
                None
            }
        }
    }

    async fn retrieve(
        &self,
        coord: &Coordinate,
        result: &ResolutionResult,
    ) -> ResolverResult<ArtifactBody> {
        let url = match &result.location {
            Location::Http(url) => url.clone(),
            Location::File(path) => {
                return Err(ResolverError::Configuration(format!(
                    "remote repository '{}' cannot retrieve {}",
                    self.id,
                    path.display()
                )));
            }
        };

        debug!(repository = %self.id, %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.transport(&url, err.status().map(|s| s.as_u16()), Some(err)))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(ResolverError::NotFound {
                    repository: self.id.clone(),
                    coordinate: coord.to_string(),
                    location: url.to_string(),
                });
            }
            other => return Err(self.transport(&url, Some(other.as_u16()), None)),
        }

        let content_length = response.content_length();
        let repository = self.id.clone();
        let location = url.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|err| ResolverError::transport(&repository, &location, None, Some(err)))
        });

        Ok(ArtifactBody::Stream {
            stream: Box::pin(stream),
            content_length,
        })
    }
}

pub struct RemoteRepositoryBuilder {
    id: String,
    name: Option<String>,
    root: Option<String>,
}

impl RemoteRepositoryBuilder {
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

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn build(self, http: &dyn HttpClientFactory) -> ResolverResult<RemoteRepository> {
        require_non_empty("remote", "id", &self.id)?;
        let raw = self.root.ok_or_else(|| {
            ResolverError::Configuration(format!("remote repository '{}' has no root URL", self.id))
        })?;
        let base = Url::parse(&raw).map_err(|err| {
            ResolverError::Configuration(format!(
                "remote repository '{}' has invalid root `{raw}`: {err}",
                self.id
            ))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ResolverError::Configuration(format!(
                "remote repository '{}' must use http or https, got `{}`",
                self.id,
                base.scheme()
            )));
        }
        let client = http.get().build().map_err(|err| {
            ResolverError::Configuration(format!(
                "failed to build HTTP client for '{}': {err}",
                self.id
            ))
        })?;
        Ok(RemoteRepository {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            base,
            client,
        })
    }
}
