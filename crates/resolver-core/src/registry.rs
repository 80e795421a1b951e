use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ResolverError, ResolverResult};
use crate::http::HttpClientFactory;
use crate::repository::{
    ApplicationRepositoryBuilder, LocalRepositoryBuilder, RemoteRepositoryBuilder, Repository,
};

pub const LOCAL_KIND: &str = "local";
pub const APPLICATION_KIND: &str = "application";
pub const REMOTE_KIND: &str = "remote";

/// Declarative description of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositorySpec {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Directory for filesystem kinds, base URL for remote kinds.
    pub root: String,
}

impl RepositorySpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: None,
            root: root.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

type Constructor =
    dyn Fn(&RepositorySpec, &dyn HttpClientFactory) -> ResolverResult<Arc<dyn Repository>> + Send + Sync;

/// Maps a repository kind to the function that builds it.
#[derive(Default)]
pub struct RepositoryRegistry {
    constructors: HashMap<String, Arc<Constructor>>,
}

impl RepositoryRegistry {
    /// Registry with the `local`, `application` and `remote` kinds installed.
    pub fn with_builtin() -> Self {
        let mut registry = Self::default();
        registry.register_builtin();
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&RepositorySpec, &dyn HttpClientFactory) -> ResolverResult<Arc<dyn Repository>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(kind.into().to_ascii_lowercase(), Arc::new(constructor));
    }

    pub fn register_builtin(&mut self) {
        self.register(LOCAL_KIND, |spec, _| {
            let mut builder = LocalRepositoryBuilder::new(&spec.id).with_root(&spec.root);
            if let Some(name) = &spec.name {
                builder = builder.with_name(name);
            }
            Ok(Arc::new(builder.build()?) as Arc<dyn Repository>)
        });
        self.register(APPLICATION_KIND, |spec, _| {
            let mut builder = ApplicationRepositoryBuilder::new(&spec.id).with_root(&spec.root);
            if let Some(name) = &spec.name {
                builder = builder.with_name(name);
            }
            Ok(Arc::new(builder.build()?) as Arc<dyn Repository>)
        });
        self.register(REMOTE_KIND, |spec, http| {
            let mut builder = RemoteRepositoryBuilder::new(&spec.id).with_root(&spec.root);
            if let Some(name) = &spec.name {
                builder = builder.with_name(name);
            }
            Ok(Arc::new(builder.build(http)?) as Arc<dyn Repository>)
        });
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build(
        &self,
        spec: &RepositorySpec,
        http: &dyn HttpClientFactory,
    ) -> ResolverResult<Arc<dyn Repository>> {
        let constructor = self
            .constructors
            .get(&spec.kind.to_ascii_lowercase())
            .ok_or_else(|| {
                ResolverError::Configuration(format!(
                    "no repository kind `{}` registered (repository '{}')",
                    spec.kind, spec.id
                ))
            })?;
        constructor(spec, http)
    }

    /// Builds every spec, preserving order.
    pub fn build_all(
        &self,
        specs: &[RepositorySpec],
        http: &dyn HttpClientFactory,
    ) -> ResolverResult<Vec<Arc<dyn Repository>>> {
        specs.iter().map(|spec| self.build(spec, http)).collect()
    }
}

impl fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::DefaultHttpClientFactory;

    #[test]
    fn builtin_kinds_are_registered() {
        let registry = RepositoryRegistry::with_builtin();
        assert_eq!(registry.kinds(), vec!["application", "local", "remote"]);
    }

    #[test]
    fn builds_each_builtin_kind() {
        let registry = RepositoryRegistry::with_builtin();
        let http = DefaultHttpClientFactory::default();
        let repos = registry
            .build_all(
                &[
                    RepositorySpec::new("m2", "local", "/home/user/.m2/repository"),
                    RepositorySpec::new("cache", "Application", "/tmp/cache").with_name("Cache"),
                    RepositorySpec::new("central", "remote", "https://repo1.maven.org/maven2"),
                ],
                &http,
            )
            .unwrap();
        let ids: Vec<&str> = repos.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["m2", "cache", "central"]);
        assert_eq!(repos[1].name(), "Cache");
        assert!(repos[1].capabilities().writable);
        assert!(repos[2].capabilities().remote);
    }

    #[test]
    fn unknown_kind_is_a_configuration_error() {
        let registry = RepositoryRegistry::with_builtin();
        let http = DefaultHttpClientFactory::default();
        let err = registry
            .build(&RepositorySpec::new("x", "s3", "s3://bucket"), &http)
            .err().unwrap();
        assert!(matches!(err, ResolverError::Configuration(_)));
    }

    #[test]
    fn custom_kinds_can_be_registered() {
        let mut registry = RepositoryRegistry::default();
        registry.register("mirror", |spec, _| {
            let repo = LocalRepositoryBuilder::new(&spec.id)
                .with_root(format!("/mirrors/{}", spec.root))
                .build()?;
            Ok(Arc::new(repo) as Arc<dyn Repository>)
        });
        let http = DefaultHttpClientFactory::default();
        let repo = registry
            .build(&RepositorySpec::new("eu", "mirror", "eu"), &http)
            .unwrap();
        assert_eq!(repo.id(), "eu");
    }
}
