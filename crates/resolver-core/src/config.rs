use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_yaml_bw as serde_yaml;

use crate::engine::ResolutionEngine;
use crate::http::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_USER_AGENT, DefaultHttpClientFactory,
    HttpClientFactory,
};
use crate::registry::{APPLICATION_KIND, LOCAL_KIND, REMOTE_KIND, RepositoryRegistry, RepositorySpec};

pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

/// Ordered repository list plus transport settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub repositories: Vec<RepositorySpec>,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpSettings {
    pub fn client_factory(&self) -> DefaultHttpClientFactory {
        DefaultHttpClientFactory {
            user_agent: self.user_agent.clone(),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    repositories: Vec<RepositorySpec>,
    #[serde(default)]
    http: HttpFile,
}

#[derive(Debug, Default, Deserialize)]
struct HttpFile {
    #[serde(default)]
    connect_timeout: Option<String>,
    #[serde(default)]
    read_timeout: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
}

impl ResolverConfig {
    /// Reads a YAML file. Relative filesystem roots are taken relative to
    /// the file's directory.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read resolver config {}", path.display()))?;
        Self::from_yaml_with_base(&content, path.parent())
            .with_context(|| format!("failed to parse resolver config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Self::from_yaml_with_base(content, None)
    }

    fn from_yaml_with_base(content: &str, base: Option<&Path>) -> Result<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(content).context("resolver config YAML is not valid")?;
        if file.repositories.is_empty() {
            bail!("resolver config lists no repositories");
        }

        let repositories = file
            .repositories
            .into_iter()
            .map(|mut spec| {
                let filesystem = [LOCAL_KIND, APPLICATION_KIND]
                    .iter()
                    .any(|kind| spec.kind.eq_ignore_ascii_case(kind));
                if filesystem {
                    spec.root = resolve_path(base, &spec.root).display().to_string();
                }
                spec
            })
            .collect();

        let defaults = HttpSettings::default();
        let http = HttpSettings {
            connect_timeout: parse_duration_opt("http.connect_timeout", file.http.connect_timeout)?
                .unwrap_or(defaults.connect_timeout),
            read_timeout: parse_duration_opt("http.read_timeout", file.http.read_timeout)?
                .unwrap_or(defaults.read_timeout),
            user_agent: file.http.user_agent.unwrap_or(defaults.user_agent),
        };

        Ok(Self { repositories, http })
    }

    /// Build a [`ResolverConfig`] from the documented ARTIFACT_* variables.
    ///
    /// `ARTIFACT_RESOLVER_CONFIG` points at a YAML file; without it a
    /// local → application → remote chain is assembled from
    /// `ARTIFACT_LOCAL_REPO`, `ARTIFACT_CACHE_DIR` and `ARTIFACT_REMOTE_URL`.
    /// Timeout variables override either source.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("ARTIFACT_RESOLVER_CONFIG") {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default_chain(&lookup),
        };

        if let Some(timeout) =
            parse_duration_opt("ARTIFACT_HTTP_CONNECT_TIMEOUT", lookup("ARTIFACT_HTTP_CONNECT_TIMEOUT"))?
        {
            cfg.http.connect_timeout = timeout;
        }
        if let Some(timeout) =
            parse_duration_opt("ARTIFACT_HTTP_READ_TIMEOUT", lookup("ARTIFACT_HTTP_READ_TIMEOUT"))?
        {
            cfg.http.read_timeout = timeout;
        }
        Ok(cfg)
    }

    fn default_chain<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut repositories = Vec::new();
        let local = lookup("ARTIFACT_LOCAL_REPO").or_else(|| {
            lookup("HOME").map(|home| {
                PathBuf::from(home)
                    .join(".m2")
                    .join("repository")
                    .display()
                    .to_string()
            })
        });
        if let Some(local) = local {
            repositories.push(RepositorySpec::new("local", LOCAL_KIND, local).with_name("Local repository"));
        }
        let cache = lookup("ARTIFACT_CACHE_DIR").unwrap_or_else(|| ".artifacts".to_string());
        repositories
            .push(RepositorySpec::new("application", APPLICATION_KIND, cache).with_name("Application cache"));
        let remote = lookup("ARTIFACT_REMOTE_URL").unwrap_or_else(|| MAVEN_CENTRAL.to_string());
        repositories.push(RepositorySpec::new("central", REMOTE_KIND, remote).with_name("Remote repository"));

        Self {
            repositories,
            http: HttpSettings::default(),
        }
    }

    /// Builds repositories through `registry` and assembles the engine.
    pub fn build_engine(
        &self,
        registry: &RepositoryRegistry,
        http: &dyn HttpClientFactory,
    ) -> Result<ResolutionEngine> {
        let repositories = registry
            .build_all(&self.repositories, http)
            .context("failed to build repositories")?;
        ResolutionEngine::builder()
            .repositories(repositories)
            .build()
            .context("failed to build resolution engine")
    }
}

fn parse_duration_opt(key: &str, value: Option<String>) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            humantime::parse_duration(raw.trim())
                .with_context(|| format!("{key} is not a valid duration: `{raw}`"))
        })
        .transpose()
}

fn resolve_path(base: Option<&Path>, value: &str) -> PathBuf {
    let candidate = PathBuf::from(value);
    if candidate.is_absolute() {
        candidate
    } else if let Some(base) = base {
        base.join(candidate)
    } else {
        candidate
    }
}
