use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Unified error across coordinate handling, repositories and the engine.
///
/// Sources are reference counted so a terminal outcome can be handed to
/// every caller waiting on the same coordinate.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    #[error("invalid coordinate `{input}`: {reason}")]
    InvalidCoordinate { input: String, reason: String },

    #[error("{coordinate} not found in repository '{repository}' at {location}")]
    NotFound {
        repository: String,
        coordinate: String,
        location: String,
    },

    #[error("{coordinate} not found in any repository (tried: {})", .attempted.join(", "))]
    AggregateNotFound {
        coordinate: String,
        attempted: Vec<String>,
    },

    #[error("transport failure from repository '{repository}' for {location}{}", status_suffix(.status))]
    Transport {
        repository: String,
        location: String,
        status: Option<u16>,
        #[source]
        source: Option<Arc<reqwest::Error>>,
    },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("resolution of {coordinate} was interrupted")]
    Interrupted { coordinate: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result alias for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;

impl ResolverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn transport(
        repository: impl Into<String>,
        location: impl Into<String>,
        status: Option<u16>,
        source: Option<reqwest::Error>,
    ) -> Self {
        Self::Transport {
            repository: repository.into(),
            location: location.into(),
            status,
            source: source.map(Arc::new),
        }
    }

    /// `true` for the per-repository absence the engine recovers from.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_aggregate_not_found(&self) -> bool {
        matches!(self, Self::AggregateNotFound { .. })
    }

    /// HTTP status carried by a transport failure, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(": HTTP {code}"),
        None => String::new(),
    }
}
