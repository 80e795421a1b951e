//! Artifact resolution core.
//!
//! This crate maps artifact coordinates onto the hierarchical repository
//! layout, tries an ordered list of local, application and remote
//! repositories, and mirrors remote hits into the first writable repository
//! so later resolutions are served from disk.

#![forbid(unsafe_code)]

pub mod config;
pub mod coordinate;
pub mod engine;
pub mod error;
pub mod http;
pub mod layout;
pub mod monitor;
pub mod registry;
pub mod repository;

pub use config::{HttpSettings, ResolverConfig};
pub use coordinate::Coordinate;
pub use engine::{ArtifactContent, ResolutionEngine, ResolutionEngineBuilder, ResolvedArtifact};
pub use error::{ResolverError, ResolverResult};
pub use http::{DefaultHttpClientFactory, HttpClientFactory};
pub use monitor::{NoopMonitor, ResolutionMonitor, TracingMonitor};
pub use registry::{RepositoryRegistry, RepositorySpec};
pub use repository::{
    ApplicationRepository, ArtifactBody, ArtifactStore, ByteStream, Capabilities, LocalRepository,
    Location, RemoteRepository, Repository, ResolutionResult,
};
pub use tokio_util::sync::CancellationToken;
