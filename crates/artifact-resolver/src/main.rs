use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resolver_core::{
    Coordinate, RepositoryRegistry, ResolutionEngine, ResolvedArtifact, ResolverConfig,
    TracingMonitor, layout,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "artifact-resolver")]
struct Cli {
    /// Resolver configuration (YAML). Falls back to ARTIFACT_* environment variables.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve coordinates and print where each artifact was stored
    Resolve {
        /// group:artifact:version[:classifier][@extension]
        #[arg(required = true)]
        coordinates: Vec<String>,

        /// Only consult the repository with this id
        #[arg(long)]
        repository: Option<String>,

        /// Print one JSON object per coordinate
        #[arg(long)]
        json: bool,
    },
    /// Print the repository layout for a coordinate
    Layout { coordinate: String },
    /// List configured repositories in priority order
    Repositories,
}

#[derive(Debug, Serialize)]
struct ResolvedLine<'a> {
    coordinate: String,
    repository: &'a str,
    location: String,
    path: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        tracing::error!(error = %format!("{err:#}"), "artifact resolution failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Layout { coordinate } => {
            let coord: Coordinate = coordinate.parse()?;
            println!("path: {}", layout::relative_path(&coord).display());
            println!("url:  {}", layout::url_suffix(&coord));
            Ok(())
        }
        Command::Repositories => {
            let engine = build_engine(cli.config.as_ref())?;
            for repo in engine.repositories() {
                println!("{:<16} {:<24} {}", repo.id(), repo.name(), repo.capabilities());
            }
            Ok(())
        }
        Command::Resolve {
            coordinates,
            repository,
            json,
        } => {
            let engine = build_engine(cli.config.as_ref())?;
            for raw in coordinates {
                let mut coord: Coordinate = raw
                    .parse()
                    .with_context(|| format!("invalid coordinate `{raw}`"))?;
                if let Some(repository) = &repository {
                    coord = coord.with_repository(repository.clone());
                }
                let artifact = engine
                    .resolve_with_monitor(&coord, &TracingMonitor)
                    .await
                    .with_context(|| format!("failed to resolve {coord}"))?;
                print_artifact(&artifact, json)?;
            }
            Ok(())
        }
    }
}

fn build_engine(config: Option<&PathBuf>) -> Result<ResolutionEngine> {
    let cfg = match config {
        Some(path) => ResolverConfig::load_from_path(path)?,
        None => ResolverConfig::from_env()?,
    };
    let registry = RepositoryRegistry::with_builtin();
    cfg.build_engine(&registry, &cfg.http.client_factory())
}

fn print_artifact(artifact: &ResolvedArtifact, json: bool) -> Result<()> {
    let line = ResolvedLine {
        coordinate: artifact.coordinate().to_string(),
        repository: artifact.repository(),
        location: artifact.location().to_string(),
        path: artifact.path().map(|p| p.display().to_string()),
    };
    if json {
        println!("{}", serde_json::to_string(&line)?);
    } else {
        println!(
            "{} <- {} ({})",
            line.coordinate,
            line.repository,
            line.path.as_deref().unwrap_or("in memory")
        );
    }
    Ok(())
}
