use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use resolver_core::{
    ApplicationRepository, ArtifactBody, ByteStream, CancellationToken, Capabilities, Coordinate,
    LocalRepository, Location, NoopMonitor, Repository, ResolutionEngine, ResolutionMonitor,
    ResolutionResult, ResolverError, ResolverResult,
};
use url::Url;

const PAYLOAD: &[u8] = b"0123456789abcdef";

/// Remote-like repository that counts fetches, can stall mid-body and can
/// answer HTTP 500 a set number of times.
struct CountingRemote {
    fetches: AtomicUsize,
    stall: AtomicBool,
    failures: AtomicUsize,
    delay: Duration,
}

impl CountingRemote {
    fn new(delay: Duration) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            stall: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
            delay,
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for CountingRemote {
    fn id(&self) -> &str {
        "stub"
    }

    fn name(&self) -> &str {
        "Counting stub"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            writable: false,
            remote: true,
        }
    }

    fn resolve(&self, coord: &Coordinate) -> Option<ResolutionResult> {
        let url = Url::parse("https://stub.invalid/repo/")
            .ok()?
            .join(&resolver_core::layout::url_suffix(coord))
            .ok()?;
        Some(ResolutionResult::http(url))
    }

    async fn retrieve(
        &self,
        _coord: &Coordinate,
        result: &ResolutionResult,
    ) -> ResolverResult<ArtifactBody> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ResolverError::transport(
                "stub",
                result.location.to_string(),
                Some(500),
                None,
            ));
        }

        let (head, tail) = PAYLOAD.split_at(PAYLOAD.len() / 2);
        let head = futures::stream::iter(vec![Ok(Bytes::from_static(head))]);
        let stream: ByteStream = if self.stall.load(Ordering::SeqCst) {
            Box::pin(head.chain(futures::stream::pending()))
        } else {
            Box::pin(head.chain(futures::stream::iter(vec![Ok(Bytes::from_static(tail))])))
        };
        Ok(ArtifactBody::Stream {
            stream,
            content_length: Some(PAYLOAD.len() as u64),
        })
    }
}

fn engine_with(stub: Arc<CountingRemote>, cache_root: &Path) -> Result<ResolutionEngine> {
    let cache = ApplicationRepository::builder("cache")
        .with_root(cache_root)
        .build()?;
    Ok(ResolutionEngine::builder()
        .repository(stub)
        .repository(Arc::new(cache))
        .build()?)
}

fn coord() -> Coordinate {
    "org.example:widget:1.2.0".parse().unwrap()
}

fn files_under(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolutions_fetch_once() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let stub = Arc::new(CountingRemote::new(Duration::from_millis(100)));
    let engine = Arc::new(engine_with(Arc::clone(&stub), temp.path())?);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move { engine.resolve(&coord()).await }));
    }
    let mut paths = Vec::new();
    for task in tasks {
        let artifact = task.await??;
        assert_eq!(artifact.repository(), "stub");
        paths.push(artifact.path().map(Path::to_path_buf));
    }

    assert_eq!(stub.fetches(), 1);
    assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
    let cached = temp.path().join("org/example/widget/1.2.0/widget-1.2.0.jar");
    assert_eq!(std::fs::read(cached)?, PAYLOAD);
    Ok(())
}

#[tokio::test]
async fn timed_out_resolution_is_retried() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let stub = Arc::new(CountingRemote::new(Duration::ZERO));
    stub.stall.store(true, Ordering::SeqCst);
    let engine = engine_with(Arc::clone(&stub), temp.path())?;

    let first =
        tokio::time::timeout(Duration::from_millis(50), engine.resolve(&coord())).await;
    assert!(first.is_err(), "stalled download should time out");

    stub.stall.store(false, Ordering::SeqCst);
    engine.resolve(&coord()).await?;
    assert_eq!(stub.fetches(), 2);
    Ok(())
}

#[tokio::test]
async fn cancellation_leaves_no_residue() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let stub = Arc::new(CountingRemote::new(Duration::ZERO));
    stub.stall.store(true, Ordering::SeqCst);
    let engine = engine_with(Arc::clone(&stub), temp.path())?;
    let final_path = temp.path().join("org/example/widget/1.2.0/widget-1.2.0.jar");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let err = engine
        .resolve_with_cancel(&coord(), &NoopMonitor, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::Interrupted { .. }));
    assert!(!final_path.exists());
    assert!(
        files_under(final_path.parent().unwrap()).is_empty(),
        "temporary download files must be removed"
    );

    stub.stall.store(false, Ordering::SeqCst);
    let artifact = engine
        .resolve_with_cancel(&coord(), &NoopMonitor, &CancellationToken::new())
        .await?;
    assert_eq!(artifact.path(), Some(final_path.as_path()));
    assert_eq!(std::fs::read(&final_path)?, PAYLOAD);
    assert_eq!(files_under(final_path.parent().unwrap()), vec!["widget-1.2.0.jar"]);
    Ok(())
}

#[derive(Default)]
struct FailureLog {
    repositories: Mutex<Vec<String>>,
}

impl FailureLog {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.repositories.lock().unwrap())
    }
}

impl ResolutionMonitor for FailureLog {
    fn failed(&self, _coord: &Coordinate, repository: &str, _error: &ResolverError) -> Result<()> {
        self.repositories.lock().unwrap().push(repository.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn failed_resolution_is_retried_across_every_repository() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let local = LocalRepository::builder("m2")
        .with_root(temp.path().join("m2"))
        .build()?;
    let stub = Arc::new(CountingRemote::new(Duration::ZERO));
    stub.failures.store(1, Ordering::SeqCst);
    let cache = ApplicationRepository::builder("cache")
        .with_root(temp.path().join("cache"))
        .build()?;
    let engine = ResolutionEngine::builder()
        .repository(Arc::new(local))
        .repository(Arc::clone(&stub) as Arc<dyn Repository>)
        .repository(Arc::new(cache))
        .build()?;
    let log = FailureLog::default();

    let err = engine.resolve_with_monitor(&coord(), &log).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(log.take(), vec!["m2", "stub"]);

    let artifact = engine.resolve_with_monitor(&coord(), &log).await?;
    assert_eq!(artifact.repository(), "stub");
    assert_eq!(artifact.bytes().await?.as_ref(), PAYLOAD);
    assert_eq!(log.take(), vec!["m2"]);
    assert_eq!(stub.fetches(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_callers_share_one_failure() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let stub = Arc::new(CountingRemote::new(Duration::from_millis(100)));
    stub.failures.store(usize::MAX, Ordering::SeqCst);
    let engine = Arc::new(engine_with(Arc::clone(&stub), temp.path())?);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move { engine.resolve(&coord()).await }));
    }
    for task in tasks {
        let err = task.await?.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
    assert_eq!(stub.fetches(), 1);

    stub.failures.store(0, Ordering::SeqCst);
    engine.resolve(&coord()).await?;
    assert_eq!(stub.fetches(), 2);
    Ok(())
}

struct BrokenMonitor;

impl ResolutionMonitor for BrokenMonitor {
    fn found(
        &self,
        _coord: &Coordinate,
        _location: &Location,
        _repository: &str,
        _content_length: Option<u64>,
    ) -> Result<()> {
        bail!("metrics backend offline")
    }

    fn downloaded(&self, _coord: &Coordinate, _bytes_written: u64) -> Result<()> {
        panic!("observer bug")
    }
}

#[tokio::test]
async fn monitor_failures_do_not_change_the_result() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let stub = Arc::new(CountingRemote::new(Duration::ZERO));
    let engine = engine_with(Arc::clone(&stub), temp.path())?;

    let artifact = engine.resolve_with_monitor(&coord(), &BrokenMonitor).await?;
    assert_eq!(artifact.bytes().await?.as_ref(), PAYLOAD);
    Ok(())
}
