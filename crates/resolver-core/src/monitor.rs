use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Result;
use tracing::{info, warn};

use crate::coordinate::Coordinate;
use crate::error::ResolverError;
use crate::repository::Location;

/// Observer of per-attempt resolution outcomes.
///
/// Callbacks run synchronously on the resolving task, so implementations
/// must return promptly. Errors and panics are logged by the engine and
/// never change the resolution result.
pub trait ResolutionMonitor: Send + Sync {
    fn found(
        &self,
        _coord: &Coordinate,
        _location: &Location,
        _repository: &str,
        _content_length: Option<u64>,
    ) -> Result<()> {
        Ok(())
    }

    fn downloaded(&self, _coord: &Coordinate, _bytes_written: u64) -> Result<()> {
        Ok(())
    }

    fn failed(&self, _coord: &Coordinate, _repository: &str, _error: &ResolverError) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ResolutionMonitor for NoopMonitor {}

/// Emits one structured event per callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl ResolutionMonitor for TracingMonitor {
    fn found(
        &self,
        coord: &Coordinate,
        location: &Location,
        repository: &str,
        content_length: Option<u64>,
    ) -> Result<()> {
        info!(coordinate = %coord, %location, repository, ?content_length, "artifact found");
        Ok(())
    }

    fn downloaded(&self, coord: &Coordinate, bytes_written: u64) -> Result<()> {
        info!(coordinate = %coord, bytes_written, "artifact downloaded");
        Ok(())
    }

    fn failed(&self, coord: &Coordinate, repository: &str, error: &ResolverError) -> Result<()> {
        info!(coordinate = %coord, repository, error = %error, "repository attempt failed");
        Ok(())
    }
}

/// Invokes a monitor callback, swallowing errors and panics.
pub(crate) fn notify<F>(event: &'static str, call: F)
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(event, error = %err, "resolution monitor returned an error"),
        Err(_) => warn!(event, "resolution monitor panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn notify_swallows_errors_and_panics() {
        notify("found", || bail!("observer broke"));
        notify("found", || panic!("observer exploded"));
        notify("found", || Ok(()));
    }
}
