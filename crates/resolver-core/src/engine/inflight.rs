use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::ResolvedArtifact;
use crate::coordinate::Coordinate;
use crate::error::ResolverResult;

/// Terminal outcome published by a lock holder for the callers queued
/// behind it. Gone once the entry is dropped, so later attempts retry.
pub(crate) type Slot = Option<ResolverResult<ResolvedArtifact>>;

type Entries = Arc<Mutex<HashMap<Coordinate, Entry>>>;

struct Entry {
    gate: Arc<AsyncMutex<Slot>>,
    users: usize,
}

/// Per-coordinate FIFO locks. An entry lives while at least one caller
/// holds or waits on it.
#[derive(Default)]
pub(crate) struct InFlight {
    entries: Entries,
}

impl InFlight {
    pub(crate) async fn acquire(&self, coord: &Coordinate) -> InFlightGuard {
        let gate = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(coord.clone()).or_insert_with(|| Entry {
                gate: Arc::new(AsyncMutex::new(None)),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.gate)
        };
        // Created before awaiting so a cancelled waiter still gives its
        // registration back.
        let registration = Registration {
            entries: Arc::clone(&self.entries),
            coord: coord.clone(),
        };
        let slot = gate.lock_owned().await;
        InFlightGuard {
            slot,
            _registration: registration,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

pub(crate) struct InFlightGuard {
    // Declared first so the lock is released before the registration.
    slot: OwnedMutexGuard<Slot>,
    _registration: Registration,
}

impl InFlightGuard {
    pub(crate) fn completed(&self) -> Option<ResolverResult<ResolvedArtifact>> {
        (*self.slot).clone()
    }

    pub(crate) fn publish(&mut self, outcome: &ResolverResult<ResolvedArtifact>) {
        *self.slot = Some(outcome.clone());
    }
}

struct Registration {
    entries: Entries,
    coord: Coordinate,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&self.coord) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                entries.remove(&self.coord);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn coord(text: &str) -> Coordinate {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn entries_are_removed_after_release() {
        let inflight = InFlight::default();
        let guard = inflight.acquire(&coord("g:a:1")).await;
        assert_eq!(inflight.len(), 1);
        drop(guard);
        assert_eq!(inflight.len(), 0);
    }

    #[tokio::test]
    async fn distinct_coordinates_do_not_contend() {
        let inflight = InFlight::default();
        let _a = inflight.acquire(&coord("g:a:1")).await;
        let b =
            tokio::time::timeout(Duration::from_secs(1), inflight.acquire(&coord("g:b:1"))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_entry() {
        let inflight = InFlight::default();
        let holder = inflight.acquire(&coord("g:a:1")).await;
        let waiter =
            tokio::time::timeout(Duration::from_millis(20), inflight.acquire(&coord("g:a:1")))
                .await;
        assert!(waiter.is_err());
        assert_eq!(inflight.len(), 1);
        drop(holder);
        assert_eq!(inflight.len(), 0);
    }

    #[tokio::test]
    async fn waiter_sees_published_outcome() {
        let inflight = Arc::new(InFlight::default());
        let mut holder = inflight.acquire(&coord("g:a:1")).await;
        assert!(holder.completed().is_none());

        let waiter = {
            let inflight = Arc::clone(&inflight);
            tokio::spawn(async move {
                let guard = inflight.acquire(&coord("g:a:1")).await;
                guard
                    .completed()
                    .and_then(Result::ok)
                    .map(|artifact| artifact.repository().to_string())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        holder.publish(&Ok(ResolvedArtifact::in_memory(
            coord("g:a:1"),
            "central",
            crate::repository::Location::Http(
                url::Url::parse("https://example.org/g/a/1/a-1.jar").unwrap(),
            ),
            bytes::Bytes::from_static(b"jar"),
        )));
        drop(holder);

        assert_eq!(waiter.await.unwrap().as_deref(), Some("central"));
        assert_eq!(inflight.len(), 0);
    }

    #[tokio::test]
    async fn failure_reaches_queued_waiters_but_not_later_callers() {
        let inflight = Arc::new(InFlight::default());
        let mut holder = inflight.acquire(&coord("g:a:1")).await;

        let waiter = {
            let inflight = Arc::clone(&inflight);
            tokio::spawn(async move {
                let guard = inflight.acquire(&coord("g:a:1")).await;
                guard.completed().map(|outcome| outcome.map(|_| ()))
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        holder.publish(&Err(crate::error::ResolverError::transport(
            "central",
            "https://example.org/g/a/1/a-1.jar",
            Some(500),
            None,
        )));
        drop(holder);

        let seen = waiter.await.unwrap().expect("waiter should see the outcome");
        assert_eq!(seen.unwrap_err().status(), Some(500));
        assert_eq!(inflight.len(), 0);

        let later = inflight.acquire(&coord("g:a:1")).await;
        assert!(later.completed().is_none());
    }
}
