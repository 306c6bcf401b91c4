//! Remote summary refresh
//!
//! A newer refresh supersedes any in-flight one. The older fetch is aborted,
//! and should it still finish first its result is dropped because the
//! generation it was issued under is no longer current. Tearing the view
//! down discards everything.

use crate::error::EngineError;
use crate::services::RemoteSummaryService;
use crate::types::RemoteSummary;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct RefreshState {
    generation: u64,
    torn_down: bool,
    latest: Option<RemoteSummary>,
    last_error: Option<String>,
    in_flight: Option<AbortHandle>,
}

/// A fetch that has been started
#[derive(Debug)]
pub struct PendingRefresh {
    generation: u64,
    task: JoinHandle<()>,
}

impl PendingRefresh {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until the fetch applied its result, was discarded, or was aborted
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(generation = self.generation, error = %e, "summary fetch task failed");
            }
        }
    }
}

/// Cache of the latest remote summary for one view
pub struct SummaryRefresher {
    service: Arc<dyn RemoteSummaryService>,
    state: Arc<Mutex<RefreshState>>,
}

impl SummaryRefresher {
    pub fn new(service: Arc<dyn RemoteSummaryService>) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    /// Start a fetch, superseding whatever is in flight
    pub fn refresh(&self) -> Result<PendingRefresh, EngineError> {
        let runtime = Handle::try_current()
            .map_err(|_| EngineError::Unavailable("summary refresh needs an async runtime".to_string()))?;

        let mut state = lock(&self.state);
        if state.torn_down {
            return Err(EngineError::Unavailable("summary view was torn down".to_string()));
        }

        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.in_flight.take() {
            debug!(generation, "superseding in-flight summary fetch");
            previous.abort();
        }

        let service = Arc::clone(&self.service);
        let shared = Arc::clone(&self.state);
        let task = runtime.spawn(async move {
            let result = service.fetch_summary().await;
            apply(&shared, generation, result);
        });
        state.in_flight = Some(task.abort_handle());

        Ok(PendingRefresh { generation, task })
    }

    /// Most recent successfully fetched summary
    pub fn latest(&self) -> Option<RemoteSummary> {
        lock(&self.state).latest.clone()
    }

    /// Error of the most recent fetch, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Forget the cached summary. Fetches already in flight still apply.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.latest = None;
        state.last_error = None;
    }

    /// Abort any fetch and drop all cached data. Later refreshes are refused.
    pub fn teardown(&self) {
        let mut state = lock(&self.state);
        state.torn_down = true;
        state.latest = None;
        state.last_error = None;
        if let Some(task) = state.in_flight.take() {
            task.abort();
        }
        debug!(generation = state.generation, "summary view torn down");
    }
}

impl Drop for SummaryRefresher {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.state).in_flight.take() {
            task.abort();
        }
    }
}

fn apply(state: &Mutex<RefreshState>, generation: u64, result: Result<RemoteSummary, EngineError>) {
    let mut state = lock(state);
    if state.torn_down || state.generation != generation {
        debug!(
            generation,
            current = state.generation,
            "discarding stale summary result"
        );
        return;
    }
    state.in_flight = None;

    match result {
        Ok(summary) => {
            debug!(
                generation,
                current = summary.current_streak,
                previous = summary.previous_streak,
                "summary refreshed"
            );
            state.latest = Some(summary);
            state.last_error = None;
        }
        Err(e) => {
            // Keep the last good summary; the view shows stale numbers rather than none
            warn!(generation, error = %e, "summary fetch failed, server data unavailable");
            state.last_error = Some(e.to_string());
        }
    }
}

fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
