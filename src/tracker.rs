//! Streak tracking façade for one user view
//!
//! Owns the current check-in log and wires the local write path to the
//! optional remote collaborators. Mutation takes `&mut self`, so the load,
//! upsert and save sequence cannot interleave with another writer.

use crate::clock::Clock;
use crate::detached::{spawn_detached, DetachedHandle};
use crate::error::EngineError;
use crate::reconcile::{record_check_in, ReconciliationPolicy};
use crate::refresh::{PendingRefresh, SummaryRefresher};
use crate::services::CheckInSyncService;
use crate::store::CheckInStore;
use crate::types::{CalendarDate, CheckInLog, CheckInPayload, StreakSnapshot};
use std::sync::Arc;
use tracing::debug;

/// Result of a recorded check-in
#[derive(Debug)]
pub struct CheckInOutcome {
    pub snapshot: StreakSnapshot,
    /// Background sync task, when a sync service is attached
    pub sync: Option<DetachedHandle>,
}

pub struct StreakTracker {
    store: CheckInStore,
    log: CheckInLog,
    clock: Arc<dyn Clock>,
    policy: ReconciliationPolicy,
    refresher: Option<Arc<SummaryRefresher>>,
    sync: Option<Arc<dyn CheckInSyncService>>,
}

impl StreakTracker {
    /// Load the persisted log and start tracking from it
    pub fn open(store: CheckInStore, clock: Arc<dyn Clock>, policy: ReconciliationPolicy) -> Self {
        let log = store.load();
        debug!(records = log.len(), key = store.key(), "streak tracker opened");
        Self {
            store,
            log,
            clock,
            policy,
            refresher: None,
            sync: None,
        }
    }

    pub fn with_remote(mut self, refresher: Arc<SummaryRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_sync(mut self, sync: Arc<dyn CheckInSyncService>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn log(&self) -> &CheckInLog {
        &self.log
    }

    pub fn today(&self) -> CalendarDate {
        self.clock.today()
    }

    /// Statistics for rendering right now
    pub fn snapshot(&self) -> StreakSnapshot {
        let remote = self.refresher.as_ref().and_then(|r| r.latest());
        self.policy
            .reconcile(&self.log, self.clock.today(), remote.as_ref())
    }

    /// Ask the remote summary service for fresh numbers. `None` without one.
    pub fn refresh_remote(&self) -> Option<Result<PendingRefresh, EngineError>> {
        self.refresher.as_ref().map(|r| r.refresh())
    }

    /// Record a check-in for `date` (today when `None`).
    ///
    /// The local write completes before this returns. Syncing to the server
    /// happens in the background and, once accepted, refreshes the remote
    /// summary; its failure is only logged.
    pub fn record_check_in(
        &mut self,
        relapsed: bool,
        date: Option<CalendarDate>,
        note: Option<String>,
    ) -> Result<CheckInOutcome, EngineError> {
        let today = self.clock.today();
        let date = date.unwrap_or(today);
        let (log, snapshot) =
            record_check_in(&self.store, &self.policy, &self.log, relapsed, Some(date), today)?;
        self.log = log;

        let sync = self.sync.as_ref().and_then(|service| {
            let service = Arc::clone(service);
            let refresher = self.refresher.clone();
            let payload = CheckInPayload {
                relapsed,
                date: Some(date),
                note: note.filter(|n| !n.trim().is_empty()),
            };
            spawn_detached("checkin-sync", async move {
                service.post_check_in(&payload).await?;
                if let Some(refresher) = refresher {
                    refresher.refresh()?.wait().await;
                }
                Ok::<(), EngineError>(())
            })
        });

        Ok(CheckInOutcome { snapshot, sync })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::refresh::tests::{summary, ScriptedSummaries};
    use crate::types::StatsSource;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::time::Duration;

    fn d(s: &str) -> CalendarDate {
        CalendarDate::parse_strict(s).unwrap()
    }

    fn clock(day: &str) -> Arc<dyn Clock> {
        Arc::new(FixedClock(d(day)))
    }

    #[derive(Default)]
    struct RecordingSync {
        posted: Mutex<Vec<CheckInPayload>>,
        fail: bool,
    }

    #[async_trait]
    impl CheckInSyncService for RecordingSync {
        async fn post_check_in(&self, payload: &CheckInPayload) -> Result<(), EngineError> {
            self.posted.lock().unwrap().push(payload.clone());
            if self.fail {
                Err(EngineError::Service("sync rejected".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_record_check_in_updates_snapshot() {
        let mut tracker = StreakTracker::open(
            CheckInStore::in_memory(),
            clock("2024-01-04"),
            ReconciliationPolicy::default(),
        );

        for (day, relapsed) in [
            ("2024-01-01", false),
            ("2024-01-02", false),
            ("2024-01-03", true),
            ("2024-01-04", false),
        ] {
            tracker.record_check_in(relapsed, Some(d(day)), None).unwrap();
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.current, 1);
        assert_eq!(snapshot.best, 2);
        assert_eq!(snapshot.relapse_days, 1);
        assert_eq!(snapshot.before_relapse, 2);
        assert_eq!(snapshot.source, StatsSource::Local);
    }

    #[tokio::test]
    async fn test_source_switches_to_local_permanently() {
        let dir = tempfile::tempdir().unwrap();
        let refresher = Arc::new(SummaryRefresher::new(ScriptedSummaries::new(vec![
            (Duration::ZERO, Ok(summary(5, 3))),
        ])));

        let mut tracker = StreakTracker::open(
            CheckInStore::open_dir(dir.path()),
            clock("2024-01-04"),
            ReconciliationPolicy::default(),
        )
        .with_remote(refresher.clone());

        tracker.refresh_remote().unwrap().unwrap().wait().await;
        let before = tracker.snapshot();
        assert_eq!(before.source, StatsSource::Server);
        assert_eq!(before.best, 5);

        tracker.record_check_in(false, None, None).unwrap();
        assert_eq!(tracker.snapshot().source, StatsSource::Local);

        refresher.clear();
        assert_eq!(tracker.snapshot().source, StatsSource::Local);

        let reopened = StreakTracker::open(
            CheckInStore::open_dir(dir.path()),
            clock("2024-01-04"),
            ReconciliationPolicy::default(),
        )
        .with_remote(refresher);
        assert_eq!(reopened.snapshot().source, StatsSource::Local);
        assert_eq!(reopened.snapshot().current, 1);
    }

    #[tokio::test]
    async fn test_sync_posts_and_refreshes_summary() {
        let sync = Arc::new(RecordingSync::default());
        let refresher = Arc::new(SummaryRefresher::new(ScriptedSummaries::new(vec![
            (Duration::ZERO, Ok(summary(1, 0))),
        ])));

        let mut tracker = StreakTracker::open(
            CheckInStore::in_memory(),
            clock("2024-01-04"),
            ReconciliationPolicy::default(),
        )
        .with_remote(refresher.clone())
        .with_sync(sync.clone());

        let outcome = tracker
            .record_check_in(true, None, Some("stressful exam".to_string()))
            .unwrap();
        outcome.sync.unwrap().join().await;

        let posted = sync.posted.lock().unwrap().clone();
        assert_eq!(
            posted,
            vec![CheckInPayload {
                relapsed: true,
                date: Some(d("2024-01-04")),
                note: Some("stressful exam".to_string()),
            }]
        );
        assert_eq!(refresher.latest(), Some(summary(1, 0)));
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_local_write() {
        let sync = Arc::new(RecordingSync {
            fail: true,
            ..Default::default()
        });
        let mut tracker = StreakTracker::open(
            CheckInStore::in_memory(),
            clock("2024-01-04"),
            ReconciliationPolicy::default(),
        )
        .with_sync(sync);

        let outcome = tracker.record_check_in(false, None, None).unwrap();
        outcome.sync.unwrap().join().await;

        assert_eq!(tracker.log().len(), 1);
        assert_eq!(tracker.snapshot().current, 1);
    }

    #[test]
    fn test_without_remote_empty_log_reports_unavailable_server() {
        let tracker = StreakTracker::open(
            CheckInStore::in_memory(),
            clock("2024-01-04"),
            ReconciliationPolicy::default(),
        );
        assert_eq!(tracker.snapshot(), StreakSnapshot::server_unavailable());
        assert!(tracker.refresh_remote().is_none());
    }
}
