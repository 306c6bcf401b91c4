//! Choosing between local and server statistics
//!
//! A non-empty local log always wins. The remote summary is only consulted
//! while the log is empty, and since the log never shrinks the switch to
//! local statistics is one-way. Snapshots never mix the two sources.

use crate::error::EngineError;
use crate::store::CheckInStore;
use crate::streak::StreakCalculator;
use crate::types::{CalendarDate, CheckInLog, CheckInRecord, RemoteSummary, StatsSource, StreakSnapshot};
use tracing::{debug, info};

/// Decides which source a rendered snapshot is computed from
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationPolicy {
    calculator: StreakCalculator,
}

impl ReconciliationPolicy {
    pub fn new(calculator: StreakCalculator) -> Self {
        Self { calculator }
    }

    pub fn calculator(&self) -> &StreakCalculator {
        &self.calculator
    }

    /// Snapshot for the given log, falling back to `remote` only when the log
    /// is empty. With neither, a zeroed server snapshot is returned.
    pub fn reconcile(
        &self,
        log: &CheckInLog,
        today: CalendarDate,
        remote: Option<&RemoteSummary>,
    ) -> StreakSnapshot {
        if !log.is_empty() {
            return self.local_snapshot(log, today);
        }

        match remote {
            Some(summary) => {
                debug!(
                    current = summary.current_streak,
                    previous = summary.previous_streak,
                    "[streak] empty local log, using server summary"
                );
                Self::server_snapshot(summary)
            }
            None => {
                debug!("[streak] empty local log and no server summary");
                StreakSnapshot::server_unavailable()
            }
        }
    }

    /// Statistics computed purely from the local log
    pub fn local_snapshot(&self, log: &CheckInLog, today: CalendarDate) -> StreakSnapshot {
        let calc = &self.calculator;
        let snapshot = StreakSnapshot {
            current: calc.current_streak(log, today),
            best: calc.best_streak(log),
            before_relapse: calc.streak_before_last_relapse(log),
            relapse_days: StreakCalculator::relapse_days(log),
            yesterday: today.pred().map(|y| calc.current_streak(log, y)),
            source: StatsSource::Local,
        };
        debug!(
            today = %today,
            current = snapshot.current,
            best = snapshot.best,
            before_relapse = snapshot.before_relapse,
            relapse_days = snapshot.relapse_days,
            "[streak] local snapshot"
        );
        snapshot
    }

    /// Statistics taken from a remote summary.
    ///
    /// `best` is approximated as the larger of current and previous; the
    /// relapse figures cannot be derived from a summary and stay at zero.
    pub fn server_snapshot(summary: &RemoteSummary) -> StreakSnapshot {
        StreakSnapshot {
            current: summary.current_streak,
            best: summary.current_streak.max(summary.previous_streak),
            before_relapse: 0,
            relapse_days: 0,
            yesterday: None,
            source: StatsSource::Server,
        }
    }
}

/// The single local mutation path.
///
/// Writes the record for `date` (today when `None`), persists the whole log
/// and returns the new log with its recomputed snapshot. Repeating the same
/// call leaves the log unchanged. Callers hold exclusive access to the log
/// for the duration, which makes load, upsert and save one unit.
pub fn record_check_in(
    store: &CheckInStore,
    policy: &ReconciliationPolicy,
    log: &CheckInLog,
    relapsed: bool,
    date: Option<CalendarDate>,
    today: CalendarDate,
) -> Result<(CheckInLog, StreakSnapshot), EngineError> {
    let date = date.unwrap_or(today);
    let record = CheckInRecord::new(date, relapsed);

    let next = CheckInStore::upsert(log, record);
    store.save(&next)?;

    let snapshot = policy.reconcile(&next, today, None);
    info!(
        date = %date,
        relapsed,
        records = next.len(),
        current = snapshot.current,
        "[streak] recorded check-in"
    );
    Ok((next, snapshot))
}
