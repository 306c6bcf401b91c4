//! Streak statistics
//!
//! Pure functions over a log snapshot and a reference day. No I/O, no clock.
//!
//! Adjacency: `current_streak` always walks calendar days backwards from the
//! reference day, so an unlogged day (including today before checking in)
//! ends the streak. `best_streak` and `streak_before_last_relapse` follow the
//! configured [`Adjacency`]; the default is calendar days as well, so every
//! statistic agrees on what "consecutive" means.

use crate::types::{CalendarDate, CheckInLog};
use serde::{Deserialize, Serialize};

/// Upper bound on the backwards walk, keeps corrupted data from looping
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// What makes two clean check-ins part of the same run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjacency {
    /// Consecutive calendar days; a day without a record breaks the run
    #[default]
    CalendarDays,
    /// Consecutive records in date order; gaps in logging are ignored
    RecordedEntries,
}

/// Computes streak statistics from a check-in log
#[derive(Debug, Clone, Copy)]
pub struct StreakCalculator {
    adjacency: Adjacency,
    max_lookback_days: u32,
}

impl Default for StreakCalculator {
    fn default() -> Self {
        Self::new(Adjacency::default(), MAX_LOOKBACK_DAYS)
    }
}

impl StreakCalculator {
    pub fn new(adjacency: Adjacency, max_lookback_days: u32) -> Self {
        Self {
            adjacency,
            max_lookback_days,
        }
    }

    pub fn adjacency(&self) -> Adjacency {
        self.adjacency
    }

    /// Clean days in a row ending at `today`
    pub fn current_streak(&self, log: &CheckInLog, today: CalendarDate) -> u32 {
        let mut count = 0;
        let mut cursor = Some(today);

        for _ in 0..self.max_lookback_days {
            let Some(day) = cursor else { break };
            match log.get(&day) {
                Some(record) if !record.relapsed => {
                    count += 1;
                    cursor = day.pred();
                }
                _ => break,
            }
        }

        count
    }

    /// Longest clean run anywhere in the log
    pub fn best_streak(&self, log: &CheckInLog) -> u32 {
        let mut best = 0;
        let mut run = 0;
        let mut prev: Option<CalendarDate> = None;

        for record in log.iter() {
            if record.relapsed {
                run = 0;
            } else {
                let continues = match self.adjacency {
                    Adjacency::RecordedEntries => true,
                    Adjacency::CalendarDays => {
                        prev.is_some_and(|p| p.is_followed_by(&record.date))
                    }
                };
                run = if continues { run + 1 } else { 1 };
                best = best.max(run);
            }
            prev = Some(record.date);
        }

        best
    }

    /// Length of the clean run that ended with the most recent relapse.
    ///
    /// Zero when the log holds no relapse.
    pub fn streak_before_last_relapse(&self, log: &CheckInLog) -> u32 {
        let mut records = log.iter().rev().skip_while(|r| !r.relapsed);
        let Some(last_relapse) = records.next() else {
            return 0;
        };

        let mut count = 0;
        let mut expected = last_relapse.date.pred();

        for record in records {
            if record.relapsed {
                break;
            }
            if self.adjacency == Adjacency::CalendarDays {
                if expected != Some(record.date) {
                    break;
                }
                expected = record.date.pred();
            }
            count += 1;
        }

        count
    }

    /// Number of days marked as a relapse
    pub fn relapse_days(log: &CheckInLog) -> u32 {
        log.iter().filter(|r| r.relapsed).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckInRecord;

    fn d(s: &str) -> CalendarDate {
        CalendarDate::parse_strict(s).unwrap()
    }

    fn log(entries: &[(&str, bool)]) -> CheckInLog {
        CheckInLog::from_records(
            entries
                .iter()
                .map(|(date, relapsed)| CheckInRecord::new(d(date), *relapsed)),
        )
    }

    fn sample_log() -> CheckInLog {
        log(&[
            ("2024-01-01", false),
            ("2024-01-02", false),
            ("2024-01-03", true),
            ("2024-01-04", false),
        ])
    }

    #[test]
    fn test_reference_log_statistics() {
        let calc = StreakCalculator::default();
        let log = sample_log();
        let today = d("2024-01-04");

        assert_eq!(calc.current_streak(&log, today), 1);
        assert_eq!(calc.best_streak(&log), 2);
        assert_eq!(StreakCalculator::relapse_days(&log), 1);
        assert_eq!(calc.streak_before_last_relapse(&log), 2);
    }

    #[test]
    fn test_reference_log_matches_under_entry_adjacency() {
        let calc = StreakCalculator::new(Adjacency::RecordedEntries, MAX_LOOKBACK_DAYS);
        let log = sample_log();

        assert_eq!(calc.current_streak(&log, d("2024-01-04")), 1);
        assert_eq!(calc.best_streak(&log), 2);
        assert_eq!(calc.streak_before_last_relapse(&log), 2);
    }

    #[test]
    fn test_unlogged_today_ends_current_streak() {
        let calc = StreakCalculator::default();
        let log = log(&[("2024-01-01", false), ("2024-01-02", false)]);

        assert_eq!(calc.current_streak(&log, d("2024-01-03")), 0);
        assert_eq!(calc.current_streak(&log, d("2024-01-02")), 2);
    }

    #[test]
    fn test_current_streak_stops_at_relapse_today() {
        let calc = StreakCalculator::default();
        let log = log(&[("2024-01-01", false), ("2024-01-02", true)]);
        assert_eq!(calc.current_streak(&log, d("2024-01-02")), 0);
    }

    #[test]
    fn test_current_streak_is_bounded_by_lookback() {
        let calc = StreakCalculator::new(Adjacency::CalendarDays, 5);
        let mut day = d("2024-01-01");
        let mut records = Vec::new();
        for _ in 0..20 {
            records.push(CheckInRecord::clean(day));
            day = day.succ().unwrap();
        }
        let log = CheckInLog::from_records(records);

        assert_eq!(calc.current_streak(&log, d("2024-01-20")), 5);
    }

    #[test]
    fn test_gap_breaks_best_streak_only_for_calendar_days() {
        let log = log(&[
            ("2024-01-01", false),
            ("2024-01-02", false),
            ("2024-01-05", false),
            ("2024-01-06", false),
            ("2024-01-07", false),
        ]);

        let calendar = StreakCalculator::default();
        let entries = StreakCalculator::new(Adjacency::RecordedEntries, MAX_LOOKBACK_DAYS);

        assert_eq!(calendar.best_streak(&log), 3);
        assert_eq!(entries.best_streak(&log), 5);
    }

    #[test]
    fn test_streak_before_last_relapse_respects_gaps() {
        let log = log(&[
            ("2024-01-01", false),
            ("2024-01-02", false),
            ("2024-01-04", false),
            ("2024-01-05", true),
            ("2024-01-06", false),
        ]);

        let calendar = StreakCalculator::default();
        let entries = StreakCalculator::new(Adjacency::RecordedEntries, MAX_LOOKBACK_DAYS);

        assert_eq!(calendar.streak_before_last_relapse(&log), 1);
        assert_eq!(entries.streak_before_last_relapse(&log), 3);
    }

    #[test]
    fn test_streak_before_last_relapse_uses_most_recent_relapse() {
        let log = log(&[
            ("2024-01-01", false),
            ("2024-01-02", false),
            ("2024-01-03", false),
            ("2024-01-04", true),
            ("2024-01-05", false),
            ("2024-01-06", true),
        ]);
        let calc = StreakCalculator::default();

        assert_eq!(calc.streak_before_last_relapse(&log), 1);
        assert_eq!(StreakCalculator::relapse_days(&log), 2);
    }

    #[test]
    fn test_no_relapse_means_zero_before_relapse() {
        let calc = StreakCalculator::default();
        let log = log(&[("2024-01-01", false), ("2024-01-02", false)]);
        assert_eq!(calc.streak_before_last_relapse(&log), 0);
        assert_eq!(calc.streak_before_last_relapse(&CheckInLog::new()), 0);
    }

    #[test]
    fn test_empty_log() {
        let calc = StreakCalculator::default();
        let empty = CheckInLog::new();
        assert_eq!(calc.current_streak(&empty, d("2024-01-01")), 0);
        assert_eq!(calc.best_streak(&empty), 0);
        assert_eq!(StreakCalculator::relapse_days(&empty), 0);
    }

    /// Every log over a six-day window where each day is unlogged, clean or
    /// a relapse.
    fn all_small_logs() -> Vec<CheckInLog> {
        let start = d("2024-02-26");
        let days: Vec<CalendarDate> = std::iter::successors(Some(start), |d| d.succ())
            .take(6)
            .collect();

        (0..3u32.pow(6))
            .map(|mut code| {
                let mut records = Vec::new();
                for day in &days {
                    match code % 3 {
                        1 => records.push(CheckInRecord::clean(*day)),
                        2 => records.push(CheckInRecord::relapse(*day)),
                        _ => {}
                    }
                    code /= 3;
                }
                CheckInLog::from_records(records)
            })
            .collect()
    }

    #[test]
    fn test_current_never_exceeds_best() {
        let today = d("2024-03-02");
        for adjacency in [Adjacency::CalendarDays, Adjacency::RecordedEntries] {
            let calc = StreakCalculator::new(adjacency, MAX_LOOKBACK_DAYS);
            for log in all_small_logs().iter().filter(|l| !l.is_empty()) {
                assert!(
                    calc.current_streak(log, today) <= calc.best_streak(log),
                    "{:?} broke current <= best for {:?}",
                    adjacency,
                    log
                );
                assert!(calc.streak_before_last_relapse(log) <= calc.best_streak(log));
            }
        }
    }
}
