use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::error::{CoreError, Result};
use crate::core::HistoryStore;

pub const WEEKEND_ROTATION: [u32; 3] = [12, 14, 15];
pub const WEEKDAY_ROTATION: [u32; 5] = [10, 11, 12, 14, 15];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingDecision {
    pub should_show_prompt: bool,
    pub prompt_quota_today: u32,
    pub prompts_shown_today: u32,
    pub day_number: u32,
    pub is_weekend: bool,
}

/// Quota lookup. The table is fixed: weekends rotate through
/// `WEEKEND_ROTATION` by day mod 3, the first three weekdays ramp 10/8/9, and
/// later weekdays rotate through `WEEKDAY_ROTATION` by (day mod 7) mod 5.
pub fn quota_for(day_number: u32, is_weekend: bool) -> u32 {
    if is_weekend {
        return WEEKEND_ROTATION[(day_number % 3) as usize];
    }

    match day_number {
        0 | 1 => 10,
        2 => 8,
        3 => 9,
        n => WEEKDAY_ROTATION[((n % 7) % 5) as usize],
    }
}

/// Whole days since the first answer, plus one. 1 when there is no answer yet.
pub fn day_number(first_answer: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> u32 {
    match first_answer {
        Some(first) if as_of > first => (as_of - first).num_days() as u32 + 1,
        _ => 1,
    }
}

pub fn is_weekend(tz: Tz, as_of: DateTime<Utc>) -> bool {
    matches!(as_of.with_timezone(&tz).weekday(), Weekday::Sat | Weekday::Sun)
}

fn local_midnight(tz: Tz, date: NaiveDate) -> Result<DateTime<Utc>> {
    let invalid = || CoreError::InvalidTimestamp {
        id: format!("local-midnight/{}", tz.name()),
        value: date.to_string(),
    };

    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
    // some zones skip midnight on DST days; the day then starts an hour later
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(invalid)
}

/// `[start, end)` of the local calendar day containing `as_of`, in UTC
pub fn local_day_bounds(tz: Tz, as_of: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let today = as_of.with_timezone(&tz).date_naive();
    let tomorrow = today.succ_opt().ok_or_else(|| CoreError::InvalidTimestamp {
        id: "local-day".to_string(),
        value: today.to_string(),
    })?;
    Ok((local_midnight(tz, today)?, local_midnight(tz, tomorrow)?))
}

/// Decide whether a prompt may be shown now. Any hour qualifies; only the quota gates.
///
/// Keeps no counter of its own: the day's answers are counted from the store
/// on every call.
pub fn decide<S: HistoryStore + ?Sized>(
    store: &S,
    user_id: &str,
    as_of: DateTime<Utc>,
    tz: Tz,
) -> Result<PacingDecision> {
    let first = store.first_answer_at(user_id)?;
    let day_number = day_number(first, as_of);
    let is_weekend = is_weekend(tz, as_of);
    let quota = quota_for(day_number, is_weekend);

    let (start, end) = local_day_bounds(tz, as_of)?;
    let shown = store.count_answers_between(user_id, start, end)? as u32;

    Ok(PacingDecision {
        should_show_prompt: shown < quota,
        prompt_quota_today: quota,
        prompts_shown_today: shown,
        day_number,
        is_weekend,
    })
}

/// Per-user critical section around decide-then-write for stores shared
/// between threads of one process.
///
/// Only one decision per user is in flight at a time. It does not reach other
/// processes; `InsightService::submit_answer` also holds a database write lock
/// for that.
#[derive(Debug, Default)]
pub struct PacingGate {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PacingGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Decide, and run `record` only when a prompt is allowed. The returned
    /// decision describes the state before `record` ran.
    pub fn decide_and_record<S, F>(
        &self,
        store: &S,
        user_id: &str,
        as_of: DateTime<Utc>,
        tz: Tz,
        record: F,
    ) -> Result<PacingDecision>
    where
        S: HistoryStore + ?Sized,
        F: FnOnce() -> Result<()>,
    {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let decision = decide(store, user_id, as_of, tz)?;
        if decision.should_show_prompt {
            record()?;
        } else {
            tracing::debug!(user_id, quota = decision.prompt_quota_today, "daily prompt quota reached");
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnswerRecord, PeerProfile, RawAnswerRow, RawLogRow, SqliteStore};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_onboarding_ramp() {
        assert_eq!(quota_for(1, false), 10);
        assert_eq!(quota_for(2, false), 8);
        assert_eq!(quota_for(3, false), 9);
    }

    #[test]
    fn test_quota_table_verbatim() {
        let weekdays: Vec<u32> = (4..=13).map(|d| quota_for(d, false)).collect();
        assert_eq!(weekdays, vec![15, 10, 11, 10, 11, 12, 14, 15, 10, 11]);

        let weekends: Vec<u32> = (1..=6).map(|d| quota_for(d, true)).collect();
        assert_eq!(weekends, vec![14, 15, 12, 14, 15, 12]);
    }

    #[test]
    fn test_day_number() {
        let first = utc(2024, 3, 1, 12, 0);
        assert_eq!(day_number(None, first), 1);
        assert_eq!(day_number(Some(first), first), 1);
        assert_eq!(day_number(Some(first), utc(2024, 3, 2, 11, 59)), 1);
        assert_eq!(day_number(Some(first), utc(2024, 3, 2, 12, 0)), 2);
        assert_eq!(day_number(Some(first), utc(2024, 3, 11, 0, 0)), 10);
        // first answer in the future
        assert_eq!(day_number(Some(first), utc(2024, 2, 1, 0, 0)), 1);
    }

    #[test]
    fn test_brand_new_user_on_tuesday() {
        let store = SqliteStore::in_memory().unwrap();
        let tuesday = utc(2024, 3, 5, 15, 0);

        let decision = decide(&store, "new", tuesday, Tz::UTC).unwrap();
        assert_eq!(
            decision,
            PacingDecision {
                should_show_prompt: true,
                prompt_quota_today: 10,
                prompts_shown_today: 0,
                day_number: 1,
                is_weekend: false,
            }
        );
    }

    #[test]
    fn test_quota_exhausted_for_rest_of_day() {
        let store = SqliteStore::in_memory().unwrap();
        let morning = utc(2024, 3, 5, 6, 0);
        for i in 0..10 {
            store
                .insert_answer(&AnswerRecord::new("u1", "q", "a", morning + Duration::minutes(i)))
                .unwrap();
        }

        for hour in [7, 12, 23] {
            let decision = decide(&store, "u1", utc(2024, 3, 5, hour, 59), Tz::UTC).unwrap();
            assert_eq!(decision.prompts_shown_today, 10);
            assert!(!decision.should_show_prompt);
        }

        // next day resets the count and moves along the ramp
        let decision = decide(&store, "u1", utc(2024, 3, 6, 8, 0), Tz::UTC).unwrap();
        assert_eq!(decision.day_number, 2);
        assert_eq!(decision.prompts_shown_today, 0);
        assert!(decision.should_show_prompt);
    }

    #[test]
    fn test_shown_count_is_monotonic() {
        let store = SqliteStore::in_memory().unwrap();
        let as_of = utc(2024, 3, 5, 20, 0);
        let mut previous = 0;
        for i in 0..4 {
            store
                .insert_answer(&AnswerRecord::new("u1", "q", "a", utc(2024, 3, 5, 8 + i, 0)))
                .unwrap();
            let shown = decide(&store, "u1", as_of, Tz::UTC).unwrap().prompts_shown_today;
            assert!(shown > previous);
            previous = shown;
        }
    }

    #[test]
    fn test_local_calendar_day() {
        let store = SqliteStore::in_memory().unwrap();
        // 01:00 Wednesday in Tokyo, still Tuesday in UTC
        store
            .insert_answer(&AnswerRecord::new("u1", "q", "a", utc(2024, 3, 5, 16, 0)))
            .unwrap();
        let as_of = utc(2024, 3, 6, 2, 0);

        let tokyo = decide(&store, "u1", as_of, chrono_tz::Asia::Tokyo).unwrap();
        assert_eq!(tokyo.prompts_shown_today, 1);

        let utc_decision = decide(&store, "u1", as_of, Tz::UTC).unwrap();
        assert_eq!(utc_decision.prompts_shown_today, 0);
    }

    #[test]
    fn test_weekend_from_local_weekday() {
        // Friday 23:00 in New York is Saturday in UTC
        let as_of = utc(2024, 3, 9, 4, 0);
        assert!(is_weekend(Tz::UTC, as_of));
        assert!(!is_weekend(chrono_tz::America::New_York, as_of));
    }

    #[test]
    fn test_dst_day_bounds() {
        // New York springs forward on 2024-03-10, a 23 hour day
        let (start, end) = local_day_bounds(chrono_tz::America::New_York, utc(2024, 3, 10, 12, 0)).unwrap();
        assert_eq!(end - start, Duration::hours(23));
    }

    #[test]
    fn test_deterministic() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_answer(&AnswerRecord::new("u1", "q", "a", utc(2024, 3, 1, 9, 0)))
            .unwrap();
        let as_of = utc(2024, 3, 12, 9, 0);
        let first = decide(&store, "u1", as_of, Tz::UTC).unwrap();
        for _ in 0..3 {
            assert_eq!(decide(&store, "u1", as_of, Tz::UTC).unwrap(), first);
        }
    }

    /// Thread-safe store holding only answer timestamps
    #[derive(Default)]
    struct SharedAnswers {
        answers: Mutex<Vec<DateTime<Utc>>>,
    }

    impl HistoryStore for SharedAnswers {
        fn log_rows(&self, _: &str) -> Result<Vec<RawLogRow>> {
            Ok(vec![])
        }

        fn answer_rows(&self, _: &str) -> Result<Vec<RawAnswerRow>> {
            Ok(vec![])
        }

        fn first_answer_at(&self, _: &str) -> Result<Option<DateTime<Utc>>> {
            Ok(self.answers.lock().unwrap().iter().min().copied())
        }

        fn count_answers_between(&self, _: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
            Ok(self
                .answers
                .lock()
                .unwrap()
                .iter()
                .filter(|at| **at >= start && **at < end)
                .count())
        }

        fn peers(&self) -> Result<Vec<PeerProfile>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_gate_prevents_overshoot() {
        let store = SharedAnswers::default();
        let gate = PacingGate::new();
        let as_of = utc(2024, 3, 5, 12, 0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..4 {
                        gate.decide_and_record(&store, "u1", as_of, Tz::UTC, || {
                            // widen the race window
                            std::thread::yield_now();
                            store.answers.lock().unwrap().push(as_of);
                            Ok(())
                        })
                        .unwrap();
                    }
                });
            }
        });

        assert_eq!(store.answers.lock().unwrap().len(), 10);
    }
}
