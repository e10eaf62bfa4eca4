use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::calendar::DayWindow;
use crate::store::{CompletionStore, StoreError};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Completion {
    pub id: String,
    pub habit_id: String,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("habit {0} is already completed today")]
    DuplicateCompletion(String),
    #[error("completion instant {instant} falls outside the day window starting {window_start}")]
    OutsideWindow {
        instant: DateTime<Utc>,
        window_start: DateTime<Utc>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn new_completion_id() -> String {
    Ulid::new().to_string()
}

pub fn has_completion_today<S>(
    store: &S,
    habit_id: &str,
    window: &DayWindow,
) -> Result<bool, StoreError>
where
    S: CompletionStore + ?Sized,
{
    Ok(store.find_completion(habit_id, window)?.is_some())
}

/// Appends a completion for `habit_id` stamped at `instant`.
///
/// At most one completion may exist per habit and day window; a second
/// attempt fails with `DuplicateCompletion` and writes nothing.
pub fn record_completion<S>(
    store: &mut S,
    habit_id: &str,
    user_id: &str,
    instant: DateTime<Utc>,
    window: &DayWindow,
) -> Result<String, LedgerError>
where
    S: CompletionStore + ?Sized,
{
    if !window.contains(instant) {
        return Err(LedgerError::OutsideWindow {
            instant,
            window_start: window.start,
        });
    }
    if has_completion_today(store, habit_id, window)? {
        return Err(LedgerError::DuplicateCompletion(habit_id.to_string()));
    }
    let completion = Completion {
        id: new_completion_id(),
        habit_id: habit_id.to_string(),
        user_id: user_id.to_string(),
        completed_at: instant,
    };
    let id = completion.id.clone();
    store.insert_completion(completion)?;
    Ok(id)
}

/// Returns false when there was nothing to remove.
pub fn remove_completion_today<S>(
    store: &mut S,
    habit_id: &str,
    window: &DayWindow,
) -> Result<bool, StoreError>
where
    S: CompletionStore + ?Sized,
{
    match store.find_completion(habit_id, window)? {
        Some(completion) => store.delete_completion(&completion.id),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Calendar;
    use crate::store::UserLedger;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0)
            .single()
            .expect("instant")
    }

    #[test]
    fn record_then_duplicate_is_rejected() {
        let mut ledger = UserLedger::new("u1");
        let window = Calendar::utc().day_window(noon());

        record_completion(&mut ledger, "h1", "u1", noon(), &window).expect("first");
        let err = record_completion(
            &mut ledger,
            "h1",
            "u1",
            noon() + Duration::hours(3),
            &window,
        )
        .expect_err("duplicate");
        assert!(matches!(err, LedgerError::DuplicateCompletion(ref id) if id == "h1"));
        assert_eq!(ledger.completions.len(), 1);
    }

    #[test]
    fn yesterday_does_not_count_for_today() {
        let mut ledger = UserLedger::new("u1");
        let calendar = Calendar::utc();
        let yesterday = noon() - Duration::days(1);
        record_completion(
            &mut ledger,
            "h1",
            "u1",
            yesterday,
            &calendar.day_window(yesterday),
        )
        .expect("yesterday");

        let today = calendar.day_window(noon());
        assert!(!has_completion_today(&ledger, "h1", &today).expect("query"));
        record_completion(&mut ledger, "h1", "u1", noon(), &today).expect("today");
    }

    #[test]
    fn remove_is_a_no_op_when_absent() {
        let mut ledger = UserLedger::new("u1");
        let window = Calendar::utc().day_window(noon());
        assert!(!remove_completion_today(&mut ledger, "h1", &window).expect("remove"));

        record_completion(&mut ledger, "h1", "u1", noon(), &window).expect("record");
        assert!(remove_completion_today(&mut ledger, "h1", &window).expect("remove"));
        assert!(ledger.completions.is_empty());
    }

    #[test]
    fn backdated_instant_is_rejected() {
        let mut ledger = UserLedger::new("u1");
        let window = Calendar::utc().day_window(noon());
        let err = record_completion(
            &mut ledger,
            "h1",
            "u1",
            noon() - Duration::days(2),
            &window,
        )
        .expect_err("outside");
        assert!(matches!(err, LedgerError::OutsideWindow { .. }));
    }
}
