//! Streak consistency engine.
//!
//! Completing or reversing a habit moves two counters: the habit's own
//! `streak` and the user's aggregate streak. The aggregate tracks whether the
//! day is *fully satisfied*, meaning every habit due today has a completion
//! inside today's window. It moves only when an event flips that state:
//!
//! - a completion that takes the day from unsatisfied to satisfied advances it;
//! - a reversal that takes the day from satisfied to unsatisfied retreats it;
//! - everything else (non-due habits, days with nothing due, partial days)
//!   leaves it alone.
//!
//! Both states are read inside the same per-user transaction as the write,
//! so racing requests for one user cannot both observe the pre-update day.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::aggregate::AggregateStreak;
use crate::calendar::{Calendar, DayWindow};
use crate::completion::{
    has_completion_today, record_completion, remove_completion_today, LedgerError,
};
use crate::habit::Habit;
use crate::schedule::{is_due_today, ScheduleError};
use crate::store::{
    AggregateStreakStore, CompletionStore, HabitStore, StoreError, StreakStore,
};

pub const DEFAULT_ANALYTICS_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Error)]
pub enum StreakError {
    #[error("Habit not found: {0}")]
    HabitNotFound(String),
    #[error("Habit {0} is already completed today")]
    DuplicateCompletion(String),
    #[error("Habit {habit_id} has a malformed weekly schedule: {source}")]
    MalformedSchedule {
        habit_id: String,
        #[source]
        source: ScheduleError,
    },
    #[error("Invalid habit input: {0}")]
    InvalidInput(String),
    #[error("Storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl StreakError {
    /// Only storage failures are worth retrying; everything else is a
    /// property of the request or of the stored data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreakError::Storage(_))
    }
}

impl From<StoreError> for StreakError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MalformedSchedule { habit_id, source } => {
                StreakError::MalformedSchedule { habit_id, source }
            }
            other => StreakError::Storage(other),
        }
    }
}

impl From<LedgerError> for StreakError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateCompletion(habit_id) => StreakError::DuplicateCompletion(habit_id),
            LedgerError::OutsideWindow { .. } => StreakError::InvalidInput(err.to_string()),
            LedgerError::Store(store) => store.into(),
        }
    }
}

/// How an event changed the day's fully-satisfied state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayTransition {
    Unchanged,
    BecameSatisfied,
    BecameUnsatisfied,
}

impl DayTransition {
    pub fn between(before: bool, after: bool) -> Self {
        match (before, after) {
            (false, true) => DayTransition::BecameSatisfied,
            (true, false) => DayTransition::BecameUnsatisfied,
            _ => DayTransition::Unchanged,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreakUpdate {
    pub habit: Habit,
    pub aggregate: AggregateStreak,
    pub day: DayTransition,
    /// False when a reversal found nothing to reverse.
    pub changed: bool,
}

#[derive(Debug)]
pub struct StreakEngine<S> {
    store: S,
    calendar: Calendar,
    analytics_window_days: u32,
}

impl<S: StreakStore> StreakEngine<S> {
    pub fn new(store: S, calendar: Calendar) -> Self {
        Self {
            store,
            calendar,
            analytics_window_days: DEFAULT_ANALYTICS_WINDOW_DAYS,
        }
    }

    pub fn with_analytics_window(mut self, days: u32) -> Self {
        self.analytics_window_days = days.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn analytics_window_days(&self) -> u32 {
        self.analytics_window_days
    }

    pub fn complete_habit(
        &self,
        habit_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StreakUpdate, StreakError> {
        let window = self.calendar.day_window(now);
        let weekday = self.calendar.weekday_index(now);
        let today = self.calendar.local_date(now);

        let result = self.store.transaction(user_id, |tx| -> Result<StreakUpdate, StreakError> {
            let mut habit = fetch_owned(tx, habit_id, user_id)?;
            let due = due_habits(tx, user_id, weekday)?;
            let satisfied_before = day_satisfied(tx, &due, &window)?;

            record_completion(tx, &habit.id, user_id, now, &window)?;
            habit.streak = habit.streak.saturating_add(1);
            tx.update_streak(&habit.id, habit.streak)?;

            let satisfied_after = day_satisfied(tx, &due, &window)?;
            let day = DayTransition::between(satisfied_before, satisfied_after);
            let mut aggregate = tx.fetch_aggregate(user_id)?;
            // A habit added or rescheduled after the day was counted can make
            // the day unsatisfied and then satisfied again; it still counts once.
            let counted = day == DayTransition::BecameSatisfied && aggregate.advance_on(today);
            if counted {
                tx.store_aggregate(user_id, aggregate)?;
            }
            debug!(
                user_id,
                habit_id = %habit.id,
                due = due.len(),
                satisfied_before,
                satisfied_after,
                counted,
                "completion evaluated"
            );
            Ok(StreakUpdate {
                habit,
                aggregate,
                day,
                changed: true,
            })
        });

        log_outcome("complete", user_id, habit_id, &result);
        result
    }

    pub fn uncomplete_habit(
        &self,
        habit_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StreakUpdate, StreakError> {
        let window = self.calendar.day_window(now);
        let weekday = self.calendar.weekday_index(now);
        let today = self.calendar.local_date(now);

        let result = self.store.transaction(user_id, |tx| -> Result<StreakUpdate, StreakError> {
            let mut habit = fetch_owned(tx, habit_id, user_id)?;
            let due = due_habits(tx, user_id, weekday)?;
            // Must be read before the removal; inferring it afterwards from
            // how many habits remain completed is wrong once several habits
            // are out of sync.
            let satisfied_before = day_satisfied(tx, &due, &window)?;

            if !remove_completion_today(tx, &habit.id, &window)? {
                let aggregate = tx.fetch_aggregate(user_id)?;
                return Ok(StreakUpdate {
                    habit,
                    aggregate,
                    day: DayTransition::Unchanged,
                    changed: false,
                });
            }
            if habit.streak > 0 {
                habit.streak -= 1;
                tx.update_streak(&habit.id, habit.streak)?;
            }

            let satisfied_after = day_satisfied(tx, &due, &window)?;
            let day = DayTransition::between(satisfied_before, satisfied_after);
            let mut aggregate = tx.fetch_aggregate(user_id)?;
            let uncounted = day == DayTransition::BecameUnsatisfied && aggregate.retreat_on(today);
            if uncounted {
                tx.store_aggregate(user_id, aggregate)?;
            }
            debug!(
                user_id,
                habit_id = %habit.id,
                due = due.len(),
                satisfied_before,
                satisfied_after,
                uncounted,
                "reversal evaluated"
            );
            Ok(StreakUpdate {
                habit,
                aggregate,
                day,
                changed: true,
            })
        });

        log_outcome("uncomplete", user_id, habit_id, &result);
        result
    }
}

pub(crate) fn fetch_owned<T>(tx: &T, habit_id: &str, user_id: &str) -> Result<Habit, StreakError>
where
    T: HabitStore + ?Sized,
{
    tx.fetch_habit(habit_id, user_id)?
        .ok_or_else(|| StreakError::HabitNotFound(habit_id.to_string()))
}

/// Habits owned by `user_id` that are due on `weekday`.
pub fn due_habits<T>(tx: &T, user_id: &str, weekday: usize) -> Result<Vec<Habit>, StreakError>
where
    T: HabitStore + ?Sized,
{
    let mut due = Vec::new();
    for habit in tx.habits_for_user(user_id)? {
        let is_due = is_due_today(&habit, weekday).map_err(|source| {
            error!(habit_id = %habit.id, error = %source, "schedule evaluation failed");
            StreakError::MalformedSchedule {
                habit_id: habit.id.clone(),
                source,
            }
        })?;
        if is_due {
            due.push(habit);
        }
    }
    Ok(due)
}

/// True when every habit in `due` has a completion inside `window`. An empty
/// set is trivially satisfied.
pub fn day_satisfied<T>(tx: &T, due: &[Habit], window: &DayWindow) -> Result<bool, StoreError>
where
    T: CompletionStore + ?Sized,
{
    for habit in due {
        if !has_completion_today(tx, &habit.id, window)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn log_outcome(
    action: &str,
    user_id: &str,
    habit_id: &str,
    result: &Result<StreakUpdate, StreakError>,
) {
    match result {
        Ok(update) => match update.day {
            DayTransition::BecameSatisfied => info!(
                user_id,
                habit_id,
                current_streak = update.aggregate.current_streak,
                longest_streak = update.aggregate.longest_streak,
                "day fully satisfied"
            ),
            DayTransition::BecameUnsatisfied => info!(
                user_id,
                habit_id,
                current_streak = update.aggregate.current_streak,
                "day no longer satisfied"
            ),
            DayTransition::Unchanged => {
                debug!(user_id, habit_id, action, changed = update.changed, "aggregate unchanged")
            }
        },
        Err(err) if err.is_retryable() => {
            warn!(user_id, habit_id, action, error = %err, "transaction rolled back")
        }
        Err(StreakError::MalformedSchedule { habit_id: bad, .. }) => {
            error!(user_id, habit_id = %bad, action, "data-quality defect: malformed schedule")
        }
        Err(err) => debug!(user_id, habit_id, action, error = %err, "request rejected"),
    }
}
