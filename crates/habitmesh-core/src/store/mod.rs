//! Persistence seams consumed by the streak engine.
//!
//! The engine only talks to the three narrow store traits, and only inside a
//! [`StreakStore::transaction`], which is the per-user critical section: every
//! read and write the closure performs either commits together or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::aggregate::AggregateStreak;
use crate::calendar::DayWindow;
use crate::completion::Completion;
use crate::habit::Habit;
use crate::schedule::{ScheduleError, WeeklySchedule};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize ledger: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),
    #[error("Ledger belongs to {found:?}, expected {expected:?}")]
    UserMismatch { expected: String, found: String },
    #[error("Unknown habit: {0}")]
    UnknownHabit(String),
    #[error("Habit {habit_id} has a malformed weekly schedule: {source}")]
    MalformedSchedule {
        habit_id: String,
        #[source]
        source: ScheduleError,
    },
    #[error("Store backend error: {0}")]
    Backend(String),
}

pub trait HabitStore {
    /// `None` when the habit is absent or owned by someone else.
    fn fetch_habit(&self, habit_id: &str, user_id: &str) -> Result<Option<Habit>, StoreError>;
    fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>, StoreError>;
    fn update_streak(&mut self, habit_id: &str, streak: u32) -> Result<(), StoreError>;
    fn insert_habit(&mut self, habit: Habit) -> Result<(), StoreError>;
    fn replace_habit(&mut self, habit: Habit) -> Result<(), StoreError>;
    fn delete_habit(&mut self, habit_id: &str) -> Result<bool, StoreError>;
}

pub trait CompletionStore {
    /// First completion of `habit_id` inside `[window.start, window.end)`.
    fn find_completion(
        &self,
        habit_id: &str,
        window: &DayWindow,
    ) -> Result<Option<Completion>, StoreError>;
    fn insert_completion(&mut self, completion: Completion) -> Result<(), StoreError>;
    fn delete_completion(&mut self, completion_id: &str) -> Result<bool, StoreError>;
    fn delete_completions_for_habit(&mut self, habit_id: &str) -> Result<usize, StoreError>;
    fn completions_for_user(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Completion>, StoreError>;
}

pub trait AggregateStreakStore {
    fn fetch_aggregate(&self, user_id: &str) -> Result<AggregateStreak, StoreError>;
    fn store_aggregate(&mut self, user_id: &str, aggregate: AggregateStreak)
        -> Result<(), StoreError>;
}

/// Per-user transactional access to the three stores.
pub trait StreakStore: Send + Sync {
    type Tx: HabitStore + CompletionStore + AggregateStreakStore;

    /// Runs `f` with exclusive access to `user_id`'s state. Writes made by `f`
    /// become visible only if it returns `Ok`.
    fn transaction<T, E, F>(&self, user_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<T, E>,
        E: From<StoreError>;

    fn read<T, E, F>(&self, user_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self::Tx) -> Result<T, E>,
        E: From<StoreError>;
}

pub fn validate_user_id(user_id: &str) -> Result<(), StoreError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty()
        || trimmed != user_id
        || user_id.contains('/')
        || user_id.contains('\\')
        || user_id.starts_with('.')
    {
        return Err(StoreError::InvalidUserId(user_id.to_string()));
    }
    Ok(())
}

/// Everything the engine knows about one user. Both stores hand this out as
/// the transaction handle.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserLedger {
    pub user_id: String,
    #[serde(default)]
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub completions: Vec<Completion>,
    #[serde(default)]
    pub aggregate: AggregateStreak,
}

impl UserLedger {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }

    /// Parses a persisted ledger. A habit whose schedule is not seven booleans
    /// is reported as `MalformedSchedule` rather than a generic parse error.
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        match serde_json::from_str::<UserLedger>(raw) {
            Ok(mut ledger) => {
                ledger.aggregate = ledger.aggregate.normalized();
                Ok(ledger)
            }
            Err(err) => {
                let value: Value = serde_json::from_str(raw)?;
                if let Some(malformed) = find_malformed_schedule(&value) {
                    return Err(malformed);
                }
                Err(StoreError::Serde(err))
            }
        }
    }

    fn check_user(&self, user_id: &str) -> Result<(), StoreError> {
        if self.user_id != user_id {
            return Err(StoreError::UserMismatch {
                expected: user_id.to_string(),
                found: self.user_id.clone(),
            });
        }
        Ok(())
    }
}

fn find_malformed_schedule(value: &Value) -> Option<StoreError> {
    let habits = value.get("habits")?.as_array()?;
    habits.iter().find_map(|habit| {
        let schedule = habit.get("weekly_schedule").unwrap_or(&Value::Null);
        let source = WeeklySchedule::from_value(schedule).err()?;
        let habit_id = habit
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("(unknown)")
            .to_string();
        error!(habit_id = %habit_id, error = %source, "stored habit has a malformed weekly schedule");
        Some(StoreError::MalformedSchedule { habit_id, source })
    })
}

impl HabitStore for UserLedger {
    fn fetch_habit(&self, habit_id: &str, user_id: &str) -> Result<Option<Habit>, StoreError> {
        Ok(self
            .habits
            .iter()
            .find(|habit| habit.id == habit_id && habit.is_owned_by(user_id))
            .cloned())
    }

    fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>, StoreError> {
        Ok(self
            .habits
            .iter()
            .filter(|habit| habit.is_owned_by(user_id))
            .cloned()
            .collect())
    }

    fn update_streak(&mut self, habit_id: &str, streak: u32) -> Result<(), StoreError> {
        let habit = self
            .habits
            .iter_mut()
            .find(|habit| habit.id == habit_id)
            .ok_or_else(|| StoreError::UnknownHabit(habit_id.to_string()))?;
        habit.streak = streak;
        Ok(())
    }

    fn insert_habit(&mut self, habit: Habit) -> Result<(), StoreError> {
        self.check_user(&habit.user_id)?;
        self.habits.push(habit);
        Ok(())
    }

    fn replace_habit(&mut self, habit: Habit) -> Result<(), StoreError> {
        let slot = self
            .habits
            .iter_mut()
            .find(|existing| existing.id == habit.id)
            .ok_or_else(|| StoreError::UnknownHabit(habit.id.clone()))?;
        *slot = habit;
        Ok(())
    }

    fn delete_habit(&mut self, habit_id: &str) -> Result<bool, StoreError> {
        let before = self.habits.len();
        self.habits.retain(|habit| habit.id != habit_id);
        Ok(self.habits.len() != before)
    }
}

impl CompletionStore for UserLedger {
    fn find_completion(
        &self,
        habit_id: &str,
        window: &DayWindow,
    ) -> Result<Option<Completion>, StoreError> {
        Ok(self
            .completions
            .iter()
            .find(|completion| {
                completion.habit_id == habit_id && window.contains(completion.completed_at)
            })
            .cloned())
    }

    fn insert_completion(&mut self, completion: Completion) -> Result<(), StoreError> {
        self.check_user(&completion.user_id)?;
        self.completions.push(completion);
        Ok(())
    }

    fn delete_completion(&mut self, completion_id: &str) -> Result<bool, StoreError> {
        let before = self.completions.len();
        self.completions
            .retain(|completion| completion.id != completion_id);
        Ok(self.completions.len() != before)
    }

    fn delete_completions_for_habit(&mut self, habit_id: &str) -> Result<usize, StoreError> {
        let before = self.completions.len();
        self.completions
            .retain(|completion| completion.habit_id != habit_id);
        Ok(before - self.completions.len())
    }

    fn completions_for_user(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Completion>, StoreError> {
        Ok(self
            .completions
            .iter()
            .filter(|completion| completion.user_id == user_id)
            .filter(|completion| since.map_or(true, |since| completion.completed_at >= since))
            .cloned()
            .collect())
    }
}

impl AggregateStreakStore for UserLedger {
    fn fetch_aggregate(&self, user_id: &str) -> Result<AggregateStreak, StoreError> {
        self.check_user(user_id)?;
        Ok(self.aggregate)
    }

    fn store_aggregate(
        &mut self,
        user_id: &str,
        aggregate: AggregateStreak,
    ) -> Result<(), StoreError> {
        self.check_user(user_id)?;
        self.aggregate = aggregate.normalized();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_user_id_rejects_path_like_ids() {
        assert!(validate_user_id("alice").is_ok());
        assert!(validate_user_id("01J9ZK3").is_ok());
        for bad in ["", " ", "../x", "a/b", "a\\b", ".hidden", " padded"] {
            assert!(
                matches!(validate_user_id(bad), Err(StoreError::InvalidUserId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn from_json_reports_malformed_schedule_with_habit_id() {
        let raw = r#"{
            "user_id": "u1",
            "habits": [{
                "id": "habit-bad",
                "user_id": "u1",
                "name": "Read",
                "weekly_schedule": [true, false, true],
                "streak": 0,
                "created_at": "2026-10-01T00:00:00Z"
            }]
        }"#;
        let err = UserLedger::from_json(raw).expect_err("malformed");
        match err {
            StoreError::MalformedSchedule { habit_id, source } => {
                assert_eq!(habit_id, "habit-bad");
                assert_eq!(source, ScheduleError::WrongLength(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_json_repairs_inverted_aggregate() {
        let raw = r#"{"user_id":"u1","aggregate":{"current_streak":3,"longest_streak":1}}"#;
        let ledger = UserLedger::from_json(raw).expect("parse");
        assert_eq!(ledger.aggregate.longest_streak, 3);
    }

    #[test]
    fn aggregate_access_is_scoped_to_owner() {
        let ledger = UserLedger::new("u1");
        assert!(matches!(
            ledger.fetch_aggregate("u2"),
            Err(StoreError::UserMismatch { .. })
        ));
    }
}
