use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::calendar::DayWindow;
use crate::completion::has_completion_today;
use crate::engine::{fetch_owned, StreakEngine, StreakError};
use crate::habit::{new_habit_id, Habit, HabitPatch, NewHabit};
use crate::schedule::{is_due_today, ScheduleError, WeeklySchedule};
use crate::store::{CompletionStore, HabitStore, StreakStore};

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct HabitStatus {
    #[serde(flatten)]
    pub habit: Habit,
    pub due_today: bool,
    pub completed_today: bool,
}

/// Parses schedule input at the edge: a JSON array of seven booleans, seven
/// comma-separated flags, or a list of day names.
pub fn parse_schedule_input(input: &str) -> Result<WeeklySchedule, StreakError> {
    let trimmed = input.trim();
    let parsed = if trimmed.starts_with('[') {
        serde_json::from_str::<Value>(trimmed)
            .map_err(|_| ScheduleError::NotAnArray)
            .and_then(|value| WeeklySchedule::from_value(&value))
    } else if trimmed
        .chars()
        .next()
        .map(|first| first.is_ascii_digit())
        .unwrap_or(false)
        || trimmed.starts_with("true")
        || trimmed.starts_with("false")
    {
        WeeklySchedule::parse_flags(trimmed)
    } else {
        WeeklySchedule::parse_days(trimmed)
    };
    parsed.map_err(|source| StreakError::MalformedSchedule {
        habit_id: "(input)".to_string(),
        source,
    })
}

pub fn normalize_reminder_time(value: &str) -> Result<String, StreakError> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        StreakError::InvalidInput(format!("reminder time must be HH:MM, got {:?}", value))
    })?;
    Ok(time.format("%H:%M").to_string())
}

impl<S: StreakStore> StreakEngine<S> {
    pub fn create_habit(
        &self,
        user_id: &str,
        input: NewHabit,
        now: DateTime<Utc>,
    ) -> Result<Habit, StreakError> {
        let habit = Habit {
            id: new_habit_id(),
            user_id: user_id.to_string(),
            name: required_name(&input.name)?,
            identity: normalize_optional(input.identity),
            difficulty: normalize_optional(input.difficulty),
            reminder_time: normalize_optional(input.reminder_time)
                .map(|value| normalize_reminder_time(&value))
                .transpose()?,
            weekly_schedule: input.weekly_schedule,
            streak: 0,
            created_at: now,
        };
        let created = self
            .store()
            .transaction(user_id, |tx| -> Result<Habit, StreakError> {
                tx.insert_habit(habit.clone())?;
                Ok(habit)
            })?;
        info!(user_id, habit_id = %created.id, schedule = %created.weekly_schedule, "habit created");
        Ok(created)
    }

    pub fn update_habit(
        &self,
        habit_id: &str,
        user_id: &str,
        patch: HabitPatch,
    ) -> Result<Habit, StreakError> {
        self.store()
            .transaction(user_id, |tx| -> Result<Habit, StreakError> {
                let mut habit = fetch_owned(tx, habit_id, user_id)?;
                if patch.is_empty() {
                    return Ok(habit);
                }
                if let Some(name) = patch.name {
                    habit.name = required_name(&name)?;
                }
                if let Some(identity) = patch.identity {
                    habit.identity = normalize_optional(identity);
                }
                if let Some(difficulty) = patch.difficulty {
                    habit.difficulty = normalize_optional(difficulty);
                }
                if let Some(reminder) = patch.reminder_time {
                    habit.reminder_time = normalize_optional(reminder)
                        .map(|value| normalize_reminder_time(&value))
                        .transpose()?;
                }
                if let Some(schedule) = patch.weekly_schedule {
                    habit.weekly_schedule = schedule;
                }
                tx.replace_habit(habit.clone())?;
                Ok(habit)
            })
    }

    /// Removes the habit and its completions. Returns how many completions
    /// went with it.
    pub fn delete_habit(&self, habit_id: &str, user_id: &str) -> Result<usize, StreakError> {
        let removed = self
            .store()
            .transaction(user_id, |tx| -> Result<usize, StreakError> {
                let habit = fetch_owned(tx, habit_id, user_id)?;
                let removed = tx.delete_completions_for_habit(&habit.id)?;
                tx.delete_habit(&habit.id)?;
                Ok(removed)
            })?;
        info!(user_id, habit_id, completions = removed, "habit deleted");
        Ok(removed)
    }

    pub fn list_habits(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<HabitStatus>, StreakError> {
        let window = self.calendar().day_window(now);
        let weekday = self.calendar().weekday_index(now);
        self.store()
            .read(user_id, |tx| habit_statuses(tx, user_id, weekday, &window))
    }

    /// Habits whose reminder falls on the current local minute and that are
    /// due today.
    pub fn reminders_due(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Habit>, StreakError> {
        let hhmm = self.calendar().local_hhmm(now);
        let weekday = self.calendar().weekday_index(now);
        self.store().read(user_id, |tx| -> Result<Vec<Habit>, StreakError> {
            let mut due = Vec::new();
            for habit in tx.habits_for_user(user_id)? {
                if habit.reminder_time.as_deref() != Some(hhmm.as_str()) {
                    continue;
                }
                if schedule_due(&habit, weekday)? {
                    due.push(habit);
                }
            }
            Ok(due)
        })
    }
}

fn habit_statuses<T>(
    tx: &T,
    user_id: &str,
    weekday: usize,
    window: &DayWindow,
) -> Result<Vec<HabitStatus>, StreakError>
where
    T: HabitStore + CompletionStore + ?Sized,
{
    let mut statuses = Vec::new();
    for habit in tx.habits_for_user(user_id)? {
        let due_today = schedule_due(&habit, weekday)?;
        let completed_today = has_completion_today(tx, &habit.id, window)?;
        statuses.push(HabitStatus {
            habit,
            due_today,
            completed_today,
        });
    }
    statuses.sort_by(|a, b| {
        a.habit
            .created_at
            .cmp(&b.habit.created_at)
            .then_with(|| a.habit.id.cmp(&b.habit.id))
    });
    Ok(statuses)
}

fn schedule_due(habit: &Habit, weekday: usize) -> Result<bool, StreakError> {
    is_due_today(habit, weekday).map_err(|source| StreakError::MalformedSchedule {
        habit_id: habit.id.clone(),
        source,
    })
}

fn required_name(value: &str) -> Result<String, StreakError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StreakError::InvalidInput("habit name is required".to_string()));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
