use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::schedule::WeeklySchedule;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Local `HH:MM`.
    #[serde(default)]
    pub reminder_time: Option<String>,
    pub weekly_schedule: WeeklySchedule,
    /// Consecutive due-days completed. Only the streak engine writes it.
    #[serde(default)]
    pub streak: u32,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

#[derive(Clone, Debug, Default)]
pub struct NewHabit {
    pub name: String,
    pub identity: Option<String>,
    pub difficulty: Option<String>,
    pub reminder_time: Option<String>,
    pub weekly_schedule: WeeklySchedule,
}

/// Fields a user may change after creation. `None` leaves a field untouched;
/// `Some(None)` clears an optional field.
#[derive(Clone, Debug, Default)]
pub struct HabitPatch {
    pub name: Option<String>,
    pub identity: Option<Option<String>>,
    pub difficulty: Option<Option<String>>,
    pub reminder_time: Option<Option<String>>,
    pub weekly_schedule: Option<WeeklySchedule>,
}

impl HabitPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.identity.is_none()
            && self.difficulty.is_none()
            && self.reminder_time.is_none()
            && self.weekly_schedule.is_none()
    }
}

pub fn new_habit_id() -> String {
    format!("habit-{}", Ulid::new().to_string().to_lowercase())
}
