use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::habit::Habit;

pub const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

pub const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("weekly schedule must be an array of 7 booleans")]
    NotAnArray,
    #[error("weekly schedule must have exactly 7 entries, got {0}")]
    WrongLength(usize),
    #[error("weekly schedule entry {index} is not a boolean: {value}")]
    NotBoolean { index: usize, value: String },
    #[error("weekday index {0} is outside 0..=6")]
    WeekdayOutOfRange(usize),
    #[error("unknown weekday: {0}")]
    UnknownDay(String),
}

/// Which weekdays a habit is due on, indexed 0 = Sunday ... 6 = Saturday.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<bool>")]
pub struct WeeklySchedule([bool; 7]);

impl WeeklySchedule {
    pub fn new(days: [bool; 7]) -> Self {
        Self(days)
    }

    pub fn every_day() -> Self {
        Self([true; 7])
    }

    pub fn as_array(&self) -> [bool; 7] {
        self.0
    }

    pub fn is_due(&self, weekday_index: usize) -> Result<bool, ScheduleError> {
        self.0
            .get(weekday_index)
            .copied()
            .ok_or(ScheduleError::WeekdayOutOfRange(weekday_index))
    }

    pub fn due_days(&self) -> Vec<usize> {
        (0..7).filter(|idx| self.0[*idx]).collect()
    }

    pub fn from_value(value: &Value) -> Result<Self, ScheduleError> {
        match value {
            Value::Array(items) => Self::try_from(items.clone()),
            _ => Err(ScheduleError::NotAnArray),
        }
    }

    /// Parses a comma-separated day list such as `mon,wed,fri`. Each entry is
    /// a three-letter abbreviation or a full day name, in any case.
    pub fn parse_days(input: &str) -> Result<Self, ScheduleError> {
        let mut days = [false; 7];
        for raw in input.split(',') {
            let name = raw.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            let idx = DAY_NAMES
                .iter()
                .zip(WEEKDAY_NAMES)
                .position(|(short, full)| name == *short || name.eq_ignore_ascii_case(full))
                .ok_or_else(|| ScheduleError::UnknownDay(raw.trim().to_string()))?;
            days[idx] = true;
        }
        Ok(Self(days))
    }

    /// Parses seven comma-separated flags (`1`/`0`/`true`/`false`), Sunday first.
    pub fn parse_flags(input: &str) -> Result<Self, ScheduleError> {
        let values = input
            .split(',')
            .map(|raw| match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "y" | "yes" => Value::Bool(true),
                "0" | "false" | "n" | "no" => Value::Bool(false),
                other => Value::String(other.to_string()),
            })
            .collect::<Vec<_>>();
        Self::try_from(values)
    }
}

impl TryFrom<Vec<Value>> for WeeklySchedule {
    type Error = ScheduleError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        if values.len() != 7 {
            return Err(ScheduleError::WrongLength(values.len()));
        }
        let mut days = [false; 7];
        for (index, value) in values.iter().enumerate() {
            days[index] = value.as_bool().ok_or_else(|| ScheduleError::NotBoolean {
                index,
                value: value.to_string(),
            })?;
        }
        Ok(Self(days))
    }
}

impl TryFrom<Vec<bool>> for WeeklySchedule {
    type Error = ScheduleError;

    fn try_from(values: Vec<bool>) -> Result<Self, Self::Error> {
        let days: [bool; 7] = values
            .try_into()
            .map_err(|rejected: Vec<bool>| ScheduleError::WrongLength(rejected.len()))?;
        Ok(Self(days))
    }
}

impl From<WeeklySchedule> for Vec<bool> {
    fn from(schedule: WeeklySchedule) -> Self {
        schedule.0.to_vec()
    }
}

impl fmt::Display for WeeklySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self
            .due_days()
            .into_iter()
            .map(|idx| DAY_NAMES[idx])
            .collect::<Vec<_>>();
        if days.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", days.join(","))
        }
    }
}

pub fn is_due_today(habit: &Habit, weekday_index: usize) -> Result<bool, ScheduleError> {
    habit.weekly_schedule.is_due(weekday_index)
}
