use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// User-level streak: consecutive days on which every due habit was completed.
///
/// `longest_streak >= current_streak` holds after every transition; a retreat
/// never lowers the high-water mark. `last_satisfied_day` is the local date
/// the current count last advanced on, so one calendar day is counted at most
/// once however often its due set changes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AggregateStreak {
    pub current_streak: u32,
    pub longest_streak: u32,
    #[serde(default)]
    pub last_satisfied_day: Option<NaiveDate>,
}

impl AggregateStreak {
    pub fn with_counts(current_streak: u32, longest_streak: u32) -> Self {
        Self {
            current_streak,
            longest_streak,
            last_satisfied_day: None,
        }
    }

    /// Counts `day`. Returns false when `day` is already counted.
    pub fn advance_on(&mut self, day: NaiveDate) -> bool {
        if self.last_satisfied_day == Some(day) {
            return false;
        }
        self.current_streak = self.current_streak.saturating_add(1);
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_satisfied_day = Some(day);
        true
    }

    /// Uncounts `day`. Returns false when `day` was never counted.
    pub fn retreat_on(&mut self, day: NaiveDate) -> bool {
        if self.last_satisfied_day != Some(day) {
            return false;
        }
        self.current_streak = self.current_streak.saturating_sub(1);
        self.last_satisfied_day = None;
        true
    }

    /// Restores `longest >= current` on records written by older or foreign code.
    pub fn normalized(mut self) -> Self {
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self
    }
}
