//! Read-only projections over a user's ledger.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::calendar::Calendar;
use crate::completion::Completion;
use crate::engine::{StreakEngine, StreakError};
use crate::schedule::WEEKDAY_NAMES;
use crate::store::{AggregateStreakStore, CompletionStore, HabitStore, StoreError, StreakStore};

/// Days averaged over by [`Overview::average_per_day`].
pub const OVERVIEW_DAYS: u32 = 30;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Analytics {
    pub weekly_completion_pct: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completed: usize,
    pub window_days: u32,
    pub best_day: Option<&'static str>,
    pub worst_day: Option<&'static str>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct WeeklyReport {
    pub completions: usize,
    pub consistency_pct: u32,
    pub window_days: u32,
    pub summary: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Overview {
    pub total_habits: usize,
    pub total_completions: usize,
    pub average_per_day: f64,
}

/// `completions` as a share of `habits * days`, rounded and capped at 100.
/// Zero when there is nothing to complete.
pub fn completion_pct(completions: usize, habits: usize, days: u32) -> u32 {
    let possible = habits.saturating_mul(days as usize);
    if possible == 0 {
        return 0;
    }
    let pct = (completions.saturating_mul(200) + possible) / (possible * 2);
    pct.min(100) as u32
}

/// Weekday indexes (0 = Sunday) with the most and fewest completions, ties
/// going to the lower index.
pub fn weekday_extremes(
    completions: &[Completion],
    calendar: &Calendar,
) -> (Option<usize>, Option<usize>) {
    if completions.is_empty() {
        return (None, None);
    }
    let mut counts = [0usize; 7];
    for completion in completions {
        counts[calendar.weekday_index(completion.completed_at)] += 1;
    }
    let mut best = 0;
    let mut worst = 0;
    for (idx, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = idx;
        }
        if *count < counts[worst] {
            worst = idx;
        }
    }
    (Some(best), Some(worst))
}

pub fn project_analytics<T>(
    tx: &T,
    user_id: &str,
    now: DateTime<Utc>,
    calendar: &Calendar,
    window_days: u32,
) -> Result<Analytics, StoreError>
where
    T: HabitStore + CompletionStore + AggregateStreakStore + ?Sized,
{
    let habits = tx.habits_for_user(user_id)?;
    let all = tx.completions_for_user(user_id, None)?;
    let since = window_start(now, window_days);
    let in_window = all
        .iter()
        .filter(|completion| completion.completed_at >= since && completion.completed_at <= now)
        .count();
    let aggregate = tx.fetch_aggregate(user_id)?;
    let (best, worst) = weekday_extremes(&all, calendar);
    Ok(Analytics {
        weekly_completion_pct: completion_pct(in_window, habits.len(), window_days),
        current_streak: aggregate.current_streak,
        longest_streak: aggregate.longest_streak,
        total_completed: all.len(),
        window_days,
        best_day: best.map(|idx| WEEKDAY_NAMES[idx]),
        worst_day: worst.map(|idx| WEEKDAY_NAMES[idx]),
    })
}

pub fn project_weekly_report<T>(
    tx: &T,
    user_id: &str,
    now: DateTime<Utc>,
    window_days: u32,
) -> Result<WeeklyReport, StoreError>
where
    T: HabitStore + CompletionStore + ?Sized,
{
    let habits = tx.habits_for_user(user_id)?;
    let completions = tx
        .completions_for_user(user_id, Some(window_start(now, window_days)))?
        .into_iter()
        .filter(|completion| completion.completed_at <= now)
        .count();
    let consistency_pct = completion_pct(completions, habits.len(), window_days);
    let noun = if completions == 1 { "habit" } else { "habits" };
    Ok(WeeklyReport {
        completions,
        consistency_pct,
        window_days,
        summary: format!(
            "Completed {completions} {noun} in the last {window_days} days ({consistency_pct}% consistency)."
        ),
    })
}

pub fn project_overview<T>(tx: &T, user_id: &str) -> Result<Overview, StoreError>
where
    T: HabitStore + CompletionStore + ?Sized,
{
    let total_habits = tx.habits_for_user(user_id)?.len();
    let total_completions = tx.completions_for_user(user_id, None)?.len();
    let average = total_completions as f64 / f64::from(OVERVIEW_DAYS);
    Ok(Overview {
        total_habits,
        total_completions,
        average_per_day: (average * 10.0).round() / 10.0,
    })
}

fn window_start(now: DateTime<Utc>, window_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(window_days.max(1)))
}

impl<S: StreakStore> StreakEngine<S> {
    pub fn get_analytics(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Analytics, StreakError> {
        let window_days = self.analytics_window_days();
        self.store().read(user_id, |tx| -> Result<Analytics, StreakError> {
            Ok(project_analytics(tx, user_id, now, self.calendar(), window_days)?)
        })
    }

    pub fn weekly_report(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WeeklyReport, StreakError> {
        let window_days = self.analytics_window_days();
        self.store().read(user_id, |tx| -> Result<WeeklyReport, StreakError> {
            Ok(project_weekly_report(tx, user_id, now, window_days)?)
        })
    }

    pub fn overview(&self, user_id: &str) -> Result<Overview, StreakError> {
        self.store().read(user_id, |tx| -> Result<Overview, StreakError> {
            Ok(project_overview(tx, user_id)?)
        })
    }
}
