use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use habitmesh_core::calendar::Calendar;
use habitmesh_core::engine::{StreakEngine, StreakError};
use habitmesh_core::habit::NewHabit;
use habitmesh_core::schedule::WeeklySchedule;
use habitmesh_core::store::{FileStore, UserLedger};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0)
        .single()
        .expect("instant")
}

fn engine(root: &std::path::Path, offset_minutes: i32) -> StreakEngine<FileStore> {
    StreakEngine::new(
        FileStore::open(root).expect("open"),
        Calendar::from_offset_minutes(offset_minutes).expect("offset"),
    )
}

#[test]
fn streaks_survive_reopen_and_accumulate_across_days() {
    let temp = TempDir::new().expect("tempdir");
    let habit = engine(temp.path(), 0)
        .create_habit(
            "alice",
            NewHabit {
                name: "Stretch".to_string(),
                weekly_schedule: WeeklySchedule::every_day(),
                ..NewHabit::default()
            },
            at(17, 8),
        )
        .expect("create");

    for day in 17..=19 {
        // A fresh handle per day, as separate CLI invocations would do.
        engine(temp.path(), 0)
            .complete_habit(&habit.id, "alice", at(day, 9))
            .expect("complete");
    }

    let reopened = engine(temp.path(), 0);
    let analytics = reopened.get_analytics("alice", at(19, 12)).expect("analytics");
    assert_eq!(analytics.current_streak, 3);
    assert_eq!(analytics.longest_streak, 3);
    assert_eq!(analytics.total_completed, 3);

    let raw = std::fs::read_to_string(reopened.store().ledger_path("alice")).expect("ledger");
    let ledger = UserLedger::from_json(&raw).expect("parse");
    assert_eq!(ledger.habits[0].streak, 3);
    assert_eq!(ledger.completions.len(), 3);
}

#[test]
fn day_boundary_follows_configured_offset() {
    let temp = TempDir::new().expect("tempdir");
    // UTC-05:00: 2026-10-20T03:00Z is still Monday evening locally.
    let engine = engine(temp.path(), -300);
    let habit = engine
        .create_habit(
            "bob",
            NewHabit {
                name: "Journal".to_string(),
                weekly_schedule: WeeklySchedule::parse_days("mon").expect("days"),
                ..NewHabit::default()
            },
            at(19, 12),
        )
        .expect("create");

    engine
        .complete_habit(&habit.id, "bob", at(19, 15))
        .expect("monday afternoon");
    let err = engine
        .complete_habit(&habit.id, "bob", at(20, 3))
        .expect_err("same local day");
    assert!(matches!(err, StreakError::DuplicateCompletion(_)));

    // Local Tuesday: the habit is not due, so the aggregate stays put.
    let tuesday = engine
        .complete_habit(&habit.id, "bob", at(20, 3) + Duration::hours(3))
        .expect("tuesday");
    assert_eq!(tuesday.aggregate.current_streak, 1);
    assert_eq!(tuesday.habit.streak, 2);
}

#[test]
fn malformed_persisted_schedule_fails_the_operation() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine(temp.path(), 0);
    let dir = engine.store().user_dir("carol");
    std::fs::create_dir_all(&dir).expect("dir");
    std::fs::write(
        engine.store().ledger_path("carol"),
        r#"{"user_id":"carol","habits":[{"id":"habit-1","user_id":"carol","name":"Walk","weekly_schedule":[true,true,true,true,true,true,"yes"],"created_at":"2026-10-01T00:00:00Z"}]}"#,
    )
    .expect("seed");

    let err = engine
        .complete_habit("habit-1", "carol", at(19, 9))
        .expect_err("malformed");
    match err {
        StreakError::MalformedSchedule { habit_id, .. } => assert_eq!(habit_id, "habit-1"),
        other => panic!("unexpected error: {other}"),
    }

    let listed = engine
        .list_habits("carol", at(19, 9))
        .expect_err("reads fail too");
    assert!(matches!(listed, StreakError::MalformedSchedule { .. }));
    assert!(!listed.is_retryable());
}
