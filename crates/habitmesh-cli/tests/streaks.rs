use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const MONDAY_NOON: &str = "2026-10-19T12:00:00Z";
const TUESDAY_NOON: &str = "2026-10-20T12:00:00Z";

fn bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_habitmesh"));
    cmd.current_dir(home)
        .env("HABITMESH_HOME", home)
        .env("HABITMESH_USER", "alice")
        .env_remove("HABITMESH_LOG");
    cmd
}

fn json_of(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json")
}

fn add_habit(home: &Path, name: &str, days: &str) -> String {
    let output = bin(home)
        .args(["--now", MONDAY_NOON, "--json", "habit", "add", "--name", name, "--days", days])
        .output()
        .expect("habit add");
    let value = json_of(&output);
    value["habit"]["id"].as_str().expect("habit id").to_string()
}

fn complete(home: &Path, now: &str, habit_id: &str) -> Output {
    bin(home)
        .args(["--now", now, "--json", "complete", habit_id])
        .output()
        .expect("complete")
}

#[test]
fn completing_every_due_habit_advances_the_streak() {
    let home = TempDir::new().expect("home");
    let gym = add_habit(home.path(), "Gym", "mon,wed,fri");
    let read = add_habit(home.path(), "Read", "sun,mon,tue,wed,thu,fri,sat");

    let first = json_of(&complete(home.path(), MONDAY_NOON, &gym));
    assert_eq!(first["update"]["day"], "unchanged");
    assert_eq!(first["update"]["aggregate"]["current_streak"], 0);

    let second = json_of(&complete(home.path(), MONDAY_NOON, &read));
    assert_eq!(second["update"]["day"], "became_satisfied");
    assert_eq!(second["update"]["aggregate"]["current_streak"], 1);
    assert_eq!(second["update"]["habit"]["streak"], 1);

    let tuesday = json_of(&complete(home.path(), TUESDAY_NOON, &read));
    assert_eq!(tuesday["update"]["aggregate"]["current_streak"], 2);
    assert_eq!(tuesday["update"]["aggregate"]["longest_streak"], 2);

    let analytics = json_of(
        &bin(home.path())
            .args(["--now", TUESDAY_NOON, "--json", "analytics"])
            .output()
            .expect("analytics"),
    );
    assert_eq!(analytics["analytics"]["total_completed"], 3);
    assert_eq!(analytics["analytics"]["best_day"], "Monday");
}

#[test]
fn duplicate_and_missing_habits_use_distinct_exit_codes() {
    let home = TempDir::new().expect("home");
    let gym = add_habit(home.path(), "Gym", "mon");

    assert!(complete(home.path(), MONDAY_NOON, &gym).status.success());
    let duplicate = complete(home.path(), MONDAY_NOON, &gym);
    assert_eq!(duplicate.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&duplicate.stderr).contains("already completed today"));

    let missing = complete(home.path(), MONDAY_NOON, "habit-nope");
    assert_eq!(missing.status.code(), Some(3));

    let foreign = bin(home.path())
        .args(["--user", "mallory", "--now", MONDAY_NOON, "complete", gym.as_str()])
        .output()
        .expect("foreign");
    assert_eq!(foreign.status.code(), Some(3));
}

#[test]
fn uncomplete_reverts_and_then_reports_nothing_to_undo() {
    let home = TempDir::new().expect("home");
    let gym = add_habit(home.path(), "Gym", "mon");
    json_of(&complete(home.path(), MONDAY_NOON, &gym));

    let undo = json_of(
        &bin(home.path())
            .args(["--now", MONDAY_NOON, "--json", "uncomplete", gym.as_str()])
            .output()
            .expect("uncomplete"),
    );
    assert_eq!(undo["update"]["changed"], true);
    assert_eq!(undo["update"]["aggregate"]["current_streak"], 0);
    assert_eq!(undo["update"]["aggregate"]["longest_streak"], 1);

    let again = bin(home.path())
        .args(["--now", MONDAY_NOON, "uncomplete", gym.as_str()])
        .output()
        .expect("uncomplete again");
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("nothing to undo"));
}

#[test]
fn malformed_schedule_input_is_rejected() {
    let home = TempDir::new().expect("home");
    let output = bin(home.path())
        .args(["habit", "add", "--name", "Bad", "--schedule", "1,0,1"])
        .output()
        .expect("habit add");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("malformed weekly schedule"));
}

#[test]
fn missing_user_is_an_error() {
    let home = TempDir::new().expect("home");
    let output = bin(home.path())
        .env_remove("HABITMESH_USER")
        .args(["habit", "list"])
        .output()
        .expect("habit list");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("HABITMESH_USER"));
}
