use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use habitmesh_core::calendar::{Clock, SystemClock};
use habitmesh_core::config::resolve_config;
use habitmesh_core::engine::{DayTransition, StreakEngine, StreakError};
use habitmesh_core::habit::{HabitPatch, NewHabit};
use habitmesh_core::habit_ops::parse_schedule_input;
use habitmesh_core::schedule::WeeklySchedule;
use habitmesh_core::store::FileStore;

mod version;

#[derive(Parser)]
#[command(name = "habitmesh", version, about = "Habit completion and streak tracking")]
struct Cli {
    /// Store root (overrides `data_dir` from config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Acting user
    #[arg(long, global = true, env = "HABITMESH_USER")]
    user: Option<String>,
    /// Evaluate as of this RFC 3339 instant instead of the system clock
    #[arg(long, global = true, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create, list, update and remove habits
    Habit {
        #[command(subcommand)]
        command: HabitCommand,
    },
    /// Mark a habit done for today
    Complete { habit_id: String },
    /// Undo today's completion of a habit
    Uncomplete { habit_id: String },
    /// Completion rate, streaks and weekday extremes
    Analytics,
    /// Weekly consistency report or all-time overview
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
    /// Habits whose reminder is due this minute
    Reminders,
    /// Inspect resolved configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum HabitCommand {
    Add {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        details: HabitDetails,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    List,
    Update {
        habit_id: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        details: HabitDetails,
        #[arg(long, conflicts_with = "reminder")]
        clear_reminder: bool,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    Remove { habit_id: String },
}

#[derive(Args)]
struct HabitDetails {
    #[arg(long)]
    identity: Option<String>,
    #[arg(long)]
    difficulty: Option<String>,
    /// Local reminder time, HH:MM
    #[arg(long)]
    reminder: Option<String>,
}

#[derive(Args)]
struct ScheduleArgs {
    /// Due weekdays, e.g. `mon,wed,fri` (default: every day)
    #[arg(long, conflicts_with = "schedule")]
    days: Option<String>,
    /// Seven flags, Sunday first, e.g. `0,1,0,1,0,1,0`
    #[arg(long)]
    schedule: Option<String>,
}

impl ScheduleArgs {
    fn parse(&self) -> Result<Option<WeeklySchedule>> {
        let Some(raw) = self.days.as_deref().or(self.schedule.as_deref()) else {
            return Ok(None);
        };
        Ok(Some(parse_schedule_input(raw)?))
    }
}

#[derive(Subcommand)]
enum ReportCommand {
    /// Completions and consistency over the analytics window
    Weekly,
    /// All-time totals
    Overview,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show resolved settings and where each came from
    Show,
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| format!("expected an RFC 3339 timestamp: {err}"))
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("HABITMESH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // Logs go to stderr so `--json` output stays parseable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<StreakError>() {
        Some(StreakError::DuplicateCompletion(_)) => 2,
        Some(StreakError::HabitNotFound(_)) => 3,
        _ => 1,
    }
}

struct Session {
    engine: StreakEngine<FileStore>,
    user: String,
    now: DateTime<Utc>,
    json: bool,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("resolve working directory")?;
        let config = resolve_config(&cwd)?;
        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(|| config.data_dir.value.clone());
        let store = FileStore::open(&data_dir)
            .with_context(|| format!("open store at {}", data_dir.display()))?;
        let engine = StreakEngine::new(store, config.calendar()?)
            .with_analytics_window(config.analytics_window_days.value);
        let user = cli
            .user
            .clone()
            .ok_or_else(|| anyhow!("no user given; pass --user or set HABITMESH_USER"))?;
        let now = cli.now.unwrap_or_else(|| SystemClock.now());
        debug!(data_dir = %data_dir.display(), user = %user, now = %now, "session opened");
        Ok(Self {
            engine,
            user,
            now,
            json: cli.json,
        })
    }
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command.as_ref() else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };
    match command {
        Command::Version => {
            if cli.json {
                print_json(&json!({"ok": true, "version": version::FULL}))?;
            } else {
                println!("habitmesh {}", version::FULL);
            }
            Ok(())
        }
        Command::Config {
            command: ConfigCommand::Show,
        } => config_show(&cli),
        Command::Habit { command } => habit_command(&Session::open(&cli)?, command),
        Command::Complete { habit_id } => complete(&Session::open(&cli)?, habit_id),
        Command::Uncomplete { habit_id } => uncomplete(&Session::open(&cli)?, habit_id),
        Command::Analytics => analytics(&Session::open(&cli)?),
        Command::Report { command } => report(&Session::open(&cli)?, command),
        Command::Reminders => reminders(&Session::open(&cli)?),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn config_show(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let mut config = resolve_config(&cwd)?;
    if let Some(dir) = cli.data_dir.as_ref() {
        config.data_dir.value = dir.clone();
        config.data_dir.source = "flag";
    }
    if cli.json {
        return print_json(&json!({"ok": true, "config": config}));
    }
    println!(
        "data_dir = {} ({})",
        config.data_dir.value.display(),
        config.data_dir.source
    );
    println!(
        "utc_offset_minutes = {} ({})",
        config.utc_offset_minutes.value, config.utc_offset_minutes.source
    );
    println!(
        "analytics_window_days = {} ({})",
        config.analytics_window_days.value, config.analytics_window_days.source
    );
    Ok(())
}

fn habit_command(session: &Session, command: &HabitCommand) -> Result<()> {
    let engine = &session.engine;
    let user = session.user.as_str();
    match command {
        HabitCommand::Add {
            name,
            details,
            schedule,
        } => {
            let input = NewHabit {
                name: name.clone(),
                identity: details.identity.clone(),
                difficulty: details.difficulty.clone(),
                reminder_time: details.reminder.clone(),
                weekly_schedule: schedule.parse()?.unwrap_or_else(WeeklySchedule::every_day),
            };
            let habit = engine.create_habit(user, input, session.now)?;
            if session.json {
                return print_json(&json!({"ok": true, "habit": habit}));
            }
            println!(
                "Created {}: {} ({})",
                habit.id, habit.name, habit.weekly_schedule
            );
        }
        HabitCommand::List => {
            let habits = engine.list_habits(user, session.now)?;
            if session.json {
                return print_json(&json!({"ok": true, "habits": habits}));
            }
            if habits.is_empty() {
                println!("No habits yet.");
            }
            for status in habits {
                let mark = if status.completed_today { "x" } else { " " };
                let due = if status.due_today { "due today" } else { "not due" };
                println!(
                    "[{mark}] {}  {}  ({}; {due}; streak {})",
                    status.habit.id,
                    status.habit.name,
                    status.habit.weekly_schedule,
                    status.habit.streak
                );
            }
        }
        HabitCommand::Update {
            habit_id,
            name,
            details,
            clear_reminder,
            schedule,
        } => {
            let reminder_time = if *clear_reminder {
                Some(None)
            } else {
                details.reminder.clone().map(Some)
            };
            let patch = HabitPatch {
                name: name.clone(),
                identity: details.identity.clone().map(Some),
                difficulty: details.difficulty.clone().map(Some),
                reminder_time,
                weekly_schedule: schedule.parse()?,
            };
            let habit = engine.update_habit(habit_id, user, patch)?;
            if session.json {
                return print_json(&json!({"ok": true, "habit": habit}));
            }
            println!(
                "Updated {}: {} ({})",
                habit.id, habit.name, habit.weekly_schedule
            );
        }
        HabitCommand::Remove { habit_id } => {
            let removed = engine.delete_habit(habit_id, user)?;
            if session.json {
                return print_json(
                    &json!({"ok": true, "habit_id": habit_id, "completions_removed": removed}),
                );
            }
            println!("Removed {habit_id} and {removed} completion(s).");
        }
    }
    Ok(())
}

fn complete(session: &Session, habit_id: &str) -> Result<()> {
    let update = session
        .engine
        .complete_habit(habit_id, &session.user, session.now)?;
    if session.json {
        return print_json(&json!({"ok": true, "update": update}));
    }
    println!(
        "Completed {} (streak {}).",
        update.habit.name, update.habit.streak
    );
    if update.day == DayTransition::BecameSatisfied {
        println!("Every habit due today is done.");
    }
    println!(
        "Current streak {} (longest {}).",
        update.aggregate.current_streak, update.aggregate.longest_streak
    );
    Ok(())
}

fn uncomplete(session: &Session, habit_id: &str) -> Result<()> {
    let update = session
        .engine
        .uncomplete_habit(habit_id, &session.user, session.now)?;
    if session.json {
        return print_json(&json!({"ok": true, "update": update}));
    }
    if !update.changed {
        println!("{} has no completion today; nothing to undo.", update.habit.name);
        return Ok(());
    }
    println!(
        "Reverted {} (streak {}).",
        update.habit.name, update.habit.streak
    );
    println!(
        "Current streak {} (longest {}).",
        update.aggregate.current_streak, update.aggregate.longest_streak
    );
    Ok(())
}

fn analytics(session: &Session) -> Result<()> {
    let analytics = session.engine.get_analytics(&session.user, session.now)?;
    if session.json {
        return print_json(&json!({"ok": true, "analytics": analytics}));
    }
    println!(
        "Completion over the last {} days: {}%",
        analytics.window_days, analytics.weekly_completion_pct
    );
    println!(
        "Current streak: {}  Longest streak: {}",
        analytics.current_streak, analytics.longest_streak
    );
    println!("Total completions: {}", analytics.total_completed);
    println!(
        "Best day: {}  Worst day: {}",
        analytics.best_day.unwrap_or("-"),
        analytics.worst_day.unwrap_or("-")
    );
    Ok(())
}

fn report(session: &Session, command: &ReportCommand) -> Result<()> {
    match command {
        ReportCommand::Weekly => {
            let report = session.engine.weekly_report(&session.user, session.now)?;
            if session.json {
                return print_json(&json!({"ok": true, "report": report}));
            }
            println!("{}", report.summary);
        }
        ReportCommand::Overview => {
            let overview = session.engine.overview(&session.user)?;
            if session.json {
                return print_json(&json!({"ok": true, "overview": overview}));
            }
            println!("Habits: {}", overview.total_habits);
            println!("Completions: {}", overview.total_completions);
            println!("Average per day: {:.1}", overview.average_per_day);
        }
    }
    Ok(())
}

fn reminders(session: &Session) -> Result<()> {
    let due = session.engine.reminders_due(&session.user, session.now)?;
    if session.json {
        return print_json(&json!({"ok": true, "reminders": due}));
    }
    for habit in due {
        println!(
            "{}  {}  {}",
            habit.reminder_time.as_deref().unwrap_or("--:--"),
            habit.id,
            habit.name
        );
    }
    Ok(())
}
