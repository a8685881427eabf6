use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use crate::listing::{SortKey, SortOrder, TaskQuery};
use crate::models::{Notification, Session, Task};
use crate::planner::{NewTask, PlannerError, TaskEdit, TaskPlanner};
use crate::reminder::ReminderScheduler;
use crate::store::TaskStore;
use crate::utils::{parse_date, parse_lead_times, parse_time};

#[derive(Parser)]
#[command(name = "duetask")]
#[command(about = "Tasks with due dates and reminders that move with them")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    /// Act as this user instead of the configured one
    #[arg(short, long)]
    pub user: Option<String>,

    /// Database file to use instead of the configured one
    #[arg(long)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a task
    Add {
        /// Task category
        category: String,
        /// Task name
        name: String,
        /// Due date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Due time (HH:MM), defaults to now
        #[arg(long)]
        time: Option<String>,
        /// Comma-separated reminder lead times in days, e.g. 1,2,30
        #[arg(long)]
        remind: Option<String>,
    },
    /// Change a task; reminders move with its due date
    Edit {
        id: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// New due date (YYYY-MM-DD), defaults to the current one
        #[arg(long)]
        date: Option<String>,
        /// New due time (HH:MM), defaults to the current one
        #[arg(long)]
        time: Option<String>,
    },
    /// Delete a task and its reminders
    Delete { id: i64 },
    /// Show a task with its reminders
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// List tasks (default if no subcommand)
    List(ListArgs),
    /// Tasks due in the next few days
    Upcoming {
        /// Look-ahead window in days
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Sort key
    #[arg(long, value_enum, default_value_t = SortKey::Category)]
    pub sort: SortKey,
    /// Sort Z-A / latest first
    #[arg(long)]
    pub desc: bool,
    /// Only this category
    #[arg(long)]
    pub category: Option<String>,
    /// Only tasks whose category or name contains this text
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    PlannerError(#[from] PlannerError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Failed to parse time: {0}")]
    TimeParseError(String),
    #[error("{0}")]
    LeadTimeError(String),
    #[error("Failed to write JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct TaskDetails<'a> {
    task: &'a Task,
    notifications: &'a [Notification],
}

fn date_arg(value: &str) -> Result<chrono::NaiveDate, CliError> {
    parse_date(value)
        .map_err(|e| CliError::DateParseError(format!("Invalid date format '{}': {}", value, e)))
}

fn time_arg(value: &str) -> Result<chrono::NaiveTime, CliError> {
    parse_time(value)
        .map_err(|e| CliError::TimeParseError(format!("Invalid time format '{}': {}", value, e)))
}

/// One-line summary of a task
pub fn format_task_line(task: &Task) -> String {
    format!(
        "#{} [{}] {} (due {})",
        task.id.unwrap_or_default(),
        task.category,
        task.name,
        task.due_date.format("%Y-%m-%d %H:%M")
    )
}

fn print_tasks(tasks: &[Task], json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
    } else if tasks.is_empty() {
        println!("No tasks");
    } else {
        for task in tasks {
            println!("{}", format_task_line(task));
        }
    }
    Ok(())
}

/// Handle the add command
#[allow(clippy::too_many_arguments)]
pub fn handle_add<S: TaskStore, R: ReminderScheduler>(
    planner: &mut TaskPlanner<S, R>,
    session: &Session,
    category: String,
    name: String,
    date: Option<String>,
    time: Option<String>,
    remind: Option<String>,
    default_lead_times: &[u32],
    now: NaiveDateTime,
) -> Result<(), CliError> {
    let date = match date {
        Some(ref value) => date_arg(value)?,
        None => now.date(),
    };
    let time = match time {
        Some(ref value) => time_arg(value)?,
        None => now.time(),
    };
    let lead_times_days = match remind {
        Some(ref value) => parse_lead_times(value).map_err(CliError::LeadTimeError)?,
        None => default_lead_times.to_vec(),
    };

    let created = planner.create_task(
        session,
        NewTask {
            category,
            name,
            date,
            time,
            lead_times_days,
        },
        now,
    )?;

    println!("Task created successfully (ID: {})", created.task.id.unwrap_or_default());
    for notification in &created.notifications {
        println!("  reminder at {}", notification.fire_at.format("%Y-%m-%d %H:%M"));
    }
    for days in &created.skipped_lead_times {
        println!("  no reminder {} day(s) before: that time has already passed", days);
    }
    if !created.unarmed.is_empty() {
        println!("  {} reminder(s) could not be armed", created.unarmed.len());
    }

    Ok(())
}

/// Handle the edit command
#[allow(clippy::too_many_arguments)]
pub fn handle_edit<S: TaskStore, R: ReminderScheduler>(
    planner: &mut TaskPlanner<S, R>,
    session: &Session,
    id: i64,
    category: Option<String>,
    name: Option<String>,
    date: Option<String>,
    time: Option<String>,
    now: NaiveDateTime,
) -> Result<(), CliError> {
    // Unset pickers keep the current due date's components
    let (current, _) = planner.task_details(session, id)?;
    let date = match date {
        Some(ref value) => date_arg(value)?,
        None => current.due_date.date(),
    };
    let time = match time {
        Some(ref value) => time_arg(value)?,
        None => current.due_date.time(),
    };

    let edited = planner.edit_task(
        session,
        id,
        TaskEdit {
            category,
            name,
            date,
            time,
        },
        now,
    )?;

    println!("{}", format_task_line(&edited.task));
    println!(
        "  {} reminder(s) moved by {} minute(s)",
        edited.updated.len(),
        edited.delta.num_minutes()
    );
    if !edited.removed.is_empty() {
        println!("  {} reminder(s) removed: their time has passed", edited.removed.len());
    } else if !edited.stale.is_empty() {
        println!("  {} reminder(s) now fall in the past", edited.stale.len());
    }
    if !edited.unarmed.is_empty() {
        println!("  {} reminder(s) could not be re-armed", edited.unarmed.len());
    }

    Ok(())
}

/// Handle the delete command
pub fn handle_delete<S: TaskStore, R: ReminderScheduler>(
    planner: &mut TaskPlanner<S, R>,
    session: &Session,
    id: i64,
) -> Result<(), CliError> {
    planner.delete_task(session, id)?;
    println!("Task deleted (ID: {})", id);
    Ok(())
}

/// Handle the show command
pub fn handle_show<S: TaskStore, R: ReminderScheduler>(
    planner: &TaskPlanner<S, R>,
    session: &Session,
    id: i64,
    json: bool,
) -> Result<(), CliError> {
    let (task, notifications) = planner.task_details(session, id)?;
    if json {
        let details = TaskDetails {
            task: &task,
            notifications: &notifications,
        };
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    println!("{}", format_task_line(&task));
    if notifications.is_empty() {
        println!("  no reminders");
    }
    for notification in &notifications {
        println!("  reminder at {}", notification.fire_at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

/// Handle the list command
pub fn handle_list<S: TaskStore, R: ReminderScheduler>(
    planner: &TaskPlanner<S, R>,
    session: &Session,
    args: ListArgs,
) -> Result<(), CliError> {
    let query = TaskQuery {
        sort: args.sort,
        order: if args.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        },
        category: args.category,
        search: args.search,
    };
    let tasks = planner.list_tasks(session, &query)?;
    print_tasks(&tasks, args.json)
}

/// Handle the upcoming command
pub fn handle_upcoming<S: TaskStore, R: ReminderScheduler>(
    planner: &TaskPlanner<S, R>,
    session: &Session,
    days: u32,
    json: bool,
    now: NaiveDateTime,
) -> Result<(), CliError> {
    let tasks = planner.upcoming_tasks(session, now, days)?;
    print_tasks(&tasks, json)
}
