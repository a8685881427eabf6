use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::models::Task;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Reminder rejected: {0}")]
    Rejected(String),
}

/// A one-shot reminder handed to the device scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub notification_id: i64,
    pub task_id: i64,
    pub fire_at: NaiveDateTime,
    pub title: String,
    pub body: String,
}

impl Reminder {
    /// Build the reminder for a notification of `task`. The body is derived
    /// from how far ahead of the due date the notification fires.
    pub fn for_task(task: &Task, task_id: i64, notification_id: i64, fire_at: NaiveDateTime) -> Self {
        let days = task.due_date.signed_duration_since(fire_at).num_days();
        let body = match days {
            0 => "Due today".to_string(),
            1 => "Due in 1 day".to_string(),
            n => format!("Due in {} days", n),
        };
        Self {
            notification_id,
            task_id,
            fire_at,
            title: task.reminder_title(),
            body,
        }
    }
}

/// Arms one-shot reminders on whatever delivers them to the user
pub trait ReminderScheduler {
    fn arm(&mut self, reminder: &Reminder) -> Result<(), ReminderError>;
}

/// Scheduler that records each reminder as a log event and keeps a copy
#[derive(Debug, Default)]
pub struct LogScheduler {
    armed: Vec<Reminder>,
}

impl LogScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed(&self) -> &[Reminder] {
        &self.armed
    }
}

impl ReminderScheduler for LogScheduler {
    fn arm(&mut self, reminder: &Reminder) -> Result<(), ReminderError> {
        info!(
            notification_id = reminder.notification_id,
            task_id = reminder.task_id,
            fire_at = %reminder.fire_at,
            title = %reminder.title,
            body = %reminder.body,
            "reminder armed"
        );
        self.armed.push(reminder.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn task() -> Task {
        Task::new(
            "ana".to_string(),
            "Science".to_string(),
            "Biology test".to_string(),
            at("2025-03-11 10:00"),
            at("2025-03-01 10:00"),
        )
    }

    #[test]
    fn body_counts_days_before_due() {
        let task = task();
        assert_eq!(Reminder::for_task(&task, 1, 1, at("2025-03-11 10:00")).body, "Due today");
        assert_eq!(Reminder::for_task(&task, 1, 2, at("2025-03-10 10:00")).body, "Due in 1 day");
        assert_eq!(Reminder::for_task(&task, 1, 3, at("2025-02-09 10:00")).body, "Due in 30 days");
        assert_eq!(
            Reminder::for_task(&task, 1, 3, at("2025-02-09 10:00")).title,
            "Science: Biology test"
        );
    }

    #[test]
    fn log_scheduler_keeps_armed_reminders() {
        let mut scheduler = LogScheduler::new();
        let reminder = Reminder::for_task(&task(), 1, 5, at("2025-03-10 10:00"));
        scheduler.arm(&reminder).unwrap();
        assert_eq!(scheduler.armed(), &[reminder]);
    }
}
