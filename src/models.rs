use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub owner: String,
    pub category: String,
    pub name: String,
    pub due_date: NaiveDateTime, // local wall-clock time, minute precision
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A reminder record owned by a task. The lead time it was created with is
/// not stored: it only survives as the distance between `fire_at` and the
/// task's due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Option<i64>,
    pub task_id: i64,
    pub fire_at: NaiveDateTime,
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
}

impl Task {
    pub fn new(
        owner: String,
        category: String,
        name: String,
        due_date: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: None,
            owner,
            category,
            name,
            due_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title used for reminders: "<category>: <name>"
    pub fn reminder_title(&self) -> String {
        format!("{}: {}", self.category, self.name)
    }
}

impl Notification {
    pub fn new(task_id: i64, fire_at: NaiveDateTime) -> Self {
        Self {
            id: None,
            task_id,
            fire_at,
        }
    }
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn owns(&self, task: &Task) -> bool {
        task.owner == self.user_id
    }
}
