use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::{Notification, Task};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(i64),
    #[error("Cannot write a {0} that has no id")]
    MissingId(&'static str),
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Ids handed out when a task and its notifications are first stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedTask {
    pub task_id: i64,
    /// One per fire time, in the order given
    pub notification_ids: Vec<i64>,
}

/// Task and notification records, addressed by key.
///
/// The `*_with_notifications` methods must be atomic: either the task and all
/// of its notification changes are visible afterwards, or none are.
pub trait TaskStore {
    fn get_task(&self, id: i64) -> Result<Task, StoreError>;

    /// All tasks of one owner, soonest due first
    fn tasks_for_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError>;

    /// Notifications of a task, earliest fire time first
    fn notifications_for_task(&self, task_id: i64) -> Result<Vec<Notification>, StoreError>;

    fn insert_task_with_notifications(
        &self,
        task: &Task,
        fire_times: &[NaiveDateTime],
    ) -> Result<InsertedTask, StoreError>;

    /// Write `task`, overwrite the fire times of `updated` and delete the
    /// notifications listed in `removed`.
    fn update_task_with_notifications(
        &self,
        task: &Task,
        updated: &[Notification],
        removed: &[i64],
    ) -> Result<(), StoreError>;

    /// Delete a task together with its notifications
    fn delete_task(&self, id: i64) -> Result<(), StoreError>;
}
