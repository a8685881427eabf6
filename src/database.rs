use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::models::{Notification, Task};
use crate::store::{InsertedTask, StoreError, TaskStore};
use crate::utils::{format_timestamp, parse_timestamp};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Task not found: {0}")]
    TaskNotFound(i64),
    #[error("Cannot write a {0} that has no id")]
    MissingId(&'static str),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::TaskNotFound(id) => StoreError::TaskNotFound(id),
            DatabaseError::MissingId(what) => StoreError::MissingId(what),
            other => StoreError::Backend(Box::new(other)),
        }
    }
}

const TASK_COLUMNS: &str = "id, owner, category, name, due_date, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database connection and initialize the schema
    pub fn new(path: &str) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        debug!(path = %db_path.display(), "opened task database");
        Self::with_connection(conn)
    }

    /// Private database that lives as long as the value
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let db = Database { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize the database schema (tables and indexes)
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner           TEXT NOT NULL,
                category        TEXT NOT NULL,
                name            TEXT NOT NULL,
                due_date        TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS notifications (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id         INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                fire_at         TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notifications_task_id ON notifications(task_id)",
            [],
        )?;

        Ok(())
    }

    /// Helper function to read a timestamp column
    fn timestamp_column(row: &rusqlite::Row, idx: usize) -> Result<NaiveDateTime, rusqlite::Error> {
        let raw: String = row.get(idx)?;
        parse_timestamp(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    /// Helper function to map a row to a Task
    fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
        Ok(Task {
            id: Some(row.get(0)?),
            owner: row.get(1)?,
            category: row.get(2)?,
            name: row.get(3)?,
            due_date: Self::timestamp_column(row, 4)?,
            created_at: Self::timestamp_column(row, 5)?,
            updated_at: Self::timestamp_column(row, 6)?,
        })
    }

    /// Helper function to map a row to a Notification
    fn row_to_notification(row: &rusqlite::Row) -> Result<Notification, rusqlite::Error> {
        Ok(Notification {
            id: Some(row.get(0)?),
            task_id: row.get(1)?,
            fire_at: Self::timestamp_column(row, 2)?,
        })
    }

    /// Get a single task by ID
    pub fn get_task(&self, id: i64) -> Result<Task, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))?;

        stmt.query_row(rusqlite::params![id], Self::row_to_task)
            .optional()?
            .ok_or(DatabaseError::TaskNotFound(id))
    }

    /// Get all tasks of an owner ordered by due date ASC
    pub fn get_tasks_for_owner(&self, owner: &str) -> Result<Vec<Task>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE owner = ?1 ORDER BY due_date ASC, id ASC",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(rusqlite::params![owner], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Get all notifications of a task ordered by fire time ASC
    pub fn get_notifications(&self, task_id: i64) -> Result<Vec<Notification>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, fire_at FROM notifications
             WHERE task_id = ?1 ORDER BY fire_at ASC, id ASC",
        )?;
        let notifications = stmt
            .query_map(rusqlite::params![task_id], Self::row_to_notification)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    /// Insert a task and one notification per fire time, in one transaction
    pub fn insert_task(
        &self,
        task: &Task,
        fire_times: &[NaiveDateTime],
    ) -> Result<InsertedTask, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO tasks (owner, category, name, due_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                task.owner,
                task.category,
                task.name,
                format_timestamp(&task.due_date),
                format_timestamp(&task.created_at),
                format_timestamp(&task.updated_at)
            ],
        )?;
        let task_id = tx.last_insert_rowid();

        let mut notification_ids = Vec::with_capacity(fire_times.len());
        for fire_at in fire_times {
            tx.execute(
                "INSERT INTO notifications (task_id, fire_at) VALUES (?1, ?2)",
                rusqlite::params![task_id, format_timestamp(fire_at)],
            )?;
            notification_ids.push(tx.last_insert_rowid());
        }

        tx.commit()?;
        Ok(InsertedTask {
            task_id,
            notification_ids,
        })
    }

    /// Update an existing task and its notifications, in one transaction
    pub fn update_task(
        &self,
        task: &Task,
        updated: &[Notification],
        removed: &[i64],
    ) -> Result<(), DatabaseError> {
        let id = task.id.ok_or(DatabaseError::MissingId("task"))?;

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE tasks SET category = ?1, name = ?2, due_date = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![
                task.category,
                task.name,
                format_timestamp(&task.due_date),
                format_timestamp(&task.updated_at),
                id
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::TaskNotFound(id));
        }

        for notification in updated {
            let notification_id = notification.id.ok_or(DatabaseError::MissingId("notification"))?;
            tx.execute(
                "UPDATE notifications SET fire_at = ?1 WHERE id = ?2 AND task_id = ?3",
                rusqlite::params![format_timestamp(&notification.fire_at), notification_id, id],
            )?;
        }

        for notification_id in removed {
            tx.execute(
                "DELETE FROM notifications WHERE id = ?1 AND task_id = ?2",
                rusqlite::params![notification_id, id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete a task by ID along with its notifications
    pub fn delete_task(&self, id: i64) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM notifications WHERE task_id = ?1",
            rusqlite::params![id],
        )?;
        let changed = tx.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
        if changed == 0 {
            return Err(DatabaseError::TaskNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }
}

impl TaskStore for Database {
    fn get_task(&self, id: i64) -> Result<Task, StoreError> {
        Ok(Database::get_task(self, id)?)
    }

    fn tasks_for_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        Ok(self.get_tasks_for_owner(owner)?)
    }

    fn notifications_for_task(&self, task_id: i64) -> Result<Vec<Notification>, StoreError> {
        Ok(self.get_notifications(task_id)?)
    }

    fn insert_task_with_notifications(
        &self,
        task: &Task,
        fire_times: &[NaiveDateTime],
    ) -> Result<InsertedTask, StoreError> {
        Ok(self.insert_task(task, fire_times)?)
    }

    fn update_task_with_notifications(
        &self,
        task: &Task,
        updated: &[Notification],
        removed: &[i64],
    ) -> Result<(), StoreError> {
        Ok(self.update_task(task, updated, removed)?)
    }

    fn delete_task(&self, id: i64) -> Result<(), StoreError> {
        Ok(Database::delete_task(self, id)?)
    }
}
