//! Client-side sorting and filtering of fetched task lists.

use chrono::{Days, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::Task;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Category,
    Due,
    Name,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub sort: SortKey,
    pub order: SortOrder,
    /// Only tasks in this category (case-insensitive)
    pub category: Option<String>,
    /// Substring match over category and name (case-insensitive)
    pub search: Option<String>,
}

impl TaskQuery {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(ref category) = self.category {
            if task.category.to_lowercase() != category.trim().to_lowercase() {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let query_lower = search.to_lowercase();
            if !task.category.to_lowercase().contains(&query_lower)
                && !task.name.to_lowercase().contains(&query_lower)
            {
                return false;
            }
        }
        true
    }

    fn compare(&self, a: &Task, b: &Task) -> Ordering {
        let ordering = match self.sort {
            SortKey::Category => a.category.to_lowercase().cmp(&b.category.to_lowercase()),
            SortKey::Due => a.due_date.cmp(&b.due_date),
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }

    /// Filter then sort. The sort is stable, so ties keep their fetched order.
    pub fn apply(&self, tasks: Vec<Task>) -> Vec<Task> {
        let mut tasks: Vec<Task> = tasks.into_iter().filter(|t| self.matches(t)).collect();
        tasks.sort_by(|a, b| self.compare(a, b));
        tasks
    }
}

/// Tasks due after `now` and no later than `within_days` days from now,
/// soonest first
pub fn upcoming(tasks: Vec<Task>, now: NaiveDateTime, within_days: u32) -> Vec<Task> {
    let horizon = now.checked_add_days(Days::new(u64::from(within_days)));
    let mut tasks: Vec<Task> = tasks
        .into_iter()
        .filter(|t| t.due_date > now && horizon.is_none_or(|h| t.due_date <= h))
        .collect();
    tasks.sort_by_key(|t| t.due_date);
    tasks
}
