//! Create, edit and delete flows for tasks and their reminders.
//!
//! Every flow writes through [`TaskStore`] in a single atomic call and only
//! then arms reminders, so a failed write leaves nothing half-updated and a
//! failed reminder never undoes a write.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::listing::{self, TaskQuery};
use crate::models::{Notification, Session, Task};
use crate::reminder::{Reminder, ReminderScheduler};
use crate::rescheduler::{self, RescheduleError, ShiftedNotification};
use crate::store::{StoreError, TaskStore};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Reschedule(#[from] RescheduleError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Task {task_id} does not belong to user '{user}'")]
    NotOwner { task_id: i64, user: String },
}

/// What to do with notifications when a task's due date moves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReschedulePolicy {
    /// Delete notifications whose shifted fire time is not after now,
    /// instead of writing them back
    pub drop_stale: bool,
    /// Arm a fresh reminder for every shifted notification still ahead
    pub rearm: bool,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub category: String,
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub lead_times_days: Vec<u32>,
}

/// Changes to an existing task. Date and time are both required since the
/// new due date is always composed from the two.
#[derive(Debug, Clone)]
pub struct TaskEdit {
    pub category: Option<String>,
    pub name: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub task: Task,
    pub notifications: Vec<Notification>,
    /// Lead times that would already have fired
    pub skipped_lead_times: Vec<u32>,
    /// Notifications whose reminder could not be armed
    pub unarmed: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct EditedTask {
    pub task: Task,
    pub delta: TimeDelta,
    /// Notifications written back with their shifted fire time
    pub updated: Vec<Notification>,
    /// Notifications deleted because they went stale
    pub removed: Vec<i64>,
    /// Notifications whose shifted fire time is not after now
    pub stale: Vec<i64>,
    pub rearmed: Vec<i64>,
    pub unarmed: Vec<i64>,
}

pub struct TaskPlanner<S, R> {
    store: S,
    scheduler: R,
    policy: ReschedulePolicy,
}

impl<S: TaskStore, R: ReminderScheduler> TaskPlanner<S, R> {
    pub fn new(store: S, scheduler: R, policy: ReschedulePolicy) -> Self {
        Self {
            store,
            scheduler,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn scheduler(&self) -> &R {
        &self.scheduler
    }

    /// Create a task and one notification per lead time that is still ahead
    pub fn create_task(
        &mut self,
        session: &Session,
        new_task: NewTask,
        now: NaiveDateTime,
    ) -> Result<CreatedTask, PlannerError> {
        let now = whole_seconds(now);
        let category = required_text("category", &new_task.category)?;
        let name = required_text("name", &new_task.name)?;

        let due_date = rescheduler::compose_due_date(new_task.date, new_task.time);
        let plan = rescheduler::plan_initial_notifications(due_date, &new_task.lead_times_days, now)?;

        let mut task = Task::new(session.user_id.clone(), category, name, due_date, now);
        let fire_times: Vec<NaiveDateTime> = plan.scheduled.iter().map(|p| p.fire_at).collect();
        let inserted = self.store.insert_task_with_notifications(&task, &fire_times)?;
        task.id = Some(inserted.task_id);

        info!(
            task_id = inserted.task_id,
            user = %session.user_id,
            %due_date,
            notifications = inserted.notification_ids.len(),
            "task created"
        );
        if !plan.skipped.is_empty() {
            warn!(
                task_id = inserted.task_id,
                skipped = ?plan.skipped,
                "lead times already passed, no reminder created"
            );
        }

        let notifications: Vec<Notification> = inserted
            .notification_ids
            .iter()
            .zip(&fire_times)
            .map(|(&id, &fire_at)| Notification {
                id: Some(id),
                task_id: inserted.task_id,
                fire_at,
            })
            .collect();

        let unarmed = self.arm_all(&task, inserted.task_id, &notifications);

        Ok(CreatedTask {
            task,
            notifications,
            skipped_lead_times: plan.skipped,
            unarmed,
        })
    }

    /// Move a task to a new due date, shifting its notifications with it
    pub fn edit_task(
        &mut self,
        session: &Session,
        task_id: i64,
        edit: TaskEdit,
        now: NaiveDateTime,
    ) -> Result<EditedTask, PlannerError> {
        let now = whole_seconds(now);
        let mut task = self.owned_task(session, task_id)?;
        let existing = self.store.notifications_for_task(task_id)?;

        if let Some(ref category) = edit.category {
            task.category = required_text("category", category)?;
        }
        if let Some(ref name) = edit.name {
            task.name = required_text("name", name)?;
        }

        let rescheduled = rescheduler::reschedule(task.due_date, edit.date, edit.time, &existing)?;
        let (ahead, stale) = rescheduler::partition_stale(&rescheduled.notifications, now);
        let stale_ids = ids_of(&stale)?;

        let (kept, removed) = if self.policy.drop_stale {
            (ahead, stale_ids.clone())
        } else {
            (rescheduled.notifications.clone(), Vec::new())
        };

        let updated = kept
            .iter()
            .map(|n| -> Result<Notification, PlannerError> {
                let id = n.id.ok_or(StoreError::MissingId("notification"))?;
                Ok(Notification {
                    id: Some(id),
                    task_id,
                    fire_at: n.fire_at,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        task.due_date = rescheduled.new_due_date;
        task.updated_at = now;
        self.store
            .update_task_with_notifications(&task, &updated, &removed)?;

        info!(
            task_id,
            user = %session.user_id,
            due_date = %task.due_date,
            delta_minutes = rescheduled.delta.num_minutes(),
            updated = updated.len(),
            removed = removed.len(),
            "task rescheduled"
        );
        if !stale_ids.is_empty() {
            warn!(
                task_id,
                stale = ?stale_ids,
                dropped = self.policy.drop_stale,
                "notifications shifted into the past"
            );
        }

        let (rearmed, unarmed) = if self.policy.rearm {
            let to_arm: Vec<Notification> = updated
                .iter()
                .filter(|n| n.fire_at > now)
                .cloned()
                .collect();
            let unarmed = self.arm_all(&task, task_id, &to_arm);
            let rearmed: Vec<i64> = to_arm
                .iter()
                .filter_map(|n| n.id)
                .filter(|id| !unarmed.contains(id))
                .collect();
            (rearmed, unarmed)
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(EditedTask {
            task,
            delta: rescheduled.delta,
            updated,
            removed,
            stale: stale_ids,
            rearmed,
            unarmed,
        })
    }

    pub fn delete_task(&mut self, session: &Session, task_id: i64) -> Result<(), PlannerError> {
        self.owned_task(session, task_id)?;
        self.store.delete_task(task_id)?;
        info!(task_id, user = %session.user_id, "task deleted");
        Ok(())
    }

    pub fn task_details(
        &self,
        session: &Session,
        task_id: i64,
    ) -> Result<(Task, Vec<Notification>), PlannerError> {
        let task = self.owned_task(session, task_id)?;
        let notifications = self.store.notifications_for_task(task_id)?;
        Ok((task, notifications))
    }

    pub fn list_tasks(&self, session: &Session, query: &TaskQuery) -> Result<Vec<Task>, PlannerError> {
        let tasks = self.store.tasks_for_owner(&session.user_id)?;
        Ok(query.apply(tasks))
    }

    pub fn upcoming_tasks(
        &self,
        session: &Session,
        now: NaiveDateTime,
        within_days: u32,
    ) -> Result<Vec<Task>, PlannerError> {
        let tasks = self.store.tasks_for_owner(&session.user_id)?;
        Ok(listing::upcoming(tasks, now, within_days))
    }

    fn owned_task(&self, session: &Session, task_id: i64) -> Result<Task, PlannerError> {
        let task = self.store.get_task(task_id)?;
        if !session.owns(&task) {
            return Err(PlannerError::NotOwner {
                task_id,
                user: session.user_id.clone(),
            });
        }
        Ok(task)
    }

    /// Arm a reminder per notification; returns the ids that failed
    fn arm_all(&mut self, task: &Task, task_id: i64, notifications: &[Notification]) -> Vec<i64> {
        let mut unarmed = Vec::new();
        for notification in notifications {
            let Some(id) = notification.id else {
                continue;
            };
            let reminder = Reminder::for_task(task, task_id, id, notification.fire_at);
            if let Err(e) = self.scheduler.arm(&reminder) {
                warn!(task_id, notification_id = id, error = %e, "failed to arm reminder");
                unarmed.push(id);
            } else {
                debug!(task_id, notification_id = id, fire_at = %notification.fire_at, "armed");
            }
        }
        unarmed
    }
}

fn required_text(field: &str, value: &str) -> Result<String, PlannerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PlannerError::InvalidInput(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Stored timestamps keep whole seconds only
fn whole_seconds(at: NaiveDateTime) -> NaiveDateTime {
    at.with_nanosecond(0).unwrap_or(at)
}

fn ids_of(notifications: &[ShiftedNotification]) -> Result<Vec<i64>, PlannerError> {
    notifications
        .iter()
        .map(|n| n.id.ok_or(PlannerError::Store(StoreError::MissingId("notification"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::reminder::{LogScheduler, ReminderError};

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    /// Rejects reminders for the listed notification ids
    #[derive(Default)]
    struct FlakyScheduler {
        reject: Vec<i64>,
        armed: Vec<Reminder>,
    }

    impl ReminderScheduler for FlakyScheduler {
        fn arm(&mut self, reminder: &Reminder) -> Result<(), ReminderError> {
            if self.reject.contains(&reminder.notification_id) {
                return Err(ReminderError::Rejected("quota exceeded".to_string()));
            }
            self.armed.push(reminder.clone());
            Ok(())
        }
    }

    fn planner(policy: ReschedulePolicy) -> TaskPlanner<Database, LogScheduler> {
        TaskPlanner::new(Database::open_in_memory().unwrap(), LogScheduler::new(), policy)
    }

    fn biology_test(leads: Vec<u32>) -> NewTask {
        NewTask {
            category: "Science".to_string(),
            name: "Biology test".to_string(),
            date: date("2025-03-11"),
            time: time("10:00"),
            lead_times_days: leads,
        }
    }

    #[test]
    fn create_arms_future_reminders_and_reports_skips() {
        let mut planner = planner(ReschedulePolicy::default());
        let session = Session::new("ana");
        let now = at("2025-03-01 10:00");

        let created = planner
            .create_task(&session, biology_test(vec![1, 2, 30]), now)
            .unwrap();

        assert_eq!(created.task.due_date, at("2025-03-11 10:00"));
        assert_eq!(created.skipped_lead_times, vec![30]);
        let fires: Vec<NaiveDateTime> = created.notifications.iter().map(|n| n.fire_at).collect();
        assert_eq!(fires, vec![at("2025-03-10 10:00"), at("2025-03-09 10:00")]);
        assert!(created.unarmed.is_empty());

        let armed = planner.scheduler().armed();
        assert_eq!(armed.len(), 2);
        assert_eq!(armed[0].title, "Science: Biology test");
        assert_eq!(armed[1].body, "Due in 2 days");

        let task_id = created.task.id.unwrap();
        let stored = planner.store().get_notifications(task_id).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn create_validates_input() {
        let mut planner = planner(ReschedulePolicy::default());
        let session = Session::new("ana");
        let now = at("2025-03-01 10:00");

        let mut blank = biology_test(vec![1]);
        blank.name = "   ".to_string();
        assert!(matches!(
            planner.create_task(&session, blank, now),
            Err(PlannerError::InvalidInput(_))
        ));

        assert!(matches!(
            planner.create_task(&session, biology_test(vec![]), now),
            Err(PlannerError::Reschedule(RescheduleError::InvalidInput(_)))
        ));
        assert!(planner.store().get_tasks_for_owner("ana").unwrap().is_empty());
    }

    #[test]
    fn reminder_failure_does_not_undo_create() {
        let scheduler = FlakyScheduler {
            reject: vec![1],
            ..FlakyScheduler::default()
        };
        let mut planner = TaskPlanner::new(
            Database::open_in_memory().unwrap(),
            scheduler,
            ReschedulePolicy::default(),
        );
        let created = planner
            .create_task(&Session::new("ana"), biology_test(vec![1, 2]), at("2025-03-01 10:00"))
            .unwrap();

        assert_eq!(created.unarmed, vec![1]);
        assert_eq!(planner.scheduler().armed.len(), 1);
        assert_eq!(created.notifications.len(), 2);
    }

    #[test]
    fn edit_shifts_every_notification() {
        let mut planner = planner(ReschedulePolicy::default());
        let session = Session::new("ana");
        let created = planner
            .create_task(&session, biology_test(vec![1, 2]), at("2025-03-01 10:00"))
            .unwrap();
        let task_id = created.task.id.unwrap();

        let edited = planner
            .edit_task(
                &session,
                task_id,
                TaskEdit {
                    category: None,
                    name: Some("Biology quiz".to_string()),
                    date: date("2025-03-13"),
                    time: time("08:30"),
                },
                at("2025-03-02 10:00"),
            )
            .unwrap();

        assert_eq!(edited.delta, TimeDelta::days(1) + TimeDelta::hours(22) + TimeDelta::minutes(30));
        assert!(edited.stale.is_empty());

        let (task, notifications) = planner.task_details(&session, task_id).unwrap();
        assert_eq!(task.name, "Biology quiz");
        assert_eq!(task.category, "Science");
        assert_eq!(task.due_date, at("2025-03-13 08:30"));
        let fires: Vec<NaiveDateTime> = notifications.iter().map(|n| n.fire_at).collect();
        assert_eq!(fires, vec![at("2025-03-11 08:30"), at("2025-03-12 08:30")]);
    }

    #[test]
    fn stale_notifications_are_kept_by_default() {
        let mut planner = planner(ReschedulePolicy::default());
        let session = Session::new("ana");
        let created = planner
            .create_task(&session, biology_test(vec![1, 7]), at("2025-03-01 10:00"))
            .unwrap();
        let task_id = created.task.id.unwrap();

        // Pull the due date in to two days from now: the 7-day reminder lands
        // in the past.
        let edited = planner
            .edit_task(
                &session,
                task_id,
                TaskEdit {
                    category: None,
                    name: None,
                    date: date("2025-03-05"),
                    time: time("10:00"),
                },
                at("2025-03-03 10:00"),
            )
            .unwrap();

        assert_eq!(edited.stale.len(), 1);
        assert!(edited.removed.is_empty());
        assert_eq!(edited.updated.len(), 2);
        assert_eq!(planner.store().get_notifications(task_id).unwrap().len(), 2);
        // Re-arming is off: only the two reminders from creation
        assert_eq!(planner.scheduler().armed().len(), 2);
    }

    #[test]
    fn stale_notifications_dropped_and_rest_rearmed_when_enabled() {
        let mut planner = planner(ReschedulePolicy {
            drop_stale: true,
            rearm: true,
        });
        let session = Session::new("ana");
        let created = planner
            .create_task(&session, biology_test(vec![1, 7]), at("2025-03-01 10:00"))
            .unwrap();
        let task_id = created.task.id.unwrap();
        let seven_day = created.notifications[1].id.unwrap();

        let edited = planner
            .edit_task(
                &session,
                task_id,
                TaskEdit {
                    category: None,
                    name: None,
                    date: date("2025-03-05"),
                    time: time("10:00"),
                },
                at("2025-03-03 10:00"),
            )
            .unwrap();

        assert_eq!(edited.removed, vec![seven_day]);
        assert_eq!(edited.stale, vec![seven_day]);
        assert_eq!(edited.updated.len(), 1);
        assert_eq!(edited.rearmed.len(), 1);

        let stored = planner.store().get_notifications(task_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fire_at, at("2025-03-04 10:00"));

        let last = planner.scheduler().armed().last().unwrap();
        assert_eq!(last.fire_at, at("2025-03-04 10:00"));
        assert_eq!(last.body, "Due in 1 day");
    }

    #[test]
    fn kept_stale_notifications_are_not_rearmed() {
        let mut planner = planner(ReschedulePolicy {
            drop_stale: false,
            rearm: true,
        });
        let session = Session::new("ana");
        let created = planner
            .create_task(&session, biology_test(vec![1, 7]), at("2025-03-01 10:00"))
            .unwrap();
        let task_id = created.task.id.unwrap();
        let one_day = created.notifications[0].id.unwrap();
        let seven_day = created.notifications[1].id.unwrap();
        let armed_at_create = planner.scheduler().armed().len();

        let edited = planner
            .edit_task(
                &session,
                task_id,
                TaskEdit {
                    category: None,
                    name: None,
                    date: date("2025-03-05"),
                    time: time("10:00"),
                },
                at("2025-03-03 10:00"),
            )
            .unwrap();

        assert_eq!(edited.stale, vec![seven_day]);
        assert!(edited.removed.is_empty());
        assert_eq!(edited.updated.len(), 2);
        assert_eq!(edited.rearmed, vec![one_day]);

        let stored = planner.store().get_notifications(task_id).unwrap();
        let fires: Vec<NaiveDateTime> = stored.iter().map(|n| n.fire_at).collect();
        assert_eq!(fires, vec![at("2025-02-26 10:00"), at("2025-03-04 10:00")]);

        let rearmed = &planner.scheduler().armed()[armed_at_create..];
        assert_eq!(rearmed.len(), 1);
        assert_eq!(rearmed[0].notification_id, one_day);
        assert!(rearmed.iter().all(|r| r.notification_id != seven_day));
    }

    #[test]
    fn returned_task_matches_stored_task() {
        let mut planner = planner(ReschedulePolicy::default());
        let session = Session::new("ana");
        let now = at("2025-03-01 10:00") + TimeDelta::milliseconds(1_234);

        let created = planner
            .create_task(&session, biology_test(vec![1]), now)
            .unwrap();
        let task_id = created.task.id.unwrap();
        assert_eq!(created.task.created_at, at("2025-03-01 10:00") + TimeDelta::seconds(1));
        assert_eq!(planner.store().get_task(task_id).unwrap(), created.task);

        let edited = planner
            .edit_task(
                &session,
                task_id,
                TaskEdit {
                    category: None,
                    name: None,
                    date: date("2025-03-12"),
                    time: time("10:00"),
                },
                now + TimeDelta::microseconds(500),
            )
            .unwrap();
        assert_eq!(planner.store().get_task(task_id).unwrap(), edited.task);
    }

    #[test]
    fn other_users_cannot_touch_a_task() {
        let mut planner = planner(ReschedulePolicy::default());
        let created = planner
            .create_task(&Session::new("ana"), biology_test(vec![1]), at("2025-03-01 10:00"))
            .unwrap();
        let task_id = created.task.id.unwrap();
        let intruder = Session::new("ben");

        assert!(matches!(
            planner.delete_task(&intruder, task_id),
            Err(PlannerError::NotOwner { .. })
        ));
        assert!(matches!(
            planner.task_details(&intruder, task_id),
            Err(PlannerError::NotOwner { .. })
        ));
        assert!(planner
            .list_tasks(&intruder, &TaskQuery::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn delete_removes_task_and_notifications() {
        let mut planner = planner(ReschedulePolicy::default());
        let session = Session::new("ana");
        let created = planner
            .create_task(&session, biology_test(vec![1, 2]), at("2025-03-01 10:00"))
            .unwrap();
        let task_id = created.task.id.unwrap();

        planner.delete_task(&session, task_id).unwrap();

        assert!(matches!(
            planner.task_details(&session, task_id),
            Err(PlannerError::Store(StoreError::TaskNotFound(_)))
        ));
        assert!(planner.store().get_notifications(task_id).unwrap().is_empty());
    }

    #[test]
    fn upcoming_only_lists_own_future_tasks() {
        let mut planner = planner(ReschedulePolicy::default());
        let ana = Session::new("ana");
        let now = at("2025-03-01 10:00");
        planner.create_task(&ana, biology_test(vec![0]), now).unwrap();
        planner
            .create_task(&Session::new("ben"), biology_test(vec![0]), now)
            .unwrap();

        assert_eq!(planner.upcoming_tasks(&ana, now, 14).unwrap().len(), 1);
        assert!(planner.upcoming_tasks(&ana, now, 3).unwrap().is_empty());
    }
}
