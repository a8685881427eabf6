//! Due-date rescheduling and initial reminder planning.
//!
//! Both operations are pure: they take the current time as an argument and
//! never touch storage or the reminder scheduler.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::models::Notification;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RescheduleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A notification after its fire time has been moved by the due-date delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftedNotification {
    pub id: Option<i64>,
    pub fire_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rescheduled {
    pub new_due_date: NaiveDateTime,
    pub delta: TimeDelta,
    /// Same order as the notifications passed in
    pub notifications: Vec<ShiftedNotification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedNotification {
    pub lead_time_days: u32,
    pub fire_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationPlan {
    pub scheduled: Vec<PlannedNotification>,
    /// Lead times whose fire time is not after `now`
    pub skipped: Vec<u32>,
}

/// Combine a picked calendar date with a picked clock time.
/// Seconds and sub-seconds of `time` are dropped.
pub fn compose_due_date(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    let time = time
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time);
    date.and_time(time)
}

/// Move a task's due date to `new_date` at `new_time` and shift every
/// notification by the same delta, so each keeps its distance to the due date.
///
/// Shifted fire times are not checked against the current time; see
/// [`partition_stale`].
pub fn reschedule(
    old_due_date: NaiveDateTime,
    new_date: NaiveDate,
    new_time: NaiveTime,
    notifications: &[Notification],
) -> Result<Rescheduled, RescheduleError> {
    let new_due_date = compose_due_date(new_date, new_time);
    let delta = new_due_date.signed_duration_since(old_due_date);

    let shifted = notifications
        .iter()
        .map(|n| -> Result<ShiftedNotification, RescheduleError> {
            let fire_at = n.fire_at.checked_add_signed(delta).ok_or_else(|| {
                RescheduleError::InvalidInput(format!(
                    "shifting notification at {} by {} is out of range",
                    n.fire_at, delta
                ))
            })?;
            Ok(ShiftedNotification { id: n.id, fire_at })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        %old_due_date,
        %new_due_date,
        delta_minutes = delta.num_minutes(),
        notifications = shifted.len(),
        "rescheduled due date"
    );

    Ok(Rescheduled {
        new_due_date,
        delta,
        notifications: shifted,
    })
}

/// Work out which reminders to create for a new task.
///
/// Each lead time `d` yields a fire time of `due_date - d days`. Fire times
/// strictly after `now` are scheduled, the rest are reported as skipped.
/// Input order is kept and coinciding fire times are not merged.
pub fn plan_initial_notifications(
    due_date: NaiveDateTime,
    lead_times_days: &[u32],
    now: NaiveDateTime,
) -> Result<NotificationPlan, RescheduleError> {
    if lead_times_days.is_empty() {
        return Err(RescheduleError::InvalidInput(
            "at least one lead time is required".to_string(),
        ));
    }

    let mut plan = NotificationPlan::default();
    for &days in lead_times_days {
        let fire_at = due_date
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| {
                RescheduleError::InvalidInput(format!(
                    "{} days before {} is out of range",
                    days, due_date
                ))
            })?;

        if fire_at > now {
            plan.scheduled.push(PlannedNotification {
                lead_time_days: days,
                fire_at,
            });
        } else {
            plan.skipped.push(days);
        }
    }

    debug!(
        %due_date,
        scheduled = plan.scheduled.len(),
        skipped = plan.skipped.len(),
        "planned initial notifications"
    );

    Ok(plan)
}

/// Split shifted notifications into those still ahead of `now` and stale ones
/// (fire time at or before `now`). Order is kept within each half.
pub fn partition_stale(
    shifted: &[ShiftedNotification],
    now: NaiveDateTime,
) -> (Vec<ShiftedNotification>, Vec<ShiftedNotification>) {
    shifted.iter().cloned().partition(|n| n.fire_at > now)
}
