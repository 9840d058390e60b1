/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Queue Maintenance
//!
//! [`ReminderScheduler`] keeps the reminder queue in step with task
//! mutations. The host calls it right after creating, updating or deleting a
//! task:
//!
//! | Task change | Call |
//! |---|---|
//! | created | [`schedule_reminder`](ReminderScheduler::schedule_reminder) |
//! | due date, reminder settings or status changed | [`reschedule_reminders`](ReminderScheduler::reschedule_reminders) |
//! | completed, cancelled or deleted | [`cancel_reminders`](ReminderScheduler::cancel_reminders) |
//!
//! [`apply_task_change`](ReminderScheduler::apply_task_change) does this routing.
//!
//! Expected conditions (reminders off, no due date, lead time already
//! passed) come back as [`ScheduleOutcome::NotScheduled`]. Only storage
//! failures are errors, and callers should log them rather than fail the
//! task mutation.
//!
//! ```rust,ignore
//! let scheduler = ReminderScheduler::new(dal);
//! if let Err(e) = scheduler.schedule_reminder(&task, &user_id, Utc::now()).await {
//!     tracing::warn!("reminder not scheduled for {}: {}", task.id, e);
//! }
//! ```

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::calculator::compute_reminder_time_in;
use crate::config::ProcessorConfig;
use crate::dal::{PendingDisposition, DAL};
use crate::database::UniversalTimestamp;
use crate::error::StorageError;
use crate::models::reminder_entry::{NewReminderEntry, ReminderEntry, ReminderKind};
use crate::models::task::Task;

/// Why no reminder was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The task has no reminder settings, or they are switched off.
    ReminderDisabled,
    /// The task has no due date.
    NoDueDate,
    /// The task is completed, cancelled or soft-deleted.
    TaskClosed,
    /// The reminder time is already at or before `now`.
    WindowPassed,
}

/// Result of a scheduling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Scheduled(ReminderEntry),
    NotScheduled(SkipReason),
    /// A concurrent call queued the same reminder first.
    AlreadyScheduled,
}

impl ScheduleOutcome {
    /// Returns the queued entry, if any.
    pub fn entry(&self) -> Option<&ReminderEntry> {
        match self {
            ScheduleOutcome::Scheduled(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled(_))
    }
}

/// Result of [`ReminderScheduler::reschedule_reminders`].
#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleOutcome {
    /// Pending entries moved to `cancelled`.
    pub cancelled: usize,
    pub outcome: ScheduleOutcome,
}

/// The kind of task mutation that just happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskChange {
    Created,
    Updated,
    Deleted,
}

/// Schedules, reschedules and cancels queued reminders for tasks.
#[derive(Clone, Debug)]
pub struct ReminderScheduler {
    dal: DAL,
    timezone: Tz,
}

impl ReminderScheduler {
    /// Creates a scheduler that evaluates calendar lead times in UTC.
    pub fn new(dal: DAL) -> Self {
        Self {
            dal,
            timezone: Tz::UTC,
        }
    }

    /// Creates a scheduler using the zone from `config`.
    pub fn with_config(dal: DAL, config: &ProcessorConfig) -> Self {
        Self::new(dal).with_timezone(config.timezone())
    }

    /// Sets the zone used for "1 day" and "1 week" lead times.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Replaces any pending reminder for `task` with a fresh one.
    ///
    /// Existing pending entries for the task are deleted first, whether or
    /// not a new one is queued. Both steps run in one transaction.
    pub async fn schedule_reminder(
        &self,
        task: &Task,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, StorageError> {
        let plan = self.plan(task, user_id, now);
        let result = self
            .dal
            .reminder_queue()
            .replace_pending_for_task(
                &task.id,
                PendingDisposition::Delete,
                plan.as_ref().ok().cloned(),
                UniversalTimestamp::from(now),
            )
            .await;

        let replacement = match result {
            Ok(replacement) => replacement,
            Err(StorageError::AlreadyScheduled { .. }) => {
                debug!(task_id = %task.id, "Reminder already queued by a concurrent call");
                return Ok(ScheduleOutcome::AlreadyScheduled);
            }
            Err(e) => return Err(e),
        };

        if replacement.removed > 0 {
            debug!(
                task_id = %task.id,
                removed = replacement.removed,
                "Removed superseded pending reminders"
            );
        }

        Ok(self.outcome(task, plan, replacement.created))
    }

    /// Cancels every pending reminder of a task.
    ///
    /// Returns how many entries were cancelled.
    pub async fn cancel_reminders(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let cancelled = self
            .dal
            .reminder_queue()
            .cancel_pending_for_task(task_id, UniversalTimestamp::from(now))
            .await?;

        if cancelled > 0 {
            metrics::counter!("nudge_reminders_cancelled_total", "source" => "scheduler")
                .increment(cancelled as u64);
            info!(task_id = %task_id, cancelled, "Cancelled pending reminders");
        }
        Ok(cancelled)
    }

    /// Cancels pending reminders for `task` and queues a new one if its
    /// current settings call for it, in one transaction.
    pub async fn reschedule_reminders(
        &self,
        task: &Task,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RescheduleOutcome, StorageError> {
        let plan = self.plan(task, user_id, now);
        let result = self
            .dal
            .reminder_queue()
            .replace_pending_for_task(
                &task.id,
                PendingDisposition::Cancel,
                plan.as_ref().ok().cloned(),
                UniversalTimestamp::from(now),
            )
            .await;

        let replacement = match result {
            Ok(replacement) => replacement,
            Err(StorageError::AlreadyScheduled { .. }) => {
                debug!(task_id = %task.id, "Reminder already queued by a concurrent call");
                return Ok(RescheduleOutcome {
                    cancelled: 0,
                    outcome: ScheduleOutcome::AlreadyScheduled,
                });
            }
            Err(e) => return Err(e),
        };

        if replacement.removed > 0 {
            metrics::counter!("nudge_reminders_cancelled_total", "source" => "scheduler")
                .increment(replacement.removed as u64);
        }

        Ok(RescheduleOutcome {
            cancelled: replacement.removed,
            outcome: self.outcome(task, plan, replacement.created),
        })
    }

    /// Routes a task mutation to the matching queue operation.
    ///
    /// Updates that close or soft-delete the task only cancel.
    pub async fn apply_task_change(
        &self,
        task: &Task,
        user_id: &str,
        change: TaskChange,
        now: DateTime<Utc>,
    ) -> Result<RescheduleOutcome, StorageError> {
        match change {
            TaskChange::Created => Ok(RescheduleOutcome {
                cancelled: 0,
                outcome: self.schedule_reminder(task, user_id, now).await?,
            }),
            TaskChange::Updated if task.accepts_reminders() => {
                self.reschedule_reminders(task, user_id, now).await
            }
            TaskChange::Updated | TaskChange::Deleted => Ok(RescheduleOutcome {
                cancelled: self.cancel_reminders(&task.id, now).await?,
                outcome: ScheduleOutcome::NotScheduled(SkipReason::TaskClosed),
            }),
        }
    }

    fn plan(
        &self,
        task: &Task,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<NewReminderEntry, SkipReason> {
        let settings = task.enabled_reminder().ok_or(SkipReason::ReminderDisabled)?;
        let due_at = task.due_at.ok_or(SkipReason::NoDueDate)?;
        if !task.accepts_reminders() {
            return Err(SkipReason::TaskClosed);
        }
        let scheduled_for = compute_reminder_time_in(due_at, settings.lead_time, now, self.timezone)
            .ok_or(SkipReason::WindowPassed)?;

        Ok(NewReminderEntry {
            task_id: task.id.clone(),
            user_id: user_id.to_string(),
            kind: ReminderKind::DueDate,
            scheduled_for: UniversalTimestamp::from(scheduled_for),
        })
    }

    fn outcome(
        &self,
        task: &Task,
        plan: Result<NewReminderEntry, SkipReason>,
        created: Option<ReminderEntry>,
    ) -> ScheduleOutcome {
        match (plan, created) {
            (Ok(_), Some(entry)) => {
                metrics::counter!("nudge_reminders_scheduled_total").increment(1);
                info!(
                    task_id = %task.id,
                    entry_id = %entry.id,
                    scheduled_for = %entry.scheduled_for,
                    "Scheduled reminder"
                );
                ScheduleOutcome::Scheduled(entry)
            }
            (Err(reason), _) => {
                debug!(task_id = %task.id, ?reason, "Reminder not scheduled");
                ScheduleOutcome::NotScheduled(reason)
            }
            // a planned replacement always comes back created
            (Ok(_), None) => ScheduleOutcome::AlreadyScheduled,
        }
    }
}
